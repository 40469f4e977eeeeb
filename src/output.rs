//! Text output of the benchmark views
//!
//! A view writes lines into a [`ViewOutput`] and returns a result.
//! [`ViewOutput::finish`] turns that into the response body: everything
//! written, a blank line, and on failure the error with its cause chain.

use std::fmt::{self, Display, Write};

#[derive(Debug, Default)]
pub struct ViewOutput {
    buf: String,
}

impl ViewOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(&mut self, text: impl Display) {
        let _ = writeln!(self.buf, "{}", text);
    }

    pub fn blank(&mut self) {
        self.buf.push('\n');
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    pub fn finish(mut self, result: anyhow::Result<()>) -> String {
        self.blank();
        if let Err(err) = result {
            tracing::warn!("View failed: {:#}", err);
            let _ = writeln!(self.buf, "{:?}", err);
        }
        self.buf
    }
}

impl Write for ViewOutput {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.buf.push_str(s);
        Ok(())
    }
}
