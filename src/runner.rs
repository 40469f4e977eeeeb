//! Drives a running server through its endpoints and averages the timings
//!
//! Each test is called once to discover which timing keys it reports (that
//! run's numbers are thrown away), then `iterations` more times. Averages
//! are rounded to `round` decimals.

use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::{BenchError, BenchResult};

/// Timing key to seconds, as parsed from one response
pub type Times = BTreeMap<String, f64>;

pub const DEFAULT_ITERATIONS: usize = 1000;
/// Decimals kept in averages (milliseconds)
pub const DEFAULT_ROUND: u32 = 3;

/// Extract `key: value` timing lines from a test response
///
/// Anything after the first whitespace of the value (the percentage) is
/// dropped; lines without `": "` or with a non-numeric value are skipped.
pub fn parse_times(body: &str) -> Times {
    let mut times = Times::new();
    for line in body.lines() {
        let Some((key, value)) = line.split_once(": ") else {
            continue;
        };
        let Some(first) = value.split_whitespace().next() else {
            continue;
        };
        match first.parse::<f64>() {
            Ok(v) => {
                times.insert(key.to_string(), v);
            }
            Err(_) => tracing::debug!("Skipping non-numeric line: {}", line),
        }
    }
    times
}

pub fn round_to(value: f64, digits: u32) -> f64 {
    let factor = 10f64.powi(digits as i32);
    (value * factor).round() / factor
}

/// Divide sums by `n` and round
pub fn average(sums: &Times, n: usize, digits: u32) -> Times {
    let n = n.max(1) as f64;
    sums.iter()
        .map(|(key, value)| (key.clone(), round_to(value / n, digits)))
        .collect()
}

/// `time` first, then the other keys sorted, each with its share of `time`
pub fn format_times(times: &Times) -> BenchResult<String> {
    let total = *times
        .get("time")
        .ok_or_else(|| BenchError::Protocol("response reported no 'time'".to_string()))?;

    let mut lines = vec![format!("time: {}", total)];
    for (key, value) in times.iter().filter(|(k, _)| k.as_str() != "time") {
        let percent = if total > 0.0 {
            (value * 100.0 / total).round() as i64
        } else {
            0
        };
        lines.push(format!("{}: {} ({}%)", key, value, percent));
    }
    Ok(lines.join("\n"))
}

pub struct Runner {
    client: reqwest::Client,
    base_url: String,
    iterations: usize,
    round: u32,
    progress: bool,
}

impl Runner {
    pub fn new(base_url: &str, iterations: usize, round: u32) -> BenchResult<Self> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            iterations,
            round,
            progress: false,
        })
    }

    /// Show a progress bar while a test is repeated
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// GET a path and return the trimmed body
    pub async fn get(&self, path: &str) -> BenchResult<String> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(BenchError::Status {
                status: status.as_u16(),
                message: text.trim().to_string(),
            });
        }
        Ok(text.trim().to_string())
    }

    pub async fn get_times(&self, path: &str) -> BenchResult<Times> {
        Ok(parse_times(&self.get(path).await?))
    }

    /// Averaged timings of one test endpoint
    pub async fn run_test(&self, path: &str) -> BenchResult<Times> {
        // The warm-up run only decides which keys are summed
        let mut sums: Times = self
            .get_times(path)
            .await?
            .into_keys()
            .map(|key| (key, 0.0))
            .collect();

        let bar = if self.progress {
            let bar = ProgressBar::new(self.iterations as u64);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner:.green} {msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            {
                bar.set_style(style.progress_chars("#>-"));
            }
            bar.set_message(path.to_string());
            bar
        } else {
            ProgressBar::hidden()
        };

        for _ in 0..self.iterations {
            let times = self.get_times(path).await?;
            for (key, value) in times {
                if let Some(sum) = sums.get_mut(&key) {
                    *sum += value;
                }
            }
            bar.inc(1);
        }
        bar.finish_and_clear();

        Ok(average(&sums, self.iterations, self.round))
    }

    /// The whole session: check, clean, seed, time test1 and test2, clean
    pub async fn run_suite<F>(&self, mut report: F) -> BenchResult<()>
    where
        F: FnMut(&str),
    {
        report(&format!("Checking {}", self.base_url));
        let health = self.get("/").await?;
        if health != "ok" {
            return Err(BenchError::Protocol(format!(
                "health check returned '{}'",
                health
            )));
        }
        report("ok");

        report("Clean up");
        report(&self.get("/cleanup").await?);

        report("Initialize");
        report(&self.get("/init").await?);

        for (label, path) in [("Test 1", "/test1"), ("Test 2", "/test2")] {
            report(label);
            let times = self.run_test(path).await?;
            report(&format_times(&times)?);
        }

        report("Clean up");
        report(&self.get("/cleanup").await?);
        Ok(())
    }
}
