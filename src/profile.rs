//! Timing block for the test views
//!
//! ```text
//! 211
//! time: 0.8116917610168457
//! rpc_time: 0.7433881759643555 (91%)
//! wait_time: 0.742734432220459 (91%)
//! ```
//!
//! With profiling enabled the block also reports process CPU usage and the
//! most expensive datastore calls made during the request.

use std::time::Instant;
use sysinfo::{Pid, System};

use crate::context::{self, CallStats, RequestContext};
use crate::output::ViewOutput;

/// Rows shown in the call table
pub const PROFILE_ROWS: usize = 20;

struct CpuSampler {
    system: System,
    pid: Pid,
}

impl CpuSampler {
    fn start() -> Option<Self> {
        let pid = sysinfo::get_current_pid().ok()?;
        let mut system = System::new();
        system.refresh_process(pid);
        Some(Self { system, pid })
    }

    /// CPU usage of this process since `start`, in percent of one core
    fn usage(mut self) -> Option<f32> {
        self.system.refresh_process(self.pid);
        self.system.process(self.pid).map(|p| p.cpu_usage())
    }
}

pub struct Profile {
    start: Instant,
    context: Option<RequestContext>,
    cpu: Option<CpuSampler>,
    detailed: bool,
}

impl Profile {
    /// Start timing; `detailed` adds the CPU figure and call table
    pub fn start(detailed: bool) -> Self {
        let cpu = if detailed { CpuSampler::start() } else { None };
        Self {
            start: Instant::now(),
            context: context::current(),
            cpu,
            detailed,
        }
    }

    /// Stop timing and write the report
    pub fn finish(self, out: &mut ViewOutput) {
        let elapsed = self.start.elapsed().as_secs_f64();
        let (rpc_time, wait_time) = match &self.context {
            Some(ctx) => (ctx.rpc_time().as_secs_f64(), ctx.wait_time().as_secs_f64()),
            None => (0.0, 0.0),
        };

        out.line(format!("time: {}", elapsed));
        out.line(format!("rpc_time: {} ({}%)", rpc_time, percent(rpc_time, elapsed)));
        out.line(format!("wait_time: {} ({}%)", wait_time, percent(wait_time, elapsed)));

        if !self.detailed {
            return;
        }

        out.blank();
        if let Some(usage) = self.cpu.and_then(CpuSampler::usage) {
            out.line(format!("   process cpu {:.1}% of one core", usage));
        }
        let stats = self
            .context
            .as_ref()
            .map(RequestContext::call_stats)
            .unwrap_or_default();
        write_call_table(out, &stats, rpc_time);
    }
}

/// Whole percentage of `part` in `whole`, truncated
pub fn percent(part: f64, whole: f64) -> i64 {
    if whole <= 0.0 {
        0
    } else {
        (part * 100.0 / whole) as i64
    }
}

fn write_call_table(out: &mut ViewOutput, stats: &[(&'static str, CallStats)], rpc_time: f64) {
    let total_calls: u64 = stats.iter().map(|(_, s)| s.calls).sum();
    out.line(format!(
        "         {} datastore calls in {:.3} seconds",
        total_calls, rpc_time
    ));
    out.blank();
    out.line("   Ordered by total time");
    if stats.len() > PROFILE_ROWS {
        out.line(format!(
            "   List reduced from {} to {} due to restriction <{}>",
            stats.len(),
            PROFILE_ROWS,
            PROFILE_ROWS
        ));
    }
    out.blank();
    out.line(format!(
        "{:>9} {:>9} {:>9} {:>9}  {}",
        "ncalls", "tottime", "percall", "maxtime", "call"
    ));
    for (name, s) in stats.iter().take(PROFILE_ROWS) {
        out.line(format!(
            "{:>9} {:>9.3} {:>9.3} {:>9.3}  {}",
            s.calls,
            s.total.as_secs_f64(),
            s.per_call().as_secs_f64(),
            s.max.as_secs_f64(),
            name
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_percent() {
        assert_eq!(percent(0.0, 0.0), 0);
        assert_eq!(percent(0.74, 0.81), 91);
        assert_eq!(percent(0.999, 1.0), 99);
    }

    #[test]
    fn test_report_outside_context() {
        let mut out = ViewOutput::new();
        Profile::start(false).finish(&mut out);

        let lines: Vec<&str> = out.as_str().lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("time: "));
        assert_eq!(lines[1], "rpc_time: 0 (0%)");
        assert_eq!(lines[2], "wait_time: 0 (0%)");
    }

    #[tokio::test]
    async fn test_detailed_report_lists_calls() {
        let ctx = RequestContext::new();
        let out = ctx
            .clone()
            .scope(async {
                let mut out = ViewOutput::new();
                let profile = Profile::start(true);
                context::wait(context::rpc(
                    "store.count",
                    tokio::time::sleep(Duration::from_millis(2)),
                ))
                .await;
                profile.finish(&mut out);
                out
            })
            .await;

        let text = out.as_str();
        assert!(text.contains("1 datastore calls in"));
        assert!(text.contains("store.count"));
        assert!(text.contains("ncalls"));
        // Table lines stay out of the way of `key: value` parsing
        let keyed: Vec<&str> = text.lines().filter(|l| l.contains(": ")).collect();
        assert_eq!(keyed.len(), 3);
    }

    #[test]
    fn test_call_table_is_truncated() {
        let mut out = ViewOutput::new();
        let names: Vec<&'static str> = (0..25)
            .map(|i| &*Box::leak(format!("call{}", i).into_boxed_str()))
            .collect();
        let stats: Vec<(&'static str, CallStats)> = names
            .into_iter()
            .map(|n| {
                (
                    n,
                    CallStats {
                        calls: 1,
                        total: Duration::from_millis(1),
                        max: Duration::from_millis(1),
                    },
                )
            })
            .collect();

        write_call_table(&mut out, &stats, 0.025);
        assert!(out.as_str().contains("List reduced from 25 to 20"));
        assert_eq!(out.as_str().lines().filter(|l| l.ends_with(|c: char| c.is_ascii_digit()) && l.contains("call")).count(), 20);
    }
}
