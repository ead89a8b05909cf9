//! Ingestion progress reporting.
//!
//! Long-running commands (`model create`, `corpus load`, `compare add`,
//! `assign`) report fractional completion and a human-readable status line
//! through a [`ProgressReporter`]. Progress is emitted on **stderr** so
//! stdout remains parseable for scripts.
//!
//! Every operation fixes its `total` up front, `completed` never decreases,
//! and the final report always carries `completed == total`. The
//! [`ProgressTracker`] throttles intermediate reports to a configurable
//! percentage margin so a ten-million-row load does not emit ten million
//! lines.

use std::io::Write;

/// Sink for progress reports. Implementations write to stderr (human or
/// JSON) or discard the report entirely.
pub trait ProgressReporter: Send + Sync {
    /// Emit one report. `completed` is monotonically non-decreasing and
    /// `total` is fixed for the lifetime of the operation.
    fn report(&self, completed: u64, total: u64, message: &str);
}

/// Human-friendly progress on stderr:
/// `Loaded 120,000 articles  240,001 / 360,001 (66.6%)`.
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, completed: u64, total: u64, message: &str) {
        let line = format!(
            "{}  {} / {} ({:.1}%)\n",
            message,
            format_number(completed),
            format_number(total),
            percent(completed, total),
        );
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, completed: u64, total: u64, message: &str) {
        let obj = serde_json::json!({
            "event": "progress",
            "completed": completed,
            "total": total,
            "percent": percent(completed, total),
            "message": message,
        });
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _completed: u64, _total: u64, _message: &str) {}
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Build a reporter for this mode. Caller passes it to the engines.
    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

/// Tracks one operation's completion against a fixed total and forwards to
/// the reporter only when the percentage has moved by more than `margin`
/// points since the last forwarded report (reports at 0% and the final
/// [`finish`](ProgressTracker::finish) always go through).
pub struct ProgressTracker<'a> {
    reporter: &'a dyn ProgressReporter,
    total: u64,
    completed: u64,
    reported_pct: f64,
    margin: f64,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(reporter: &'a dyn ProgressReporter, total: u64, margin: f64) -> Self {
        ProgressTracker {
            reporter,
            total,
            completed: 0,
            reported_pct: 0.0,
            margin,
        }
    }

    /// Advance by `units` and maybe emit. Clamped to the total.
    pub fn advance(&mut self, units: u64, message: &str) {
        self.completed = (self.completed + units).min(self.total);
        let pct = percent(self.completed, self.total);
        if pct == 0.0 || pct - self.reported_pct > self.margin {
            self.reporter.report(self.completed, self.total, message);
            self.reported_pct = pct;
        }
    }

    /// Final report: always emitted, always `completed == total`.
    pub fn finish(&mut self, message: &str) {
        self.completed = self.total;
        self.reporter.report(self.completed, self.total, message);
        self.reported_pct = 100.0;
    }
}

/// Percentage truncated to two decimals, matching the report lines.
fn percent(completed: u64, total: u64) -> f64 {
    if total == 0 {
        return 100.0;
    }
    (completed as f64 / total as f64 * 10_000.0).trunc() / 100.0
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recording {
        calls: Mutex<Vec<(u64, u64, String)>>,
    }

    impl Recording {
        fn new() -> Self {
            Recording {
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl ProgressReporter for Recording {
        fn report(&self, completed: u64, total: u64, message: &str) {
            self.calls
                .lock()
                .unwrap()
                .push((completed, total, message.to_string()));
        }
    }

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(1), "1");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234), "1,234");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn margin_bounds_report_volume() {
        let rec = Recording::new();
        let mut tracker = ProgressTracker::new(&rec, 10_000, 1.0);
        for _ in 0..10_000 {
            tracker.advance(1, "step");
        }
        tracker.finish("done");
        let calls = rec.calls.lock().unwrap();
        // At most one report per whole percent, plus the 0% calls and the
        // final one.
        assert!(calls.len() <= 102, "emitted {} reports", calls.len());
        let last = calls.last().unwrap();
        assert_eq!(last.0, last.1);
    }

    #[test]
    fn completed_is_monotonic_and_clamped() {
        let rec = Recording::new();
        let mut tracker = ProgressTracker::new(&rec, 10, 0.0);
        tracker.advance(4, "a");
        tracker.advance(4, "b");
        tracker.advance(4, "c");
        tracker.finish("done");
        let calls = rec.calls.lock().unwrap();
        let mut last = 0;
        for (completed, total, _) in calls.iter() {
            assert!(*completed >= last);
            assert!(*completed <= *total);
            last = *completed;
        }
        assert_eq!(calls.last().unwrap().0, 10);
    }

    #[test]
    fn finish_always_reports_total() {
        let rec = Recording::new();
        let mut tracker = ProgressTracker::new(&rec, 7, 100.0);
        tracker.advance(3, "quiet");
        tracker.finish("done");
        let calls = rec.calls.lock().unwrap();
        assert_eq!(calls.last().unwrap().0, 7);
        assert_eq!(calls.last().unwrap().1, 7);
    }

    #[test]
    fn zero_total_reports_full() {
        assert_eq!(percent(0, 0), 100.0);
    }
}
