//! Progress reporting for the fetch phases of a catalog build.
//!
//! Interactive runs draw an indicatif bar per phase. With `--log-only` the
//! bar stays hidden and a `log` line is written every few steps instead, so
//! piped or tailed output stays readable.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::info;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

static LOG_ONLY: AtomicBool = AtomicBool::new(false);

const BAR_TEMPLATE: &str = "{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec}, ETA: {eta})";

pub fn set_log_only(value: bool) {
    LOG_ONLY.store(value, Ordering::Relaxed);
}

pub fn is_log_only() -> bool {
    LOG_ONLY.load(Ordering::Relaxed)
}

/// Seconds below a minute, minutes above.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        format!("{:.1}m", secs / 60.0)
    }
}

/// Step counter for one phase (album listings, a batch stream).
pub struct PhaseProgress {
    phase: &'static str,
    total: u64,
    done: u64,
    /// Log every this many steps in log-only mode.
    log_every: u64,
    bar: ProgressBar,
}

impl PhaseProgress {
    pub fn new(phase: &'static str, total: u64) -> Self {
        let bar = ProgressBar::new(total);
        if is_log_only() {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        } else if let Ok(style) = ProgressStyle::default_bar().template(BAR_TEMPLATE) {
            bar.set_style(style.progress_chars("=> "));
        }
        bar.set_message(phase);

        Self {
            phase,
            total,
            done: 0,
            log_every: (total / 10).max(1),
            bar,
        }
    }

    pub fn position(&self) -> u64 {
        self.done
    }

    /// Whether step `done` of `total` gets a log line.
    fn should_log(&self) -> bool {
        self.total > 0 && (self.done % self.log_every == 0 || self.done == self.total)
    }

    pub fn step(&mut self) {
        self.done += 1;
        self.bar.inc(1);
        if is_log_only() && self.should_log() {
            let pct = 100.0 * self.done as f64 / self.total as f64;
            info!("[{}] {}/{} ({:.1}%)", self.phase, self.done, self.total, pct);
        }
    }

    pub fn finish(self, summary: String) {
        self.bar.finish_with_message(summary);
    }

    /// Stop drawing without marking the phase complete.
    pub fn abandon(self) {
        self.bar.abandon();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1.5m");
    }

    #[test]
    fn test_phase_logs_every_tenth_and_last_step() {
        let mut progress = PhaseProgress::new("albums", 25);
        let mut logged = Vec::new();
        for _ in 0..25 {
            progress.step();
            if progress.should_log() {
                logged.push(progress.position());
            }
        }
        assert_eq!(logged, vec![2, 4, 6, 8, 10, 12, 14, 16, 18, 20, 22, 24, 25]);
        progress.finish("done".to_string());
    }

    #[test]
    fn test_empty_phase_never_logs() {
        let progress = PhaseProgress::new("tracks", 0);
        assert!(!progress.should_log());
        progress.abandon();
    }
}
