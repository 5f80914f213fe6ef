// src/progress.rs
//! Periodic progress reporting for long exports

use indicatif::{ProgressBar, ProgressStyle};
use std::time::{Duration, Instant};

/// Emits a throughput/ETA status line every `interval` processed entries.
///
/// Pure observer: display problems are ignored and reporting never blocks
/// or fails the pipeline.
pub struct ProgressReporter {
    bar: Option<ProgressBar>,
    start: Instant,
    interval: u64,
    expected_total: u64,
}

impl ProgressReporter {
    pub fn new(enabled: bool, interval: u64, expected_total: u64) -> Self {
        let bar = if enabled {
            let bar = ProgressBar::new(expected_total);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{bar:40.green} {pos}/{len} {msg}")
                    .expect("Invalid template"),
            );
            Some(bar)
        } else {
            None
        };

        Self {
            bar,
            start: Instant::now(),
            interval,
            expected_total,
        }
    }

    /// Report progress if `processed` falls on the reporting interval.
    pub fn tick(&self, processed: u64) {
        if self.interval == 0 || processed % self.interval != 0 {
            return;
        }

        let line = format_status(processed, self.start.elapsed(), self.expected_total);
        match &self.bar {
            Some(bar) => {
                bar.set_position(processed);
                bar.set_message(line);
            }
            None => tracing::info!("{}", line),
        }
    }

    /// Clear the progress display.
    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.finish_and_clear();
        }
    }
}

/// Format a status line with throughput and an ETA extrapolated from the
/// expected total entry count.
pub fn format_status(processed: u64, elapsed: Duration, expected_total: u64) -> String {
    let secs = elapsed.as_secs_f64();
    let rate = if secs > 0.0 { processed as f64 / secs } else { 0.0 };

    let eta = if rate > 0.0 && expected_total > processed {
        format_duration(Duration::from_secs_f64((expected_total - processed) as f64 / rate))
    } else {
        "unknown".to_string()
    };

    format!(
        "{} entries | {:.0} entries/s | elapsed: {} | eta: {}",
        processed,
        rate,
        format_duration(elapsed),
        eta
    )
}

/// Format a duration as hours/minutes/seconds.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
