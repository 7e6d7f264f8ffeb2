//! Throttled diagnostics for long searches

use indicatif::{ProgressBar, ProgressStyle};
use log::debug;
use num_format::{Locale, ToFormattedString};

use std::time::{Duration, Instant};

use crate::board::Board;
use crate::ending_cache::EndingCache;

/// Steps of the progress bar
const PROGRESS_BAR_RESOLUTION: u64 = 1_000_000_000;
/// Number of shallow depth levels whose sizes are included in a report
const REPORTED_DEPTHS: usize = 10;

/// Counts search iterations and decides when a status report is due
///
/// A report is due once the iteration counter passes the mask and enough
/// wall-clock time has elapsed since the last one; both must hold, so the
/// clock is only read once every `mask + 1` iterations.
pub struct Progress {
    mask: u64,
    period: Duration,

    start_time: Instant,
    last_report: Instant,
    first_progress: Option<f64>,
    iterations: u64,
    last_iterations: u64,

    bar: ProgressBar,
}

impl Progress {
    pub fn new(mask: u64, period: Duration, show_bar: bool) -> Self {
        let bar = if show_bar {
            let bar = ProgressBar::new(PROGRESS_BAR_RESOLUTION);
            bar.set_style(
                ProgressStyle::with_template(
                    "Solving: {bar:40.cyan/blue} {percent}% [{elapsed_precise}] ~{eta} remaining",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▓▒░  "),
            );
            bar
        } else {
            ProgressBar::hidden()
        };

        let now = Instant::now();
        Self {
            mask,
            period,
            start_time: now,
            last_report: now,
            first_progress: None,
            iterations: 0,
            last_iterations: 0,
            bar,
        }
    }

    /// Resets the counters before a new top-level search
    pub fn restart(&mut self) {
        let now = Instant::now();
        self.start_time = now;
        self.last_report = now;
        self.first_progress = None;
        self.iterations = 0;
        self.last_iterations = 0;
        self.bar.reset();
    }

    #[inline]
    pub fn tick(&mut self) {
        self.iterations += 1;
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    #[inline]
    pub fn is_due(&self) -> bool {
        self.iterations & self.mask == 0 && self.last_report.elapsed() >= self.period
    }

    /// Logs a snapshot of the search, `progress` being the explored fraction of the tree
    pub fn report(&mut self, board: &Board, progress: f64, cache: &EndingCache) {
        let duration = self.start_time.elapsed();
        let since_last = self.last_report.elapsed();
        let first_progress = *self.first_progress.get_or_insert(progress);

        let eta_secs = if progress > first_progress {
            duration.as_secs_f64() * (1.0 - progress) / (progress - first_progress)
        } else {
            0.0
        };
        let ips = per_second(self.iterations, duration);
        let instant_ips = per_second(self.iterations - self.last_iterations, since_last);
        self.last_iterations = self.iterations;
        self.last_report = Instant::now();

        let shallow_sizes: Vec<usize> = (0..REPORTED_DEPTHS.min(cache.depths()))
            .map(|depth| cache.depth_size(depth))
            .collect();

        debug!(
            "iterations={} cache_size={} cache_clears={} max_uncleared_depth={:?} \
             progress={:.6} eta={}s ips_avg={} ips={} shallow_cache_sizes={:?}",
            self.iterations.to_formatted_string(&Locale::en),
            cache.size().to_formatted_string(&Locale::en),
            cache.clears().to_formatted_string(&Locale::en),
            cache.max_uncleared_depth(),
            progress,
            eta_secs as u64,
            ips.to_formatted_string(&Locale::en),
            instant_ips.to_formatted_string(&Locale::en),
            shallow_sizes,
        );
        debug!("currently considered board:\n{}", board);
        self.bar
            .set_position((progress * PROGRESS_BAR_RESOLUTION as f64) as u64);
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

fn per_second(count: u64, duration: Duration) -> u64 {
    match duration.as_secs() {
        0 => count,
        secs => count / secs,
    }
}
