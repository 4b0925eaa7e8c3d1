//! A console progress bar counting simulated days across every job of a run.
//!
//! The bar is a process-wide singleton. The job driver initializes it with the total number of
//! days it expects to simulate; each simulation that has progress reporting turned on advances it
//! once per day. Jobs that stop early leave the bar short of its maximum, so the driver finalizes
//! it once all jobs are done.
//!
//! ```ignore
//! init_day_progress_bar(jobs.iter().map(|job| job.num_days as usize).sum());
//! // ... run jobs ...
//! finish_day_progress();
//! ```

use crate::log::trace;
use progress_bar::{
    finalize_progress_bar, inc_progress_bar, init_progress_bar, set_progress_bar_action, Color,
    Style,
};

/// Initializes the bar with the number of days all jobs will simulate between them.
pub fn init_day_progress_bar(total_days: usize) {
    trace!("initializing day progress bar with {total_days} days");
    init_progress_bar(total_days);
    set_progress_bar_action("Days", Color::Blue, Style::Bold);
}

/// Advances the bar by one simulated day.
pub fn increment_day_progress() {
    inc_progress_bar();
}

pub fn finish_day_progress() {
    finalize_progress_bar();
}
