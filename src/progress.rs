use crate::batch::ProgressSink;
use indicatif::{ProgressBar, ProgressStyle};

const SCALE: u64 = 1_000;

/// Drives an indicatif bar from per-row progress updates.
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new(bar: ProgressBar) -> Self {
        bar.set_length(SCALE);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent}% {msg}")
        {
            bar.set_style(style.progress_chars("#>-"));
        }
        Self { bar }
    }

    pub fn finish(&self, message: String) {
        self.bar.finish_with_message(message);
    }
}

impl ProgressSink for BarProgress {
    fn update(&self, fraction: f64, status: &str) {
        let position = (fraction.clamp(0.0, 1.0) * SCALE as f64).round() as u64;
        self.bar.set_position(position);
        self.bar.set_message(status.to_string());
    }
}
