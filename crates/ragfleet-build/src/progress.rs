use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Spinner shown while a service image builds or pushes
pub struct BuildProgress {
    progress_bar: ProgressBar,
}

impl BuildProgress {
    pub fn new(action: &str, service_name: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        pb.set_style(style);
        pb.enable_steady_tick(Duration::from_millis(120));
        pb.set_message(format!("{} {}...", action, service_name));

        Self { progress_bar: pb }
    }

    /// Last line of daemon output, trimmed to fit the spinner line
    pub fn set_message(&self, msg: &str) {
        let line = msg.trim();
        if line.is_empty() {
            return;
        }
        let line: String = line.chars().take(100).collect();
        self.progress_bar.set_message(line);
    }

    pub fn finish_success(&self, message: &str) {
        self.progress_bar
            .finish_with_message(format!("{} ✓", message));
    }

    pub fn finish_error(&self, error: &str) {
        self.progress_bar
            .abandon_with_message(format!("failed: {}", error));
    }
}
