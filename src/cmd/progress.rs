//! Spinners and progress bars for export phases

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Spinner for phases of unknown length (listing plans, paging sign-ins)
pub fn create_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    spinner.set_style(style);
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

/// Bar advanced once per exported container
pub fn create_progress_bar(total: u64, message: &str) -> ProgressBar {
    let bar = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓▒░ ");
    bar.set_style(style);
    bar.set_message(message.to_string());
    bar
}

fn finish_with(bar: &ProgressBar, prefix: &'static str, template: &str, message: &str) {
    bar.set_style(
        ProgressStyle::default_spinner()
            .template(template)
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.set_prefix(prefix);
    bar.finish_with_message(message.to_string());
}

pub fn finish_spinner_success(spinner: &ProgressBar, message: &str) {
    finish_with(spinner, "✓", "{prefix:.green} {msg}", message);
}

pub fn finish_spinner_error(spinner: &ProgressBar, message: &str) {
    finish_with(spinner, "✗", "{prefix:.red} {msg}", message);
}

pub fn finish_progress_success(bar: &ProgressBar, message: &str) {
    finish_with(bar, "✓", "{prefix:.green} {msg}", message);
}
