use std::ops::Deref;

use console::style;
use indicatif::ProgressBar;

pub fn print_success(message: &str) {
    println!("{} {}", style("✅").green(), style(message).green());
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", style("❌").red(), style(message).red());
}

pub fn print_info(message: &str) {
    eprintln!("{} {}", style("ℹ️").blue(), style(message).blue());
}

pub fn print_warning(message: &str) {
    eprintln!("{} {}", style("⚠️").yellow(), style(message).yellow());
}

pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", size as u64, UNITS[unit_index])
    } else {
        format!("{:.2} {}", size, UNITS[unit_index])
    }
}

/// Clears the spinner when dropped, including on early returns.
pub struct SpinnerGuard(ProgressBar);

impl SpinnerGuard {
    pub fn new(pb: ProgressBar) -> Self {
        Self(pb)
    }
}

impl Deref for SpinnerGuard {
    type Target = ProgressBar;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Drop for SpinnerGuard {
    fn drop(&mut self) {
        self.0.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.00 MB");
    }
}
