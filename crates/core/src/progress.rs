use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tracing::{debug, info};

const TICK_INTERVAL: Duration = Duration::from_millis(300);
const TICKS: [&str; 5] = [".", "..", "...", "....", ""];

/// Blinking-dots status line for one long-running step.
///
/// The animation is driven by indicatif's steady-tick thread, so the caller never
/// waits on it except for the short join inside `stop`. Draw failures are ignored.
pub struct ProgressIndicator {
    visible: bool,
    bar: Option<ProgressBar>,
}

impl Default for ProgressIndicator {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressIndicator {
    pub fn new() -> Self {
        Self {
            visible: true,
            bar: None,
        }
    }

    pub fn hidden() -> Self {
        Self {
            visible: false,
            bar: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.bar.is_some()
    }

    pub fn start(&mut self, label: &str) {
        self.halt();

        if !self.visible {
            debug!(label, "progress started");
            return;
        }

        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{msg} {spinner}")
            .map(|style| style.tick_strings(&TICKS))
            .unwrap_or_else(|error| {
                debug!(%error, "progress template rejected, using default spinner");
                ProgressStyle::default_spinner()
            });
        bar.set_style(style);
        bar.set_message(label.to_string());
        bar.enable_steady_tick(TICK_INTERVAL);
        self.bar = Some(bar);
    }

    pub fn stop(&mut self, final_label: &str) {
        self.halt();

        if self.visible {
            if !final_label.is_empty() {
                println!("{final_label}");
            }
        } else {
            info!(message = final_label, "progress finished");
        }
    }

    fn halt(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.disable_steady_tick();
            bar.finish_and_clear();
        }
    }
}

impl Drop for ProgressIndicator {
    fn drop(&mut self) {
        self.halt();
    }
}

#[cfg(test)]
mod tests {
    use super::ProgressIndicator;

    #[test]
    fn hidden_indicator_never_animates() {
        let mut progress = ProgressIndicator::hidden();
        progress.start("[1/1] a.pdf");
        assert!(!progress.is_running());
        progress.stop("[1/1] a.pdf");
        assert!(!progress.is_running());
    }

    #[test]
    fn visible_indicator_starts_and_stops_without_a_terminal() {
        let mut progress = ProgressIndicator::new();
        progress.start("[1/2] a.pdf");
        assert!(progress.is_running());
        progress.start("[2/2] b.pdf");
        assert!(progress.is_running());
        progress.stop("");
        assert!(!progress.is_running());
    }
}
