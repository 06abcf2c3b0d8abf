use std::time::Instant;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::error::TrialLabel;

/// Terminal progress for both trials, one bar each.
#[derive(Clone)]
pub struct ProgressBoard {
    multi: MultiProgress,
}

impl ProgressBoard {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
        }
    }

    /// Board that renders nothing; bars still count.
    pub fn hidden() -> Self {
        Self {
            multi: MultiProgress::with_draw_target(ProgressDrawTarget::hidden()),
        }
    }

    pub fn trial(&self, label: TrialLabel, total_samples: Option<u64>) -> TrialProgress {
        let bar = match total_samples {
            Some(total) => {
                let bar = ProgressBar::new(total);
                bar.set_style(bar_style());
                bar
            }
            None => {
                let bar = ProgressBar::new_spinner();
                bar.set_style(spinner_style());
                bar
            }
        };
        let bar = self.multi.add(bar);
        bar.set_prefix(label.to_string());
        TrialProgress {
            bar,
            started: Instant::now(),
            seen: 0,
            detected: 0,
            finished: false,
        }
    }
}

impl Default for ProgressBoard {
    fn default() -> Self {
        Self::new()
    }
}

pub struct TrialProgress {
    bar: ProgressBar,
    started: Instant,
    seen: u64,
    detected: u64,
    finished: bool,
}

impl TrialProgress {
    pub fn observe(&mut self, detected: bool) {
        self.seen = self.seen.saturating_add(1);
        if detected {
            self.detected = self.detected.saturating_add(1);
        }
        self.bar.inc(1);
        let elapsed = self.started.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            let rate = self.seen as f64 / elapsed;
            self.bar.set_message(format!(
                "{rate:.1} fps • pose {}/{}",
                self.detected, self.seen
            ));
        }
    }

    pub fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.bar.finish_with_message(format!(
            "sampled {} frames, pose in {}",
            self.seen, self.detected
        ));
    }

    pub fn fail(&mut self, reason: &str) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.bar
            .abandon_with_message(format!("failed after {} frames: {reason}", self.seen));
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }
}

impl Drop for TrialProgress {
    fn drop(&mut self) {
        if !self.finished {
            self.bar.abandon();
        }
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{prefix:.bold} {bar:40.cyan/blue} {percent:>3.bold}% {pos:>5}/{len:<5} [{elapsed_precise:.dim}<{eta_precise:.dim}] {msg:.yellow}",
    )
    .expect("invalid trial bar template")
    .progress_chars("█▉▊▋▌▍▎▏ ")
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{prefix:.bold} {spinner:.cyan.bold} [{elapsed_precise:.dim}] {pos:>5}f {msg:.yellow}",
    )
    .expect("invalid trial spinner template")
    .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_bars_track_position() {
        let board = ProgressBoard::hidden();
        let mut progress = board.trial(TrialLabel::A, Some(3));
        progress.observe(true);
        progress.observe(false);
        assert_eq!(progress.position(), 2);
        progress.finish();
        progress.fail("ignored once finished");
    }
}
