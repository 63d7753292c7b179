use std::sync::Mutex;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Finished-instance progress, drawn on stderr. Created on the first sample.
pub(crate) struct HumanProgress {
    inner: Mutex<Option<ProgressBar>>,
}

impl HumanProgress {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    pub(crate) fn update(&self, expected: Option<u64>, finished: u64, message: String) {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let pb = inner.get_or_insert_with(|| new_bar(expected));
        pb.set_message(message);
        match expected {
            // Overshoot keeps the bar full; the sampler keeps going.
            Some(total) => pb.set_position(finished.min(total)),
            None => {
                pb.set_position(finished);
                pb.tick();
            }
        }
    }

    /// Runs `f` with the bar hidden, so plain output does not tear it.
    pub(crate) fn suspend<F: FnOnce()>(&self, f: F) {
        let inner = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        match inner.as_ref() {
            Some(pb) => pb.suspend(f),
            None => f(),
        }
    }

    pub(crate) fn finish(&self) {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(pb) = inner.take() {
            pb.finish_and_clear();
        }
    }
}

fn new_bar(expected: Option<u64>) -> ProgressBar {
    let target = ProgressDrawTarget::stderr_with_hz(5);
    match expected {
        Some(total) => {
            let pb = ProgressBar::with_draw_target(Some(total), target);
            pb.set_style(bar_style());
            pb.set_prefix("finished");
            pb
        }
        None => {
            let pb = ProgressBar::with_draw_target(None, target);
            pb.set_style(spinner_style());
            pb.set_prefix("finished");
            pb.enable_steady_tick(Duration::from_millis(120));
            pb
        }
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix} [ {bar:20.cyan/blue} ] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█░")
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix} {spinner} {pos} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}
