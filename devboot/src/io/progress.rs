//! Terminal rendering for [`ProgressState`].

use std::fmt;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::trace;

use crate::core::progress::ProgressState;
use crate::error::EngineError;

const BAR_TEMPLATE: &str = "{prefix:.bold} [{bar:40.cyan/blue}] {pos}/{len} ({elapsed})";

/// Whether trackers draw to the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProgressDisplay {
    #[default]
    Terminal,
    Hidden,
}

impl ProgressDisplay {
    pub fn tracker(self, label: &str, total: u64) -> Result<ProgressTracker, EngineError> {
        match self {
            Self::Terminal => ProgressTracker::with_bar(total, terminal_bar(label, total)),
            Self::Hidden => ProgressTracker::hidden(total),
        }
    }
}

fn terminal_bar(label: &str, total: u64) -> ProgressBar {
    let bar = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::with_template(BAR_TEMPLATE) {
        bar.set_style(style.progress_chars("=> "));
    }
    bar.set_prefix(label.to_string());
    bar
}

/// Bounded counter plus an optional render target.
///
/// indicatif rate-limits redraws, so bursts of `advance` calls coalesce into a
/// single refresh. Only the state at `finish` is guaranteed to be drawn.
pub struct ProgressTracker {
    state: ProgressState,
    bar: Option<ProgressBar>,
}

impl fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("state", &self.state)
            .field("rendered", &self.bar.is_some())
            .finish()
    }
}

impl ProgressTracker {
    pub fn hidden(total: u64) -> Result<Self, EngineError> {
        Ok(Self {
            state: ProgressState::new(total)?,
            bar: None,
        })
    }

    pub fn with_bar(total: u64, bar: ProgressBar) -> Result<Self, EngineError> {
        let state = ProgressState::new(total)?;
        bar.set_length(total);
        bar.set_position(0);
        Ok(Self {
            state,
            bar: Some(bar),
        })
    }

    pub fn state(&self) -> ProgressState {
        self.state
    }

    pub fn advance(&mut self, units: u64) {
        if units == 0 {
            return;
        }
        let position = self.state.advance(units);
        trace!(units, position, total = self.state.total(), "progress advanced");
        if let Some(bar) = &self.bar {
            bar.set_position(position);
        }
    }

    pub fn finish(&mut self) {
        self.state.finish();
        if let Some(bar) = &self.bar {
            bar.set_position(self.state.total());
            bar.finish();
        }
    }

    /// Stop drawing and leave the bar at the reached position.
    pub fn abandon(&mut self) {
        if let Some(bar) = &self.bar {
            bar.abandon();
        }
    }

    pub fn reset(&mut self, total: u64) -> Result<(), EngineError> {
        self.state.reset(total)?;
        if let Some(bar) = &self.bar {
            bar.reset();
            bar.set_length(total);
        }
        Ok(())
    }
}
