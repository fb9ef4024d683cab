//! Progress reporting and cooperative cancellation.

use crate::error::{Error, Result};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Collecting,
    Converting,
    Generating,
    Downloading,
}

impl Stage {
    pub fn label(self) -> &'static str {
        match self {
            Stage::Collecting => "collecting",
            Stage::Converting => "converting",
            Stage::Generating => "generating",
            Stage::Downloading => "downloading",
        }
    }

    /// Percent range covered by the stage.
    fn span(self) -> (f64, f64) {
        match self {
            Stage::Collecting => (0.0, 20.0),
            Stage::Converting => (20.0, 50.0),
            Stage::Generating => (50.0, 90.0),
            Stage::Downloading => (90.0, 100.0),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Progress {
    pub stage: Stage,
    pub percent: u8,
    pub message: String,
}

/// Maps stage-local fractions onto a single non-decreasing percentage.
pub struct ProgressReporter<'a> {
    sink: Option<Box<dyn FnMut(&Progress) + 'a>>,
    last: u8,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(sink: impl FnMut(&Progress) + 'a) -> Self {
        Self {
            sink: Some(Box::new(sink)),
            last: 0,
        }
    }

    pub fn silent() -> Self {
        Self { sink: None, last: 0 }
    }

    pub fn percent(&self) -> u8 {
        self.last
    }

    /// Starts a new run at 0%.
    pub fn reset(&mut self) {
        self.last = 0;
    }

    /// `fraction` is the progress within `stage`, clamped to `0.0..=1.0`.
    pub fn report(&mut self, stage: Stage, fraction: f64, message: impl Into<String>) {
        let (lo, hi) = stage.span();
        let pct = (lo + (hi - lo) * fraction.clamp(0.0, 1.0)).round() as u8;
        self.last = self.last.max(pct);
        let progress = Progress {
            stage,
            percent: self.last,
            message: message.into(),
        };
        log::debug!("[{}%] {}: {}", progress.percent, stage, progress.message);
        if let Some(sink) = self.sink.as_mut() {
            sink(&progress);
        }
    }
}

impl Default for ProgressReporter<'_> {
    fn default() -> Self {
        Self::silent()
    }
}

/// Shared cancellation flag, checked at stage boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_never_decreases() {
        let mut seen = Vec::new();
        {
            let mut reporter = ProgressReporter::new(|p: &Progress| seen.push(p.percent));
            reporter.report(Stage::Converting, 1.0, "done converting");
            reporter.report(Stage::Collecting, 0.5, "late collecting update");
            reporter.report(Stage::Generating, 0.0, "start");
            reporter.report(Stage::Downloading, 1.0, "done");
        }
        assert_eq!(seen, vec![50, 50, 50, 100]);
    }

    #[test]
    fn cancel_token_is_shared() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(token.check().is_ok());
        other.cancel();
        assert!(matches!(token.check(), Err(Error::Cancelled)));
    }
}
