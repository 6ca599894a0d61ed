//! Factory reset bookkeeping: the fixed step list, per-step failure messages and
//! progress reporting.

use crate::error::{Result, SpeckError};
use strum_macros::Display;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ResetStep {
    #[strum(to_string = "reset logging interval")]
    LoggingInterval,
    #[strum(to_string = "reset color palette")]
    ColorPalette,
    #[strum(to_string = "reset scale")]
    Scale,
    #[strum(to_string = "erase feed API key")]
    FeedApiKey,
    #[strum(to_string = "erase stored networks")]
    StoredNetworks,
    #[strum(to_string = "erase data samples")]
    Samples,
    #[strum(to_string = "reset upload URL")]
    UploadUrl,
}

impl ResetStep {
    /// Execution order.
    pub const ALL: [ResetStep; 7] = [
        ResetStep::LoggingInterval,
        ResetStep::ColorPalette,
        ResetStep::Scale,
        ResetStep::FeedApiKey,
        ResetStep::StoredNetworks,
        ResetStep::Samples,
        ResetStep::UploadUrl,
    ];

    pub fn failure_message(&self) -> &'static str {
        match self {
            ResetStep::LoggingInterval => "Failed to reset the sample interval.",
            ResetStep::ColorPalette => "Failed to reset the palette.",
            ResetStep::Scale => "Failed to reset the data sample units.",
            ResetStep::FeedApiKey => "Failed to erase the upload configuration settings.",
            ResetStep::StoredNetworks => "Failed to erase the wi-fi configuration.",
            ResetStep::Samples => "Failed to erase all data samples.",
            ResetStep::UploadUrl => "Failed to reset the upload URL.",
        }
    }
}

/// Collects step outcomes and reports `round(100 * done / total)` after each one.
pub struct ResetProgress<F: FnMut(u8)> {
    completed: usize,
    failures: Vec<String>,
    on_progress: F,
}

impl<F: FnMut(u8)> ResetProgress<F> {
    /// Reports 0% immediately.
    pub fn start(mut on_progress: F) -> Self {
        on_progress(0);
        Self {
            completed: 0,
            failures: Vec::new(),
            on_progress,
        }
    }

    /// Records one step. `Ok(false)` counts as a failure just like `Err`.
    pub fn record(&mut self, step: ResetStep, outcome: Result<bool>) {
        match outcome {
            Ok(true) => info!(step = %step, "Factory reset step done"),
            Ok(false) => {
                warn!(step = %step, "Factory reset step was not confirmed by the device");
                self.failures.push(step.failure_message().to_string());
            }
            Err(e) => {
                warn!(step = %step, "Factory reset step failed: {}", e);
                self.failures.push(step.failure_message().to_string());
            }
        }
        self.completed += 1;
        (self.on_progress)(percent(self.completed, ResetStep::ALL.len()));
    }

    pub fn finish(self) -> Result<()> {
        if self.failures.is_empty() {
            Ok(())
        } else {
            Err(SpeckError::FactoryReset(self.failures))
        }
    }
}

fn percent(done: usize, total: usize) -> u8 {
    let rounded = (200 * done + total) / (2 * total);
    u8::try_from(rounded.min(100)).unwrap_or(100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_rounds_half_up() {
        let steps: Vec<u8> = (0..=7).map(|k| percent(k, 7)).collect();
        assert_eq!(steps, vec![0, 14, 29, 43, 57, 71, 86, 100]);
    }

    #[test]
    fn test_failures_are_collected_in_order() {
        let mut reported = Vec::new();
        let mut progress = ResetProgress::start(|p| reported.push(p));
        for step in ResetStep::ALL {
            let outcome = match step {
                ResetStep::FeedApiKey => Ok(false),
                ResetStep::Samples => Err(SpeckError::NoData),
                _ => Ok(true),
            };
            progress.record(step, outcome);
        }
        match progress.finish() {
            Err(SpeckError::FactoryReset(failures)) => assert_eq!(
                failures,
                vec![
                    "Failed to erase the upload configuration settings.",
                    "Failed to erase all data samples."
                ]
            ),
            other => panic!("Expected FactoryReset error, got {:?}", other),
        }
        assert_eq!(reported.first(), Some(&0));
        assert_eq!(reported.last(), Some(&100));
        assert_eq!(reported.len(), 8);
    }
}
