use crate::autocomplete;
use crate::config::{Timeouts, Timing};
use crate::error::{LookupError, Result};
use crate::model::{FieldKind, FieldTarget, VerificationOutcome};
use crate::page::PageDriver;
use crate::verify::verify;
use tokio::time::sleep;
use tracing::{info, warn};

/// Applies a field value and keeps at it until the page reflects it
pub struct RetryingFiller<'a> {
    timing: &'a Timing,
    timeouts: &'a Timeouts,
    suggestions: Option<&'a str>,
}

impl<'a> RetryingFiller<'a> {
    pub fn new(timing: &'a Timing, timeouts: &'a Timeouts) -> Self {
        Self {
            timing,
            timeouts,
            suggestions: None,
        }
    }

    /// Also wait for this suggestion list before picking from it
    pub fn with_suggestions(mut self, selector: Option<&'a str>) -> Self {
        self.suggestions = selector;
        self
    }

    /// Fill `target`, verifying after every attempt.
    ///
    /// Returns the first matching verification. Interaction errors end the
    /// fill at once; only mismatches are retried.
    pub async fn fill<P: PageDriver + ?Sized>(
        &self,
        page: &mut P,
        target: &FieldTarget,
    ) -> Result<VerificationOutcome> {
        let mut last_observed = String::new();

        for attempt in 1..=target.max_retries() {
            info!(field = target.label(), attempt, max = target.max_retries(), "Filling field");

            match target.kind() {
                FieldKind::Autocomplete => {
                    autocomplete::perform(&mut *page, target, self.suggestions, self.timing, self.timeouts).await?;
                }
                FieldKind::PlainNumeric => {
                    page.fill(target.selector(), target.expected()).await?;
                    sleep(self.timing.settle_delay).await;
                }
            }

            let outcome = verify(&mut *page, target, attempt).await?;
            if outcome.matched {
                info!(
                    field = target.label(),
                    attempt,
                    observed = %outcome.observed_value,
                    matched = true,
                    "Field verified"
                );
                return Ok(outcome);
            }

            warn!(
                field = target.label(),
                attempt,
                expected = target.expected(),
                observed = %outcome.observed_value,
                matched = false,
                "Field value mismatch"
            );
            last_observed = outcome.observed_value;
        }

        Err(LookupError::VerificationExhausted {
            label: target.label().to_string(),
            attempts: target.max_retries(),
            last_observed,
        })
    }
}
