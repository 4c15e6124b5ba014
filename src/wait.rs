use crate::error::{LookupError, Result};
use crate::page::PageDriver;
use std::fmt;
use tokio::time::{sleep, timeout, Duration, Instant};
use tracing::{debug, trace};

/// Page-state predicates the workflow blocks on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// `document.readyState` is `complete`
    PageReady,
    ElementVisible(String),
    ElementEnabled(String),
    /// Visible and carrying non-blank text
    ElementHasText(String),
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::PageReady => write!(f, "page to finish loading"),
            Condition::ElementVisible(sel) => write!(f, "{} to become visible", sel),
            Condition::ElementEnabled(sel) => write!(f, "{} to become enabled", sel),
            Condition::ElementHasText(sel) => write!(f, "{} to show text", sel),
        }
    }
}

impl Condition {
    async fn holds<P: PageDriver + ?Sized>(&self, page: &mut P) -> Result<bool> {
        match self {
            Condition::PageReady => Ok(page.ready_state().await? == "complete"),
            Condition::ElementVisible(sel) => page.is_visible(sel).await,
            Condition::ElementEnabled(sel) => page.is_enabled(sel).await,
            Condition::ElementHasText(sel) => {
                if !page.is_visible(sel).await? {
                    return Ok(false);
                }
                Ok(!page.inner_text(sel).await?.trim().is_empty())
            }
        }
    }
}

/// Block until `condition` holds or `deadline` elapses.
///
/// Probe errors count as "not yet": a page in the middle of navigating
/// routinely rejects script evaluation. `what` names the wait in the timeout
/// message; the condition's own description is used when it is `None`.
pub async fn wait_for<P: PageDriver + ?Sized>(
    page: &mut P,
    condition: &Condition,
    what: Option<&str>,
    deadline: Duration,
    poll_interval: Duration,
) -> Result<()> {
    debug!(condition = %condition, timeout_ms = deadline.as_millis() as u64, "Waiting for condition");
    let started = Instant::now();

    let result = timeout(deadline, async {
        loop {
            match condition.holds(&mut *page).await {
                Ok(true) => break,
                Ok(false) => {}
                Err(e) => trace!(condition = %condition, error = %e, "Condition probe failed, retrying"),
            }
            sleep(poll_interval).await;
        }
    })
    .await;

    match result {
        Ok(()) => {
            debug!(
                condition = %condition,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Wait condition satisfied"
            );
            Ok(())
        }
        Err(_) => Err(LookupError::timeout(
            what.map(|w| w.to_string()).unwrap_or_else(|| condition.to_string()),
            deadline.as_millis() as u64,
        )),
    }
}
