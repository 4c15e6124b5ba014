use crate::config::{Timeouts, Timing};
use crate::error::Result;
use crate::model::FieldTarget;
use crate::page::{Key, PageDriver};
use crate::wait::{wait_for, Condition};
use tokio::time::sleep;
use tracing::debug;

/// Type into a suggestion-driven field and commit the first suggestion.
///
/// The committed value is whatever the site resolves the suggestion to, which
/// can differ from the typed text; callers verify it afterwards.
pub async fn perform<P: PageDriver + ?Sized>(
    page: &mut P,
    target: &FieldTarget,
    suggestions: Option<&str>,
    timing: &Timing,
    timeouts: &Timeouts,
) -> Result<()> {
    debug!(field = target.label(), text = target.expected(), "Autocomplete gesture");

    page.focus(target.selector()).await?;
    sleep(timing.focus_delay).await;

    page.fill(target.selector(), target.expected()).await?;
    sleep(timing.suggestion_delay).await;

    if let Some(list) = suggestions {
        let what = format!("suggestions for {}", target.label());
        wait_for(
            &mut *page,
            &Condition::ElementVisible(list.to_string()),
            Some(&what),
            timeouts.suggestions,
            timing.poll_interval,
        )
        .await?;
    }

    page.press_key(Key::ArrowDown).await?;
    sleep(timing.key_delay).await;
    page.press_key(Key::Enter).await?;
    sleep(timing.settle_delay).await;

    Ok(())
}
