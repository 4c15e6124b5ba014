use crate::error::LookupError;
use crate::model::LookupOutcome;
use crate::page::PageDriver;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Snapshot the page, best effort
pub async fn capture_snapshot<P: PageDriver + ?Sized>(page: &mut P, path: &Path) -> Option<PathBuf> {
    match page.screenshot(path).await {
        Ok(()) => {
            info!(path = %path.display(), "Screenshot saved");
            Some(path.to_path_buf())
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not capture screenshot");
            None
        }
    }
}

/// Turn a workflow error into the failure record.
///
/// Never fails: a broken snapshot only means the record carries no path, the
/// message is always the original error's.
pub async fn on_failure<P: PageDriver + ?Sized>(
    page: &mut P,
    error: &LookupError,
    snapshot_path: &Path,
) -> LookupOutcome {
    error!(kind = %error.kind(), error = %error, "Lookup failed");
    let diagnostic_path = capture_snapshot(&mut *page, snapshot_path).await;
    LookupOutcome::failure(error, diagnostic_path)
}
