use crate::config::LookupConfig;
use crate::diagnostics;
use crate::error::LookupError;
use crate::form::{FormSession, Stage};
use crate::model::{AddressQuery, LookupOutcome};
use crate::page::{PageDriver, SessionProvider};
use std::future::Future;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Look up one address, cancelled by Ctrl-C.
pub async fn run<S: SessionProvider>(
    query: &AddressQuery,
    config: &LookupConfig,
    provider: &S,
) -> LookupOutcome {
    run_until(query, config, provider, ctrl_c()).await
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Cannot listen for Ctrl-C, lookup is not cancellable");
        std::future::pending::<()>().await;
    }
}

/// Look up one address, abandoning the form as soon as `shutdown` resolves.
///
/// The page is acquired once and, once acquired, released exactly once on
/// every path, including a shutdown that arrives while acquiring. The returned
/// outcome is never replaced by a release failure.
pub async fn run_until<S, F>(
    query: &AddressQuery,
    config: &LookupConfig,
    provider: &S,
    shutdown: F,
) -> LookupOutcome
where
    S: SessionProvider,
    F: Future<Output = ()>,
{
    let span = info_span!("lookup", lookup_id = %Uuid::new_v4());

    async move {
        info!(
            commune = query.commune(),
            street = query.street(),
            number = query.number(),
            "Lookup started"
        );
        tokio::pin!(shutdown);

        // dropping a half-done acquire leaks its tab; let it finish, then release
        let acquire = provider.acquire();
        tokio::pin!(acquire);
        let acquired = tokio::select! {
            page = &mut acquire => Some(page),
            _ = &mut shutdown => None,
        };
        let cancelled = acquired.is_none();
        let acquired = match acquired {
            Some(page) => page,
            None => {
                info!(stage = %Stage::Start, "Cancellation requested while acquiring browser session");
                acquire.await
            }
        };
        let mut page = match acquired {
            Ok(page) => page,
            Err(e) => {
                error!(kind = %e.kind(), error = %e, "Could not acquire browser session");
                return LookupOutcome::failure(&e, None);
            }
        };

        let result = if cancelled {
            warn!(stage = %Stage::Start, "Form session aborted");
            Err(LookupError::Cancelled)
        } else {
            let mut session = FormSession::new(&mut page, config);
            let result = tokio::select! {
                result = session.run(query) => result,
                _ = &mut shutdown => Err(LookupError::Cancelled),
            };
            if result.is_err() {
                warn!(stage = %session.stage(), "Form session aborted");
            }
            result
        };

        let outcome = match result {
            Ok(code) => LookupOutcome::success(code),
            Err(e) => diagnostics::on_failure(&mut page, &e, &config.screenshot_path).await,
        };

        release(&mut page).await;
        outcome
    }
    .instrument(span)
    .await
}

async fn release<P: PageDriver + ?Sized>(page: &mut P) {
    match page.close().await {
        Ok(()) => info!("Browser session released"),
        Err(e) => warn!(error = %e, "Browser session release failed"),
    }
}
