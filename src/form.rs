use crate::config::LookupConfig;
use crate::error::{LookupError, Result};
use crate::filler::RetryingFiller;
use crate::model::{AddressQuery, FieldTarget};
use crate::page::PageDriver;
use crate::wait::{wait_for, Condition};
use std::fmt;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::info;

/// Progress of a lookup through the form
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Start,
    PageLoaded,
    CommuneFilled,
    StreetFilled,
    NumberFilled,
    ValidationTriggered,
    SubmitEnabled,
    Submitted,
    ResultVisible,
    Extracted,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Start => "start",
            Stage::PageLoaded => "page_loaded",
            Stage::CommuneFilled => "commune_filled",
            Stage::StreetFilled => "street_filled",
            Stage::NumberFilled => "number_filled",
            Stage::ValidationTriggered => "validation_triggered",
            Stage::SubmitEnabled => "submit_enabled",
            Stage::Submitted => "submitted",
            Stage::ResultVisible => "result_visible",
            Stage::Extracted => "extracted",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Drives one page from a blank tab to an extracted postal code
pub struct FormSession<'a, P: PageDriver + ?Sized> {
    page: &'a mut P,
    config: &'a LookupConfig,
    stage: Stage,
    started: Instant,
}

impl<'a, P: PageDriver + ?Sized> FormSession<'a, P> {
    pub fn new(page: &'a mut P, config: &'a LookupConfig) -> Self {
        Self {
            page,
            config,
            stage: Stage::Start,
            started: Instant::now(),
        }
    }

    /// Last stage reached
    pub fn stage(&self) -> Stage {
        self.stage
    }

    fn advance(&mut self, stage: Stage) {
        self.stage = stage;
        info!(
            stage = %stage,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "Stage reached"
        );
    }

    async fn wait(&mut self, condition: Condition, what: &str, deadline: Duration) -> Result<()> {
        wait_for(
            &mut *self.page,
            &condition,
            Some(what),
            deadline,
            self.config.timing.poll_interval,
        )
        .await
    }

    /// Run every step in order; the first failure aborts the rest
    pub async fn run(&mut self, query: &AddressQuery) -> Result<String> {
        let config = self.config;
        let selectors = &config.selectors;
        let timeouts = &config.timeouts;
        let filler = RetryingFiller::new(&config.timing, timeouts)
            .with_suggestions(selectors.suggestions.as_deref());

        info!("Loading postal code form");
        self.page.navigate(&config.form_url).await?;
        self.wait(Condition::PageReady, "form page to load", timeouts.page_load)
            .await?;
        self.wait(
            Condition::ElementVisible(selectors.commune.clone()),
            "commune field to appear",
            timeouts.page_load,
        )
        .await?;
        self.advance(Stage::PageLoaded);

        let commune = FieldTarget::autocomplete(
            "commune",
            &selectors.commune,
            query.commune(),
            config.retries.commune,
        );
        filler.fill(&mut *self.page, &commune).await?;
        self.advance(Stage::CommuneFilled);

        // the street list is scoped to the chosen commune
        self.wait(
            Condition::ElementEnabled(selectors.street.clone()),
            "street field to become enabled",
            timeouts.field_ready,
        )
        .await?;
        let street = FieldTarget::autocomplete(
            "street",
            &selectors.street,
            query.street(),
            config.retries.street,
        );
        filler.fill(&mut *self.page, &street).await?;
        self.advance(Stage::StreetFilled);

        let number = FieldTarget::plain_numeric(
            "number",
            &selectors.number,
            query.number(),
            config.retries.number,
        );
        filler.fill(&mut *self.page, &number).await?;
        self.advance(Stage::NumberFilled);

        // the form only recomputes the search button state on blur
        self.page.click(&selectors.blur_target).await?;
        sleep(config.timing.validation_delay).await;
        self.advance(Stage::ValidationTriggered);

        self.wait(
            Condition::ElementEnabled(selectors.submit.clone()),
            "search button to become enabled",
            timeouts.submit_enabled,
        )
        .await?;
        self.advance(Stage::SubmitEnabled);

        self.page.click(&selectors.submit).await?;
        self.advance(Stage::Submitted);

        self.wait(
            Condition::ElementHasText(selectors.result.clone()),
            "postal code result",
            timeouts.result,
        )
        .await?;
        self.advance(Stage::ResultVisible);

        let text = self.page.inner_text(&selectors.result).await?;
        let code = extract_postal_code(&text, config.result_marker.as_deref())?;
        self.advance(Stage::Extracted);

        info!(postal_code = %code, "Postal code found");
        self.advance(Stage::Done);
        Ok(code)
    }
}

/// Slice of `text` right after the first case-insensitive occurrence of `marker`
fn after_marker<'t>(text: &'t str, marker: &str) -> Option<&'t str> {
    let marker: Vec<char> = marker.trim().chars().collect();
    if marker.is_empty() {
        return Some(text);
    }

    for (start, _) in text.char_indices() {
        let mut chars = text[start..].char_indices();
        let mut end = start;
        let matched = marker.iter().all(|m| match chars.next() {
            Some((offset, c)) if c.to_lowercase().eq(m.to_lowercase()) => {
                end = start + offset + c.len_utf8();
                true
            }
            _ => false,
        });
        if matched {
            return Some(&text[end..]);
        }
    }

    None
}

/// Pull the code out of the result element's text.
///
/// With a marker, the text must contain it; the marker and a following colon
/// are stripped. Whitespace in what remains is ignored, and everything else
/// must be a digit.
pub fn extract_postal_code(text: &str, marker: Option<&str>) -> Result<String> {
    let text = text.trim();
    let rest = match marker {
        Some(marker) => after_marker(text, marker).ok_or_else(|| {
            LookupError::extraction(format!("result text {:?} does not contain {:?}", text, marker))
        })?,
        None => text,
    };

    let rest = rest.trim_start().trim_start_matches(':');
    let code: String = rest.chars().filter(|c| !c.is_whitespace()).collect();

    if code.is_empty() {
        return Err(LookupError::extraction(format!("no code in result text {:?}", text)));
    }
    if !code.chars().all(|c| c.is_ascii_digit()) {
        return Err(LookupError::extraction(format!(
            "{:?} in result text {:?} is not a postal code",
            rest.trim(),
            text
        )));
    }

    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARKER: Option<&str> = Some("Código Postal");

    #[test]
    fn test_extracts_code_after_marker() {
        assert_eq!(extract_postal_code("Código Postal: 8150215", MARKER).unwrap(), "8150215");
        assert_eq!(extract_postal_code("  código postal:8150215\n", MARKER).unwrap(), "8150215");
        assert_eq!(
            extract_postal_code("Resultado\nCÓDIGO POSTAL : 8150215", MARKER).unwrap(),
            "8150215"
        );
    }

    #[test]
    fn test_spaced_code_is_joined() {
        assert_eq!(extract_postal_code("Código Postal: 815 0215", MARKER).unwrap(), "8150215");
        assert_eq!(extract_postal_code("815\t0215", None).unwrap(), "8150215");
    }

    #[test]
    fn test_trailing_text_is_an_error() {
        let err = extract_postal_code("Código Postal: 8150215 Puente Alto", MARKER).unwrap_err();
        assert!(matches!(err, LookupError::Extraction(_)));
    }

    #[test]
    fn test_missing_marker_is_an_error() {
        let err = extract_postal_code("8150215", MARKER).unwrap_err();
        assert!(matches!(err, LookupError::Extraction(_)));

        let err = extract_postal_code("Dirección no encontrada", MARKER).unwrap_err();
        assert!(matches!(err, LookupError::Extraction(_)));
    }

    #[test]
    fn test_marker_without_code_is_an_error() {
        assert!(extract_postal_code("Código Postal:", MARKER).is_err());
        assert!(extract_postal_code("Código Postal: no disponible", MARKER).is_err());
    }

    #[test]
    fn test_bare_code_without_marker() {
        assert_eq!(extract_postal_code(" 8150215 ", None).unwrap(), "8150215");
        assert!(extract_postal_code("", None).is_err());
    }

    #[test]
    fn test_after_marker_is_char_boundary_safe() {
        assert_eq!(after_marker("ñCódigo Postal: 1", "código postal"), Some(": 1"));
        assert_eq!(after_marker("Código", "Código Postal"), None);
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(Stage::SubmitEnabled.to_string(), "submit_enabled");
        assert!(Stage::Start < Stage::Done);
    }
}
