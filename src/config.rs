use std::path::PathBuf;
use std::time::Duration;

/// Public search page of the postal code form
pub const DEFAULT_FORM_URL: &str = "https://www.correos.cl/codigo-postal";

/// Label the result element is expected to carry before the code
pub const DEFAULT_RESULT_MARKER: &str = "Código Postal";

/// CSS selectors of the remote form.
///
/// These are tied to the live page markup and break whenever the site is
/// redeployed with a new portlet instance id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormSelectors {
    pub commune: String,
    pub street: String,
    pub number: String,
    /// Unrelated label clicked to make the form run its blur validation
    pub blur_target: String,
    pub submit: String,
    pub result: String,
    /// Suggestion list shown under the autocomplete inputs, if known
    pub suggestions: Option<String>,
}

impl Default for FormSelectors {
    fn default() -> Self {
        const PORTLET: &str = "_cl_cch_codigopostal_portlet_CodigoPostalPortlet_INSTANCE_MloJQpiDsCw9";
        Self {
            commune: "input#mini-search-form-text".to_string(),
            street: "input#mini-search-form-text-direcciones".to_string(),
            number: format!("#{}_numero", PORTLET),
            blur_target: "label[for='mini-search-form-text']".to_string(),
            submit: format!("#{}_searchDirection", PORTLET),
            result: format!("#{}_ddCodPostal", PORTLET),
            suggestions: None,
        }
    }
}

/// Pauses the workflow takes to let the remote page react
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timing {
    /// After clicking into an autocomplete field, before typing
    pub focus_delay: Duration,
    /// After typing, for the remote suggestion list to populate
    pub suggestion_delay: Duration,
    /// Between moving to the first suggestion and confirming it
    pub key_delay: Duration,
    /// After confirming a suggestion or filling a plain field
    pub settle_delay: Duration,
    /// After the blur click, before polling the submit button
    pub validation_delay: Duration,
    /// Polling interval of condition waits
    pub poll_interval: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            focus_delay: Duration::from_millis(500),
            suggestion_delay: Duration::from_millis(1200),
            key_delay: Duration::from_millis(300),
            settle_delay: Duration::from_millis(1000),
            validation_delay: Duration::from_millis(1000),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Deadlines of the individual condition waits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeouts {
    pub page_load: Duration,
    pub field_ready: Duration,
    pub suggestions: Duration,
    pub submit_enabled: Duration,
    pub result: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            page_load: Duration::from_secs(20),
            field_ready: Duration::from_secs(20),
            suggestions: Duration::from_secs(5),
            submit_enabled: Duration::from_secs(10),
            result: Duration::from_secs(12),
        }
    }
}

/// Attempt budget per field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRetries {
    pub commune: u32,
    pub street: u32,
    pub number: u32,
}

impl Default for FieldRetries {
    fn default() -> Self {
        Self {
            commune: 3,
            street: 3,
            number: 2,
        }
    }
}

/// Everything a single lookup needs besides the address itself
#[derive(Debug, Clone)]
pub struct LookupConfig {
    pub form_url: String,
    pub selectors: FormSelectors,
    pub timing: Timing,
    pub timeouts: Timeouts,
    pub retries: FieldRetries,
    /// `None` accepts a bare code without a label
    pub result_marker: Option<String>,
    /// Overwritten on every failing run
    pub screenshot_path: PathBuf,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            form_url: DEFAULT_FORM_URL.to_string(),
            selectors: FormSelectors::default(),
            timing: Timing::default(),
            timeouts: Timeouts::default(),
            retries: FieldRetries::default(),
            result_marker: Some(DEFAULT_RESULT_MARKER.to_string()),
            screenshot_path: PathBuf::from("error.png"),
        }
    }
}

impl LookupConfig {
    /// Sets the same attempt budget on both autocomplete fields
    pub fn with_autocomplete_retries(mut self, retries: u32) -> Self {
        self.retries.commune = retries;
        self.retries.street = retries;
        self
    }

    pub fn with_result_marker(mut self, marker: Option<String>) -> Self {
        self.result_marker = marker.filter(|m| !m.trim().is_empty());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_selectors_target_the_portlet() {
        let selectors = FormSelectors::default();
        assert_eq!(selectors.commune, "input#mini-search-form-text");
        assert!(selectors.number.ends_with("_numero"));
        assert!(selectors.submit.ends_with("_searchDirection"));
        assert!(selectors.result.ends_with("_ddCodPostal"));
        assert!(selectors.suggestions.is_none());
    }

    #[test]
    fn test_default_config() {
        let config = LookupConfig::default();
        assert_eq!(config.form_url, DEFAULT_FORM_URL);
        assert_eq!(config.timeouts.submit_enabled, Duration::from_secs(10));
        assert_eq!(config.timeouts.result, Duration::from_secs(12));
        assert_eq!(config.timing.suggestion_delay, Duration::from_millis(1200));
        assert_eq!(config.retries.number, 2);
        assert_eq!(config.result_marker.as_deref(), Some(DEFAULT_RESULT_MARKER));
        assert_eq!(config.screenshot_path, PathBuf::from("error.png"));
    }

    #[test]
    fn test_blank_marker_disables_marker() {
        let config = LookupConfig::default().with_result_marker(Some("  ".to_string()));
        assert!(config.result_marker.is_none());
    }

    #[test]
    fn test_autocomplete_retries_leave_number_alone() {
        let config = LookupConfig::default().with_autocomplete_retries(5);
        assert_eq!(config.retries.commune, 5);
        assert_eq!(config.retries.street, 5);
        assert_eq!(config.retries.number, 2);
    }
}
