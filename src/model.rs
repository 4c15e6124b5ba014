use crate::error::{FailureKind, LookupError, Result};
use serde::Serialize;
use std::path::PathBuf;

/// The address being looked up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressQuery {
    commune: String,
    street: String,
    number: String,
}

impl AddressQuery {
    /// Builds a query, rejecting blank components
    pub fn new(
        commune: impl Into<String>,
        street: impl Into<String>,
        number: impl Into<String>,
    ) -> Result<Self> {
        let commune = commune.into();
        let street = street.into();
        let number = number.into();

        for (name, value) in [("commune", &commune), ("street", &street), ("number", &number)] {
            if value.trim().is_empty() {
                return Err(LookupError::invalid_query(format!("{} must not be empty", name)));
            }
        }

        Ok(Self {
            commune,
            street,
            number,
        })
    }

    pub fn commune(&self) -> &str {
        &self.commune
    }

    pub fn street(&self) -> &str {
        &self.street
    }

    pub fn number(&self) -> &str {
        &self.number
    }
}

/// How a field gets populated and how its value is checked afterwards
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Typed, then resolved through the site's suggestion list
    Autocomplete,
    /// Set directly, compared exactly
    PlainNumeric,
}

/// One form field the workflow has to populate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldTarget {
    kind: FieldKind,
    label: String,
    selector: String,
    expected: String,
    max_retries: u32,
}

impl FieldTarget {
    pub fn new(
        kind: FieldKind,
        label: impl Into<String>,
        selector: impl Into<String>,
        expected: impl Into<String>,
        max_retries: u32,
    ) -> Self {
        Self {
            kind,
            label: label.into(),
            selector: selector.into(),
            expected: expected.into(),
            // at least one attempt is always made
            max_retries: max_retries.max(1),
        }
    }

    pub fn autocomplete(
        label: impl Into<String>,
        selector: impl Into<String>,
        expected: impl Into<String>,
        max_retries: u32,
    ) -> Self {
        Self::new(FieldKind::Autocomplete, label, selector, expected, max_retries)
    }

    pub fn plain_numeric(
        label: impl Into<String>,
        selector: impl Into<String>,
        expected: impl Into<String>,
        max_retries: u32,
    ) -> Self {
        Self::new(FieldKind::PlainNumeric, label, selector, expected, max_retries)
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn selector(&self) -> &str {
        &self.selector
    }

    pub fn expected(&self) -> &str {
        &self.expected
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

/// Result of re-reading a field after one fill attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationOutcome {
    pub matched: bool,
    pub observed_value: String,
    pub attempt: u32,
}

/// Terminal result of one lookup
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LookupOutcome {
    Success {
        postal_code: String,
    },
    Failure {
        kind: FailureKind,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        diagnostic_path: Option<PathBuf>,
    },
}

/// Output encoding of the final record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl LookupOutcome {
    pub fn success(postal_code: impl Into<String>) -> Self {
        Self::Success {
            postal_code: postal_code.into(),
        }
    }

    pub fn failure(error: &LookupError, diagnostic_path: Option<PathBuf>) -> Self {
        Self::Failure {
            kind: error.kind(),
            message: error.to_string(),
            diagnostic_path,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, LookupOutcome::Success { .. })
    }

    pub fn postal_code(&self) -> Option<&str> {
        match self {
            LookupOutcome::Success { postal_code } => Some(postal_code),
            LookupOutcome::Failure { .. } => None,
        }
    }

    pub fn render(&self, format: OutputFormat) -> String {
        match format {
            OutputFormat::Json => serde_json::to_string(self).unwrap_or_else(|e| {
                format!("{{\"status\":\"failure\",\"kind\":\"page\",\"message\":\"{}\"}}", e)
            }),
            OutputFormat::Text => match self {
                LookupOutcome::Success { postal_code } => postal_code.clone(),
                LookupOutcome::Failure {
                    message,
                    diagnostic_path,
                    ..
                } => match diagnostic_path {
                    Some(path) => format!("Error: {}\nScreenshot: {}", message, path.display()),
                    None => format!("Error: {}", message),
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_rejects_blank_fields() {
        assert!(AddressQuery::new("PUENTE ALTO", "AVENIDA LAS PERDICES", "3462").is_ok());

        let err = AddressQuery::new("PUENTE ALTO", "  ", "3462").unwrap_err();
        assert!(matches!(err, LookupError::InvalidQuery(_)));
        assert!(err.to_string().contains("street"));

        assert!(AddressQuery::new("", "x", "1").is_err());
        assert!(AddressQuery::new("x", "y", "").is_err());
    }

    #[test]
    fn test_field_target_keeps_at_least_one_attempt() {
        let target = FieldTarget::plain_numeric("number", "#n", "3462", 0);
        assert_eq!(target.max_retries(), 1);
        assert_eq!(target.kind(), FieldKind::PlainNumeric);
        assert_eq!(target.expected(), "3462");
    }

    #[test]
    fn test_render_text() {
        assert_eq!(LookupOutcome::success("8150215").render(OutputFormat::Text), "8150215");

        let failure = LookupOutcome::failure(
            &LookupError::extraction("marker missing"),
            Some(PathBuf::from("error.png")),
        );
        assert_eq!(
            failure.render(OutputFormat::Text),
            "Error: Could not extract postal code: marker missing\nScreenshot: error.png"
        );
    }

    #[test]
    fn test_render_json() {
        let json = LookupOutcome::success("8150215").render(OutputFormat::Json);
        assert_eq!(json, r#"{"status":"success","postal_code":"8150215"}"#);

        let failure = LookupOutcome::failure(&LookupError::timeout("result", 12000), None);
        let value: serde_json::Value = serde_json::from_str(&failure.render(OutputFormat::Json)).unwrap();
        assert_eq!(value["status"], "failure");
        assert_eq!(value["kind"], "timeout");
        assert!(value.get("diagnostic_path").is_none());
    }

    #[test]
    fn test_outcome_accessors() {
        let outcome = LookupOutcome::success("8150215");
        assert!(outcome.is_success());
        assert_eq!(outcome.postal_code(), Some("8150215"));

        let failure = LookupOutcome::failure(&LookupError::Cancelled, None);
        assert!(!failure.is_success());
        assert_eq!(failure.postal_code(), None);
    }
}
