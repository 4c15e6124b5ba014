use serde::Serialize;
use thiserror::Error;

/// Every way a lookup can fail
#[derive(Error, Debug)]
pub enum LookupError {
    #[error("Timed out after {timeout_ms}ms waiting for {what}")]
    Timeout { what: String, timeout_ms: u64 },

    #[error("Field '{label}' rejected after {attempts} attempt(s): last observed value was {last_observed:?}")]
    VerificationExhausted {
        label: String,
        attempts: u32,
        last_observed: String,
    },

    #[error("Could not extract postal code: {0}")]
    Extraction(String),

    #[error("Browser resource error: {0}")]
    Resource(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("CDP connection error: {0}")]
    CdpConnection(String),

    #[error("CDP protocol error: {0}")]
    CdpProtocol(String),

    #[error("JavaScript evaluation error: {0}")]
    JavaScript(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Invalid address query: {0}")]
    InvalidQuery(String),

    #[error("Lookup cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),
}

pub type Result<T> = std::result::Result<T, LookupError>;

/// Coarse classification carried on failure records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    Verification,
    Extraction,
    Resource,
    Navigation,
    Page,
    Cancelled,
    InvalidQuery,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Timeout => "timeout",
            FailureKind::Verification => "verification",
            FailureKind::Extraction => "extraction",
            FailureKind::Resource => "resource",
            FailureKind::Navigation => "navigation",
            FailureKind::Page => "page",
            FailureKind::Cancelled => "cancelled",
            FailureKind::InvalidQuery => "invalid_query",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl LookupError {
    pub fn timeout(what: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            what: what.into(),
            timeout_ms,
        }
    }

    pub fn extraction(msg: impl Into<String>) -> Self {
        Self::Extraction(msg.into())
    }

    pub fn resource(msg: impl Into<String>) -> Self {
        Self::Resource(msg.into())
    }

    pub fn navigation(msg: impl Into<String>) -> Self {
        Self::Navigation(msg.into())
    }

    pub fn cdp_connection(msg: impl Into<String>) -> Self {
        Self::CdpConnection(msg.into())
    }

    pub fn cdp_protocol(msg: impl Into<String>) -> Self {
        Self::CdpProtocol(msg.into())
    }

    pub fn javascript(msg: impl Into<String>) -> Self {
        Self::JavaScript(msg.into())
    }

    pub fn element_not_found(msg: impl Into<String>) -> Self {
        Self::ElementNotFound(msg.into())
    }

    pub fn invalid_query(msg: impl Into<String>) -> Self {
        Self::InvalidQuery(msg.into())
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            LookupError::Timeout { .. } => FailureKind::Timeout,
            LookupError::VerificationExhausted { .. } => FailureKind::Verification,
            LookupError::Extraction(_) => FailureKind::Extraction,
            LookupError::Navigation(_) => FailureKind::Navigation,
            LookupError::Resource(_)
            | LookupError::CdpConnection(_)
            | LookupError::WebSocket(_)
            | LookupError::Io(_) => FailureKind::Resource,
            LookupError::CdpProtocol(_)
            | LookupError::JavaScript(_)
            | LookupError::ElementNotFound(_)
            | LookupError::Json(_)
            | LookupError::Url(_) => FailureKind::Page,
            LookupError::Cancelled => FailureKind::Cancelled,
            LookupError::InvalidQuery(_) => FailureKind::InvalidQuery,
        }
    }
}
