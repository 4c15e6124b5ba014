//! The browser seam of the workflow.
//!
//! Everything the lookup needs from a rendering engine goes through
//! [`PageDriver`]; acquiring a fresh page goes through [`SessionProvider`].
//! `ChromePage` / `ChromeSessionProvider` in [`crate::browser`] are the real
//! implementations, tests plug in scripted ones.

use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

/// Keys the workflow presses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    ArrowDown,
    Enter,
}

impl Key {
    pub fn name(&self) -> &'static str {
        match self {
            Key::ArrowDown => "ArrowDown",
            Key::Enter => "Enter",
        }
    }

    /// Windows virtual key code, as expected by `Input.dispatchKeyEvent`
    pub fn key_code(&self) -> u32 {
        match self {
            Key::ArrowDown => 40,
            Key::Enter => 13,
        }
    }

    /// Text the key produces, if any
    pub fn text(&self) -> Option<&'static str> {
        match self {
            Key::Enter => Some("\r"),
            Key::ArrowDown => None,
        }
    }
}

/// One open page the workflow can drive
#[async_trait]
pub trait PageDriver: Send {
    async fn navigate(&mut self, url: &str) -> Result<()>;

    /// `document.readyState`
    async fn ready_state(&mut self) -> Result<String>;

    /// False when the element does not exist
    async fn is_visible(&mut self, selector: &str) -> Result<bool>;

    /// False when the element does not exist or is disabled
    async fn is_enabled(&mut self, selector: &str) -> Result<bool>;

    async fn focus(&mut self, selector: &str) -> Result<()>;

    /// Script click, not subject to actionability checks
    async fn click(&mut self, selector: &str) -> Result<()>;

    /// Clears the element and enters `text` as user input
    async fn fill(&mut self, selector: &str, text: &str) -> Result<()>;

    /// Presses a key on the focused element
    async fn press_key(&mut self, key: Key) -> Result<()>;

    async fn read_value(&mut self, selector: &str) -> Result<String>;

    async fn inner_text(&mut self, selector: &str) -> Result<String>;

    /// Writes a PNG snapshot of the viewport to `path`
    async fn screenshot(&mut self, path: &Path) -> Result<()>;

    /// Releases the page and whatever browser resources back it
    async fn close(&mut self) -> Result<()>;
}

/// Hands out one fresh page per lookup
#[async_trait]
pub trait SessionProvider: Send + Sync {
    type Page: PageDriver;

    async fn acquire(&self) -> Result<Self::Page>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_codes() {
        assert_eq!(Key::ArrowDown.key_code(), 40);
        assert_eq!(Key::Enter.key_code(), 13);
        assert_eq!(Key::Enter.text(), Some("\r"));
        assert_eq!(Key::ArrowDown.text(), None);
        assert_eq!(Key::ArrowDown.name(), "ArrowDown");
    }
}
