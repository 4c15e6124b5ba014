use crate::cdp::{CdpClient, TabInfo};
use crate::error::{LookupError, Result};
use crate::page::{Key, PageDriver, SessionProvider};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tempfile::TempDir;
use tokio::process::{Child, Command};
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, info, warn};

/// Quote a string as a JavaScript literal
fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

/// Script that fails loudly when the selector matches nothing
fn with_element(selector: &str, body: &str) -> String {
    format!(
        r#"(() => {{
            const el = document.querySelector({sel});
            if (!el) {{ throw new Error("No element matches " + {sel}); }}
            {body}
        }})()"#,
        sel = js_string(selector),
        body = body
    )
}

/// Map a thrown "No element matches" into `ElementNotFound`
fn element_error(selector: &str, err: LookupError) -> LookupError {
    match err {
        LookupError::JavaScript(msg) if msg.contains("No element matches") => {
            LookupError::element_not_found(selector.to_string())
        }
        other => other,
    }
}

/// A Chrome tab opened for one lookup
pub struct ChromePage {
    cdp: CdpClient,
    tab: TabInfo,
    /// Set when this page owns the browser process
    process: Option<LaunchedChrome>,
    closed: bool,
}

struct LaunchedChrome {
    child: Child,
    _profile_dir: TempDir,
}

impl ChromePage {
    async fn eval_bool(&mut self, expression: &str) -> Result<bool> {
        Ok(self.cdp.evaluate_js(expression).await?.as_bool().unwrap_or(false))
    }

    async fn eval_string(&mut self, selector: &str, body: &str) -> Result<String> {
        let value = self
            .cdp
            .evaluate_js(&with_element(selector, body))
            .await
            .map_err(|e| element_error(selector, e))?;

        Ok(match value {
            Value::String(s) => s,
            Value::Null => String::new(),
            other => other.to_string(),
        })
    }
}

#[async_trait]
impl PageDriver for ChromePage {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        info!(url, "Navigating");
        self.cdp.navigate(url).await
    }

    async fn ready_state(&mut self) -> Result<String> {
        let value = self.cdp.evaluate_js("document.readyState").await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn is_visible(&mut self, selector: &str) -> Result<bool> {
        self.eval_bool(&format!(
            r#"(() => {{
                const el = document.querySelector({});
                if (!el) {{ return false; }}
                const style = getComputedStyle(el);
                const rect = el.getBoundingClientRect();
                return style.visibility !== 'hidden' && style.display !== 'none'
                    && (rect.width > 0 || rect.height > 0);
            }})()"#,
            js_string(selector)
        ))
        .await
    }

    async fn is_enabled(&mut self, selector: &str) -> Result<bool> {
        self.eval_bool(&format!(
            r#"(() => {{
                const el = document.querySelector({});
                return !!el && !el.disabled && el.getAttribute('aria-disabled') !== 'true';
            }})()"#,
            js_string(selector)
        ))
        .await
    }

    async fn focus(&mut self, selector: &str) -> Result<()> {
        debug!(selector, "Focusing");
        self.cdp
            .evaluate_js(&with_element(selector, "el.scrollIntoView({block: 'center'}); el.focus(); return true;"))
            .await
            .map_err(|e| element_error(selector, e))?;
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> Result<()> {
        debug!(selector, "Clicking");
        self.cdp
            .evaluate_js(&with_element(selector, "el.scrollIntoView({block: 'center'}); el.click(); return true;"))
            .await
            .map_err(|e| element_error(selector, e))?;
        Ok(())
    }

    async fn fill(&mut self, selector: &str, text: &str) -> Result<()> {
        debug!(selector, text, "Filling");
        self.cdp
            .evaluate_js(&with_element(
                selector,
                r#"el.focus();
                el.value = '';
                el.dispatchEvent(new Event('input', { bubbles: true }));
                return true;"#,
            ))
            .await
            .map_err(|e| element_error(selector, e))?;

        self.cdp.insert_text(text).await
    }

    async fn press_key(&mut self, key: Key) -> Result<()> {
        debug!(key = key.name(), "Pressing key");
        self.cdp.press_key(key).await
    }

    async fn read_value(&mut self, selector: &str) -> Result<String> {
        self.eval_string(selector, "return el.value ?? '';").await
    }

    async fn inner_text(&mut self, selector: &str) -> Result<String> {
        self.eval_string(selector, "return el.innerText ?? el.textContent ?? '';").await
    }

    async fn screenshot(&mut self, path: &Path) -> Result<()> {
        let data = self.cdp.capture_screenshot("png").await?;
        let bytes = BASE64
            .decode(data)
            .map_err(|e| LookupError::cdp_protocol(format!("Failed to decode screenshot: {}", e)))?;
        tokio::fs::write(path, bytes).await?;
        debug!(path = %path.display(), "Screenshot written");
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(LookupError::resource(format!("Tab {} already released", self.tab.id)));
        }
        self.closed = true;

        self.cdp.disconnect().await;
        let tab_result = self.cdp.close_tab(&self.tab.id).await;

        if let Some(mut launched) = self.process.take() {
            info!("Stopping launched browser");
            if let Err(e) = launched.child.kill().await {
                warn!(error = %e, "Failed to stop browser process");
            }
            // the whole browser is gone, a failed tab close does not matter
            return Ok(());
        }

        tab_result.map_err(|e| LookupError::resource(format!("Failed to close tab {}: {}", self.tab.id, e)))
    }
}

/// How the provider gets hold of a browser
#[derive(Debug, Clone)]
pub enum BrowserMode {
    /// Attach to an already running DevTools endpoint
    Attach { host: String, port: u16 },
    /// Spawn a private browser process per lookup
    Launch {
        executable: PathBuf,
        port: u16,
        headless: bool,
        startup_timeout: Duration,
    },
}

/// Opens one fresh Chrome tab per lookup
#[derive(Debug, Clone)]
pub struct ChromeSessionProvider {
    mode: BrowserMode,
    command_timeout: Duration,
}

impl ChromeSessionProvider {
    pub fn attach(host: impl Into<String>, port: u16) -> Self {
        Self {
            mode: BrowserMode::Attach {
                host: host.into(),
                port,
            },
            command_timeout: Duration::from_secs(30),
        }
    }

    pub fn launch(executable: impl Into<PathBuf>, port: u16, headless: bool) -> Self {
        Self {
            mode: BrowserMode::Launch {
                executable: executable.into(),
                port,
                headless,
                startup_timeout: Duration::from_secs(20),
            },
            command_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_command_timeout(mut self, command_timeout: Duration) -> Self {
        self.command_timeout = command_timeout;
        self
    }

    async fn open_tab(&self, host: &str, port: u16, process: Option<LaunchedChrome>) -> Result<ChromePage> {
        let mut cdp = CdpClient::new(host, port).with_command_timeout(self.command_timeout);

        let tab = cdp
            .create_tab(Some("about:blank"))
            .await
            .map_err(|e| LookupError::resource(format!("Could not open a tab on {}:{}: {}", host, port, e)))?;

        if let Err(e) = cdp.connect_to_tab(&tab).await {
            if let Err(close_err) = cdp.close_tab(&tab.id).await {
                debug!(tab_id = %tab.id, error = %close_err, "Failed to close half-open tab");
            }
            return Err(LookupError::resource(format!("Could not attach to tab {}: {}", tab.id, e)));
        }

        info!(tab_id = %tab.id, "Browser tab acquired");
        Ok(ChromePage {
            cdp,
            tab,
            process,
            closed: false,
        })
    }

    async fn spawn_browser(
        &self,
        executable: &Path,
        port: u16,
        headless: bool,
        startup_timeout: Duration,
    ) -> Result<LaunchedChrome> {
        let profile_dir = tempfile::Builder::new()
            .prefix("postal-lookup-profile")
            .tempdir()
            .map_err(|e| LookupError::resource(format!("Could not create browser profile: {}", e)))?;

        let mut cmd = Command::new(executable);
        cmd.arg(format!("--remote-debugging-port={}", port))
            .arg(format!("--user-data-dir={}", profile_dir.path().display()))
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-background-networking")
            .arg("--disable-sync");
        if headless {
            cmd.arg("--headless=new");
        }
        cmd.arg("about:blank")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        info!(executable = %executable.display(), port, "Launching browser");
        let mut child = cmd
            .spawn()
            .map_err(|e| LookupError::resource(format!("Failed to launch {}: {}", executable.display(), e)))?;

        let probe = CdpClient::new("127.0.0.1", port);
        let started = Instant::now();
        loop {
            if probe.version().await.is_ok() {
                debug!(elapsed_ms = started.elapsed().as_millis() as u64, "DevTools endpoint is up");
                break;
            }
            if let Ok(Some(status)) = child.try_wait() {
                return Err(LookupError::resource(format!("Browser exited during startup: {}", status)));
            }
            if started.elapsed() >= startup_timeout {
                return Err(LookupError::timeout(
                    format!("browser DevTools endpoint on port {}", port),
                    startup_timeout.as_millis() as u64,
                ));
            }
            sleep(Duration::from_millis(250)).await;
        }

        Ok(LaunchedChrome {
            child,
            _profile_dir: profile_dir,
        })
    }
}

#[async_trait]
impl SessionProvider for ChromeSessionProvider {
    type Page = ChromePage;

    async fn acquire(&self) -> Result<ChromePage> {
        match &self.mode {
            BrowserMode::Attach { host, port } => {
                info!(host = %host, port = *port, "Connecting to Chrome");
                self.open_tab(host, *port, None).await
            }
            BrowserMode::Launch {
                executable,
                port,
                headless,
                startup_timeout,
            } => {
                let launched = self
                    .spawn_browser(executable, *port, *headless, *startup_timeout)
                    .await?;
                // on failure the child is dropped and killed
                self.open_tab("127.0.0.1", *port, Some(launched)).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_js_string_escapes_quotes() {
        assert_eq!(
            js_string("label[for='mini-search-form-text']"),
            "\"label[for='mini-search-form-text']\""
        );
        assert_eq!(js_string("a\"b"), "\"a\\\"b\"");
    }

    #[test]
    fn test_with_element_embeds_selector() {
        let script = with_element("#numero", "return el.value;");
        assert!(script.contains("document.querySelector(\"#numero\")"));
        assert!(script.contains("return el.value;"));
    }

    #[test]
    fn test_element_error_mapping() {
        let err = element_error("#x", LookupError::javascript("Error: No element matches #x"));
        assert!(matches!(err, LookupError::ElementNotFound(ref s) if s == "#x"));

        let err = element_error("#x", LookupError::javascript("TypeError"));
        assert!(matches!(err, LookupError::JavaScript(_)));
    }

    #[test]
    fn test_provider_modes() {
        let provider = ChromeSessionProvider::attach("localhost", 9222);
        assert!(matches!(provider.mode, BrowserMode::Attach { port: 9222, .. }));

        let provider = ChromeSessionProvider::launch("chromium", 9333, true)
            .with_command_timeout(Duration::from_secs(5));
        assert_eq!(provider.command_timeout, Duration::from_secs(5));
        assert!(matches!(
            provider.mode,
            BrowserMode::Launch { port: 9333, headless: true, .. }
        ));
    }

    #[tokio::test]
    async fn test_attach_to_missing_endpoint_is_resource_error() {
        // nothing listens on port 1
        let provider = ChromeSessionProvider::attach("127.0.0.1", 1);
        let err = provider.acquire().await.err().unwrap();
        assert!(matches!(err, LookupError::Resource(_)));
    }

    #[tokio::test]
    #[ignore] // Requires running Chrome instance
    async fn test_acquire_and_release_tab() {
        let provider = ChromeSessionProvider::attach("localhost", 9222);
        let mut page = provider.acquire().await.unwrap();
        page.navigate("about:blank").await.unwrap();
        assert!(!page.ready_state().await.unwrap().is_empty());
        page.close().await.unwrap();
        assert!(page.close().await.is_err());
    }
}
