use crate::error::{LookupError, Result};
use crate::page::Key;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, trace, warn};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type PendingRequests = Arc<Mutex<HashMap<u64, oneshot::Sender<CdpMessage>>>>;

/// CDP message structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CdpMessage {
    pub id: Option<u64>,
    pub method: Option<String>,
    pub params: Option<Value>,
    pub result: Option<Value>,
    pub error: Option<CdpError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CdpError {
    pub code: i32,
    pub message: String,
    pub data: Option<Value>,
}

/// Chrome tab information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TabInfo {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(rename = "webSocketDebuggerUrl")]
    pub websocket_debugger_url: Option<String>,
}

/// CDP client bound to a single tab.
///
/// Commands are written to one WebSocket; a reader task routes responses back
/// to the waiting caller by message id.
pub struct CdpClient {
    sink: Option<Arc<Mutex<SplitSink<WsStream, Message>>>>,
    reader: Option<JoinHandle<()>>,
    message_id: Arc<AtomicU64>,
    pending_requests: PendingRequests,
    http: reqwest::Client,
    chrome_host: String,
    chrome_port: u16,
    command_timeout: Duration,
}

impl CdpClient {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            sink: None,
            reader: None,
            message_id: Arc::new(AtomicU64::new(1)),
            pending_requests: Arc::new(Mutex::new(HashMap::new())),
            http: reqwest::Client::new(),
            chrome_host: host.to_string(),
            chrome_port: port,
            command_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_command_timeout(mut self, command_timeout: Duration) -> Self {
        self.command_timeout = command_timeout;
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("http://{}:{}{}", self.chrome_host, self.chrome_port, path)
    }

    /// Browser version info; answers as soon as the DevTools endpoint is up
    pub async fn version(&self) -> Result<Value> {
        let response = self
            .http
            .get(self.endpoint("/json/version"))
            .send()
            .await
            .map_err(|e| LookupError::cdp_connection(format!("DevTools endpoint unreachable: {}", e)))?;

        response
            .json()
            .await
            .map_err(|e| LookupError::cdp_protocol(format!("Failed to parse version info: {}", e)))
    }

    /// Create a new tab
    pub async fn create_tab(&self, url: Option<&str>) -> Result<TabInfo> {
        let mut endpoint = self.endpoint("/json/new");
        if let Some(u) = url {
            endpoint.push('?');
            endpoint.push_str(u);
        }

        // Chrome 111+ refuses GET on /json/new
        let response = self
            .http
            .put(&endpoint)
            .send()
            .await
            .map_err(|e| LookupError::cdp_connection(format!("Failed to create tab: {}", e)))?;

        if !response.status().is_success() {
            return Err(LookupError::cdp_protocol(format!(
                "Failed to create tab: HTTP {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| LookupError::cdp_protocol(format!("Failed to parse new tab: {}", e)))
    }

    /// Close a tab
    pub async fn close_tab(&self, tab_id: &str) -> Result<()> {
        let url = self.endpoint(&format!("/json/close/{}", tab_id));

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| LookupError::cdp_connection(format!("Failed to close tab: {}", e)))?;

        if !response.status().is_success() {
            return Err(LookupError::cdp_protocol(format!(
                "Failed to close tab: HTTP {}",
                response.status()
            )));
        }

        Ok(())
    }

    /// Connect to a tab's debugger WebSocket
    pub async fn connect_to_tab(&mut self, tab: &TabInfo) -> Result<()> {
        let ws_url = tab
            .websocket_debugger_url
            .as_ref()
            .ok_or_else(|| LookupError::cdp_protocol(format!("Tab {} has no WebSocket debugger URL", tab.id)))?;

        debug!(url = %ws_url, "Connecting to tab WebSocket");

        let url = Url::parse(ws_url)?;
        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| LookupError::cdp_connection(format!("WebSocket connection failed: {}", e)))?;

        let (sink, stream) = ws_stream.split();
        self.sink = Some(Arc::new(Mutex::new(sink)));
        self.reader = Some(self.start_message_loop(stream));

        self.enable_domains().await?;

        Ok(())
    }

    async fn enable_domains(&self) -> Result<()> {
        for domain in ["Page", "Runtime"] {
            self.send_command(&format!("{}.enable", domain), None).await?;
        }
        Ok(())
    }

    fn start_message_loop(&self, mut stream: SplitStream<WsStream>) -> JoinHandle<()> {
        let pending_requests = Arc::clone(&self.pending_requests);

        tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        trace!(payload = %text, "Received CDP message");
                        match serde_json::from_str::<CdpMessage>(&text) {
                            Ok(cdp_msg) => {
                                if let Some(id) = cdp_msg.id {
                                    if let Some(sender) = pending_requests.lock().await.remove(&id) {
                                        if sender.send(cdp_msg).is_err() {
                                            warn!(id, "Dropped response to abandoned request");
                                        }
                                    }
                                } else if let Some(method) = &cdp_msg.method {
                                    trace!(method = %method, "CDP event");
                                }
                            }
                            Err(e) => {
                                error!(error = %e, "Failed to parse CDP message");
                            }
                        }
                    }
                    Ok(Message::Close(_)) => {
                        debug!("WebSocket connection closed");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }

            // waiting callers see a closed channel instead of hanging
            pending_requests.lock().await.clear();
        })
    }

    /// Send a CDP command and wait for response
    pub async fn send_command(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let sink = self
            .sink
            .as_ref()
            .ok_or_else(|| LookupError::cdp_connection("Not connected to a tab"))?;

        let id = self.message_id.fetch_add(1, Ordering::SeqCst);
        let message = CdpMessage {
            id: Some(id),
            method: Some(method.to_string()),
            params,
            result: None,
            error: None,
        };

        let (response_tx, response_rx) = oneshot::channel();
        self.pending_requests.lock().await.insert(id, response_tx);

        let json_msg = serde_json::to_string(&message)?;
        trace!(payload = %json_msg, "Sending CDP message");
        if let Err(e) = sink.lock().await.send(Message::Text(json_msg)).await {
            self.pending_requests.lock().await.remove(&id);
            return Err(e.into());
        }

        let response = match timeout(self.command_timeout, response_rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => return Err(LookupError::cdp_connection("Response channel closed")),
            Err(_) => {
                self.pending_requests.lock().await.remove(&id);
                return Err(LookupError::timeout(
                    format!("CDP response to {}", method),
                    self.command_timeout.as_millis() as u64,
                ));
            }
        };

        if let Some(error) = response.error {
            return Err(LookupError::cdp_protocol(format!(
                "CDP error {}: {}",
                error.code, error.message
            )));
        }

        Ok(response.result.unwrap_or(Value::Null))
    }

    /// Navigate to a URL; returns once the navigation is committed
    pub async fn navigate(&self, url: &str) -> Result<()> {
        let result = self.send_command("Page.navigate", Some(json!({ "url": url }))).await?;

        if let Some(error_text) = result.get("errorText").and_then(|v| v.as_str()) {
            return Err(LookupError::navigation(format!("{} ({})", url, error_text)));
        }

        Ok(())
    }

    /// Evaluate JavaScript and return its value
    pub async fn evaluate_js(&self, expression: &str) -> Result<Value> {
        let result = self
            .send_command(
                "Runtime.evaluate",
                Some(json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true
                })),
            )
            .await?;

        if let Some(exception_details) = result.get("exceptionDetails") {
            let description = exception_details
                .get("exception")
                .and_then(|e| e.get("description"))
                .and_then(|d| d.as_str())
                .map(|s| s.to_string())
                .unwrap_or_else(|| exception_details.to_string());
            return Err(LookupError::javascript(description));
        }

        Ok(result
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// Capture the viewport, base64-encoded
    pub async fn capture_screenshot(&self, format: &str) -> Result<String> {
        let result = self
            .send_command("Page.captureScreenshot", Some(json!({ "format": format })))
            .await?;

        result
            .get("data")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| LookupError::cdp_protocol("No screenshot data returned"))
    }

    /// Press and release a key on whatever has focus
    pub async fn press_key(&self, key: Key) -> Result<()> {
        let down_type = if key.text().is_some() { "keyDown" } else { "rawKeyDown" };
        let mut down = json!({
            "type": down_type,
            "key": key.name(),
            "code": key.name(),
            "windowsVirtualKeyCode": key.key_code(),
            "nativeVirtualKeyCode": key.key_code()
        });
        if let Some(text) = key.text() {
            down["text"] = json!(text);
        }

        self.send_command("Input.dispatchKeyEvent", Some(down)).await?;
        self.send_command(
            "Input.dispatchKeyEvent",
            Some(json!({
                "type": "keyUp",
                "key": key.name(),
                "code": key.name(),
                "windowsVirtualKeyCode": key.key_code(),
                "nativeVirtualKeyCode": key.key_code()
            })),
        )
        .await?;

        Ok(())
    }

    /// Type text as if it came from an IME; fires input events
    pub async fn insert_text(&self, text: &str) -> Result<()> {
        self.send_command("Input.insertText", Some(json!({ "text": text })))
            .await?;
        Ok(())
    }

    /// Drop the WebSocket and stop the reader task
    pub async fn disconnect(&mut self) {
        if let Some(sink) = self.sink.take() {
            if let Err(e) = sink.lock().await.close().await {
                debug!(error = %e, "WebSocket close failed");
            }
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.pending_requests.lock().await.clear();
    }
}

impl Drop for CdpClient {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_urls() {
        let client = CdpClient::new("localhost", 9222);
        assert_eq!(client.endpoint("/json/version"), "http://localhost:9222/json/version");
    }

    #[test]
    fn test_tab_info_parses_devtools_listing() {
        let listing = r#"[{
            "description": "",
            "id": "ABC123",
            "title": "about:blank",
            "type": "page",
            "url": "about:blank",
            "webSocketDebuggerUrl": "ws://localhost:9222/devtools/page/ABC123"
        }]"#;
        let tabs: Vec<TabInfo> = serde_json::from_str(listing).unwrap();
        assert_eq!(tabs.len(), 1);
        assert_eq!(tabs[0].id, "ABC123");
        assert_eq!(tabs[0].kind, "page");
        assert_eq!(
            tabs[0].websocket_debugger_url.as_deref(),
            Some("ws://localhost:9222/devtools/page/ABC123")
        );
    }

    #[test]
    fn test_response_message_parses() {
        let msg: CdpMessage =
            serde_json::from_str(r#"{"id":7,"error":{"code":-32000,"message":"No node"}}"#).unwrap();
        assert_eq!(msg.id, Some(7));
        assert_eq!(msg.error.unwrap().message, "No node");
    }

    #[tokio::test]
    async fn test_command_without_connection_fails() {
        let client = CdpClient::new("localhost", 9222);
        let err = client.send_command("Page.enable", None).await.unwrap_err();
        assert!(matches!(err, LookupError::CdpConnection(_)));
    }

    #[tokio::test]
    #[ignore] // Requires running Chrome instance
    async fn test_create_and_close_tab() {
        let client = CdpClient::new("localhost", 9222);
        let tab = client.create_tab(Some("about:blank")).await.unwrap();
        client.close_tab(&tab.id).await.unwrap();
    }
}
