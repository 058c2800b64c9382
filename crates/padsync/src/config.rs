//! Client configuration.

use std::time::Duration;

/// Configuration for a document session.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// WebSocket URI of the document, see [`socket_uri`].
    pub uri: String,
    /// How often to retry the connection while disconnected.
    pub reconnect_interval: Duration,
    /// Disconnects within one failure window that mark the session desynchronized.
    pub failure_threshold: u32,
    /// Length of the failure window, in reconnect intervals.
    pub failure_window: u32,
    /// Quiet period before a local cursor change is sent.
    pub cursor_debounce: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            uri: socket_uri("localhost:3030", false, "default"),
            reconnect_interval: Duration::from_millis(1000),
            failure_threshold: 5,
            failure_window: 15,
            cursor_debounce: Duration::from_millis(20),
        }
    }
}

impl ClientConfig {
    /// Create a configuration for the given socket URI.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Default::default()
        }
    }

    /// Set the reconnect interval.
    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Set the number of disconnects that mark the session desynchronized.
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Set the failure window, in reconnect intervals.
    pub fn with_failure_window(mut self, intervals: u32) -> Self {
        self.failure_window = intervals;
        self
    }

    /// Set the cursor debounce window.
    pub fn with_cursor_debounce(mut self, debounce: Duration) -> Self {
        self.cursor_debounce = debounce;
        self
    }
}

/// Build the socket URI for a document: `ws(s)://<host>/api/socket/<id>`.
///
/// `secure` mirrors the security context of the page or origin; a secure
/// origin must use `wss`.
pub fn socket_uri(host: &str, secure: bool, document_id: &str) -> String {
    let scheme = if secure { "wss" } else { "ws" };
    format!("{}://{}/api/socket/{}", scheme, host.trim_end_matches('/'), document_id)
}
