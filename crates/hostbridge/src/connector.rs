//! WebSocket [`Connector`] for the reference deployment target (spec
//! sections 4.1 and 6): dials `HostConfig::endpoint`, tagging the upgrade
//! request with `x-instance-id` and an optional `x-api-key` header.

use async_trait::async_trait;
use hostbridge_runtime::{Connector, HostConfig};
use hostbridge_socket::{SocketError, SocketResult, WebSocketDuplexStream};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;

/// Connects (and reconnects) to a single WebSocket endpoint, tagging every
/// dial with the `x-instance-id` the caller passes in. The dispatcher holds
/// the stable id across the connection's lifetime; this connector just
/// stamps it onto each upgrade request, so the header always matches the
/// `instance_id` carried in the framed `OPEN` handshake.
pub struct WebSocketConnector {
    endpoint: String,
    api_key: Option<String>,
}

impl WebSocketConnector {
    #[must_use]
    pub fn new(config: &HostConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
        }
    }
}

#[async_trait]
impl Connector<WebSocketDuplexStream> for WebSocketConnector {
    async fn connect(&self, instance_id: &str) -> SocketResult<WebSocketDuplexStream> {
        let mut request = self
            .endpoint
            .as_str()
            .into_client_request()
            .map_err(|e| SocketError::Transport(e.to_string()))?;

        let instance_id = HeaderValue::from_str(instance_id).map_err(|e| SocketError::Transport(e.to_string()))?;
        request.headers_mut().insert("x-instance-id", instance_id);

        if let Some(api_key) = &self.api_key {
            let value = HeaderValue::from_str(api_key).map_err(|e| SocketError::Transport(e.to_string()))?;
            request.headers_mut().insert("x-api-key", value);
        }

        let (stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| SocketError::Transport(e.to_string()))?;

        Ok(WebSocketDuplexStream::new(stream))
    }
}
