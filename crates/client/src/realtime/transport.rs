//! Socket transport: opens the persistent channel and yields inbound text frames.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use thiserror::Error;
use tokio_tungstenite::{connect_async, tungstenite::Message};

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },
    #[error("socket read failed: {0}")]
    Read(String),
}

/// Inbound text frames of an open socket. The stream ending means the socket closed;
/// dropping it closes the socket.
pub type FrameStream = BoxStream<'static, Result<String, TransportError>>;

/// Opens persistent sockets for the reconnection controller.
#[async_trait]
pub trait SocketTransport: Send + Sync + 'static {
    /// Resolve once the socket is open, or fail if it could not be opened.
    async fn open(&self, url: &str) -> Result<FrameStream, TransportError>;
}

/// Native websocket transport using tokio-tungstenite.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

#[async_trait]
impl SocketTransport for WebSocketTransport {
    async fn open(&self, url: &str) -> Result<FrameStream, TransportError> {
        let (ws_stream, _response) = connect_async(url)
            .await
            .map_err(|e| TransportError::Connect {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        // Pings are answered by tungstenite while the stream is polled.
        let frames = ws_stream.filter_map(|msg| async move {
            match msg {
                Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                Ok(Message::Close(frame)) => {
                    tracing::debug!(?frame, "received close frame");
                    None
                }
                Ok(Message::Binary(bytes)) => {
                    tracing::debug!(len = bytes.len(), "ignoring binary frame");
                    None
                }
                Ok(_) => None,
                Err(e) => Some(Err(TransportError::Read(e.to_string()))),
            }
        });

        Ok(frames.boxed())
    }
}
