use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use log::debug;
use tokio_tungstenite::tungstenite::Message;

use crate::error::ChannelError;

/// Text frames of one live connection. The stream ends when the connection drops.
pub type FrameStream = BoxStream<'static, Result<String, ChannelError>>;

/// Opens one connection to the progress endpoint.
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<FrameStream, ChannelError>;
}

/// WebSocket transport (`/ws/{sessionId}` on the processing service).
#[derive(Debug, Default, Clone)]
pub struct WebSocketConnector;

#[async_trait]
impl ChannelConnector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<FrameStream, ChannelError> {
        let (socket, _response) =
            tokio_tungstenite::connect_async(url)
                .await
                .map_err(|e| ChannelError::Connect {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?;
        debug!("Progress channel connected to {}", url);

        // Only the read half is used; the service never expects client frames.
        let (_write, read) = socket.split();
        let frames = read
            .take_while(|message| {
                let open = !matches!(message, Ok(Message::Close(_)));
                async move { open }
            })
            .filter_map(|message| async move {
                match message {
                    Ok(Message::Text(text)) => Some(Ok(text)),
                    Ok(_) => None,
                    Err(e) => Some(Err(ChannelError::Protocol(e.to_string()))),
                }
            });

        Ok(frames.boxed())
    }
}
