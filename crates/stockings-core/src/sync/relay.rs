//! Relay transport seam
//!
//! The session only needs a connect / send / recv / close channel that
//! delivers whole text messages in order. [`WsConnector`] provides it over a
//! WebSocket broker; tests plug in an in-memory hub.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::StockingsError;

/// Opens connections to the relay
#[async_trait]
pub trait RelayConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn RelayConnection>, StockingsError>;
}

/// One open relay connection
#[async_trait]
pub trait RelayConnection: Send {
    async fn send(&mut self, message: String) -> Result<(), StockingsError>;

    /// Next inbound text message; `Ok(None)` once the relay closed the
    /// connection. Must be cancel-safe: it is raced against timers.
    async fn recv(&mut self) -> Result<Option<String>, StockingsError>;

    async fn close(&mut self) -> Result<(), StockingsError>;
}

/// WebSocket broker client
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: Url,
}

impl WsConnector {
    pub fn new(url: Url) -> Self {
        Self { url }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl RelayConnector for WsConnector {
    async fn connect(&self) -> Result<Box<dyn RelayConnection>, StockingsError> {
        let (stream, _response) = connect_async(self.url.clone()).await?;
        debug!(url = %self.url, "Connected to relay");
        Ok(Box::new(WsConnection { stream }))
    }
}

struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl RelayConnection for WsConnection {
    async fn send(&mut self, message: String) -> Result<(), StockingsError> {
        self.stream.send(Message::Text(message)).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<String>, StockingsError> {
        while let Some(message) = self.stream.next().await {
            match message? {
                Message::Text(text) => return Ok(Some(text)),
                Message::Binary(bytes) => match String::from_utf8(bytes) {
                    Ok(text) => return Ok(Some(text)),
                    Err(e) => warn!(
                        bytes = e.as_bytes().len(),
                        "Dropping binary frame that is not UTF-8"
                    ),
                },
                Message::Close(frame) => {
                    debug!(?frame, "Relay closed the connection");
                    return Ok(None);
                }
                // Ping/pong are answered by tungstenite itself
                other => trace!(?other, "Ignoring control frame"),
            }
        }
        Ok(None)
    }

    async fn close(&mut self) -> Result<(), StockingsError> {
        self.stream.close(None).await?;
        Ok(())
    }
}
