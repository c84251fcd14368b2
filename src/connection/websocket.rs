use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::errors::SongwatchError;
use super::transport::{InboundMessage, OutboundMessage, Transport, TransportSession};

/// WebSocket transport for the workflow event endpoint.
pub struct WebSocketTransport {
    url: String,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>) -> Result<Self, SongwatchError> {
        let url = url.into();
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(SongwatchError::Config(format!(
                "Event stream URL must use ws:// or wss://, got '{}'",
                url
            )));
        }
        Ok(Self { url })
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self) -> Result<Box<dyn TransportSession>, SongwatchError> {
        let (stream, response) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(map_ws_error)?;
        debug!(url = %self.url, status = %response.status(), "WebSocket handshake complete");
        Ok(Box::new(WebSocketSession { stream }))
    }

    fn endpoint(&self) -> String {
        self.url.clone()
    }
}

struct WebSocketSession {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl TransportSession for WebSocketSession {
    async fn send(&mut self, message: OutboundMessage) -> Result<(), SongwatchError> {
        let frame = match message {
            OutboundMessage::Ping { nonce } => Message::Ping(nonce.to_be_bytes().to_vec().into()),
            other => Message::Text(other.to_json()?.into()),
        };
        self.stream.send(frame).await.map_err(map_ws_error)
    }

    async fn recv(&mut self) -> Option<Result<InboundMessage, SongwatchError>> {
        loop {
            let frame = match self.stream.next().await? {
                Ok(frame) => frame,
                Err(e) => return Some(Err(map_ws_error(e))),
            };

            match frame {
                Message::Text(text) => return Some(Ok(InboundMessage::from_text(&text))),
                Message::Binary(bytes) => {
                    let decoded = match std::str::from_utf8(&bytes) {
                        Ok(text) => InboundMessage::from_text(text),
                        Err(e) => InboundMessage::Malformed(e.to_string()),
                    };
                    return Some(Ok(decoded));
                }
                Message::Pong(payload) => {
                    let nonce = <[u8; 8]>::try_from(&payload[..]).ok().map(u64::from_be_bytes);
                    return Some(Ok(InboundMessage::Pong { nonce }));
                }
                Message::Close(frame) => {
                    let reason = frame
                        .map(|f| format!("{} {}", f.code, f.reason))
                        .unwrap_or_else(|| "close frame".to_string());
                    return Some(Err(SongwatchError::Closed(reason)));
                }
                // tungstenite answers pings on its own
                Message::Ping(_) | Message::Frame(_) => continue,
            }
        }
    }

    async fn close(&mut self) -> Result<(), SongwatchError> {
        self.stream.close(None).await.map_err(map_ws_error)
    }
}

fn map_ws_error(err: tungstenite::Error) -> SongwatchError {
    match err {
        tungstenite::Error::Http(response) => {
            let status = response.status();
            if status.as_u16() == 401 || status.as_u16() == 403 {
                SongwatchError::Authentication(format!("Handshake rejected with {}", status))
            } else {
                SongwatchError::Transport(format!("Handshake failed with {}", status))
            }
        }
        tungstenite::Error::Url(e) => SongwatchError::Config(format!("Invalid event stream URL: {}", e)),
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            SongwatchError::Closed("connection closed".to_string())
        }
        tungstenite::Error::Protocol(e) => SongwatchError::Protocol(e.to_string()),
        tungstenite::Error::Utf8 => SongwatchError::Protocol("invalid UTF-8 in text frame".to_string()),
        tungstenite::Error::Io(e) => SongwatchError::Transport(e.to_string()),
        other => SongwatchError::Transport(other.to_string()),
    }
}
