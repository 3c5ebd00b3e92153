//! WebSocket transport backed by tokio-tungstenite
//!
//! Frames run over the connection reqwest hands back after the HTTP upgrade.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::debug;

use super::{CloseStatus, EventReader, EventWriter, SessionState, StreamError};
use crate::management::{ClientEvent, ServerEvent, decode_server_event};

type WsStream = WebSocketStream<reqwest::Upgraded>;

/// Split an established connection into its read and write halves
pub fn split(stream: WsStream) -> (WebSocketReader, WebSocketWriter) {
    let (sink, stream) = stream.split();
    (
        WebSocketReader { stream },
        WebSocketWriter {
            sink,
            state: SessionState::Open,
        },
    )
}

/// Read half: decodes text and binary frames into server events
pub struct WebSocketReader {
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl EventReader for WebSocketReader {
    async fn next_event(&mut self) -> Result<ServerEvent, StreamError> {
        loop {
            let message = match self.stream.next().await {
                Some(Ok(message)) => message,
                Some(Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed)) | None => {
                    return Err(StreamError::Disconnected);
                }
                Some(Err(e)) => return Err(e.into()),
            };

            match message {
                Message::Text(text) => return Ok(decode_server_event(text.as_bytes())?),
                Message::Binary(data) => return Ok(decode_server_event(&data)?),
                Message::Close(frame) => {
                    let status = match frame {
                        Some(frame) => CloseStatus::new(u16::from(frame.code), frame.reason.into_owned()),
                        None => CloseStatus::new(CloseStatus::NO_STATUS_RECEIVED, ""),
                    };
                    debug!(%status, "WebSocketReader::next_event: close frame received");
                    return Err(StreamError::Closed(status));
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            }
        }
    }
}

/// Write half: sends JSON text frames and the close frame
pub struct WebSocketWriter {
    sink: SplitSink<WsStream, Message>,
    state: SessionState,
}

#[async_trait]
impl EventWriter for WebSocketWriter {
    async fn send_event(&mut self, event: &ClientEvent) -> Result<(), StreamError> {
        let json = serde_json::to_string(event)?;
        debug!(%json, "WebSocketWriter::send_event: sending");
        self.sink.send(Message::Text(json)).await?;
        Ok(())
    }

    async fn close(&mut self, status: CloseStatus) -> Result<(), StreamError> {
        if self.state != SessionState::Open {
            debug!(state = ?self.state, "WebSocketWriter::close: already closing");
            return Ok(());
        }

        debug!(%status, "WebSocketWriter::close: sending close frame");
        self.state = SessionState::Closing;
        let frame = CloseFrame {
            code: CloseCode::from(status.code),
            reason: status.reason.into(),
        };
        let result = self.sink.send(Message::Close(Some(frame))).await;
        self.state = SessionState::Closed;
        result.map_err(StreamError::from)
    }

    fn state(&self) -> SessionState {
        self.state
    }
}
