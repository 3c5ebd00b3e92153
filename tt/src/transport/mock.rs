//! In-memory transport for unit tests

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{CloseStatus, EventReader, EventWriter, SessionState, StreamError};
use crate::management::{ClientEvent, ServerEvent};

pub type RemoteSender = mpsc::UnboundedSender<Result<ServerEvent, StreamError>>;

/// Create a connected mock session
///
/// Events pushed through the returned sender are read by the reader in order.
/// Once every sender is gone the reader blocks forever, like a silent remote.
/// Closing the writer echoes a close frame with the same status back to the reader.
pub fn session() -> (MockReader, MockWriter, RemoteSender) {
    let (tx, rx) = mpsc::unbounded_channel();
    let writer = MockWriter {
        sent: Arc::new(Mutex::new(Vec::new())),
        closes: Arc::new(Mutex::new(Vec::new())),
        state: SessionState::Open,
        echo: Some(tx.clone()),
    };
    (MockReader { rx }, writer, tx)
}

pub struct MockReader {
    rx: mpsc::UnboundedReceiver<Result<ServerEvent, StreamError>>,
}

#[async_trait]
impl EventReader for MockReader {
    async fn next_event(&mut self) -> Result<ServerEvent, StreamError> {
        match self.rx.recv().await {
            Some(result) => result,
            None => std::future::pending().await,
        }
    }
}

pub struct MockWriter {
    pub sent: Arc<Mutex<Vec<ClientEvent>>>,
    pub closes: Arc<Mutex<Vec<CloseStatus>>>,
    state: SessionState,
    echo: Option<RemoteSender>,
}

impl MockWriter {
    /// Stop echoing close frames, simulating a remote that never answers
    pub fn without_echo(mut self) -> Self {
        self.echo = None;
        self
    }
}

#[async_trait]
impl EventWriter for MockWriter {
    async fn send_event(&mut self, event: &ClientEvent) -> Result<(), StreamError> {
        self.sent.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn close(&mut self, status: CloseStatus) -> Result<(), StreamError> {
        if self.state != SessionState::Open {
            return Ok(());
        }
        self.state = SessionState::Closed;
        self.closes.lock().unwrap().push(status.clone());
        if let Some(echo) = &self.echo {
            let _ = echo.send(Err(StreamError::Closed(status)));
        }
        Ok(())
    }

    fn state(&self) -> SessionState {
        self.state
    }
}

/// Cloneable output sink that keeps everything written to it
#[derive(Clone, Default)]
pub struct SharedOutput(Arc<Mutex<Vec<u8>>>);

impl SharedOutput {
    pub fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

impl Write for SharedOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
