//! Process signal registration
//!
//! Interrupt and terminate are registered once at startup through a
//! [`SignalListener`]. Dropping the listener stops delivery on every exit path.

use std::io;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Buffered signals before the forwarder waits on the coordinator
const SIGNAL_BUFFER: usize = 10;

/// Signals that request a graceful shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

/// Scoped registration of SIGINT and SIGTERM
pub struct SignalListener {
    rx: mpsc::Receiver<ShutdownSignal>,
    forwarder: Option<JoinHandle<()>>,
}

impl SignalListener {
    /// Register OS signal handlers; must be called inside a tokio runtime
    pub fn register() -> io::Result<Self> {
        debug!("SignalListener::register: called");
        let (tx, rx) = mpsc::channel(SIGNAL_BUFFER);

        #[cfg(unix)]
        let forwarder = {
            use tokio::signal::unix::{SignalKind, signal};

            let mut sigint = signal(SignalKind::interrupt())?;
            let mut sigterm = signal(SignalKind::terminate())?;

            tokio::spawn(async move {
                loop {
                    let received = tokio::select! {
                        Some(()) = sigint.recv() => ShutdownSignal::Interrupt,
                        Some(()) = sigterm.recv() => ShutdownSignal::Terminate,
                        else => break,
                    };
                    debug!(?received, "SignalListener: signal received");
                    if tx.send(received).await.is_err() {
                        break;
                    }
                }
            })
        };

        #[cfg(not(unix))]
        let forwarder = tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                debug!("SignalListener: ctrl_c received");
                if tx.send(ShutdownSignal::Interrupt).await.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            rx,
            forwarder: Some(forwarder),
        })
    }

    /// Listener fed by hand instead of by the OS
    pub fn manual() -> (mpsc::Sender<ShutdownSignal>, Self) {
        let (tx, rx) = mpsc::channel(SIGNAL_BUFFER);
        (tx, Self { rx, forwarder: None })
    }

    /// Wait for the next shutdown signal
    ///
    /// Returns `None` once no more signals can arrive.
    pub async fn recv(&mut self) -> Option<ShutdownSignal> {
        self.rx.recv().await
    }
}

impl Drop for SignalListener {
    fn drop(&mut self) {
        if let Some(forwarder) = self.forwarder.take() {
            debug!("SignalListener::drop: unregistering signal handlers");
            forwarder.abort();
        }
    }
}
