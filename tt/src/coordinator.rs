//! Lifecycle coordinator
//!
//! Supervises a running session. Waits on three sources at once: the
//! cancellation token, the reader task finishing, and a shutdown signal. The
//! first one to fire decides how the session ends:
//!
//! ```text
//! Running --cancelled-------------------------------> Done
//! Running --reader finished-------------------------> Done
//! Running --signal--> ShuttingDown --reader/1s------> Done
//! ```
//!
//! Every path ends in `Done` and hands back a [`ShutdownCause`]; failures are
//! only ever reported through the log.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::reader::{ReaderExit, ReaderHandle};
use crate::signals::{ShutdownSignal, SignalListener};
use crate::transport::{CloseStatus, EventWriter};

/// How long to wait for the remote to finish the close handshake
pub const CLOSE_GRACE_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Running,
    ShuttingDown,
    Done,
}

/// Which event ended the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownCause {
    /// The cancellation token fired
    Cancelled,

    /// The reader ended on its own
    ReaderFinished(ReaderExit),

    /// A shutdown signal arrived; `reader_finished` is false when the grace period ran out
    Signalled {
        signal: ShutdownSignal,
        reader_finished: bool,
    },
}

/// Drives one session from `Running` to `Done`
pub struct LifecycleCoordinator<W> {
    writer: W,
    cancel: CancellationToken,
    grace_period: Duration,
    state: LifecycleState,
}

impl<W: EventWriter> LifecycleCoordinator<W> {
    pub fn new(writer: W, cancel: CancellationToken) -> Self {
        Self {
            writer,
            cancel,
            grace_period: CLOSE_GRACE_PERIOD,
            state: LifecycleState::Running,
        }
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Give the write half back once the session is over
    pub fn into_writer(self) -> W {
        self.writer
    }

    /// Wait for the first completion event and shut down accordingly
    pub async fn run(&mut self, mut reader: ReaderHandle, signals: &mut SignalListener) -> ShutdownCause {
        debug!(state = ?self.state, "LifecycleCoordinator::run: waiting");
        let cancel = self.cancel.clone();

        let cause = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("LifecycleCoordinator::run: cancelled");
                ShutdownCause::Cancelled
            }
            exit = &mut reader => {
                debug!(?exit, "LifecycleCoordinator::run: reader finished");
                ShutdownCause::ReaderFinished(exit)
            }
            Some(signal) = signals.recv() => {
                debug!(?signal, "LifecycleCoordinator::run: shutdown signal");
                self.transition(LifecycleState::ShuttingDown);
                let reader_finished = self.shut_down(&mut reader).await;
                ShutdownCause::Signalled { signal, reader_finished }
            }
        };

        self.transition(LifecycleState::Done);
        cause
    }

    /// Send the close frame, then wait for the reader or the grace period
    async fn shut_down(&mut self, reader: &mut ReaderHandle) -> bool {
        debug!("closing management connection");
        if let Err(e) = self.writer.close(CloseStatus::normal()).await {
            debug!(error = %e, "LifecycleCoordinator::shut_down: close frame not sent");
        }

        match tokio::time::timeout(self.grace_period, &mut *reader).await {
            Ok(exit) => {
                debug!(?exit, "LifecycleCoordinator::shut_down: reader finished");
                true
            }
            Err(_) => {
                debug!(grace_period = ?self.grace_period, "LifecycleCoordinator::shut_down: grace period elapsed");
                reader.abort();
                false
            }
        }
    }

    fn transition(&mut self, next: LifecycleState) {
        debug!(from = ?self.state, to = ?next, "LifecycleCoordinator: transition");
        self.state = next;
    }
}
