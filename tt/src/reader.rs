//! Event stream reader
//!
//! Owns the read half of the session and runs as its own task. Each iteration
//! checks for cancellation, then blocks on one decode. Log records go to the
//! output sink one line each; everything else is a diagnostic on stderr.

use std::future::Future;
use std::io::Write;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::management::{LogRecord, ServerEvent};
use crate::transport::{CloseStatus, EventReader, StreamError};

/// Printed in place of the fields when they cannot be rendered
pub const FIELDS_PLACEHOLDER: &str = "unable to parse fields";

/// Render a field map as compact JSON, or the placeholder on failure
pub fn render_fields<T: Serialize + ?Sized>(fields: &T) -> String {
    match serde_json::to_string(fields) {
        Ok(rendered) => rendered,
        Err(e) => {
            debug!(error = %e, "render_fields: unable to parse fields");
            FIELDS_PLACEHOLDER.to_string()
        }
    }
}

/// One output line: `time level event message fields`
pub fn format_line<T: Serialize + ?Sized>(time: &str, level: &str, event: &str, message: &str, fields: &T) -> String {
    format!("{} {} {} {} {}", time, level, event, message, render_fields(fields))
}

pub fn format_record(record: &LogRecord) -> String {
    format_line(
        &record.time,
        &record.level,
        &record.event,
        &record.message,
        &record.fields,
    )
}

/// How the reader task ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderExit {
    /// Cancellation was observed before a decode
    Cancelled,

    /// The remote closed the session with a normal closure
    NormalClosure,

    /// The remote closed the session with any other code
    AbnormalClosure(CloseStatus),

    /// Decode or I/O failure that was not a closure
    StreamFailed(String),

    /// The task was aborted or panicked before reporting
    Aborted,
}

impl ReaderExit {
    fn from_error(err: StreamError) -> Self {
        match err.as_closed() {
            Some(status) if status.is_normal() => ReaderExit::NormalClosure,
            Some(status) => ReaderExit::AbnormalClosure(status.clone()),
            None => ReaderExit::StreamFailed(err.to_string()),
        }
    }

    /// Error-level diagnostic for unexpected endings, `None` for expected ones
    pub fn diagnostic(&self) -> Option<String> {
        match self {
            ReaderExit::AbnormalClosure(status) => Some(format!("received remote closure: {}", status)),
            ReaderExit::StreamFailed(error) => Some(format!("unable to read event from server: {}", error)),
            ReaderExit::Cancelled | ReaderExit::NormalClosure | ReaderExit::Aborted => None,
        }
    }
}

/// Decode loop over the read half of a session
pub struct EventStreamReader<R, W> {
    events: R,
    output: W,
    cancel: CancellationToken,
}

impl<R, W> EventStreamReader<R, W>
where
    R: EventReader + 'static,
    W: Write + Send + 'static,
{
    pub fn new(events: R, output: W, cancel: CancellationToken) -> Self {
        Self { events, output, cancel }
    }

    /// Run until cancellation, remote closure, or a stream error
    pub async fn run(mut self) -> ReaderExit {
        debug!("EventStreamReader::run: started");
        loop {
            if self.cancel.is_cancelled() {
                debug!("EventStreamReader::run: cancelled");
                return ReaderExit::Cancelled;
            }

            match self.events.next_event().await {
                Ok(ServerEvent::Logs(records)) => self.write_records(&records),
                Ok(ServerEvent::Invalid { event_type, error }) => {
                    error!(%event_type, %error, "invalid logs event");
                }
                Ok(ServerEvent::Unknown { event_type }) => {
                    debug!("unexpected log event type: {}", event_type);
                }
                Err(err) => {
                    let exit = ReaderExit::from_error(err);
                    if let Some(message) = exit.diagnostic() {
                        error!("{}", message);
                    }
                    debug!(?exit, "EventStreamReader::run: finished");
                    return exit;
                }
            }
        }
    }

    /// Spawn the loop as its own task
    pub fn spawn(self) -> ReaderHandle {
        ReaderHandle {
            inner: tokio::spawn(self.run()),
            finished: None,
        }
    }

    fn write_records(&mut self, records: &[LogRecord]) {
        debug!(count = records.len(), "EventStreamReader::write_records: called");
        for record in records {
            if let Err(e) = writeln!(self.output, "{}", format_record(record)) {
                debug!(error = %e, "unable to write log record");
            }
        }
        if let Err(e) = self.output.flush() {
            debug!(error = %e, "unable to flush log output");
        }
    }
}

/// Completion signal of a spawned reader
///
/// Resolves once with the task's [`ReaderExit`]; polling again returns the
/// same value.
pub struct ReaderHandle {
    inner: JoinHandle<ReaderExit>,
    finished: Option<ReaderExit>,
}

impl ReaderHandle {
    pub fn abort(&self) {
        self.inner.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.finished.is_some() || self.inner.is_finished()
    }
}

impl Future for ReaderHandle {
    type Output = ReaderExit;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(exit) = &self.finished {
            return Poll::Ready(exit.clone());
        }

        let exit = match ready!(Pin::new(&mut self.inner).poll(cx)) {
            Ok(exit) => exit,
            Err(e) => {
                debug!(error = %e, "ReaderHandle::poll: reader task did not complete");
                ReaderExit::Aborted
            }
        };
        self.finished = Some(exit.clone());
        Poll::Ready(exit)
    }
}
