//! One tail run: filters, negotiation, then supervised streaming
//!
//! Every outcome is reported through the log and returned as a [`TailOutcome`];
//! none of them is an error for the caller.

use std::io::Write;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::coordinator::{LifecycleCoordinator, ShutdownCause};
use crate::filter::{FilterError, build_filters};
use crate::reader::EventStreamReader;
use crate::session::{Session, SessionError, SessionNegotiator, SessionRequest};
use crate::signals::SignalListener;
use crate::transport::{CloseStatus, EventReader, EventWriter, SessionState};

/// Reason sent when the session is torn down without a prior close handshake
pub const ABRUPT_CLOSE_REASON: &str = "management connection was closed abruptly";

/// Inputs for a single run
#[derive(Debug, Clone)]
pub struct TailOptions {
    pub request: SessionRequest,
    pub level: Option<String>,
    pub events: Vec<String>,
}

/// How a run ended
#[derive(Debug)]
pub enum TailOutcome {
    /// Filters were rejected before any network activity
    InvalidFilters(FilterError),

    /// The session could not be opened or subscribed
    NegotiationFailed(SessionError),

    /// The session ran and was shut down
    Finished(ShutdownCause),
}

/// Stream logs to `output` until the session ends
pub async fn run<O>(
    options: TailOptions,
    output: O,
    signals: &mut SignalListener,
    cancel: CancellationToken,
) -> TailOutcome
where
    O: Write + Send + 'static,
{
    debug!(?options.level, ?options.events, "tail::run: called");

    let filters = match build_filters(options.level.as_deref(), &options.events) {
        Ok(filters) => filters,
        Err(e) => {
            error!(error = %e, "invalid filters provided");
            return TailOutcome::InvalidFilters(e);
        }
    };

    let negotiator = SessionNegotiator::new(options.request);
    let session = match negotiator.negotiate(filters).await {
        Ok(session) => session,
        Err(e) => {
            e.report();
            return TailOutcome::NegotiationFailed(e);
        }
    };

    supervise(session, output, signals, cancel).await
}

/// Run the reader and coordinator over an already negotiated session
pub async fn supervise<R, W, O>(
    session: Session<R, W>,
    output: O,
    signals: &mut SignalListener,
    cancel: CancellationToken,
) -> TailOutcome
where
    R: EventReader + 'static,
    W: EventWriter,
    O: Write + Send + 'static,
{
    let reader = EventStreamReader::new(session.reader, output, cancel.clone()).spawn();
    let mut coordinator = LifecycleCoordinator::new(session.writer, cancel.clone());
    let cause = coordinator.run(reader, signals).await;
    debug!(?cause, "supervise: session done");

    cancel.cancel();

    let mut writer = coordinator.into_writer();
    if writer.state() == SessionState::Open {
        let status = CloseStatus::new(CloseStatus::INTERNAL_ERROR, ABRUPT_CLOSE_REASON);
        if let Err(e) = writer.close(status).await {
            debug!(error = %e, "supervise: best-effort close failed");
        }
    }

    TailOutcome::Finished(cause)
}
