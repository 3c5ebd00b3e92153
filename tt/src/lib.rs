//! tunneltail - stream logs from a remote cloudflared
//!
//! Opens a WebSocket session to a tunnel's management endpoint, subscribes
//! with optional level/event filters, and prints every received log record to
//! stdout as `time level event message fields`. Diagnostics go to stderr.
//!
//! # Modules
//!
//! - [`filter`] - Level and event filter parsing
//! - [`management`] - Wire types for the `/logs` session
//! - [`transport`] - Read/write halves of the session and the WebSocket backend
//! - [`session`] - Connection, rejection classification, subscription
//! - [`reader`] - Decode loop writing records to the output
//! - [`coordinator`] - Lifecycle state machine and graceful shutdown
//! - [`signals`] - Scoped SIGINT/SIGTERM registration
//! - [`tail`] - One complete run
//! - [`config`] - Configuration file loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod coordinator;
pub mod filter;
pub mod management;
pub mod reader;
pub mod session;
pub mod signals;
pub mod tail;
pub mod transport;

// Re-export commonly used types
pub use config::Config;
pub use coordinator::{CLOSE_GRACE_PERIOD, LifecycleCoordinator, LifecycleState, ShutdownCause};
pub use filter::{FilterError, LogEventType, LogLevel, StreamingFilters, build_filters};
pub use management::{ClientEvent, LogRecord, ManagementError, ManagementErrorResponse, ServerEvent};
pub use reader::{EventStreamReader, ReaderExit, ReaderHandle};
pub use session::{ManagementEndpoint, Rejection, Session, SessionError, SessionNegotiator, SessionRequest};
pub use signals::{ShutdownSignal, SignalListener};
pub use tail::{TailOptions, TailOutcome};
pub use transport::{CloseStatus, EventReader, EventWriter, SessionState, StreamError};
