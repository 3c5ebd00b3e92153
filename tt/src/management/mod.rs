//! Management endpoint wire protocol
//!
//! JSON messages exchanged over the `/logs` streaming session, plus the error
//! body the endpoint returns when it refuses the WebSocket upgrade.

mod error;
mod events;

pub use error::{ManagementError, ManagementErrorResponse};
pub use events::{ClientEvent, LogRecord, ServerEvent, decode_server_event};
