//! Validation error body returned on a rejected upgrade

use serde::{Deserialize, Serialize};

/// A single validation failure reported by the management middleware
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagementError {
    #[serde(default)]
    pub code: i64,

    #[serde(default)]
    pub message: String,
}

/// HTTP body sent instead of `101 Switching Protocols` when a request fails validation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagementErrorResponse {
    #[serde(default)]
    pub success: bool,

    #[serde(default)]
    pub errors: Vec<ManagementError>,
}

impl ManagementErrorResponse {
    /// Errors worth reporting: only present when the body describes a real failure
    pub fn failures(&self) -> Option<&[ManagementError]> {
        if self.success || self.errors.is_empty() {
            None
        } else {
            Some(&self.errors)
        }
    }
}
