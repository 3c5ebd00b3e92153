//! Subscription filter parsing
//!
//! Turns the raw `--level` / `--event` strings into the filter sent with
//! `start_streaming`. When nothing is supplied there is no filter at all, which
//! tells the remote to apply no restriction.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while parsing user supplied filter values
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("invalid --level filter '{0}' provided, please use one of the following Log Levels: debug, info, warn, error")]
    InvalidLevel(String),

    #[error(
        "invalid --event filter '{0}' provided, please use one of the following EventTypes: cloudflared, http, tcp, udp"
    )]
    InvalidEvent(String),
}

/// Minimum log level a subscription asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub const ALL: [LogLevel; 4] = [LogLevel::Debug, LogLevel::Info, LogLevel::Warn, LogLevel::Error];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| FilterError::InvalidLevel(s.to_string()))
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source of a log event on the connector side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogEventType {
    Cloudflared,
    Http,
    Tcp,
    Udp,
}

impl LogEventType {
    pub const ALL: [LogEventType; 4] = [
        LogEventType::Cloudflared,
        LogEventType::Http,
        LogEventType::Tcp,
        LogEventType::Udp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogEventType::Cloudflared => "cloudflared",
            LogEventType::Http => "http",
            LogEventType::Tcp => "tcp",
            LogEventType::Udp => "udp",
        }
    }
}

impl FromStr for LogEventType {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|event| event.as_str() == s)
            .ok_or_else(|| FilterError::InvalidEvent(s.to_string()))
    }
}

impl fmt::Display for LogEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Filters attached to a `start_streaming` request
///
/// Never empty: at least one of `level` or `events` is set. An absent filter is
/// expressed as `Option::<StreamingFilters>::None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamingFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<LogLevel>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<LogEventType>,
}

/// Parse raw level and event strings into a subscription filter
///
/// An empty level string counts as no level. Duplicate events collapse to their
/// first occurrence. Returns `Ok(None)` when neither a level nor any event is
/// given.
pub fn build_filters(level: Option<&str>, events: &[String]) -> Result<Option<StreamingFilters>, FilterError> {
    let level = match level {
        Some(raw) if !raw.is_empty() => Some(raw.parse::<LogLevel>()?),
        _ => None,
    };

    let mut parsed: Vec<LogEventType> = Vec::with_capacity(events.len());
    for raw in events {
        let event = raw.parse::<LogEventType>()?;
        if !parsed.contains(&event) {
            parsed.push(event);
        }
    }

    if level.is_none() && parsed.is_empty() {
        return Ok(None);
    }

    Ok(Some(StreamingFilters { level, events: parsed }))
}
