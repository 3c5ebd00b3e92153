//! Command-line interface
//!
//! Every flag can also come from the environment; file configuration fills in
//! whatever neither provides.

use clap::Parser;
use std::path::PathBuf;
use tracing::debug;

use crate::config::Config;
use crate::session::{DEFAULT_MANAGEMENT_HOSTNAME, ManagementEndpoint, SessionRequest};
use crate::tail::TailOptions;

/// Level filter applied when none is configured
pub const DEFAULT_LEVEL_FILTER: &str = "debug";

/// tunneltail - stream logs from a remote cloudflared
#[derive(Parser, Debug)]
#[command(
    name = "tunneltail",
    about = "Stream logs from a remote cloudflared",
    version = env!("GIT_DESCRIBE"),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Access a specific cloudflared instance by connector id (for when a tunnel has multiple cloudflared's)
    #[arg(long = "connector-id", env = "TUNNEL_MANAGEMENT_CONNECTOR")]
    pub connector_id: Option<String>,

    /// Filter by specific Events (cloudflared, http, tcp, udp), otherwise all events are sent
    #[arg(long = "event", env = "TUNNEL_MANAGEMENT_FILTER_EVENTS", value_delimiter = ',')]
    pub events: Vec<String>,

    /// Filter by specific log levels (debug, info, warn, error) [default: debug]
    #[arg(long, env = "TUNNEL_MANAGEMENT_FILTER_LEVEL")]
    pub level: Option<String>,

    /// Access token for a specific tunnel
    #[arg(long, env = "TUNNEL_MANAGEMENT_TOKEN", default_value = "", hide_env_values = true)]
    pub token: String,

    /// Management hostname to signify incoming management requests
    #[arg(long = "management-hostname", env = "TUNNEL_MANAGEMENT_HOSTNAME", hide = true)]
    pub management_hostname: Option<String>,

    /// Set a cf-trace-id for the request
    #[arg(long, hide = true)]
    pub trace: Option<String>,

    /// Application logging level (debug, info, warn, error, fatal)
    #[arg(short = 'l', long = "log-level", env = "TUNNEL_LOGLEVEL")]
    pub log_level: Option<String>,
}

impl Cli {
    /// Resolve flags against file configuration and built-in defaults
    pub fn tail_options(&self, config: &Config) -> TailOptions {
        debug!("tail_options: called");
        let hostname = self
            .management_hostname
            .clone()
            .or_else(|| config.management_hostname.clone())
            .unwrap_or_else(|| DEFAULT_MANAGEMENT_HOSTNAME.to_string());
        let connector_id = self.connector_id.clone().or_else(|| config.connector_id.clone());

        let endpoint = ManagementEndpoint::new(hostname, self.token.clone()).with_connector_id(connector_id);
        let request = SessionRequest::new(endpoint).with_trace_id(self.trace.clone());

        let level = self
            .level
            .clone()
            .or_else(|| config.level.clone())
            .unwrap_or_else(|| DEFAULT_LEVEL_FILTER.to_string());

        let events = if self.events.is_empty() {
            debug!("tail_options: no --event flags, using config events");
            config.events.clone()
        } else {
            self.events.clone()
        };

        TailOptions {
            request,
            level: Some(level),
            events,
        }
    }
}
