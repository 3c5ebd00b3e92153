//! Session negotiation with the management endpoint
//!
//! Opens the WebSocket connection to `/logs`, classifies a refused upgrade, and
//! sends the single `start_streaming` request once the connection is up. There
//! is no reconnection: any failure here ends the run.

use std::fmt;

use reqwest::Client;
use reqwest::StatusCode;
use reqwest::header::{CONNECTION, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_KEY, SEC_WEBSOCKET_VERSION, UPGRADE, USER_AGENT};
use reqwest::redirect::Policy;
use thiserror::Error;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::handshake::client::generate_key;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::Role;
use tracing::{debug, error};
use url::Url;

use crate::filter::StreamingFilters;
use crate::management::{ClientEvent, ManagementError, ManagementErrorResponse};
use crate::transport::{self, EventWriter, StreamError, WebSocketReader, WebSocketWriter};

/// Default management hostname
pub const DEFAULT_MANAGEMENT_HOSTNAME: &str = "management.argotunnel.com";

/// Header carrying the optional trace identifier
pub const TRACE_ID_HEADER: &str = "cf-trace-id";

const WEBSOCKET_VERSION: &str = "13";

/// User agent sent with every session request
pub fn default_user_agent() -> String {
    format!("tunneltail/{}", env!("GIT_DESCRIBE"))
}

/// Where the streaming session connects to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagementEndpoint {
    scheme: String,
    hostname: String,
    access_token: String,
    connector_id: Option<String>,
}

impl ManagementEndpoint {
    pub fn new(hostname: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            scheme: "wss".to_string(),
            hostname: hostname.into(),
            access_token: access_token.into(),
            connector_id: None,
        }
    }

    /// Target a specific connector when a tunnel has several
    pub fn with_connector_id(mut self, connector_id: Option<String>) -> Self {
        self.connector_id = connector_id.filter(|id| !id.is_empty());
        self
    }

    /// Override the URL scheme (`ws` for plaintext endpoints)
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    pub fn url(&self) -> Result<Url, SessionError> {
        let base = format!("{}://{}/logs", self.scheme, self.hostname);
        let mut url = Url::parse(&base)
            .map_err(|e| SessionError::InvalidRequest(format!("invalid management hostname '{}': {}", self.hostname, e)))?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("access_token", &self.access_token);
            if let Some(connector_id) = &self.connector_id {
                query.append_pair("connector_id", connector_id);
            }
        }

        Ok(url)
    }

    /// The same URL on the HTTP scheme the upgrade request travels over
    pub fn upgrade_url(&self) -> Result<Url, SessionError> {
        let mut url = self.url()?;
        let scheme = match url.scheme() {
            "wss" => "https",
            "ws" => "http",
            other => return Err(SessionError::InvalidRequest(format!("unsupported scheme '{}'", other))),
        };
        url.set_scheme(scheme)
            .map_err(|()| SessionError::InvalidRequest(format!("unable to switch scheme to {}", scheme)))?;
        Ok(url)
    }
}

/// Everything needed to open a streaming session
#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub endpoint: ManagementEndpoint,
    pub user_agent: String,
    pub trace_id: Option<String>,
}

impl SessionRequest {
    pub fn new(endpoint: ManagementEndpoint) -> Self {
        Self {
            endpoint,
            user_agent: default_user_agent(),
            trace_id: None,
        }
    }

    pub fn with_trace_id(mut self, trace_id: Option<String>) -> Self {
        self.trace_id = trace_id.filter(|trace| !trace.is_empty());
        self
    }

    /// Build the HTTP/1.1 upgrade request with URL, user agent and trace headers
    pub fn upgrade_request(&self, client: &Client, key: &str) -> Result<reqwest::Request, SessionError> {
        let url = self.endpoint.upgrade_url()?;
        let mut builder = client
            .get(url)
            .header(USER_AGENT, self.user_agent.as_str())
            .header(CONNECTION, "Upgrade")
            .header(UPGRADE, "websocket")
            .header(SEC_WEBSOCKET_VERSION, WEBSOCKET_VERSION)
            .header(SEC_WEBSOCKET_KEY, key);

        if let Some(trace_id) = &self.trace_id {
            debug!(%trace_id, "upgrade_request: adding trace header");
            builder = builder.header(TRACE_ID_HEADER, trace_id.as_str());
        }

        builder.build().map_err(|e| SessionError::InvalidRequest(e.to_string()))
    }
}

/// Why the endpoint refused to upgrade the connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// HTTP 530: no connector reachable for this tunnel
    ConnectorUnavailable,

    /// The middleware returned structured validation errors
    Validation(Vec<ManagementError>),

    /// Any other non-upgrade response
    Status(u16),
}

impl Rejection {
    pub const CONNECTOR_UNAVAILABLE_STATUS: u16 = 530;

    /// Classify a non-101 response from its status and body
    pub fn from_response(status: u16, body: Option<&[u8]>) -> Self {
        debug!(status, body_len = ?body.map(<[u8]>::len), "Rejection::from_response: called");
        if status == Self::CONNECTOR_UNAVAILABLE_STATUS {
            return Rejection::ConnectorUnavailable;
        }

        let failures = body
            .and_then(|body| serde_json::from_slice::<ManagementErrorResponse>(body).ok())
            .and_then(|resp| resp.failures().map(<[ManagementError]>::to_vec));

        match failures {
            Some(errors) => Rejection::Validation(errors),
            None => Rejection::Status(status),
        }
    }

    /// One diagnostic line per thing worth telling the user
    pub fn diagnostics(&self) -> Vec<String> {
        match self {
            Rejection::ConnectorUnavailable => vec![
                "no cloudflared connector available or reachable via management request \
                 (a recent version of cloudflared is required to use streaming logs)"
                    .to_string(),
            ],
            Rejection::Validation(errors) => errors
                .iter()
                .map(|e| format!("management request failed validation: ({}) {}", e.code, e.message))
                .collect(),
            Rejection::Status(status) => vec![format!(
                "unable to start management log streaming session: http response code returned {}",
                status
            )],
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::ConnectorUnavailable => write!(f, "no reachable connector"),
            Rejection::Validation(errors) => write!(f, "{} validation error(s)", errors.len()),
            Rejection::Status(status) => write!(f, "http response code {}", status),
        }
    }
}

/// Errors that end negotiation
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid management request: {0}")]
    InvalidRequest(String),

    #[error("management request rejected: {0}")]
    Rejected(Rejection),

    #[error("unable to start management log streaming session: {0}")]
    Connect(#[source] reqwest::Error),

    #[error("unable to start management log streaming session: {0}")]
    Handshake(String),

    #[error("unable to request logs from management tunnel: {0}")]
    Subscribe(#[source] StreamError),
}

impl SessionError {
    /// Write this failure to the diagnostic log
    pub fn report(&self) {
        match self {
            SessionError::Rejected(rejection) => {
                for line in rejection.diagnostics() {
                    error!("{}", line);
                }
            }
            other => error!("{}", other),
        }
    }
}

/// An established session, ready to be handed to the reader and coordinator
pub struct Session<R, W> {
    pub reader: R,
    pub writer: W,
}

/// Opens streaming sessions for one request
pub struct SessionNegotiator {
    request: SessionRequest,
}

impl SessionNegotiator {
    pub fn new(request: SessionRequest) -> Self {
        Self { request }
    }

    /// Open the connection without subscribing
    ///
    /// A refused upgrade is read to the end of its body before classification.
    pub async fn connect(&self) -> Result<(WebSocketReader, WebSocketWriter), SessionError> {
        let client = Client::builder()
            .http1_only()
            .redirect(Policy::none())
            .build()
            .map_err(SessionError::Connect)?;
        let key = generate_key();
        let request = self.request.upgrade_request(&client, &key)?;
        debug!(path = %request.url().path(), "SessionNegotiator::connect: dialing");

        let response = client.execute(request).await.map_err(|e| {
            // The URL carries the access token
            let e = e.without_url();
            debug!(error = %e, "SessionNegotiator::connect: connection failed");
            SessionError::Connect(e)
        })?;

        let status = response.status();
        if status != StatusCode::SWITCHING_PROTOCOLS {
            debug!(%status, "SessionNegotiator::connect: upgrade refused");
            let body = match response.bytes().await {
                Ok(body) => Some(body),
                Err(e) => {
                    debug!(error = %e, "SessionNegotiator::connect: unable to read response body");
                    None
                }
            };
            return Err(SessionError::Rejected(Rejection::from_response(
                status.as_u16(),
                body.as_deref(),
            )));
        }

        verify_accept_key(response.headers().get(SEC_WEBSOCKET_ACCEPT), &key)?;
        let upgraded = response
            .upgrade()
            .await
            .map_err(|e| SessionError::Connect(e.without_url()))?;
        debug!("SessionNegotiator::connect: upgraded");

        let stream = WebSocketStream::from_raw_socket(upgraded, Role::Client, None).await;
        Ok(transport::split(stream))
    }

    /// Open the connection and send `start_streaming`
    pub async fn negotiate(
        &self,
        filters: Option<StreamingFilters>,
    ) -> Result<Session<WebSocketReader, WebSocketWriter>, SessionError> {
        let (reader, mut writer) = self.connect().await?;
        start_streaming(&mut writer, filters).await?;
        Ok(Session { reader, writer })
    }
}

/// Check the server's `Sec-WebSocket-Accept` against the key we sent
fn verify_accept_key(accept: Option<&reqwest::header::HeaderValue>, key: &str) -> Result<(), SessionError> {
    let expected = derive_accept_key(key.as_bytes());
    match accept {
        Some(value) if value.as_bytes() == expected.as_bytes() => Ok(()),
        Some(_) => Err(SessionError::Handshake("mismatched Sec-WebSocket-Accept".to_string())),
        None => Err(SessionError::Handshake("missing Sec-WebSocket-Accept".to_string())),
    }
}

/// Send the subscription request on a freshly opened session
pub async fn start_streaming<W: EventWriter + ?Sized>(
    writer: &mut W,
    filters: Option<StreamingFilters>,
) -> Result<(), SessionError> {
    debug!(?filters, "start_streaming: called");
    writer
        .send_event(&ClientEvent::StartStreaming { filters })
        .await
        .map_err(SessionError::Subscribe)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{LogEventType, LogLevel};
    use crate::transport::mock;

    #[test]
    fn test_url_contains_token() {
        let endpoint = ManagementEndpoint::new("management.example.com", "abc123");
        assert_eq!(
            endpoint.url().unwrap().as_str(),
            "wss://management.example.com/logs?access_token=abc123"
        );
    }

    #[test]
    fn test_url_with_connector_and_scheme() {
        let endpoint = ManagementEndpoint::new("127.0.0.1:9000", "tok")
            .with_scheme("ws")
            .with_connector_id(Some("c-1".to_string()));
        assert_eq!(
            endpoint.url().unwrap().as_str(),
            "ws://127.0.0.1:9000/logs?access_token=tok&connector_id=c-1"
        );
    }

    #[test]
    fn test_empty_connector_id_is_dropped() {
        let endpoint = ManagementEndpoint::new("host", "tok").with_connector_id(Some(String::new()));
        assert!(!endpoint.url().unwrap().as_str().contains("connector_id"));
    }

    #[test]
    fn test_malformed_hostname_is_invalid() {
        let err = ManagementEndpoint::new("bad host", "tok").url().unwrap_err();
        assert!(matches!(err, SessionError::InvalidRequest(_)));
    }

    #[test]
    fn test_upgrade_url_maps_scheme() {
        let secure = ManagementEndpoint::new("host", "tok").upgrade_url().unwrap();
        assert_eq!(secure.as_str(), "https://host/logs?access_token=tok");

        let plain = ManagementEndpoint::new("127.0.0.1:9000", "tok").with_scheme("ws");
        assert_eq!(plain.upgrade_url().unwrap().scheme(), "http");

        let err = ManagementEndpoint::new("host", "tok").with_scheme("ftp").upgrade_url().unwrap_err();
        assert!(matches!(err, SessionError::InvalidRequest(_)));
    }

    #[test]
    fn test_upgrade_request_headers() {
        let request = SessionRequest::new(ManagementEndpoint::new("host", "tok"))
            .with_trace_id(Some("trace-42".to_string()))
            .upgrade_request(&Client::new(), "dGhlIHNhbXBsZSBub25jZQ==")
            .unwrap();
        let headers = request.headers();
        assert!(headers.get(USER_AGENT).unwrap().to_str().unwrap().starts_with("tunneltail/"));
        assert_eq!(headers.get(TRACE_ID_HEADER).unwrap(), "trace-42");
        assert_eq!(headers.get(UPGRADE).unwrap(), "websocket");
        assert_eq!(headers.get(SEC_WEBSOCKET_VERSION).unwrap(), "13");
        assert_eq!(headers.get(SEC_WEBSOCKET_KEY).unwrap(), "dGhlIHNhbXBsZSBub25jZQ==");
        assert_eq!(request.url().as_str(), "https://host/logs?access_token=tok");
    }

    #[test]
    fn test_upgrade_request_without_trace() {
        let request = SessionRequest::new(ManagementEndpoint::new("host", "tok"))
            .with_trace_id(Some(String::new()))
            .upgrade_request(&Client::new(), &generate_key())
            .unwrap();
        assert!(request.headers().get(TRACE_ID_HEADER).is_none());
    }

    #[test]
    fn test_accept_key_must_match() {
        // Sample handshake from RFC 6455 section 1.3
        let key = "dGhlIHNhbXBsZSBub25jZQ==";
        let good = reqwest::header::HeaderValue::from_static("s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
        assert!(verify_accept_key(Some(&good), key).is_ok());

        let bad = reqwest::header::HeaderValue::from_static("bm90IHRoZSByaWdodCBrZXk=");
        assert!(matches!(verify_accept_key(Some(&bad), key), Err(SessionError::Handshake(_))));
        assert!(matches!(verify_accept_key(None, key), Err(SessionError::Handshake(_))));
    }

    #[test]
    fn test_530_is_connector_unavailable() {
        let body = br#"{"success":false,"errors":[{"code":1,"message":"ignored"}]}"#;
        let rejection = Rejection::from_response(530, Some(body));
        assert_eq!(rejection, Rejection::ConnectorUnavailable);
        let lines = rejection.diagnostics();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("no cloudflared connector available"));
    }

    #[test]
    fn test_validation_errors_each_reported() {
        let body = br#"{"success":false,"errors":[{"code":1001,"message":"bad token"},{"code":1002,"message":"expired"}]}"#;
        let rejection = Rejection::from_response(400, Some(body));
        assert_eq!(
            rejection.diagnostics(),
            vec![
                "management request failed validation: (1001) bad token".to_string(),
                "management request failed validation: (1002) expired".to_string(),
            ]
        );
    }

    #[test]
    fn test_undecodable_body_cites_status() {
        let rejection = Rejection::from_response(502, Some(b"<html>bad gateway</html>"));
        assert_eq!(rejection, Rejection::Status(502));
        assert!(rejection.diagnostics()[0].ends_with("http response code returned 502"));
    }

    #[test]
    fn test_success_body_cites_status() {
        assert_eq!(
            Rejection::from_response(200, Some(br#"{"success":true,"errors":[]}"#)),
            Rejection::Status(200)
        );
        assert_eq!(Rejection::from_response(403, None), Rejection::Status(403));
    }

    #[tokio::test]
    async fn test_start_streaming_sends_once_without_filters() {
        let (_reader, mut writer, _remote) = mock::session();
        start_streaming(&mut writer, None).await.unwrap();

        let sent = writer.sent.lock().unwrap();
        assert_eq!(sent.as_slice(), &[ClientEvent::StartStreaming { filters: None }]);
        assert_eq!(serde_json::to_string(&sent[0]).unwrap(), r#"{"type":"start_streaming"}"#);
    }

    #[tokio::test]
    async fn test_start_streaming_carries_filters() {
        let (_reader, mut writer, _remote) = mock::session();
        let filters = StreamingFilters {
            level: Some(LogLevel::Warn),
            events: vec![LogEventType::Udp],
        };
        start_streaming(&mut writer, Some(filters.clone())).await.unwrap();

        let sent = writer.sent.lock().unwrap();
        assert_eq!(sent.as_slice(), &[ClientEvent::StartStreaming { filters: Some(filters) }]);
    }
}
