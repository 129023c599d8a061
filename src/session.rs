//! The HamAlert telnet session.
//!
//! A session logs in, waits for the first prompt, switches the server to JSON
//! mode with `set/json`, and from then on treats every line as a spot
//! record. Line classification is deliberately loose (case-insensitive
//! substring checks) because the greeting and prompt text differ slightly
//! between server builds.
//!
//! The protocol logic lives in [`Handshake`], which is pure and consumes one
//! line at a time. [`Session`] owns the socket and drives it.

use std::io;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::dedup::DedupLedger;
use crate::notifier::Notifier;
use crate::spot::{RecordError, SpotRecord};
use crate::stats::SpotStats;
use crate::telnet::{LineRead, TelnetStream};

/// Default HamAlert telnet server.
pub const HAMALERT_HOST: &str = "hamalert.org";

/// Default HamAlert telnet port.
pub const HAMALERT_PORT: u16 = 7300;

/// Command switching the server to one JSON object per spot line.
pub const JSON_MODE_COMMAND: &str = "set/json";

const LOGIN_PROMPT: &str = "login:";
const PASSWORD_PROMPT: &str = "password:";

/// Errors that end a session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Connection to {0} timed out")]
    ConnectTimeout(String),

    #[error("Timed out waiting for {0:?} prompt")]
    PromptTimeout(&'static str),

    #[error("Connection closed by server during login")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl SessionError {
    /// Whether the server actively refused the TCP connection.
    pub fn is_connection_refused(&self) -> bool {
        match self {
            SessionError::Connect { source, .. } => {
                source.kind() == io::ErrorKind::ConnectionRefused
            }
            _ => false,
        }
    }
}

fn is_eof(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::UnexpectedEof
}

/// Lifecycle of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    AwaitingLoginPrompt,
    AwaitingPasswordPrompt,
    AwaitingGreeting,
    StructuredModeRequested,
    StructuredModeConfirmed,
    Closed,
}

/// What a received line is, judged by content alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// "Hello ..., this is HamAlert" banner.
    Greeting,
    /// Command prompt such as `W1AW de HamAlert >`.
    Prompt,
    /// Reply to a successful command.
    ModeConfirmed,
    /// Anything else: a spot, or noise before JSON mode.
    Data,
}

struct Classifier {
    kind: LineKind,
    matches: fn(&str) -> bool,
}

fn looks_like_record(line: &str) -> bool {
    line.trim_start().starts_with('{')
}

fn is_greeting(line: &str) -> bool {
    line.contains("hamalert") && line.contains("hello")
}

fn is_prompt(line: &str) -> bool {
    line.contains("de hamalert") || line.contains("hamalert >")
}

fn is_success(line: &str) -> bool {
    line.contains("operation successful")
}

/// Evaluated top to bottom against the lower-cased line; first match wins.
///
/// JSON objects are checked first so spot text can never be mistaken for a
/// protocol line.
const CLASSIFIERS: &[Classifier] = &[
    Classifier {
        kind: LineKind::Data,
        matches: looks_like_record,
    },
    Classifier {
        kind: LineKind::Greeting,
        matches: is_greeting,
    },
    Classifier {
        kind: LineKind::Prompt,
        matches: is_prompt,
    },
    Classifier {
        kind: LineKind::ModeConfirmed,
        matches: is_success,
    },
];

/// Classify one line of server output.
pub fn classify(line: &str) -> LineKind {
    let lower = line.to_lowercase();
    CLASSIFIERS
        .iter()
        .find(|c| (c.matches)(&lower))
        .map(|c| c.kind)
        .unwrap_or(LineKind::Data)
}

/// What the session should do with a line.
#[derive(Debug)]
pub enum LineAction {
    /// Nothing to do.
    Ignore,
    /// Send [`JSON_MODE_COMMAND`].
    RequestStructuredMode,
    /// JSON mode is now active.
    Confirmed,
    /// A spot record to process.
    Record(SpotRecord),
    /// A JSON-mode line that was not a JSON object.
    Malformed(RecordError),
}

/// Post-login protocol state.
#[derive(Debug)]
pub struct Handshake {
    state: SessionState,
    json_requested: bool,
}

impl Handshake {
    pub fn new() -> Self {
        Self {
            state: SessionState::AwaitingGreeting,
            json_requested: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the server has confirmed JSON mode.
    pub fn is_confirmed(&self) -> bool {
        self.state == SessionState::StructuredModeConfirmed
    }

    /// Advance on one received line.
    pub fn on_line(&mut self, line: &str) -> LineAction {
        if line.trim().is_empty() {
            return LineAction::Ignore;
        }

        match classify(line) {
            LineKind::Greeting => LineAction::Ignore,
            LineKind::Prompt if !self.json_requested => {
                self.json_requested = true;
                if !self.is_confirmed() {
                    self.state = SessionState::StructuredModeRequested;
                }
                LineAction::RequestStructuredMode
            }
            LineKind::Prompt => LineAction::Ignore,
            LineKind::ModeConfirmed => {
                self.state = SessionState::StructuredModeConfirmed;
                LineAction::Confirmed
            }
            // Nothing but the handshake counts until JSON mode is confirmed
            LineKind::Data if !self.is_confirmed() => LineAction::Ignore,
            LineKind::Data => match SpotRecord::parse(line) {
                Ok(record) => LineAction::Record(record),
                Err(e) => LineAction::Malformed(e),
            },
        }
    }
}

impl Default for Handshake {
    fn default() -> Self {
        Self::new()
    }
}

/// A prompt left without a line terminator when the idle timeout fired.
///
/// Only taken before JSON mode is confirmed; afterwards partial input is held
/// until its newline arrives.
fn unterminated_prompt(handshake: &Handshake, stream: &mut TelnetStream) -> Option<String> {
    if handshake.is_confirmed() {
        return None;
    }
    stream.take_partial_line_if(|text| classify(text) == LineKind::Prompt)
}

/// How a spot record ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpotOutcome {
    /// No callsign; dropped.
    Incomplete,
    /// Same identity notified within the de-dup window.
    Suppressed,
    /// Accepted by the notifier and recorded in the ledger.
    Delivered,
    /// Notifier failed; the ledger is left untouched.
    DeliveryFailed,
}

/// Run one spot through extraction, de-duplication and delivery.
///
/// The ledger is only written after a successful delivery, so a spot whose
/// delivery failed is not suppressed next time it arrives.
pub async fn dispatch_spot(
    record: &SpotRecord,
    ledger: &mut DedupLedger,
    notifier: &Notifier,
    stats: &SpotStats,
    now: DateTime<Utc>,
) -> SpotOutcome {
    let Some(notification) = record.extract() else {
        debug!("Spot missing callsign; skipping. Keys={:?}", record.keys());
        stats.record_incomplete();
        return SpotOutcome::Incomplete;
    };

    let (callsign, band, mode) = (
        notification.callsign.as_str(),
        notification.band.as_str(),
        notification.mode.as_str(),
    );

    if !ledger.should_notify(callsign, band, mode, now) {
        stats.record_suppressed();
        return SpotOutcome::Suppressed;
    }

    let started = Instant::now();
    if notifier.deliver(&notification.message).await {
        ledger.mark_notified(callsign, band, mode, now);
        stats.record_delivered(&notification, started.elapsed());
        SpotOutcome::Delivered
    } else {
        stats.record_delivery_failure(started.elapsed());
        SpotOutcome::DeliveryFailed
    }
}

/// Connection settings for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Hostname of the HamAlert server.
    pub host: String,

    /// Port number.
    pub port: u16,

    /// HamAlert account name.
    pub username: String,

    /// HamAlert telnet password.
    pub password: String,

    /// Bound on connecting and on each login prompt.
    pub connect_timeout: Duration,

    /// How long to wait for a line before sending a keepalive.
    pub idle_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: HAMALERT_HOST.to_string(),
            port: HAMALERT_PORT,
            username: String::new(),
            password: String::new(),
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(30),
        }
    }
}

impl SessionConfig {
    /// Create a new configuration with the given credentials.
    pub fn with_credentials(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            ..Default::default()
        }
    }

    /// Set the host and port.
    pub fn with_server(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// One live connection to HamAlert.
///
/// Never reused: the supervisor builds a fresh session for every connect.
pub struct Session {
    config: SessionConfig,
    state: SessionState,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            state: SessionState::Connecting,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Connect, log in, and stream spots until the connection ends.
    ///
    /// Returns `Ok(())` when the server closes the connection after login.
    /// Any other transport fault is an error; either way the session is
    /// finished and ends in [`SessionState::Closed`].
    pub async fn run(
        &mut self,
        ledger: &mut DedupLedger,
        notifier: &Notifier,
        stats: &SpotStats,
    ) -> Result<(), SessionError> {
        let result = self.connect_and_stream(ledger, notifier, stats).await;
        self.state = SessionState::Closed;
        result
    }

    async fn connect(&mut self) -> Result<TelnetStream, SessionError> {
        self.state = SessionState::Connecting;
        let addr = self.config.addr();
        info!("Connecting to {}...", addr);

        let stream = timeout(self.config.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| SessionError::ConnectTimeout(addr.clone()))?
            .map_err(|source| SessionError::Connect {
                addr: addr.clone(),
                source,
            })?;

        info!("Connected to {}", addr);
        Ok(TelnetStream::new(stream))
    }

    async fn expect_prompt(
        &self,
        stream: &mut TelnetStream,
        prompt: &'static str,
    ) -> Result<(), SessionError> {
        timeout(self.config.connect_timeout, stream.read_until_prompt(prompt))
            .await
            .map_err(|_| SessionError::PromptTimeout(prompt))?
            .map_err(|e| if is_eof(&e) { SessionError::Closed } else { e.into() })
    }

    async fn login(&mut self, stream: &mut TelnetStream) -> Result<(), SessionError> {
        self.state = SessionState::AwaitingLoginPrompt;
        self.expect_prompt(stream, LOGIN_PROMPT).await?;
        stream.send_line(&self.config.username).await?;

        self.state = SessionState::AwaitingPasswordPrompt;
        self.expect_prompt(stream, PASSWORD_PROMPT).await?;
        stream.send_line(&self.config.password).await?;

        info!("Logged in as {}", self.config.username);
        Ok(())
    }

    async fn connect_and_stream(
        &mut self,
        ledger: &mut DedupLedger,
        notifier: &Notifier,
        stats: &SpotStats,
    ) -> Result<(), SessionError> {
        let mut stream = self.connect().await?;
        self.login(&mut stream).await?;

        let mut handshake = Handshake::new();
        self.state = handshake.state();

        loop {
            let line = match stream.read_line(self.config.idle_timeout).await {
                Ok(LineRead::Line(line)) => line,
                Ok(LineRead::Idle) => match unterminated_prompt(&handshake, &mut stream) {
                    Some(prompt) => prompt,
                    None => {
                        stream.send_nop().await?;
                        stats.record_keepalive();
                        debug!("Sent telnet NOP keepalive");
                        continue;
                    }
                },
                Err(e) if is_eof(&e) => {
                    info!("Connection closed by server");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            };

            stats.record_line(line.len() as u64);
            debug!("Received: {}", line);

            match handshake.on_line(&line) {
                LineAction::Ignore => {}
                LineAction::RequestStructuredMode => {
                    info!("Setting JSON mode...");
                    stream.send_line(JSON_MODE_COMMAND).await?;
                }
                LineAction::Confirmed => info!("JSON mode confirmed"),
                LineAction::Malformed(e) => {
                    stats.record_parse_failure();
                    debug!("Skipping line in JSON mode ({}): {}", e, line);
                }
                LineAction::Record(record) => {
                    dispatch_spot(&record, ledger, notifier, stats, Utc::now()).await;
                }
            }
            self.state = handshake.state();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::NotifierConfig;
    use serde_json::json;

    fn confirmed() -> Handshake {
        let mut hs = Handshake::new();
        hs.on_line("W1AW de HamAlert >");
        hs.on_line("Operation successful.");
        hs
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn spot(callsign: &str) -> SpotRecord {
        SpotRecord::from_value(json!({
            "fullCallsign": callsign,
            "spotter": "K1TTT",
            "frequency": "14025",
            "mode": "CW",
            "time": "12:00"
        }))
        .unwrap()
    }

    #[test]
    fn test_classify_tolerates_variants() {
        assert_eq!(classify("Hello W1AW, this is HamAlert"), LineKind::Greeting);
        assert_eq!(classify("HELLO there from HAMALERT v2"), LineKind::Greeting);
        assert_eq!(classify("W1AW de HamAlert >"), LineKind::Prompt);
        assert_eq!(classify("hamalert >"), LineKind::Prompt);
        assert_eq!(classify("Operation successful"), LineKind::ModeConfirmed);
        assert_eq!(classify("OPERATION SUCCESSFUL!"), LineKind::ModeConfirmed);
        assert_eq!(classify("DX de K1TTT: 14025.0 W1AW"), LineKind::Data);
    }

    #[test]
    fn test_json_line_is_always_data() {
        let line = r#"{"callsign":"W1AW","comment":"hello de HamAlert >"}"#;
        assert_eq!(classify(line), LineKind::Data);
    }

    #[test]
    fn test_prompt_requests_json_once() {
        let mut hs = Handshake::new();
        assert_eq!(hs.state(), SessionState::AwaitingGreeting);

        assert!(matches!(hs.on_line("Hello W1AW, this is HamAlert"), LineAction::Ignore));
        assert!(matches!(
            hs.on_line("W1AW de HamAlert >"),
            LineAction::RequestStructuredMode
        ));
        assert_eq!(hs.state(), SessionState::StructuredModeRequested);
        assert!(matches!(hs.on_line("W1AW de HamAlert >"), LineAction::Ignore));

        assert!(matches!(hs.on_line("Operation successful."), LineAction::Confirmed));
        assert_eq!(hs.state(), SessionState::StructuredModeConfirmed);
    }

    #[test]
    fn test_spots_ignored_before_confirmation() {
        let mut hs = Handshake::new();
        let line = r#"{"fullCallsign":"W1AW","mode":"CW"}"#;

        assert!(matches!(hs.on_line(line), LineAction::Ignore));
        hs.on_line("W1AW de HamAlert >");
        assert!(matches!(hs.on_line(line), LineAction::Ignore));
        assert!(matches!(hs.on_line("not json either"), LineAction::Ignore));

        hs.on_line("Operation successful");
        assert!(matches!(hs.on_line(line), LineAction::Record(_)));
    }

    #[test]
    fn test_malformed_lines_after_confirmation() {
        let mut hs = confirmed();
        assert!(matches!(
            hs.on_line("{not valid"),
            LineAction::Malformed(RecordError::InvalidJson(_))
        ));
        assert!(matches!(
            hs.on_line("[1,2]"),
            LineAction::Malformed(RecordError::NotAnObject(_))
        ));
        assert!(matches!(hs.on_line("   "), LineAction::Ignore));
        assert!(hs.is_confirmed());
    }

    #[test]
    fn test_session_error_refused() {
        let err = SessionError::Connect {
            addr: "localhost:1".to_string(),
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        };
        assert!(err.is_connection_refused());
        assert!(!SessionError::Closed.is_connection_refused());
    }

    #[test]
    fn test_config_builder() {
        let config =
            SessionConfig::with_credentials("W1AW", "secret").with_server("test.example.com", 1234);
        assert_eq!(config.username, "W1AW");
        assert_eq!(config.password, "secret");
        assert_eq!(config.addr(), "test.example.com:1234");
        assert_eq!(SessionConfig::default().port, HAMALERT_PORT);
    }

    #[tokio::test]
    async fn test_dispatch_delivers_then_suppresses() {
        let notifier = Notifier::new(NotifierConfig::dry_run()).unwrap();
        let mut ledger = DedupLedger::new(Duration::from_secs(1200));
        let stats = SpotStats::new();

        let first = dispatch_spot(&spot("W1AW"), &mut ledger, &notifier, &stats, at(0)).await;
        assert_eq!(first, SpotOutcome::Delivered);

        let again = dispatch_spot(&spot("w1aw"), &mut ledger, &notifier, &stats, at(600)).await;
        assert_eq!(again, SpotOutcome::Suppressed);

        let later = dispatch_spot(&spot("W1AW"), &mut ledger, &notifier, &stats, at(1200)).await;
        assert_eq!(later, SpotOutcome::Delivered);

        let summary = stats.summary();
        assert_eq!(summary.notifications_sent, 2);
        assert_eq!(summary.suppressed_spots, 1);
    }

    #[tokio::test]
    async fn test_dispatch_incomplete() {
        let notifier = Notifier::new(NotifierConfig::dry_run()).unwrap();
        let mut ledger = DedupLedger::new(Duration::from_secs(1200));
        let stats = SpotStats::new();

        let record = SpotRecord::from_value(json!({"spotter": "K1TTT", "band": "20m"})).unwrap();
        let outcome = dispatch_spot(&record, &mut ledger, &notifier, &stats, at(0)).await;

        assert_eq!(outcome, SpotOutcome::Incomplete);
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn test_failed_delivery_leaves_ledger_open() {
        let notifier = Notifier::new(NotifierConfig {
            webhook_url: "http://127.0.0.1:1/webhook".to_string(),
            dry_run: false,
            timeout: Duration::from_secs(2),
        })
        .unwrap();
        let mut ledger = DedupLedger::new(Duration::from_secs(1200));
        let stats = SpotStats::new();

        let outcome = dispatch_spot(&spot("W1AW"), &mut ledger, &notifier, &stats, at(0)).await;
        assert_eq!(outcome, SpotOutcome::DeliveryFailed);
        assert!(ledger.is_empty());
        assert!(ledger.should_notify("W1AW", "20m", "CW", at(1)));
        assert_eq!(stats.summary().delivery_failures, 1);
    }
}
