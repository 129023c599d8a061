//! Minimal telnet client layer.
//!
//! HamAlert speaks plain lines over telnet. All we need from the protocol is
//! to strip IAC command sequences out of the data stream, politely refuse any
//! option the server offers, and send `IAC NOP` as a keepalive.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;
use tracing::debug;

// Telnet protocol constants (RFC 854)
pub const IAC: u8 = 255;
pub const DONT: u8 = 254;
pub const DO: u8 = 253;
pub const WONT: u8 = 252;
pub const WILL: u8 = 251;
pub const SB: u8 = 250;
pub const NOP: u8 = 241;
pub const SE: u8 = 240;

const READ_CHUNK: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum FilterState {
    #[default]
    Data,
    Iac,
    Negotiate(u8),
    Subnegotiation,
    SubnegotiationIac,
}

/// Incremental IAC stripper.
///
/// Command sequences may be split across reads, so the parse state is kept
/// between calls to [`TelnetFilter::feed`].
#[derive(Debug, Default)]
pub struct TelnetFilter {
    state: FilterState,
}

impl TelnetFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process raw bytes from the socket.
    ///
    /// Plain data is appended to `data`. Replies refusing negotiated options
    /// (`DO` -> `WONT`, `WILL` -> `DONT`) are appended to `replies`.
    pub fn feed(&mut self, input: &[u8], data: &mut Vec<u8>, replies: &mut Vec<u8>) {
        for &byte in input {
            self.state = match self.state {
                FilterState::Data => match byte {
                    IAC => FilterState::Iac,
                    // NUL padding after CR carries no data
                    0 => FilterState::Data,
                    _ => {
                        data.push(byte);
                        FilterState::Data
                    }
                },
                FilterState::Iac => match byte {
                    IAC => {
                        data.push(IAC);
                        FilterState::Data
                    }
                    DO | DONT | WILL | WONT => FilterState::Negotiate(byte),
                    SB => FilterState::Subnegotiation,
                    _ => FilterState::Data,
                },
                FilterState::Negotiate(command) => {
                    match command {
                        DO => replies.extend_from_slice(&[IAC, WONT, byte]),
                        WILL => replies.extend_from_slice(&[IAC, DONT, byte]),
                        _ => {}
                    }
                    FilterState::Data
                }
                FilterState::Subnegotiation => match byte {
                    IAC => FilterState::SubnegotiationIac,
                    _ => FilterState::Subnegotiation,
                },
                FilterState::SubnegotiationIac => match byte {
                    SE => FilterState::Data,
                    _ => FilterState::Subnegotiation,
                },
            };
        }
    }
}

/// Result of waiting for a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineRead {
    /// A complete line, without its line terminator.
    Line(String),

    /// No complete line arrived within the idle timeout.
    Idle,
}

/// Case-insensitive search; returns the index just past the match.
fn find_ignore_case(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack
        .windows(needle.len())
        .position(|w| w.eq_ignore_ascii_case(needle))
        .map(|pos| pos + needle.len())
}

fn closed_by_peer() -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed by server")
}

/// A telnet connection with IAC handling and line buffering.
pub struct TelnetStream {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    filter: TelnetFilter,
    pending: Vec<u8>,
    replies: Vec<u8>,
}

impl TelnetStream {
    pub fn new(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader,
            writer,
            filter: TelnetFilter::new(),
            pending: Vec::with_capacity(READ_CHUNK),
            replies: Vec::new(),
        }
    }

    async fn flush_replies(&mut self) -> io::Result<()> {
        if self.replies.is_empty() {
            return Ok(());
        }
        debug!("Refusing {} bytes of telnet negotiation", self.replies.len());
        self.writer.write_all(&self.replies).await?;
        self.replies.clear();
        self.writer.flush().await
    }

    /// Read one chunk, optionally bounded by `limit`.
    ///
    /// Returns `Ok(None)` when the limit elapsed with nothing read. Only the
    /// socket read is under the timeout, so cancellation loses no data.
    async fn fill(&mut self, limit: Option<Duration>) -> io::Result<Option<usize>> {
        self.flush_replies().await?;

        let mut buf = [0u8; READ_CHUNK];
        let n = match limit {
            Some(limit) => match timeout(limit, self.reader.read(&mut buf)).await {
                Ok(result) => result?,
                Err(_) => return Ok(None),
            },
            None => self.reader.read(&mut buf).await?,
        };

        if n == 0 {
            return Err(closed_by_peer());
        }
        self.filter
            .feed(&buf[..n], &mut self.pending, &mut self.replies);
        Ok(Some(n))
    }

    /// Consume input up to and including `prompt` (case-insensitive).
    ///
    /// Prompts such as `login:` are not newline terminated, so this works on
    /// the raw buffer rather than on lines.
    pub async fn read_until_prompt(&mut self, prompt: &str) -> io::Result<()> {
        loop {
            if let Some(end) = find_ignore_case(&self.pending, prompt.as_bytes()) {
                self.pending.drain(..end);
                return Ok(());
            }
            self.fill(None).await?;
        }
    }

    /// Wait up to `idle` for the next complete line.
    ///
    /// Partial input is kept across idle timeouts.
    pub async fn read_line(&mut self, idle: Duration) -> io::Result<LineRead> {
        loop {
            if let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
                let raw: Vec<u8> = self.pending.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&raw)
                    .trim_end_matches(['\r', '\n'])
                    .to_string();
                return Ok(LineRead::Line(line));
            }

            if self.fill(Some(idle)).await?.is_none() {
                return Ok(LineRead::Idle);
            }
        }
    }

    /// Take the buffered unterminated line if `accept` approves its text.
    ///
    /// The buffer is left untouched when it is empty or rejected.
    pub fn take_partial_line_if(&mut self, accept: impl FnOnce(&str) -> bool) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let text = String::from_utf8_lossy(&self.pending)
            .trim_end_matches('\r')
            .to_string();
        if !accept(&text) {
            return None;
        }
        self.pending.clear();
        Some(text)
    }

    /// Send one line of text terminated by `\n`.
    pub async fn send_line(&mut self, text: &str) -> io::Result<()> {
        self.writer.write_all(text.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await
    }

    /// Send a telnet `IAC NOP` keepalive.
    pub async fn send_nop(&mut self) -> io::Result<()> {
        self.writer.write_all(&[IAC, NOP]).await?;
        self.writer.flush().await
    }
}
