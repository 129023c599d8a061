//! HamAlert Bridge - forward HamAlert spots to a Discord-style webhook.
//!
//! This crate provides:
//! - A telnet session that logs in to HamAlert and switches it to JSON mode
//! - Tolerant extraction of spot records into notification messages
//! - Per (callsign, band, mode) de-duplication within a time window
//! - Webhook delivery with a dry-run mode
//! - A supervisor that reconnects after every disconnect
//!
//! # Example
//!
//! ```rust
//! use hamalert_bridge::spot::SpotRecord;
//!
//! let line = r#"{"fullCallsign":"W1AW","spotter":"K1TTT","frequency":14025,"mode":"cw"}"#;
//! let record = SpotRecord::parse(line).expect("Failed to parse spot");
//! let notification = record.extract().expect("Spot has a callsign");
//!
//! assert_eq!(notification.band, "20m");
//! println!("{}", notification);
//! ```

pub mod band;
pub mod config;
pub mod dedup;
pub mod metrics;
pub mod notifier;
pub mod session;
pub mod spot;
pub mod stats;
pub mod supervisor;
pub mod telnet;

pub use band::{UNKNOWN_BAND, band_from_mhz, parse_mhz};
pub use config::Config;
pub use dedup::{DedupKey, DedupLedger};
pub use notifier::{Notifier, NotifierConfig};
pub use session::{
    Handshake, LineAction, LineKind, Session, SessionConfig, SessionError, SessionState,
    SpotOutcome, classify, dispatch_spot,
};
pub use spot::{Notification, RecordError, SpotRecord};
pub use stats::{SpotStats, StatsSummary};
pub use supervisor::Supervisor;
