//! In-memory de-duplication of notifications.
//!
//! A spot is identified by its (callsign, band, mode) triple. Once a
//! notification for a triple has been delivered, further spots for the same
//! triple are suppressed until the window has elapsed.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::info;

/// Normalized de-duplication identity.
///
/// Callsign and mode are upper-cased, band is lower-cased, all are trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    callsign: String,
    band: String,
    mode: String,
}

impl DedupKey {
    pub fn new(callsign: &str, band: &str, mode: &str) -> Self {
        Self {
            callsign: callsign.trim().to_uppercase(),
            band: band.trim().to_lowercase(),
            mode: mode.trim().to_uppercase(),
        }
    }
}

/// Last-notified timestamps keyed by [`DedupKey`].
///
/// Entries are never evicted; a stale entry is simply overwritten by the next
/// delivery for the same key.
#[derive(Debug)]
pub struct DedupLedger {
    window: TimeDelta,
    last_notified: HashMap<DedupKey, DateTime<Utc>>,
}

impl DedupLedger {
    /// Create an empty ledger with the given suppression window.
    pub fn new(window: Duration) -> Self {
        Self {
            window: TimeDelta::from_std(window).unwrap_or(TimeDelta::MAX),
            last_notified: HashMap::new(),
        }
    }

    /// The suppression window.
    pub fn window(&self) -> TimeDelta {
        self.window
    }

    /// Whether a spot for this identity should be sent at `now`.
    ///
    /// An empty callsign is never suppressed.
    pub fn should_notify(
        &self,
        callsign: &str,
        band: &str,
        mode: &str,
        now: DateTime<Utc>,
    ) -> bool {
        if callsign.trim().is_empty() {
            return true;
        }

        let key = DedupKey::new(callsign, band, mode);
        let Some(last) = self.last_notified.get(&key) else {
            return true;
        };

        let elapsed = now - *last;
        if elapsed >= self.window {
            return true;
        }

        info!(
            "Skip {} ({}, {}): seen {}s ago, {}s left in de-dup window",
            key.callsign,
            key.band,
            key.mode,
            elapsed.num_seconds(),
            (self.window - elapsed).num_seconds()
        );
        false
    }

    /// Record a successful delivery for this identity at `now`.
    ///
    /// Only call this after the notifier reported success.
    pub fn mark_notified(&mut self, callsign: &str, band: &str, mode: &str, now: DateTime<Utc>) {
        if callsign.trim().is_empty() {
            return;
        }
        self.last_notified.insert(DedupKey::new(callsign, band, mode), now);
    }

    /// Number of identities seen so far.
    pub fn len(&self) -> usize {
        self.last_notified.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_notified.is_empty()
    }
}
