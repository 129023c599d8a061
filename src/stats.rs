//! Statistics tracking for the bridge.
//!
//! Counts what happened to every line read from HamAlert (parsed, skipped,
//! suppressed, delivered) plus a latency histogram for webhook deliveries
//! and breakdowns of sent notifications by band, mode and callsign.

use hdrhistogram::Histogram;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::spot::Notification;

/// Thread-safe statistics collector.
#[derive(Debug)]
pub struct SpotStats {
    /// Sessions started by the supervisor (first connect included)
    pub sessions_started: AtomicU64,

    /// Lines received from the server, handshake included
    pub lines_received: AtomicU64,

    /// Bytes of line data received
    pub bytes_received: AtomicU64,

    /// Keepalives sent after an idle read
    pub keepalives_sent: AtomicU64,

    /// JSON-mode lines that were not a JSON object
    pub parse_failures: AtomicU64,

    /// Spot records without a callsign
    pub incomplete_spots: AtomicU64,

    /// Spots suppressed by the de-dup window
    pub suppressed_spots: AtomicU64,

    /// Notifications accepted by the webhook
    pub notifications_sent: AtomicU64,

    /// Notifications the webhook rejected or that failed in transit
    pub delivery_failures: AtomicU64,

    /// Webhook round trip in milliseconds
    delivery_histogram: RwLock<Histogram<u64>>,

    /// Notifications per band
    notifications_by_band: RwLock<HashMap<String, u64>>,

    /// Notifications per mode
    notifications_by_mode: RwLock<HashMap<String, u64>>,

    /// Most notified callsigns
    top_callsigns: RwLock<HashMap<String, u64>>,

    /// When stats collection started
    start_time: Instant,
}

impl SpotStats {
    /// Create a new statistics collector.
    pub fn new() -> Self {
        Self {
            sessions_started: AtomicU64::new(0),
            lines_received: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            keepalives_sent: AtomicU64::new(0),
            parse_failures: AtomicU64::new(0),
            incomplete_spots: AtomicU64::new(0),
            suppressed_spots: AtomicU64::new(0),
            notifications_sent: AtomicU64::new(0),
            delivery_failures: AtomicU64::new(0),
            // 1 ms to 60 s, 3 significant figures
            delivery_histogram: RwLock::new(
                Histogram::new_with_bounds(1, 60_000, 3)
                    .expect("Failed to create delivery histogram"),
            ),
            notifications_by_band: RwLock::new(HashMap::new()),
            notifications_by_mode: RwLock::new(HashMap::new()),
            top_callsigns: RwLock::new(HashMap::new()),
            start_time: Instant::now(),
        }
    }

    pub fn record_session(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a line read from the server.
    pub fn record_line(&self, bytes: u64) {
        self.lines_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_keepalive(&self) {
        self.keepalives_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_parse_failure(&self) {
        self.parse_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_incomplete(&self) {
        self.incomplete_spots.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_suppressed(&self) {
        self.suppressed_spots.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a delivered notification and how long the webhook took.
    pub fn record_delivered(&self, notification: &Notification, latency: Duration) {
        self.notifications_sent.fetch_add(1, Ordering::Relaxed);
        self.record_latency(latency);

        if let Ok(mut map) = self.notifications_by_band.write() {
            *map.entry(notification.band.to_lowercase()).or_insert(0) += 1;
        }

        if let Ok(mut map) = self.notifications_by_mode.write() {
            *map.entry(notification.mode.to_uppercase()).or_insert(0) += 1;
        }

        if let Ok(mut map) = self.top_callsigns.write() {
            *map.entry(notification.callsign.to_uppercase()).or_insert(0) += 1;
        }
    }

    /// Record a failed delivery attempt.
    pub fn record_delivery_failure(&self, latency: Duration) {
        self.delivery_failures.fetch_add(1, Ordering::Relaxed);
        self.record_latency(latency);
    }

    fn record_latency(&self, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        if let Ok(mut hist) = self.delivery_histogram.write() {
            let _ = hist.record(millis.clamp(1, 60_000));
        }
    }

    /// Get the elapsed time since stats collection started.
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Generate a summary report.
    pub fn summary(&self) -> StatsSummary {
        let delivery_percentiles = self
            .delivery_histogram
            .read()
            .ok()
            .filter(|h| !h.is_empty())
            .map(|h| HistogramPercentiles {
                p50: h.value_at_quantile(0.50),
                p90: h.value_at_quantile(0.90),
                p99: h.value_at_quantile(0.99),
                min: h.min(),
                max: h.max(),
                mean: h.mean(),
            });

        let notifications_by_band = self
            .notifications_by_band
            .read()
            .map(|m| m.clone())
            .unwrap_or_default();

        let notifications_by_mode = self
            .notifications_by_mode
            .read()
            .map(|m| m.clone())
            .unwrap_or_default();

        // Get top 10 callsigns
        let top_callsigns = self
            .top_callsigns
            .read()
            .map(|m| {
                let mut vec: Vec<_> = m.iter().map(|(k, v)| (k.clone(), *v)).collect();
                vec.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
                vec.truncate(10);
                vec
            })
            .unwrap_or_default();

        StatsSummary {
            elapsed_secs: self.elapsed().as_secs_f64(),
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            lines_received: self.lines_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            keepalives_sent: self.keepalives_sent.load(Ordering::Relaxed),
            parse_failures: self.parse_failures.load(Ordering::Relaxed),
            incomplete_spots: self.incomplete_spots.load(Ordering::Relaxed),
            suppressed_spots: self.suppressed_spots.load(Ordering::Relaxed),
            notifications_sent: self.notifications_sent.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
            delivery_percentiles,
            notifications_by_band,
            notifications_by_mode,
            top_callsigns,
        }
    }
}

impl Default for SpotStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Percentile values from a histogram.
#[derive(Debug, Clone, Serialize)]
pub struct HistogramPercentiles {
    pub p50: u64,
    pub p90: u64,
    pub p99: u64,
    pub min: u64,
    pub max: u64,
    pub mean: f64,
}

/// Summary of collected statistics.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSummary {
    pub elapsed_secs: f64,
    pub sessions_started: u64,
    pub lines_received: u64,
    pub bytes_received: u64,
    pub keepalives_sent: u64,
    pub parse_failures: u64,
    pub incomplete_spots: u64,
    pub suppressed_spots: u64,
    pub notifications_sent: u64,
    pub delivery_failures: u64,
    pub delivery_percentiles: Option<HistogramPercentiles>,
    pub notifications_by_band: HashMap<String, u64>,
    pub notifications_by_mode: HashMap<String, u64>,
    pub top_callsigns: Vec<(String, u64)>,
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "═══════════════════════════════════════════════════════")?;
        writeln!(f, "                HAMALERT BRIDGE STATISTICS")?;
        writeln!(f, "═══════════════════════════════════════════════════════")?;
        writeln!(f)?;
        writeln!(f, "Runtime: {:.1}s", self.elapsed_secs)?;
        writeln!(f, "Sessions: {}", self.sessions_started)?;
        writeln!(f, "Lines received: {}", self.lines_received)?;
        writeln!(f, "Bytes received: {} KB", self.bytes_received / 1024)?;
        writeln!(f, "Keepalives sent: {}", self.keepalives_sent)?;
        writeln!(f, "Parse failures: {}", self.parse_failures)?;
        writeln!(f, "Incomplete spots: {}", self.incomplete_spots)?;
        writeln!(f, "Suppressed (de-dup): {}", self.suppressed_spots)?;
        writeln!(f, "Notifications sent: {}", self.notifications_sent)?;
        writeln!(f, "Delivery failures: {}", self.delivery_failures)?;
        writeln!(f)?;

        if let Some(ref p) = self.delivery_percentiles {
            writeln!(f, "Webhook Latency (ms):")?;
            writeln!(f, "  Min: {}, Max: {}, Mean: {:.1}", p.min, p.max, p.mean)?;
            writeln!(f, "  P50: {}, P90: {}, P99: {}", p.p50, p.p90, p.p99)?;
            writeln!(f)?;
        }

        if !self.notifications_by_band.is_empty() {
            writeln!(f, "Notifications by Band:")?;
            let mut bands: Vec<_> = self.notifications_by_band.iter().collect();
            bands.sort_by(|a, b| b.1.cmp(a.1));
            for (band, count) in bands {
                writeln!(f, "  {}: {}", band, count)?;
            }
            writeln!(f)?;
        }

        if !self.notifications_by_mode.is_empty() {
            writeln!(f, "Notifications by Mode:")?;
            let mut modes: Vec<_> = self.notifications_by_mode.iter().collect();
            modes.sort_by(|a, b| b.1.cmp(a.1));
            for (mode, count) in modes {
                writeln!(f, "  {}: {}", mode, count)?;
            }
            writeln!(f)?;
        }

        if !self.top_callsigns.is_empty() {
            writeln!(f, "Top 10 Callsigns:")?;
            for (i, (callsign, count)) in self.top_callsigns.iter().enumerate() {
                writeln!(f, "  {}. {}: {}", i + 1, callsign, count)?;
            }
        }

        Ok(())
    }
}
