//! HamAlert Bridge CLI - forward HamAlert spots to a Discord webhook.

use anyhow::{Context, Result};
use clap::Parser;
use hamalert_bridge::{
    config::Config, dedup::DedupLedger, metrics::start_metrics_server, notifier::Notifier,
    stats::SpotStats, supervisor::Supervisor,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// HamAlert Bridge - post HamAlert spots to a Discord webhook, de-duplicated per band and mode
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (default: ~/.config/hamalert-bridge/config.toml)
    #[arg(long, env = "HAMALERT_CONFIG")]
    config: Option<PathBuf>,

    /// HamAlert username
    #[arg(short, long, env = "HAMALERT_USERNAME")]
    username: Option<String>,

    /// HamAlert telnet password
    #[arg(long, env = "HAMALERT_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Webhook URL notifications are posted to
    #[arg(long, env = "DISCORD_WEBHOOK_URL", hide_env_values = true)]
    webhook_url: Option<String>,

    /// HamAlert server hostname
    #[arg(long, env = "HAMALERT_HOST")]
    host: Option<String>,

    /// HamAlert server port
    #[arg(long, env = "HAMALERT_PORT")]
    port: Option<u16>,

    /// Don't re-post the same (callsign, band, mode) within this many seconds
    #[arg(long, env = "DEDUP_WINDOW_SECONDS")]
    dedup_window: Option<u64>,

    /// Log notifications instead of posting them
    #[arg(long, env = "DRY_RUN")]
    dry_run: bool,

    /// Seconds to wait before reconnecting after a disconnect
    #[arg(long, env = "RECONNECT_DELAY")]
    reconnect_delay: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Serve Prometheus metrics
    #[arg(long)]
    metrics: bool,

    /// Port for the metrics endpoint
    #[arg(long)]
    metrics_port: Option<u16>,

    /// Print statistics every N seconds (0 = only on exit)
    #[arg(short, long, default_value_t = 0)]
    stats_interval: u64,
}

impl Args {
    /// Override file settings with anything given on the command line or in the environment.
    fn apply(&self, config: &mut Config) {
        if let Some(ref username) = self.username {
            config.username = username.clone();
        }
        if let Some(ref password) = self.password {
            config.password = password.clone();
        }
        if let Some(ref webhook_url) = self.webhook_url {
            config.webhook_url = webhook_url.clone();
        }
        if let Some(ref host) = self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(window) = self.dedup_window {
            config.dedup_window = window;
        }
        if let Some(delay) = self.reconnect_delay {
            config.reconnect_delay = delay;
        }
        if let Some(port) = self.metrics_port {
            config.metrics_port = port;
        }
        config.dry_run |= self.dry_run;
        config.metrics_enabled |= self.metrics;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let mut config = match args.config {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    args.apply(&mut config);
    config.validate()?;

    let missing = config.placeholder_fields();
    if !missing.is_empty() {
        warn!("Missing/placeholder config for: {}", missing.join(", "));
    }

    info!("HamAlert bridge starting...");
    info!("Server: {}:{}", config.host, config.port);
    info!("De-dup window: {}s", config.dedup_window);
    if config.dry_run {
        info!("Dry run: notifications will be logged, not posted");
    }

    // Create shared statistics
    let stats = Arc::new(SpotStats::new());

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Handle Ctrl+C
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => error!("Failed to install Ctrl+C handler: {}", e),
        }
    });

    if config.metrics_enabled {
        let stats_clone = Arc::clone(&stats);
        let port = config.metrics_port;
        tokio::spawn(async move {
            if let Err(e) = start_metrics_server(port, stats_clone).await {
                error!("Metrics server failed: {}", e);
            }
        });
    }

    if args.stats_interval > 0 {
        let stats_clone = Arc::clone(&stats);
        let stats_interval = args.stats_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(stats_interval));
            // The first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                println!("\n{}", stats_clone.summary());
            }
        });
    }

    let notifier =
        Notifier::new(config.notifier_config()).context("Failed to build webhook client")?;
    let ledger = DedupLedger::new(config.dedup_window());

    let mut supervisor = Supervisor::new(
        config.session_config(),
        config.reconnect_delay(),
        ledger,
        notifier,
        Arc::clone(&stats),
    );
    supervisor.run(shutdown_rx).await;

    // Print final statistics
    println!("\n\nFINAL STATISTICS");
    println!("{}", stats.summary());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_flags_override_config() {
        let args = parse(&[
            "hamalert-bridge",
            "--username",
            "W1AW",
            "--port",
            "7301",
            "--dedup-window",
            "60",
            "--dry-run",
        ]);
        let mut config = Config::default();
        args.apply(&mut config);

        assert_eq!(config.username, "W1AW");
        assert_eq!(config.port, 7301);
        assert_eq!(config.dedup_window, 60);
        assert!(config.dry_run);
    }

    #[test]
    fn test_absent_flags_keep_file_values() {
        let args = parse(&["hamalert-bridge", "--log-level", "debug"]);
        let mut config = Config {
            host: "file.example.net".to_string(),
            reconnect_delay: 42,
            ..Default::default()
        };
        args.apply(&mut config);

        assert_eq!(args.log_level, "debug");
        assert_eq!(config.host, "file.example.net");
        assert_eq!(config.reconnect_delay, 42);
    }
}
