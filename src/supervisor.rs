//! Reconnect loop around [`Session`].
//!
//! The supervisor owns the de-dup ledger for the life of the process and
//! starts a fresh session after every disconnect, waiting a fixed delay in
//! between. It only stops when the shutdown signal fires.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info};

use crate::dedup::DedupLedger;
use crate::notifier::Notifier;
use crate::session::{Session, SessionConfig, SessionError};
use crate::stats::SpotStats;

/// Default delay before reconnecting.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(10);

/// Resolve once `shutdown` reads `true`. A dropped sender never resolves.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn log_session_end(result: &Result<(), SessionError>) {
    match result {
        Ok(()) => info!("Session ended"),
        Err(e) if e.is_connection_refused() => {
            error!("Telnet connection refused. Is the server reachable?");
        }
        Err(e) => error!("Session error: {}", e),
    }
}

/// Runs sessions forever, one at a time.
pub struct Supervisor {
    session_config: SessionConfig,
    reconnect_delay: Duration,
    ledger: DedupLedger,
    notifier: Notifier,
    stats: Arc<SpotStats>,
}

impl Supervisor {
    pub fn new(
        session_config: SessionConfig,
        reconnect_delay: Duration,
        ledger: DedupLedger,
        notifier: Notifier,
        stats: Arc<SpotStats>,
    ) -> Self {
        Self {
            session_config,
            reconnect_delay,
            ledger,
            notifier,
            stats,
        }
    }

    /// The ledger shared by every session this supervisor has run.
    pub fn ledger(&self) -> &DedupLedger {
        &self.ledger
    }

    /// Run sessions until `shutdown` becomes `true`.
    ///
    /// Shutdown drops the active session, which closes its socket.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            self.stats.record_session();
            let mut session = Session::new(self.session_config.clone());

            tokio::select! {
                result = session.run(&mut self.ledger, &self.notifier, &self.stats) => {
                    log_session_end(&result);
                }
                _ = shutdown_requested(&mut shutdown) => {
                    info!("Shutdown requested; closing session");
                    break;
                }
            }

            info!(
                "Reconnecting in {} seconds...",
                self.reconnect_delay.as_secs()
            );
            tokio::select! {
                _ = tokio::time::sleep(self.reconnect_delay) => {}
                _ = shutdown_requested(&mut shutdown) => break,
            }
        }

        info!("Supervisor stopped");
    }
}
