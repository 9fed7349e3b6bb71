mod metric;
mod runner;

pub use metric::http_server;
pub use metric::{ReplicationGauge, ReplicationMetrics};
pub use runner::{fetch_status, normalize_targets, Poller, TickReport};

use tokio::sync::watch;

/// Resolves once shutdown has been requested on `shutdown`.
///
/// A closed channel never resolves: with no sender left nobody can ask for shutdown.
pub async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
