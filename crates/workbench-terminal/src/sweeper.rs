use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::registry::SessionRegistry;

/// Run [`SessionRegistry::sweep`] on the configured interval until `cancel`
/// fires. The first sweep happens one interval after start.
pub fn spawn_sweeper(registry: SessionRegistry, cancel: CancellationToken) -> JoinHandle<()> {
    let period = registry.config().sweep_interval;

    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(?period, "session sweeper started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let evicted = registry.sweep().await;
                    if evicted > 0 {
                        info!(evicted, "idle sweep finished");
                    }
                }
            }
        }

        debug!("session sweeper stopped");
    })
}
