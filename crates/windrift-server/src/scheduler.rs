use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use windrift_engine::encounter::Notifier;
use windrift_engine::engine::Engine;
use windrift_engine::habitability::HabitabilityOracle;
use windrift_engine::wind::WindSource;

/// Background task that runs the drift engine on an interval.
///
/// Each run is bounded by `deadline`; a tick that blows through it is
/// abandoned, which is safe — note mutation is per-note, so a partial tick
/// leaves the store valid and the next tick picks up from there.
pub async fn run_tick_loop<W, H, N>(engine: Arc<Engine<W, H, N>>, interval_secs: u64, deadline: Duration)
where
    W: WindSource,
    H: HabitabilityOracle,
    N: Notifier,
{
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        match tokio::time::timeout(deadline, engine.tick()).await {
            Ok(Ok(summary)) => {
                if summary.processed > 0 {
                    info!(
                        "Tick: {} processed, {} updated, {} dissolved",
                        summary.processed, summary.updated, summary.dissolved
                    );
                }
            }
            Ok(Err(e)) => {
                warn!("Tick error: {}", e);
            }
            Err(_) => {
                warn!("Tick exceeded {:?} deadline, abandoned", deadline);
            }
        }
    }
}
