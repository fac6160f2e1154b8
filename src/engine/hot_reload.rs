//! Time-driven polling reload for tracked files.
//!
//! Every tick re-issues a load for each tracked path. Completions route
//! through the engine's sequence guard, so a slow fetch from an earlier
//! tick can never overwrite a fresher result — it is discarded, not
//! aborted.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::warn;

use super::{fetch_artifact, Engine};

/// Spawn the hot-reload poller. The returned handle can be aborted to stop
/// polling; the engine itself needs no teardown.
pub fn enable_hot_reload(engine: Arc<Mutex<Engine>>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            // Issue sequence numbers under the lock, fetch outside it.
            let pending: Vec<(String, u64)> = {
                let mut engine = match engine.lock() {
                    Ok(guard) => guard,
                    Err(_) => return,
                };
                engine
                    .tracked_paths()
                    .into_iter()
                    .map(|path| {
                        let seq = engine.begin_load(&path);
                        (path, seq)
                    })
                    .collect()
            };

            for (path, seq) in pending {
                match fetch_artifact(&path).await {
                    Ok(artifact) => {
                        if let Ok(mut engine) = engine.lock() {
                            engine.complete_load(&path, seq, artifact);
                        }
                    }
                    Err(e) => {
                        warn!(path = %path, error = %e, "hot reload fetch failed");
                    }
                }
            }
        }
    })
}
