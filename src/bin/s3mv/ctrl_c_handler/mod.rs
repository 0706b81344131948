// Turns Ctrl+C into pipeline cancellation. Discovery stops, objects already
// read are still written and removed from the source.

use s3mv_rs::PipelineCancellationToken;
use tokio::task::JoinHandle;
use tokio::{select, signal};
use tracing::{debug, error, warn};

pub fn spawn_ctrl_c_handler(cancellation_token: PipelineCancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        select! {
            _ = cancellation_token.cancelled() => {
                debug!("pipeline finished, ctrl-c handler exits.");
            }
            signal = signal::ctrl_c() => {
                if let Err(e) = signal {
                    error!(error = e.to_string(), "failed to listen for ctrl-c.");
                    cancellation_token.cancelled().await;
                    return;
                }
                warn!("ctrl-c received, finishing objects in flight.");
                cancellation_token.cancel();
            }
        }
    })
}
