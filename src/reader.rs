use anyhow::{Result, anyhow};
use tracing::{debug, info, trace, warn};

use crate::config::EmptyReadPolicy;
use crate::metrics::OBJECTS_INCOMING;
use crate::stage::{SendResult, Stage};
use crate::types::error::S3mvError;
use crate::types::{DiscoveredKey, PendingWrite};

/// Fetches the content of admitted keys from the source.
///
/// Several workers share one input channel. A worker stops taking new keys
/// once the run is cancelled; a read already in flight completes and is
/// handed to the writer.
pub struct ObjectReader {
    worker_index: u16,
    stage: Stage<DiscoveredKey, PendingWrite>,
}

impl ObjectReader {
    pub fn new(stage: Stage<DiscoveredKey, PendingWrite>, worker_index: u16) -> Self {
        Self {
            worker_index,
            stage,
        }
    }

    pub async fn read(&self) -> Result<()> {
        debug!(worker_index = self.worker_index, "reader worker has started.");

        while let Some(key) = self.stage.recv_unless_cancelled().await? {
            self.stage
                .metrics()
                .increment(OBJECTS_INCOMING, &self.stage.instrumentation.source_tags);

            let Some(pending_write) = self.read_object(key).await? else {
                continue;
            };

            if self.stage.send(pending_write).await? == SendResult::Closed {
                debug!(
                    worker_index = self.worker_index,
                    "downstream closed, reader worker stops."
                );
                return Ok(());
            }
        }

        if self.stage.cancellation_token.is_cancelled() {
            info!(worker_index = self.worker_index, "reader worker cancelled.");
        }
        debug!(worker_index = self.worker_index, "reader worker has been completed.");
        Ok(())
    }

    async fn read_object(&self, key: DiscoveredKey) -> Result<Option<PendingWrite>> {
        let source_root = &self.stage.config.source;
        let path = source_root.join(&key);

        let content = match self.stage.source.get_object(&path).await {
            Ok(content) => content,
            Err(e) => {
                let e = e.context(format!("failed to read {path}"));
                self.stage.supervise(e)?;
                return Ok(None);
            }
        };

        match content {
            Some(content) => {
                trace!(
                    worker_index = self.worker_index,
                    key = %key,
                    size = content.len(),
                    "object read."
                );
                Ok(Some(PendingWrite {
                    source_root: source_root.clone(),
                    key,
                    content,
                }))
            }
            None => match self.stage.config.empty_read_policy {
                EmptyReadPolicy::Skip => {
                    warn!(
                        worker_index = self.worker_index,
                        path = %path,
                        "object disappeared before it was read, skipping."
                    );
                    self.stage.stats().increment_skipped();
                    Ok(None)
                }
                EmptyReadPolicy::Fail => {
                    let e = anyhow!(S3mvError::Processing {
                        path: path.to_string(),
                        key,
                    });
                    self.stage.supervise(e)?;
                    Ok(None)
                }
            },
        }
    }
}
