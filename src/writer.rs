use anyhow::Result;
use tracing::{debug, error, trace};

use crate::metrics::{OBJECTS_OUTGOING, OBJECTS_SIZE};
use crate::stage::{SendResult, Stage};
use crate::types::error::S3mvError;
use crate::types::{PendingDelete, PendingWrite, StoragePath};

/// Location under `target_root` that a source key is written to.
///
/// A key that already carries the target prefix is not prefixed twice, so
/// the mapping is idempotent.
pub fn target_path_for(target_root: &StoragePath, key: &str) -> StoragePath {
    target_root.join(target_root.relative_key(key))
}

/// Writes read content to the target and forwards the source object for
/// deletion.
///
/// Writer workers drain their input channel even after cancellation, so
/// every object that has been read is written. A failed write stops the run
/// and its source object is never deleted.
pub struct ObjectWriter {
    worker_index: u16,
    stage: Stage<PendingWrite, PendingDelete>,
}

impl ObjectWriter {
    pub fn new(stage: Stage<PendingWrite, PendingDelete>, worker_index: u16) -> Self {
        Self {
            worker_index,
            stage,
        }
    }

    pub async fn write(&self) -> Result<()> {
        debug!(worker_index = self.worker_index, "writer worker has started.");

        while let Some(pending_write) = self.stage.recv().await? {
            let Some(pending_delete) = self.write_object(pending_write).await? else {
                continue;
            };

            if self.stage.send(pending_delete).await? == SendResult::Closed {
                debug!(
                    worker_index = self.worker_index,
                    "downstream closed, writer worker stops."
                );
                return Ok(());
            }
        }

        debug!(worker_index = self.worker_index, "writer worker has been completed.");
        Ok(())
    }

    async fn write_object(&self, pending_write: PendingWrite) -> Result<Option<PendingDelete>> {
        let PendingWrite {
            source_root,
            key,
            content,
        } = pending_write;

        let target_path = target_path_for(&self.stage.config.target, &key);
        let size = content.len() as u64;

        if let Err(e) = self.stage.target.put_object(&target_path, content, true).await {
            error!(
                worker_index = self.worker_index,
                source = %source_root.join(&key),
                target = %target_path,
                error = format!("{e:#}"),
                "failed to write object."
            );
            self.stage.supervise(e.context(S3mvError::Sink(format!(
                "Failed to write blob {target_path}"
            ))))?;
            return Ok(None);
        }

        let instrumentation = &self.stage.instrumentation;
        self.stage
            .metrics()
            .increment(OBJECTS_OUTGOING, &instrumentation.target_tags);
        self.stage
            .metrics()
            .count(OBJECTS_SIZE, size, &instrumentation.source_tags);
        self.stage.stats().increment_migrated(size);

        trace!(
            worker_index = self.worker_index,
            target = %target_path,
            size = size,
            "object written."
        );

        Ok(Some(PendingDelete { source_root, key }))
    }
}
