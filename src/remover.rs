use anyhow::{Result, anyhow};
use tracing::{debug, error, trace};

use crate::metrics::OBJECTS_DELETED;
use crate::stage::Stage;
use crate::types::PendingDelete;
use crate::types::error::S3mvError;

/// Terminal sink: deletes source objects whose copy has been written.
///
/// A delete that fails or that the store refuses stops the run. Remover
/// workers drain their input channel even after cancellation.
pub struct ObjectRemover {
    worker_index: u16,
    stage: Stage<PendingDelete, ()>,
}

impl ObjectRemover {
    pub fn new(stage: Stage<PendingDelete, ()>, worker_index: u16) -> Self {
        Self {
            worker_index,
            stage,
        }
    }

    pub async fn remove(&self) -> Result<()> {
        debug!(worker_index = self.worker_index, "remover worker has started.");

        while let Some(pending_delete) = self.stage.recv().await? {
            self.remove_object(pending_delete).await?;
        }

        debug!(worker_index = self.worker_index, "remover worker has been completed.");
        Ok(())
    }

    async fn remove_object(&self, pending_delete: PendingDelete) -> Result<()> {
        let path = pending_delete.source_path();

        match self.stage.source.delete_object(&path).await {
            Ok(true) => {
                self.stage
                    .metrics()
                    .increment(OBJECTS_DELETED, &self.stage.instrumentation.source_tags);
                self.stage.stats().increment_deleted();
                trace!(worker_index = self.worker_index, path = %path, "source object deleted.");
                Ok(())
            }
            Ok(false) => {
                error!(
                    worker_index = self.worker_index,
                    path = %path,
                    "source object could not be removed."
                );
                self.stage.supervise(anyhow!(S3mvError::Sink(format!(
                    "Failed to remove blob {path}"
                ))))
            }
            Err(e) => {
                error!(
                    worker_index = self.worker_index,
                    path = %path,
                    error = format!("{e:#}"),
                    "failed to delete source object."
                );
                self.stage.supervise(e.context(S3mvError::Sink(format!(
                    "Failed to remove blob {path}"
                ))))
            }
        }
    }
}
