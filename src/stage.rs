use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Result, anyhow};
use async_channel::{Receiver, Sender};
use tracing::warn;

use crate::config::Config;
use crate::metrics::{MetricsService, MetricsTagSet};
use crate::storage::Storage;
use crate::supervisor::{Directive, classify};
use crate::types::MigrationStatsReport;
use crate::types::error::S3mvError;
use crate::types::token::PipelineCancellationToken;

/// Result of sending an element to the next stage.
#[derive(Debug, Clone, PartialEq)]
pub enum SendResult {
    Success,
    Closed,
}

/// Metrics sink, precomputed tag sets and run counters shared by all stages.
#[derive(Clone)]
pub struct Instrumentation {
    pub metrics: Arc<dyn MetricsService>,
    pub source_tags: MetricsTagSet,
    pub target_tags: MetricsTagSet,
    pub stats: Arc<MigrationStatsReport>,
}

impl Instrumentation {
    pub fn new(config: &Config, metrics: Arc<dyn MetricsService>) -> Self {
        Self {
            metrics,
            source_tags: MetricsTagSet::for_root(
                &config.source,
                &config.stream_kind,
                &config.stream_id,
            ),
            target_tags: MetricsTagSet::for_root(
                &config.target,
                &config.stream_kind,
                &config.stream_id,
            ),
            stats: Arc::new(MigrationStatsReport::new()),
        }
    }
}

/// Shared context handed to each stage worker.
///
/// - Channels connect stages: a worker reads from `receiver` and writes to
///   `sender`.
/// - The enumerator has no `receiver`; the remover has no `sender`.
/// - Workers of the same pool hold clones of the same channel ends, so a
///   channel closes once every worker upstream of it has finished.
pub struct Stage<I, O> {
    pub config: Config,
    pub source: Storage,
    pub target: Storage,
    pub receiver: Option<Receiver<I>>,
    pub sender: Option<Sender<O>>,
    pub cancellation_token: PipelineCancellationToken,
    pub has_warning: Arc<AtomicBool>,
    pub instrumentation: Instrumentation,
}

impl<I, O> Stage<I, O> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        source: Storage,
        target: Storage,
        receiver: Option<Receiver<I>>,
        sender: Option<Sender<O>>,
        cancellation_token: PipelineCancellationToken,
        has_warning: Arc<AtomicBool>,
        instrumentation: Instrumentation,
    ) -> Self {
        Self {
            config,
            source,
            target,
            receiver,
            sender,
            cancellation_token,
            has_warning,
            instrumentation,
        }
    }

    /// Receive the next element, or `None` once the upstream channel is
    /// closed and drained.
    pub async fn recv(&self) -> Result<Option<I>> {
        let receiver = self
            .receiver
            .as_ref()
            .ok_or_else(|| anyhow!(S3mvError::Pipeline("stage has no receiver".to_string())))?;

        Ok(receiver.recv().await.ok())
    }

    /// Like [`Stage::recv`], but gives up as soon as the run is cancelled.
    ///
    /// Cancellation wins when both are ready.
    pub async fn recv_unless_cancelled(&self) -> Result<Option<I>> {
        tokio::select! {
            biased;
            _ = self.cancellation_token.cancelled() => Ok(None),
            element = self.recv() => element,
        }
    }

    /// Send an element to the next stage.
    ///
    /// Returns `SendResult::Closed` if every downstream worker has gone away,
    /// allowing the caller to exit gracefully.
    pub async fn send(&self, element: O) -> Result<SendResult> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| anyhow!(S3mvError::Pipeline("stage has no sender".to_string())))?;

        let result = sender
            .send(element)
            .await
            .map_err(|_| anyhow!("async_channel::Sender::send() failed."));

        if let Err(e) = result {
            return if !sender.is_closed() {
                Err(e)
            } else {
                Ok(SendResult::Closed)
            };
        }

        Ok(SendResult::Success)
    }

    /// Route a failure through the supervisor.
    ///
    /// Returns `Ok(())` when the element can be dropped and the worker should
    /// continue, or the error itself when the run must stop.
    pub fn supervise(&self, e: anyhow::Error) -> Result<()> {
        self.instrumentation.stats.increment_failed();

        match classify(&e) {
            Directive::Resume => {
                warn!(error = format!("{e:#}"), "object skipped.");
                self.set_warning();
                Ok(())
            }
            Directive::Stop => Err(e),
        }
    }

    /// Set the warning flag to indicate a non-fatal issue occurred.
    pub fn set_warning(&self) {
        self.has_warning.store(true, Ordering::SeqCst);
    }

    pub fn metrics(&self) -> &dyn MetricsService {
        self.instrumentation.metrics.as_ref()
    }

    pub fn stats(&self) -> &MigrationStatsReport {
        &self.instrumentation.stats
    }
}
