//! Migration pipeline orchestrator.
//!
//! Creates and connects all stages: Enumerate → Throttle → Read → Write →
//! Remove. Stages are joined by bounded async channels; read, write and
//! remove are pools of workers sharing one input channel (MPMC), so a full
//! channel backpressures everything upstream of it.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use async_channel::{Receiver, Sender};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::enumerator::ObjectEnumerator;
use crate::metrics::MetricsService;
use crate::reader::ObjectReader;
use crate::remover::ObjectRemover;
use crate::stage::{Instrumentation, Stage};
use crate::storage::Storage;
use crate::throttle::Throttle;
use crate::types::error::{S3mvError, is_cancelled_error};
use crate::types::token::PipelineCancellationToken;
use crate::types::{DiscoveredKey, MigrationStats, PendingDelete, PendingWrite};
use crate::writer::ObjectWriter;

/// The core migration pipeline.
///
/// ## Pipeline stages
///
/// ```text
/// ObjectEnumerator → Throttle → ObjectReader (N) → ObjectWriter (N) → ObjectRemover (N)
/// ```
///
/// ## Failure handling
///
/// Every failure a worker reports is classified by the
/// [supervisor](crate::supervisor). Resumable failures are logged, counted
/// and flagged as warnings. Any other failure is recorded, the cancellation
/// token is triggered so that no new objects are admitted, the objects
/// already read are written and deleted, and [`run`](Self::run) returns the
/// first recorded error.
///
/// ## Usage
///
/// ```no_run
/// # async fn example() -> anyhow::Result<()> {
/// use std::sync::Arc;
/// use s3mv_rs::{Config, MigrationPipeline, create_pipeline_cancellation_token};
/// use s3mv_rs::metrics::InMemoryMetricsService;
/// use s3mv_rs::storage::create_storage_pair;
///
/// let config = Config::for_roots("s3://source/incoming/", "s3://target/archive/")?;
/// let (source, target) = create_storage_pair(&config).await?;
/// let cancellation_token = create_pipeline_cancellation_token();
///
/// let mut pipeline = MigrationPipeline::new(
///     config,
///     source,
///     target,
///     Arc::new(InMemoryMetricsService::new()),
///     cancellation_token.clone(),
/// )?;
/// pipeline.run().await?;
/// println!("{:?}", pipeline.get_stats());
/// # Ok(())
/// # }
/// ```
pub struct MigrationPipeline {
    config: Config,
    source: Storage,
    target: Storage,
    cancellation_token: PipelineCancellationToken,
    instrumentation: Instrumentation,
    has_error: Arc<AtomicBool>,
    has_panic: Arc<AtomicBool>,
    has_warning: Arc<AtomicBool>,
    errors: Arc<Mutex<VecDeque<anyhow::Error>>>,
    error_messages: Vec<String>,
    ready: bool,
}

impl MigrationPipeline {
    /// Create a new MigrationPipeline.
    ///
    /// Validates the configuration and builds the metric tag sets of both
    /// roots. Nothing is spawned until [`run`](Self::run).
    pub fn new(
        config: Config,
        source: Storage,
        target: Storage,
        metrics: Arc<dyn MetricsService>,
        cancellation_token: PipelineCancellationToken,
    ) -> Result<Self, S3mvError> {
        config.validate()?;

        let instrumentation = Instrumentation::new(&config, metrics);

        Ok(Self {
            config,
            source,
            target,
            cancellation_token,
            instrumentation,
            has_error: Arc::new(AtomicBool::new(false)),
            has_panic: Arc::new(AtomicBool::new(false)),
            has_warning: Arc::new(AtomicBool::new(false)),
            errors: Arc::new(Mutex::new(VecDeque::new())),
            error_messages: Vec::new(),
            ready: true,
        })
    }

    /// Run the migration until discovery stops and every admitted object has
    /// been processed.
    ///
    /// Resolves `Ok(())` when the run drained without a terminal failure
    /// (including after an external cancellation), or with the first
    /// terminal error otherwise. A pipeline runs at most once.
    pub async fn run(&mut self) -> Result<()> {
        if !self.ready {
            return Err(anyhow!(S3mvError::Pipeline(
                "MigrationPipeline::run() called more than once".to_string()
            )));
        }
        self.ready = false;

        info!(
            source = %self.config.source,
            target = %self.config.target,
            run_once = self.config.run_once,
            "migration pipeline has started."
        );

        let mut handles = Vec::new();

        let discovered_keys = self.enumerate(&mut handles);
        let admitted_keys = self.throttle(discovered_keys, &mut handles);
        let read_objects = self.read_objects(admitted_keys, &mut handles);
        let written_objects = self.write_objects(read_objects, &mut handles);
        self.remove_objects(written_objects, &mut handles);

        for handle in handles {
            if let Err(e) = handle.await {
                self.has_panic.store(true, Ordering::SeqCst);
                error!("stage supervisor task panicked: {}", e);
                self.record_error(anyhow!("stage supervisor task panicked: {}", e));
            }
        }

        // Promote warnings to errors if configured (checked once after all workers complete)
        if self.config.warn_as_error && self.has_warning() {
            let failed_objects = self.get_stats().failed_objects;
            self.record_error(anyhow!(S3mvError::WarningsPromoted(failed_objects)));
        }

        let stats = self.get_stats();
        info!(
            listed = stats.listed_objects,
            migrated = stats.migrated_objects,
            migrated_bytes = stats.migrated_bytes,
            deleted = stats.deleted_objects,
            skipped = stats.skipped_objects,
            failed = stats.failed_objects,
            "migration pipeline has finished."
        );

        let mut errors = self.errors.lock().unwrap_or_else(|e| e.into_inner());
        self.error_messages = errors.iter().map(|e| format!("{e:#}")).collect();
        match errors.pop_front() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Check if any terminal error occurred during the run.
    pub fn has_error(&self) -> bool {
        self.has_error.load(Ordering::SeqCst)
    }

    /// Check if any spawned task panicked during the run.
    pub fn has_panic(&self) -> bool {
        self.has_panic.load(Ordering::SeqCst)
    }

    /// Check if any object was skipped because of a resumable failure.
    pub fn has_warning(&self) -> bool {
        self.has_warning.load(Ordering::SeqCst)
    }

    /// Messages of every terminal error, in the order they were recorded.
    ///
    /// Returns `None` if no errors occurred.
    pub fn get_error_messages(&self) -> Option<Vec<String>> {
        if !self.has_error() {
            return None;
        }
        Some(self.error_messages.clone())
    }

    /// Get a snapshot of the current run counters.
    pub fn get_stats(&self) -> MigrationStats {
        self.instrumentation.stats.snapshot()
    }

    pub fn cancellation_token(&self) -> &PipelineCancellationToken {
        &self.cancellation_token
    }

    // -----------------------------------------------------------------------
    // Internal methods
    // -----------------------------------------------------------------------

    fn record_error(&self, error: anyhow::Error) {
        self.has_error.store(true, Ordering::SeqCst);
        self.errors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(error);
    }

    fn create_stage<I, O>(
        &self,
        receiver: Option<Receiver<I>>,
        sender: Option<Sender<O>>,
    ) -> Stage<I, O> {
        Stage::new(
            self.config.clone(),
            dyn_clone::clone_box(&*self.source),
            dyn_clone::clone_box(&*self.target),
            receiver,
            sender,
            self.cancellation_token.clone(),
            self.has_warning.clone(),
            self.instrumentation.clone(),
        )
    }

    fn create_channel<T>(&self) -> (Sender<T>, Receiver<T>) {
        async_channel::bounded::<T>(self.config.stage_queue_size as usize)
    }

    /// Spawn a worker with error handling.
    ///
    /// The worker runs in its own task so that a panic is caught by the
    /// supervising task. Any error or panic is recorded and cancels the run.
    fn spawn_worker<F>(&self, stage_name: &'static str, worker_index: u16, worker: F) -> JoinHandle<()>
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let has_error = self.has_error.clone();
        let has_panic = self.has_panic.clone();
        let error_list = self.errors.clone();
        let cancellation_token = self.cancellation_token.clone();

        tokio::spawn(async move {
            let join_result = tokio::spawn(worker).await;

            match join_result {
                Ok(Ok(())) => {
                    debug!(stage = stage_name, worker_index, "worker completed successfully.");
                }
                Ok(Err(e)) => {
                    if is_cancelled_error(&e) {
                        info!(stage = stage_name, worker_index, "worker cancelled.");
                    } else {
                        cancellation_token.cancel();
                        has_error.store(true, Ordering::SeqCst);
                        error!(
                            stage = stage_name,
                            worker_index,
                            error = format!("{e:#}"),
                            "worker failed."
                        );
                        error_list
                            .lock()
                            .unwrap_or_else(|e| e.into_inner())
                            .push_back(e);
                    }
                }
                Err(e) => {
                    cancellation_token.cancel();
                    has_error.store(true, Ordering::SeqCst);
                    has_panic.store(true, Ordering::SeqCst);
                    error!(stage = stage_name, worker_index, "worker task panicked: {}", e);
                    error_list
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .push_back(anyhow!("{} worker panicked: {}", stage_name, e));
                }
            }
        })
    }

    fn enumerate(&self, handles: &mut Vec<JoinHandle<()>>) -> Receiver<DiscoveredKey> {
        let (sender, next_stage_receiver) = self.create_channel();
        let enumerator = ObjectEnumerator::new(self.create_stage(None::<Receiver<()>>, Some(sender)));

        handles.push(self.spawn_worker("enumerator", 0, async move {
            enumerator.enumerate().await
        }));

        next_stage_receiver
    }

    fn throttle(
        &self,
        discovered_keys: Receiver<DiscoveredKey>,
        handles: &mut Vec<JoinHandle<()>>,
    ) -> Receiver<DiscoveredKey> {
        let (sender, next_stage_receiver) = self.create_channel();
        let throttle = Throttle::new(self.create_stage(Some(discovered_keys), Some(sender)));

        handles.push(self.spawn_worker("throttle", 0, async move { throttle.throttle().await }));

        next_stage_receiver
    }

    fn read_objects(
        &self,
        admitted_keys: Receiver<DiscoveredKey>,
        handles: &mut Vec<JoinHandle<()>>,
    ) -> Receiver<PendingWrite> {
        let (sender, next_stage_receiver) = self.create_channel();

        for worker_index in 0..self.config.read_parallelism {
            let stage = self.create_stage(Some(admitted_keys.clone()), Some(sender.clone()));
            let reader = ObjectReader::new(stage, worker_index);
            handles.push(self.spawn_worker("reader", worker_index, async move {
                reader.read().await
            }));
        }

        next_stage_receiver
    }

    fn write_objects(
        &self,
        read_objects: Receiver<PendingWrite>,
        handles: &mut Vec<JoinHandle<()>>,
    ) -> Receiver<PendingDelete> {
        let (sender, next_stage_receiver) = self.create_channel();

        for worker_index in 0..self.config.write_parallelism {
            let stage = self.create_stage(Some(read_objects.clone()), Some(sender.clone()));
            let writer = ObjectWriter::new(stage, worker_index);
            handles.push(self.spawn_worker("writer", worker_index, async move {
                writer.write().await
            }));
        }

        next_stage_receiver
    }

    fn remove_objects(
        &self,
        written_objects: Receiver<PendingDelete>,
        handles: &mut Vec<JoinHandle<()>>,
    ) {
        for worker_index in 0..self.config.delete_parallelism {
            let stage = self.create_stage(Some(written_objects.clone()), None::<Sender<()>>);
            let remover = ObjectRemover::new(stage, worker_index);
            handles.push(self.spawn_worker("remover", worker_index, async move {
                remover.remove().await
            }));
        }
    }
}
