//! Shared test infrastructure for s3mv-rs integration tests.
//!
//! `MemoryStore` is an in-process blob store implementing the public
//! `StorageTrait`, so whole pipelines can be run without S3. Source and
//! target may share one store; buckets keep them apart.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use bytes::Bytes;
use s3mv_rs::config::Config;
use s3mv_rs::metrics::InMemoryMetricsService;
use s3mv_rs::storage::StorageTrait;
use s3mv_rs::{
    MigrationPipeline, MigrationStats, PipelineCancellationToken, StoragePath,
    create_pipeline_cancellation_token,
};

#[cfg(e2e_test)]
pub mod e2e;

/// A call the store received.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Write { path: StoragePath, overwrite: bool },
    Delete(StoragePath),
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    objects: Arc<Mutex<BTreeMap<StoragePath, Bytes>>>,
    calls: Arc<Mutex<Vec<Call>>>,
    refused_deletes: Arc<Mutex<HashSet<StoragePath>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, uri: &str, content: &[u8]) {
        let path = StoragePath::parse(uri).unwrap();
        self.objects
            .lock()
            .unwrap()
            .insert(path, Bytes::copy_from_slice(content));
    }

    pub fn content(&self, uri: &str) -> Option<Bytes> {
        let path = StoragePath::parse(uri).unwrap();
        self.objects.lock().unwrap().get(&path).cloned()
    }

    pub fn uris(&self) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .keys()
            .map(ToString::to_string)
            .collect()
    }

    pub fn refuse_delete(&self, uri: &str) {
        self.refused_deletes
            .lock()
            .unwrap()
            .insert(StoragePath::parse(uri).unwrap());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn writes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Write { path, .. } => Some(path.to_string()),
                Call::Delete(_) => None,
            })
            .collect()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Delete(path) => Some(path.to_string()),
                Call::Write { .. } => None,
            })
            .collect()
    }
}

#[async_trait]
impl StorageTrait for MemoryStore {
    async fn list_objects(&self, root: &StoragePath) -> Result<Vec<String>> {
        let prefix = root.prefix();
        Ok(self
            .objects
            .lock()
            .unwrap()
            .keys()
            .filter(|path| path.bucket() == root.bucket() && path.key().starts_with(&prefix))
            .map(|path| path.key().to_string())
            .collect())
    }

    async fn get_object(&self, path: &StoragePath) -> Result<Option<Bytes>> {
        Ok(self.objects.lock().unwrap().get(path).cloned())
    }

    async fn put_object(&self, path: &StoragePath, content: Bytes, overwrite: bool) -> Result<()> {
        let mut objects = self.objects.lock().unwrap();
        if !overwrite && objects.contains_key(path) {
            return Err(anyhow!("{path} already exists"));
        }
        objects.insert(path.clone(), content);
        drop(objects);

        self.calls.lock().unwrap().push(Call::Write {
            path: path.clone(),
            overwrite,
        });
        Ok(())
    }

    async fn delete_object(&self, path: &StoragePath) -> Result<bool> {
        self.calls.lock().unwrap().push(Call::Delete(path.clone()));
        if self.refused_deletes.lock().unwrap().contains(path) {
            return Ok(false);
        }
        Ok(self.objects.lock().unwrap().remove(path).is_some())
    }
}

/// Outcome of one pipeline run.
#[derive(Debug)]
pub struct PipelineResult {
    pub stats: MigrationStats,
    pub has_error: bool,
    pub has_warning: bool,
    pub errors: Vec<String>,
}

/// A configuration that runs a single discovery pass quickly.
pub fn make_config(source: &str, target: &str) -> Config {
    let mut config = Config::for_roots(source, target).unwrap();
    config.run_once = true;
    config.read_parallelism = 4;
    config.write_parallelism = 4;
    config.delete_parallelism = 4;
    config.elements_per_second = 10_000;
    config.request_throttle_burst = 10_000;
    config
}

pub async fn run_pipeline(
    config: Config,
    store: &MemoryStore,
    metrics: Arc<InMemoryMetricsService>,
) -> PipelineResult {
    run_pipeline_with_token(config, store, metrics, create_pipeline_cancellation_token()).await
}

pub async fn run_pipeline_with_token(
    config: Config,
    store: &MemoryStore,
    metrics: Arc<InMemoryMetricsService>,
    cancellation_token: PipelineCancellationToken,
) -> PipelineResult {
    let mut pipeline = MigrationPipeline::new(
        config,
        Box::new(store.clone()),
        Box::new(store.clone()),
        metrics,
        cancellation_token,
    )
    .unwrap();

    let _ = pipeline.run().await;

    PipelineResult {
        stats: pipeline.get_stats(),
        has_error: pipeline.has_error(),
        has_warning: pipeline.has_warning(),
        errors: pipeline.get_error_messages().unwrap_or_default(),
    }
}
