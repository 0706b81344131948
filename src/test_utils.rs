//! Shared test utilities for the s3mv library crate.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use aws_smithy_types::checksum_config::RequestChecksumCalculation;
use bytes::Bytes;

use crate::config::{CLITimeoutConfig, ClientConfig, Config, RetryConfig};
use crate::storage::StorageTrait;
use crate::types::token::PipelineCancellationToken;
use crate::types::{AccessKeys, ClientConfigLocation, S3Credentials, StoragePath};

/// Initialise a dummy tracing subscriber for tests.
///
/// Uses `try_init` so that only the first call in a process actually
/// installs the subscriber; subsequent calls are silently ignored.
pub(crate) fn init_dummy_tracing_subscriber() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("dummy=trace")
        .try_init();
}

/// A valid [`Config`] for unit tests.
///
/// source=`s3://source-bucket/prefix/`, target=`s3://target-bucket/out/`,
/// parallelism 2 per stage, no throttling in practice and a single
/// discovery pass.
pub(crate) fn make_test_config() -> Config {
    Config {
        source: StoragePath::new("source-bucket", "prefix/"),
        target: StoragePath::new("target-bucket", "out/"),
        read_parallelism: 2,
        write_parallelism: 2,
        delete_parallelism: 2,
        change_capture_interval: Duration::from_millis(10),
        elements_per_second: 10_000,
        request_throttle_burst: 10_000,
        stage_queue_size: 16,
        run_once: true,
        ..Config::default()
    }
}

pub(crate) fn make_test_client_config() -> ClientConfig {
    ClientConfig {
        client_config_location: ClientConfigLocation {
            aws_config_file: None,
            aws_shared_credentials_file: None,
        },
        credential: S3Credentials::Credentials {
            access_keys: AccessKeys {
                access_key: "test_key".to_string(),
                secret_access_key: "test_secret".to_string(),
                session_token: None,
            },
        },
        region: Some("us-east-1".to_string()),
        endpoint_url: Some("https://localhost:9000".to_string()),
        force_path_style: true,
        retry_config: RetryConfig {
            aws_max_attempts: 3,
            initial_backoff_milliseconds: 100,
        },
        cli_timeout_config: CLITimeoutConfig::default(),
        disable_stalled_stream_protection: false,
        request_checksum_calculation: RequestChecksumCalculation::WhenRequired,
    }
}

/// Every call a [`MockStorage`] received, in order.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum StorageEvent {
    List(StoragePath),
    Get(StoragePath),
    Put(StoragePath, Bytes),
    Delete(StoragePath),
}

/// In-memory object store shared by all of its clones.
///
/// Source and target can be the same instance (their buckets differ), which
/// gives one ordered event log for both sides.
#[derive(Clone, Default)]
pub(crate) struct MockStorage {
    objects: Arc<Mutex<BTreeMap<StoragePath, Bytes>>>,
    events: Arc<Mutex<Vec<StorageEvent>>>,
    ghosts: Arc<Mutex<HashSet<StoragePath>>>,
    fail_list: Arc<Mutex<bool>>,
    fail_get: Arc<Mutex<HashSet<StoragePath>>>,
    fail_put: Arc<Mutex<HashSet<StoragePath>>>,
    refuse_delete: Arc<Mutex<HashSet<StoragePath>>>,
    fail_delete: Arc<Mutex<HashSet<StoragePath>>>,
    cancel_on_get: Arc<Mutex<Option<(u32, PipelineCancellationToken)>>>,
    get_calls: Arc<AtomicU32>,
    put_delay: Arc<Mutex<Option<Duration>>>,
}

impl MockStorage {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, bucket: &str, key: &str, content: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(StoragePath::new(bucket, key), Bytes::copy_from_slice(content));
    }

    /// Listed, but gone by the time it is read.
    pub(crate) fn add_ghost(&self, bucket: &str, key: &str) {
        self.ghosts
            .lock()
            .unwrap()
            .insert(StoragePath::new(bucket, key));
    }

    pub(crate) fn fail_listing(&self) {
        *self.fail_list.lock().unwrap() = true;
    }

    pub(crate) fn fail_get_of(&self, bucket: &str, key: &str) {
        self.fail_get
            .lock()
            .unwrap()
            .insert(StoragePath::new(bucket, key));
    }

    pub(crate) fn fail_put_of(&self, bucket: &str, key: &str) {
        self.fail_put
            .lock()
            .unwrap()
            .insert(StoragePath::new(bucket, key));
    }

    /// Deleting this object reports `Ok(false)`.
    pub(crate) fn refuse_delete_of(&self, bucket: &str, key: &str) {
        self.refuse_delete
            .lock()
            .unwrap()
            .insert(StoragePath::new(bucket, key));
    }

    pub(crate) fn fail_delete_of(&self, bucket: &str, key: &str) {
        self.fail_delete
            .lock()
            .unwrap()
            .insert(StoragePath::new(bucket, key));
    }

    /// Cancel `token` while serving the `nth` read (1-based).
    pub(crate) fn cancel_on_get(&self, nth: u32, token: PipelineCancellationToken) {
        *self.cancel_on_get.lock().unwrap() = Some((nth, token));
    }

    pub(crate) fn delay_puts(&self, delay: Duration) {
        *self.put_delay.lock().unwrap() = Some(delay);
    }

    pub(crate) fn get(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.objects
            .lock()
            .unwrap()
            .get(&StoragePath::new(bucket, key))
            .cloned()
    }

    pub(crate) fn keys_in(&self, bucket: &str) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .keys()
            .filter(|path| path.bucket() == bucket)
            .map(|path| path.key().to_string())
            .collect()
    }

    pub(crate) fn events(&self) -> Vec<StorageEvent> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn puts(&self) -> Vec<StoragePath> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                StorageEvent::Put(path, _) => Some(path),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn deletes(&self) -> Vec<StoragePath> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                StorageEvent::Delete(path) => Some(path),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: StorageEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl StorageTrait for MockStorage {
    async fn list_objects(&self, root: &StoragePath) -> Result<Vec<String>> {
        self.record(StorageEvent::List(root.clone()));
        if *self.fail_list.lock().unwrap() {
            return Err(anyhow!("ListObjectsV2 failed: AccessDenied"));
        }

        let prefix = root.prefix();
        let objects = self.objects.lock().unwrap();
        let ghosts = self.ghosts.lock().unwrap();
        let mut keys: Vec<String> = objects
            .keys()
            .chain(ghosts.iter())
            .filter(|path| path.bucket() == root.bucket() && path.key().starts_with(&prefix))
            .map(|path| path.key().to_string())
            .collect();
        keys.sort();
        keys.dedup();

        Ok(keys)
    }

    async fn get_object(&self, path: &StoragePath) -> Result<Option<Bytes>> {
        self.record(StorageEvent::Get(path.clone()));
        let nth = self.get_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((cancel_at, token)) = self.cancel_on_get.lock().unwrap().as_ref() {
            if *cancel_at == nth {
                token.cancel();
            }
        }

        if self.fail_get.lock().unwrap().contains(path) {
            return Err(anyhow!("GetObject failed: InternalError"));
        }

        Ok(self.objects.lock().unwrap().get(path).cloned())
    }

    async fn put_object(&self, path: &StoragePath, content: Bytes, overwrite: bool) -> Result<()> {
        let delay = *self.put_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_put.lock().unwrap().contains(path) {
            return Err(anyhow!("PutObject failed: SlowDown"));
        }

        let mut objects = self.objects.lock().unwrap();
        if !overwrite && objects.contains_key(path) {
            return Err(anyhow!("PutObject failed: PreconditionFailed"));
        }
        objects.insert(path.clone(), content.clone());
        drop(objects);

        self.record(StorageEvent::Put(path.clone(), content));
        Ok(())
    }

    async fn delete_object(&self, path: &StoragePath) -> Result<bool> {
        self.record(StorageEvent::Delete(path.clone()));

        if self.fail_delete.lock().unwrap().contains(path) {
            return Err(anyhow!("DeleteObject failed: AccessDenied"));
        }
        if self.refuse_delete.lock().unwrap().contains(path) {
            return Ok(false);
        }

        self.objects.lock().unwrap().remove(path);
        self.ghosts.lock().unwrap().remove(path);
        Ok(true)
    }
}
