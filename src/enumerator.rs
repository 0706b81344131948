use anyhow::{Context, Result};
use tracing::{debug, info, trace};

use crate::stage::{SendResult, Stage};
use crate::types::DiscoveredKey;

/// Polls the source listing and feeds discovered keys into the pipeline.
///
/// ## Pipeline role
///
/// ```text
/// ObjectEnumerator → Throttle → Reader → Writer → Remover
/// ```
///
/// It has no `receiver` channel (it's the entry point). Every
/// `change_capture_interval` it lists the source root and sends each key,
/// relative to that root, downstream. Keys are not deduplicated across
/// polls: a migrated object is deleted from the source and does not show up
/// again, and a key that does reappear is migrated again.
///
/// The loop ends when the run is cancelled, when the downstream channel
/// closes, after the first pass when `run_once` is set, or when listing
/// fails (the error is returned to the pipeline).
pub struct ObjectEnumerator {
    stage: Stage<(), DiscoveredKey>,
}

impl ObjectEnumerator {
    pub fn new(stage: Stage<(), DiscoveredKey>) -> Self {
        Self { stage }
    }

    pub async fn enumerate(&self) -> Result<()> {
        debug!("object enumerator has started.");

        let source_root = &self.stage.config.source;
        let mut poll_count: u64 = 0;

        loop {
            if self.stage.cancellation_token.is_cancelled() {
                info!("object enumerator cancelled.");
                break;
            }

            let listing = tokio::select! {
                biased;
                _ = self.stage.cancellation_token.cancelled() => {
                    info!("object enumerator cancelled while listing.");
                    break;
                }
                listing = self.stage.source.list_objects(source_root) => listing,
            };
            let keys =
                listing.with_context(|| format!("failed to list objects under {source_root}"))?;

            poll_count += 1;
            debug!(
                poll_count = poll_count,
                listed = keys.len(),
                "source listing completed."
            );

            for key in keys {
                let relative_key = source_root.relative_key(&key);
                if relative_key.is_empty() {
                    continue;
                }

                trace!(key = relative_key, "key discovered.");
                self.stage.stats().increment_listed();

                let sent = tokio::select! {
                    biased;
                    _ = self.stage.cancellation_token.cancelled() => {
                        info!("object enumerator cancelled.");
                        return Ok(());
                    }
                    sent = self.stage.send(relative_key.to_string()) => sent?,
                };
                if sent == SendResult::Closed {
                    debug!("downstream closed, object enumerator stops.");
                    return Ok(());
                }
            }

            if self.stage.config.run_once {
                debug!("single discovery pass completed.");
                break;
            }

            tokio::select! {
                biased;
                _ = self.stage.cancellation_token.cancelled() => {
                    info!("object enumerator cancelled.");
                    break;
                }
                _ = tokio::time::sleep(self.stage.config.change_capture_interval) => {}
            }
        }

        debug!("object enumerator has been completed.");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::InMemoryMetricsService;
    use crate::stage::Instrumentation;
    use crate::test_utils::{MockStorage, init_dummy_tracing_subscriber, make_test_config};
    use crate::types::token::create_pipeline_cancellation_token;
    use crate::types::StoragePath;
    use async_channel::Receiver;
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    fn make_enumerator(
        storage: &MockStorage,
        config: crate::config::Config,
    ) -> (ObjectEnumerator, Receiver<DiscoveredKey>, Stage<(), DiscoveredKey>) {
        let (sender, receiver) = async_channel::bounded(config.stage_queue_size as usize);
        let instrumentation =
            Instrumentation::new(&config, Arc::new(InMemoryMetricsService::new()));
        let make = |sender| {
            Stage::new(
                config.clone(),
                Box::new(storage.clone()),
                Box::new(storage.clone()),
                None,
                sender,
                create_pipeline_cancellation_token(),
                Arc::new(AtomicBool::new(false)),
                instrumentation.clone(),
            )
        };
        (ObjectEnumerator::new(make(Some(sender))), receiver, make(None))
    }

    #[tokio::test]
    async fn single_pass_yields_relative_keys() {
        init_dummy_tracing_subscriber();

        let storage = MockStorage::new();
        storage.insert("source-bucket", "prefix/a", b"1");
        storage.insert("source-bucket", "prefix/nested/b", b"2");
        storage.insert("source-bucket", "other/c", b"3");
        storage.insert("target-bucket", "prefix/d", b"4");

        let (enumerator, receiver, _) = make_enumerator(&storage, make_test_config());
        enumerator.enumerate().await.unwrap();
        drop(enumerator);

        let mut keys = Vec::new();
        while let Ok(key) = receiver.recv().await {
            keys.push(key);
        }
        assert_eq!(keys, vec!["a".to_string(), "nested/b".to_string()]);
        assert_eq!(
            storage.events(),
            vec![crate::test_utils::StorageEvent::List(StoragePath::new(
                "source-bucket",
                "prefix/"
            ))]
        );
    }

    #[tokio::test]
    async fn root_marker_is_not_discovered() {
        init_dummy_tracing_subscriber();

        let storage = MockStorage::new();
        storage.insert("source-bucket", "prefix/", b"");
        storage.insert("source-bucket", "prefix/a", b"1");

        let (enumerator, receiver, _) = make_enumerator(&storage, make_test_config());
        enumerator.enumerate().await.unwrap();

        assert_eq!(receiver.recv().await.unwrap(), "a");
        assert!(receiver.is_empty());
    }

    #[tokio::test]
    async fn polls_repeatedly_without_deduplication() {
        init_dummy_tracing_subscriber();

        let storage = MockStorage::new();
        storage.insert("source-bucket", "prefix/a", b"1");

        let mut config = make_test_config();
        config.run_once = false;
        config.change_capture_interval = Duration::from_millis(1);

        let (enumerator, receiver, _) = make_enumerator(&storage, config);
        let token = enumerator.stage.cancellation_token.clone();
        let handle = tokio::spawn(async move { enumerator.enumerate().await });

        for _ in 0..3 {
            assert_eq!(receiver.recv().await.unwrap(), "a");
        }
        token.cancel();

        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn stops_when_downstream_closes() {
        init_dummy_tracing_subscriber();

        let storage = MockStorage::new();
        storage.insert("source-bucket", "prefix/a", b"1");

        let mut config = make_test_config();
        config.run_once = false;

        let (enumerator, receiver, _) = make_enumerator(&storage, config);
        drop(receiver);

        enumerator.enumerate().await.unwrap();
    }

    #[tokio::test]
    async fn does_not_list_after_cancellation() {
        init_dummy_tracing_subscriber();

        let storage = MockStorage::new();
        storage.insert("source-bucket", "prefix/a", b"1");

        let (enumerator, receiver, _) = make_enumerator(&storage, make_test_config());
        enumerator.stage.cancellation_token.cancel();
        enumerator.enumerate().await.unwrap();

        assert!(receiver.is_empty());
        assert!(storage.events().is_empty());
    }

    #[tokio::test]
    async fn listing_failure_is_returned() {
        init_dummy_tracing_subscriber();

        let storage = MockStorage::new();
        storage.fail_listing();

        let (enumerator, _receiver, _) = make_enumerator(&storage, make_test_config());
        let e = enumerator.enumerate().await.unwrap_err();

        assert!(
            e.to_string()
                .contains("failed to list objects under s3://source-bucket/prefix/")
        );
        assert!(crate::supervisor::classify(&e) == crate::supervisor::Directive::Stop);
    }

    #[tokio::test]
    async fn counts_listed_keys() {
        init_dummy_tracing_subscriber();

        let storage = MockStorage::new();
        storage.insert("source-bucket", "prefix/a", b"1");
        storage.insert("source-bucket", "prefix/b", b"2");

        let (enumerator, _receiver, other) = make_enumerator(&storage, make_test_config());
        enumerator.enumerate().await.unwrap();

        assert_eq!(other.stats().snapshot().listed_objects, 2);
    }
}
