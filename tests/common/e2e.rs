//! Real-S3 fixtures for the E2E tests.
//!
//! A `MigrationFixture` owns a fresh source and target bucket, created with
//! the `s3mv-e2e-test` AWS profile. Both buckets are emptied and removed when
//! the fixture is dropped, also after a failed assertion.

use std::time::Duration;

use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use uuid::Uuid;

pub const AWS_PROFILE: &str = "s3mv-e2e-test";
pub const E2E_TIMEOUT: Duration = Duration::from_secs(300);

#[macro_export]
macro_rules! e2e_timeout {
    ($body:expr) => {
        tokio::time::timeout(common::e2e::E2E_TIMEOUT, $body)
            .await
            .expect("E2E test timed out")
    };
}

pub struct MigrationFixture {
    client: Client,
    pub source_bucket: String,
    pub target_bucket: String,
}

impl MigrationFixture {
    /// Creates both buckets. Only the target bucket is created when
    /// `with_source` is false, for runs against a missing source.
    pub async fn setup(with_source: bool) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .profile_name(AWS_PROFILE)
            .load()
            .await;
        let region = sdk_config.region().map(|region| region.to_string());

        let fixture = Self {
            client: Client::new(&sdk_config),
            source_bucket: unique_bucket_name("src"),
            target_bucket: unique_bucket_name("dst"),
        };

        if with_source {
            fixture.create_bucket(&fixture.source_bucket, region.as_deref()).await;
        }
        fixture.create_bucket(&fixture.target_bucket, region.as_deref()).await;
        fixture
    }

    pub fn source_uri(&self, prefix: &str) -> String {
        format!("s3://{}/{prefix}", self.source_bucket)
    }

    pub fn target_uri(&self, prefix: &str) -> String {
        format!("s3://{}/{prefix}", self.target_bucket)
    }

    async fn create_bucket(&self, bucket: &str, region: Option<&str>) {
        let mut request = self.client.create_bucket().bucket(bucket);

        // Buckets in us-east-1 are created without a location constraint.
        if let Some(region) = region.filter(|region| *region != "us-east-1") {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region))
                    .build(),
            );
        }

        if let Err(e) = request.send().await {
            panic!("create_bucket({bucket}) failed: {e}");
        }
    }

    pub async fn put_source(&self, key: &str, body: &[u8]) {
        let result = self
            .client
            .put_object()
            .bucket(&self.source_bucket)
            .key(key)
            .body(ByteStream::from(body.to_vec()))
            .send()
            .await;
        if let Err(e) = result {
            panic!("put_object({key}) failed: {e}");
        }
    }

    pub async fn read_target(&self, key: &str) -> Option<Vec<u8>> {
        let output = self
            .client
            .get_object()
            .bucket(&self.target_bucket)
            .key(key)
            .send()
            .await
            .ok()?;
        let body = output.body.collect().await.ok()?;
        Some(body.into_bytes().to_vec())
    }

    pub async fn source_keys(&self) -> Vec<String> {
        keys_in(&self.client, &self.source_bucket).await
    }

    pub async fn target_keys(&self) -> Vec<String> {
        keys_in(&self.client, &self.target_bucket).await
    }
}

impl Drop for MigrationFixture {
    fn drop(&mut self) {
        let client = self.client.clone();
        let buckets = [self.source_bucket.clone(), self.target_bucket.clone()];

        tokio::task::block_in_place(move || {
            tokio::runtime::Handle::current().block_on(async move {
                for bucket in buckets {
                    remove_bucket(&client, &bucket).await;
                }
            });
        });
    }
}

fn unique_bucket_name(side: &str) -> String {
    format!("s3mv-e2e-{side}-{}", Uuid::new_v4().simple())
}

/// Sorted keys of a bucket. A missing bucket has no keys.
async fn keys_in(client: &Client, bucket: &str) -> Vec<String> {
    let mut keys = Vec::new();
    let mut pages = client
        .list_objects_v2()
        .bucket(bucket)
        .into_paginator()
        .send();

    while let Some(page) = pages.next().await {
        let Ok(page) = page else {
            break;
        };
        keys.extend(page.contents().iter().filter_map(|o| o.key().map(String::from)));
    }

    keys.sort();
    keys
}

async fn remove_bucket(client: &Client, bucket: &str) {
    for key in keys_in(client, bucket).await {
        let _ = client.delete_object().bucket(bucket).key(key).send().await;
    }
    let _ = client.delete_bucket().bucket(bucket).send().await;
}
