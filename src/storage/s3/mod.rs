pub mod client_builder;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_smithy_types::error::metadata::ProvideErrorMetadata;
use bytes::Bytes;

use crate::config::ClientConfig;
use crate::storage::{Storage, StorageFactory, StorageTrait};
use crate::types::StoragePath;

/// Extracts the S3 error code and message from an AWS SDK error.
///
/// For service errors (S3 API responses), returns the S3 error code
/// (e.g. "AccessDenied", "NoSuchBucket") and the error message from the
/// response. For other error types (network, timeout, construction
/// failure), returns "N/A" as the code and the full error description as
/// the message.
fn extract_sdk_error_details<E: std::fmt::Display + ProvideErrorMetadata>(
    e: &SdkError<E>,
) -> (String, String) {
    if let Some(service_err) = e.as_service_error() {
        (
            service_err.code().unwrap_or("unknown").to_string(),
            service_err.message().unwrap_or("no message").to_string(),
        )
    } else {
        ("N/A".to_string(), e.to_string())
    }
}

fn is_no_such_key(e: &SdkError<GetObjectError>) -> bool {
    matches!(
        e.as_service_error(),
        Some(GetObjectError::NoSuchKey(_))
    )
}

/// Factory for S3 storages; one client per side of the migration.
pub struct S3StorageFactory;

#[async_trait]
impl StorageFactory for S3StorageFactory {
    async fn create(client_config: Option<ClientConfig>) -> Result<Storage> {
        let client = client_config.unwrap_or_default().create_client().await;

        Ok(Box::new(S3Storage {
            client: Arc::new(client),
        }))
    }
}

/// Blob store backed by the S3 API (AWS or any S3-compatible endpoint).
///
/// Every request addresses a full bucket and key; SDK-level retries and
/// timeouts come from the client configuration.
#[derive(Clone)]
struct S3Storage {
    client: Arc<Client>,
}

#[async_trait]
impl StorageTrait for S3Storage {
    async fn list_objects(&self, root: &StoragePath) -> Result<Vec<String>> {
        let prefix = root.prefix();
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let output = self
                .client
                .list_objects_v2()
                .bucket(root.bucket())
                .prefix(&prefix)
                .set_continuation_token(continuation_token.clone())
                .send()
                .await
                .map_err(|e| {
                    let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                    tracing::error!(
                        bucket = root.bucket(),
                        prefix = prefix,
                        s3_error_code = s3_error_code,
                        s3_error_message = s3_error_message,
                        "S3 ListObjectsV2 API call failed for {}: {} ({}).",
                        root,
                        s3_error_code,
                        s3_error_message,
                    );
                    anyhow::anyhow!(e).context("aws_sdk_s3::client::list_objects_v2() failed.")
                })?;

            keys.extend(
                output
                    .contents()
                    .iter()
                    .filter_map(|object| object.key())
                    .map(str::to_string),
            );

            if !output.is_truncated().unwrap_or(false) {
                break;
            }
            continuation_token = output.next_continuation_token().map(str::to_string);
            if continuation_token.is_none() {
                break;
            }
        }

        tracing::debug!(root = %root, count = keys.len(), "listed objects.");
        Ok(keys)
    }

    async fn get_object(&self, path: &StoragePath) -> Result<Option<Bytes>> {
        let result = self
            .client
            .get_object()
            .bucket(path.bucket())
            .key(path.key())
            .send()
            .await;

        let output = match result {
            Ok(output) => output,
            Err(e) if is_no_such_key(&e) => {
                tracing::debug!(path = %path, "object not found.");
                return Ok(None);
            }
            Err(e) => {
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                tracing::error!(
                    bucket = path.bucket(),
                    key = path.key(),
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 GetObject API call failed for {}: {} ({}).",
                    path,
                    s3_error_code,
                    s3_error_message,
                );
                return Err(anyhow::anyhow!(e).context("aws_sdk_s3::client::get_object() failed."));
            }
        };

        let content = output
            .body
            .collect()
            .await
            .map_err(|e| anyhow::anyhow!(e).context("failed to read object body."))?
            .into_bytes();

        Ok(Some(content))
    }

    async fn put_object(&self, path: &StoragePath, content: Bytes, overwrite: bool) -> Result<()> {
        let if_none_match = if overwrite {
            None
        } else {
            Some("*".to_string())
        };

        self.client
            .put_object()
            .bucket(path.bucket())
            .key(path.key())
            .content_length(content.len() as i64)
            .set_if_none_match(if_none_match)
            .body(ByteStream::from(content))
            .send()
            .await
            .map_err(|e| {
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                tracing::error!(
                    bucket = path.bucket(),
                    key = path.key(),
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 PutObject API call failed for {}: {} ({}).",
                    path,
                    s3_error_code,
                    s3_error_message,
                );
                anyhow::anyhow!(e).context("aws_sdk_s3::client::put_object() failed.")
            })?;

        Ok(())
    }

    async fn delete_object(&self, path: &StoragePath) -> Result<bool> {
        self.client
            .delete_object()
            .bucket(path.bucket())
            .key(path.key())
            .send()
            .await
            .map_err(|e| {
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                tracing::warn!(
                    bucket = path.bucket(),
                    key = path.key(),
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 DeleteObject API call failed for {}: {} ({}).",
                    path,
                    s3_error_code,
                    s3_error_message,
                );
                anyhow::anyhow!(e).context("aws_sdk_s3::client::delete_object() failed.")
            })?;

        // S3 reports success for keys that are already gone.
        Ok(true)
    }
}
