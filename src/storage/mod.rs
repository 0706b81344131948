use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use dyn_clone::DynClone;

use crate::config::{ClientConfig, Config};
use crate::types::{StoragePath, StorageScheme};

pub mod s3;

/// Type alias for a boxed Storage trait object.
pub type Storage = Box<dyn StorageTrait + Send + Sync>;

/// Factory trait for creating Storage instances for one side of a migration.
#[async_trait]
pub trait StorageFactory {
    async fn create(client_config: Option<ClientConfig>) -> Result<Storage>;
}

/// The blob-store capabilities the migration pipeline needs.
///
/// Every method takes a full [`StoragePath`]; implementations never prepend
/// a root of their own.
#[async_trait]
pub trait StorageTrait: DynClone {
    /// List the keys of every object under `root`.
    ///
    /// Returned keys are full keys in `root`'s bucket, not relative ones.
    async fn list_objects(&self, root: &StoragePath) -> Result<Vec<String>>;

    /// Fetch an object's content.
    ///
    /// `Ok(None)` means the object does not exist (anymore). An object that
    /// exists but is empty is `Ok(Some(Bytes::new()))`.
    async fn get_object(&self, path: &StoragePath) -> Result<Option<Bytes>>;

    /// Write an object. With `overwrite = true` an existing object is
    /// replaced.
    async fn put_object(&self, path: &StoragePath, content: Bytes, overwrite: bool) -> Result<()>;

    /// Remove an object.
    ///
    /// `Ok(false)` means the store reported that it could not remove it.
    async fn delete_object(&self, path: &StoragePath) -> Result<bool>;
}

dyn_clone::clone_trait_object!(StorageTrait);

/// Create the source and target storages for a validated configuration.
///
/// The backend is chosen from the scheme resolved during validation.
pub async fn create_storage_pair(config: &Config) -> Result<(Storage, Storage)> {
    let source = match config.scheme {
        StorageScheme::S3 => {
            s3::S3StorageFactory::create(config.source_client_config.clone()).await?
        }
    };
    let target = match config.scheme {
        StorageScheme::S3 => {
            s3::S3StorageFactory::create(config.target_client_config.clone()).await?
        }
    };

    Ok((source, target))
}
