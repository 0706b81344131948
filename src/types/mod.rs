use std::fmt;
use std::fmt::{Debug, Formatter};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use zeroize_derive::{Zeroize, ZeroizeOnDrop};

pub mod error;
pub mod storage_path;
pub mod token;

pub use storage_path::{StoragePath, StorageScheme};

/// Key of a discovered object, relative to the source root.
pub type DiscoveredKey = String;

/// Content read from the source, waiting to be written to the target.
///
/// Only lives between the read and write stages.
#[derive(Clone, PartialEq)]
pub struct PendingWrite {
    pub source_root: StoragePath,
    pub key: DiscoveredKey,
    pub content: Bytes,
}

impl Debug for PendingWrite {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingWrite")
            .field("source_root", &self.source_root)
            .field("key", &self.key)
            .field("content_length", &self.content.len())
            .finish()
    }
}

/// A source object whose copy has been durably written.
///
/// Produced only by a successful write.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingDelete {
    pub source_root: StoragePath,
    pub key: DiscoveredKey,
}

impl PendingWrite {
    pub fn source_path(&self) -> StoragePath {
        self.source_root.join(&self.key)
    }
}

impl PendingDelete {
    pub fn source_path(&self) -> StoragePath {
        self.source_root.join(&self.key)
    }
}

/// AWS configuration file locations.
#[derive(Debug, Clone, Default)]
pub struct ClientConfigLocation {
    pub aws_config_file: Option<PathBuf>,
    pub aws_shared_credentials_file: Option<PathBuf>,
}

/// Credential sources for one side (source or target) of a migration.
#[derive(Debug, Clone)]
pub enum S3Credentials {
    Profile(String),
    Credentials { access_keys: AccessKeys },
    FromEnvironment,
}

/// AWS access key pair, cleared from memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AccessKeys {
    pub access_key: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl Debug for AccessKeys {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut keys = f.debug_struct("AccessKeys");
        let session_token = self
            .session_token
            .as_ref()
            .map_or("None", |_| "** redacted **");
        keys.field("access_key", &self.access_key)
            .field("secret_access_key", &"** redacted **")
            .field("session_token", &session_token);
        keys.finish()
    }
}

/// Point-in-time snapshot of a migration run's counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MigrationStats {
    pub listed_objects: u64,
    pub migrated_objects: u64,
    pub migrated_bytes: u64,
    pub deleted_objects: u64,
    pub skipped_objects: u64,
    pub failed_objects: u64,
}

/// Counters updated concurrently by the stage workers.
#[derive(Debug, Default)]
pub struct MigrationStatsReport {
    listed_objects: AtomicU64,
    migrated_objects: AtomicU64,
    migrated_bytes: AtomicU64,
    deleted_objects: AtomicU64,
    skipped_objects: AtomicU64,
    failed_objects: AtomicU64,
}

impl MigrationStatsReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_listed(&self) {
        self.listed_objects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_migrated(&self, bytes: u64) {
        self.migrated_objects.fetch_add(1, Ordering::Relaxed);
        self.migrated_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn increment_deleted(&self) {
        self.deleted_objects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_skipped(&self) {
        self.skipped_objects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_failed(&self) {
        self.failed_objects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MigrationStats {
        MigrationStats {
            listed_objects: self.listed_objects.load(Ordering::Relaxed),
            migrated_objects: self.migrated_objects.load(Ordering::Relaxed),
            migrated_bytes: self.migrated_bytes.load(Ordering::Relaxed),
            deleted_objects: self.deleted_objects.load(Ordering::Relaxed),
            skipped_objects: self.skipped_objects.load(Ordering::Relaxed),
            failed_objects: self.failed_objects.load(Ordering::Relaxed),
        }
    }
}
