pub mod args;

use std::time::Duration;

use aws_smithy_types::checksum_config::RequestChecksumCalculation;

use crate::types::error::S3mvError;
use crate::types::{ClientConfigLocation, S3Credentials, StoragePath, StorageScheme};

/// Main configuration for an s3mv-rs migration run.
///
/// Holds everything a [`MigrationPipeline`](crate::MigrationPipeline) needs:
/// the source and target roots, per-stage parallelism, the discovery
/// interval, throttle settings, stream identity for metric tags, and the
/// AWS client settings of each side.
///
/// Immutable once the pipeline is built. [`Config::validate`] is called by
/// the pipeline constructor; invalid values are configuration errors and
/// never reach the running stages.
///
/// # Quick Start
///
/// ```
/// use s3mv_rs::Config;
///
/// let config = Config::for_roots("s3://source-bucket/incoming/", "s3://target-bucket/archive/").unwrap();
/// assert_eq!(config.read_parallelism, 16);
/// assert_eq!(config.source.key(), "incoming/");
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    pub source: StoragePath,
    pub target: StoragePath,
    pub scheme: StorageScheme,
    pub read_parallelism: u16,
    pub write_parallelism: u16,
    pub delete_parallelism: u16,
    pub change_capture_interval: Duration,
    pub elements_per_second: u32,
    pub request_throttle_burst: u32,
    pub stream_kind: String,
    pub stream_id: String,
    pub run_once: bool,
    pub backfill: bool,
    pub empty_read_policy: EmptyReadPolicy,
    pub stage_queue_size: u32,
    pub warn_as_error: bool,
    pub source_client_config: Option<ClientConfig>,
    pub target_client_config: Option<ClientConfig>,
    pub tracing_config: Option<TracingConfig>,
}

/// What the read stage does when a discovered object has no content to
/// fetch (it vanished between listing and reading).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptyReadPolicy {
    /// Drop the object with a warning and continue.
    #[default]
    Skip,
    /// Report a per-object processing failure. The run still continues.
    Fail,
}

impl Config {
    /// Create a `Config` with default settings for the given source and
    /// target URIs.
    pub fn for_roots(source: &str, target: &str) -> Result<Self, S3mvError> {
        let source = StoragePath::parse(source)?;
        let target = StoragePath::parse(target)?;

        Ok(Config {
            source,
            target,
            ..Config::default()
        })
    }

    /// Check every constraint a run depends on.
    pub fn validate(&self) -> Result<(), S3mvError> {
        if self.backfill {
            return Err(S3mvError::UnsupportedMode(
                "backfill is not supported for object migration streams".to_string(),
            ));
        }

        for (name, value) in [
            ("read_parallelism", self.read_parallelism),
            ("write_parallelism", self.write_parallelism),
            ("delete_parallelism", self.delete_parallelism),
        ] {
            if value == 0 {
                return Err(S3mvError::InvalidConfig(format!(
                    "{name} must be greater than 0"
                )));
            }
        }

        if self.elements_per_second == 0 {
            return Err(S3mvError::InvalidConfig(
                "elements_per_second must be greater than 0".to_string(),
            ));
        }
        if self.request_throttle_burst < self.elements_per_second {
            return Err(S3mvError::InvalidConfig(format!(
                "request_throttle_burst ({}) must be greater than or equal to elements_per_second ({})",
                self.request_throttle_burst, self.elements_per_second
            )));
        }
        if self.stage_queue_size == 0 {
            return Err(S3mvError::InvalidConfig(
                "stage_queue_size must be greater than 0".to_string(),
            ));
        }

        for (name, path) in [("source", &self.source), ("target", &self.target)] {
            if path.bucket().is_empty() {
                return Err(S3mvError::InvalidUri(format!("{name} bucket is empty")));
            }
        }

        if self.source.bucket() == self.target.bucket()
            && self.target.prefix().starts_with(&self.source.prefix())
        {
            return Err(S3mvError::InvalidConfig(format!(
                "target {} must not be inside source {}: migrated objects would be discovered again",
                self.target, self.source
            )));
        }

        Ok(())
    }
}

impl Default for Config {
    /// Defaults matching the CLI. Source and target are empty and must be
    /// set before the configuration validates.
    fn default() -> Self {
        Config {
            source: StoragePath::new("", ""),
            target: StoragePath::new("", ""),
            scheme: StorageScheme::S3,
            read_parallelism: 16,
            write_parallelism: 16,
            delete_parallelism: 16,
            change_capture_interval: Duration::from_secs(15),
            elements_per_second: 100,
            request_throttle_burst: 200,
            stream_kind: "ObjectMigration".to_string(),
            stream_id: "s3mv".to_string(),
            run_once: false,
            backfill: false,
            empty_read_policy: EmptyReadPolicy::default(),
            stage_queue_size: 1000,
            warn_as_error: false,
            source_client_config: None,
            target_client_config: None,
            tracing_config: None,
        }
    }
}

/// AWS S3 client configuration for one side of the migration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub client_config_location: ClientConfigLocation,
    pub credential: S3Credentials,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
    pub retry_config: RetryConfig,
    pub cli_timeout_config: CLITimeoutConfig,
    pub disable_stalled_stream_protection: bool,
    pub request_checksum_calculation: RequestChecksumCalculation,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            client_config_location: ClientConfigLocation::default(),
            credential: S3Credentials::FromEnvironment,
            region: None,
            endpoint_url: None,
            force_path_style: false,
            retry_config: RetryConfig::default(),
            cli_timeout_config: CLITimeoutConfig::default(),
            disable_stalled_stream_protection: false,
            request_checksum_calculation: RequestChecksumCalculation::WhenRequired,
        }
    }
}

/// Retry configuration for AWS SDK operations.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub aws_max_attempts: u32,
    pub initial_backoff_milliseconds: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            aws_max_attempts: 10,
            initial_backoff_milliseconds: 100,
        }
    }
}

/// Timeout configuration for AWS SDK operations.
#[derive(Debug, Clone, Default)]
pub struct CLITimeoutConfig {
    pub operation_timeout_milliseconds: Option<u64>,
    pub operation_attempt_timeout_milliseconds: Option<u64>,
    pub connect_timeout_milliseconds: Option<u64>,
    pub read_timeout_milliseconds: Option<u64>,
}

/// Tracing (logging) configuration.
#[derive(Debug, Clone, Copy)]
pub struct TracingConfig {
    pub tracing_level: log::Level,
    pub json_tracing: bool,
    pub aws_sdk_tracing: bool,
    pub span_events_tracing: bool,
    pub disable_color_tracing: bool,
}
