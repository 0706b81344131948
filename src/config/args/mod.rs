use crate::config::{
    CLITimeoutConfig, ClientConfig, Config, EmptyReadPolicy, RetryConfig, TracingConfig,
};
use crate::types::{AccessKeys, ClientConfigLocation, S3Credentials, StoragePath, StorageScheme};
use aws_smithy_types::checksum_config::RequestChecksumCalculation;
use clap::Parser;
use clap::builder::NonEmptyStringValueParser;
use clap_verbosity_flag::{Verbosity, WarnLevel};
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;


// ---------------------------------------------------------------------------
// Default constants
// ---------------------------------------------------------------------------

const DEFAULT_READ_PARALLELISM: u16 = 16;
const DEFAULT_WRITE_PARALLELISM: u16 = 16;
const DEFAULT_DELETE_PARALLELISM: u16 = 16;
const DEFAULT_CHANGE_CAPTURE_INTERVAL_SECONDS: u64 = 15;
const DEFAULT_ELEMENTS_PER_SECOND: u32 = 100;
const DEFAULT_REQUEST_THROTTLE_BURST: u32 = 200;
const DEFAULT_STREAM_KIND: &str = "ObjectMigration";
const DEFAULT_STREAM_ID: &str = "s3mv";
const DEFAULT_STAGE_QUEUE_SIZE: u32 = 1000;
const DEFAULT_BACKFILL: bool = false;
const DEFAULT_ONCE: bool = false;
const DEFAULT_FAIL_ON_EMPTY_READ: bool = false;
const DEFAULT_WARN_AS_ERROR: bool = false;
const DEFAULT_AWS_MAX_ATTEMPTS: u32 = 10;
const DEFAULT_INITIAL_BACKOFF_MILLISECONDS: u64 = 100;
const DEFAULT_JSON_TRACING: bool = false;
const DEFAULT_AWS_SDK_TRACING: bool = false;
const DEFAULT_SPAN_EVENTS_TRACING: bool = false;
const DEFAULT_DISABLE_COLOR_TRACING: bool = false;
const DEFAULT_FORCE_PATH_STYLE: bool = false;
const DEFAULT_DISABLE_STALLED_STREAM_PROTECTION: bool = false;

// ---------------------------------------------------------------------------
// Error messages
// ---------------------------------------------------------------------------

const ERROR_MESSAGE_INVALID_PATH: &str =
    "Path must be an S3 URI starting with 's3://' or 's3a://' (e.g., s3://bucket/prefix/).";
const ERROR_MESSAGE_SCHEME_MISMATCH: &str = "Source and target must use the same storage scheme.";
const ERROR_MESSAGE_SECRET_KEY_REQUIRED: &str =
    "A secret access key is required when an access key is given";

// ---------------------------------------------------------------------------
// Value parser helpers
// ---------------------------------------------------------------------------

fn check_storage_path(s: &str) -> Result<String, String> {
    StorageScheme::from_uri(s).map_err(|_| ERROR_MESSAGE_INVALID_PATH.to_string())?;
    Ok(s.to_string())
}

// ---------------------------------------------------------------------------
// CLIArgs (clap-derived argument struct)
// ---------------------------------------------------------------------------

/// s3mv - Continuously moves objects from one S3 location to another.
///
/// Every object found under SOURCE is copied under TARGET (same relative
/// key) and deleted from SOURCE once the copy has been written.
///
/// Example:
///   s3mv s3://landing/incoming/ s3://archive/2024/ --once
///   s3mv s3://landing/incoming/ s3://archive/ --elements-per-second 50 -v
#[derive(Parser, Clone, Debug)]
#[command(name = "s3mv", version, about, long_about = None)]
pub struct CLIArgs {
    /// S3 source root: s3://<BUCKET_NAME>[/prefix]
    #[arg(env, help = "s3://<BUCKET_NAME>[/prefix]", value_parser = check_storage_path)]
    pub source: String,

    /// S3 target root: s3://<BUCKET_NAME>[/prefix]
    #[arg(env, help = "s3://<BUCKET_NAME>[/prefix]", value_parser = check_storage_path)]
    pub target: String,

    // -----------------------------------------------------------------------
    // Stream options
    // -----------------------------------------------------------------------
    /// Stream kind, used for metric tags (normalised to snake_case).
    #[arg(long, env, default_value = DEFAULT_STREAM_KIND, value_parser = NonEmptyStringValueParser::new(), help_heading = "Stream")]
    pub stream_kind: String,

    /// Stream identifier, used for metric tags.
    #[arg(long, env, default_value = DEFAULT_STREAM_ID, value_parser = NonEmptyStringValueParser::new(), help_heading = "Stream")]
    pub stream_id: String,

    /// Seconds between two listings of the source. Default: 15.
    #[arg(long, env, default_value_t = DEFAULT_CHANGE_CAPTURE_INTERVAL_SECONDS, help_heading = "Stream")]
    pub change_capture_interval_seconds: u64,

    /// List the source once, migrate what was found and exit.
    #[arg(long, env, default_value_t = DEFAULT_ONCE, help_heading = "Stream")]
    pub once: bool,

    /// Replay history before following changes (not supported; rejected).
    #[arg(long, env, default_value_t = DEFAULT_BACKFILL, help_heading = "Stream")]
    pub backfill: bool,

    /// Count objects that vanish between listing and reading as failures
    /// instead of skipping them.
    #[arg(long, env, default_value_t = DEFAULT_FAIL_ON_EMPTY_READ, help_heading = "Stream")]
    pub fail_on_empty_read: bool,

    // -----------------------------------------------------------------------
    // Performance options
    // -----------------------------------------------------------------------
    /// Number of concurrent read workers. Default: 16.
    #[arg(long, env, default_value_t = DEFAULT_READ_PARALLELISM, help_heading = "Performance")]
    pub read_parallelism: u16,

    /// Number of concurrent write workers. Default: 16.
    #[arg(long, env, default_value_t = DEFAULT_WRITE_PARALLELISM, help_heading = "Performance")]
    pub write_parallelism: u16,

    /// Number of concurrent delete workers. Default: 16.
    #[arg(long, env, default_value_t = DEFAULT_DELETE_PARALLELISM, help_heading = "Performance")]
    pub delete_parallelism: u16,

    /// Sustained number of objects admitted per second. Default: 100.
    #[arg(long, env, default_value_t = DEFAULT_ELEMENTS_PER_SECOND, help_heading = "Performance")]
    pub elements_per_second: u32,

    /// Number of objects that may be admitted at once. Default: 200.
    #[arg(long, env, default_value_t = DEFAULT_REQUEST_THROTTLE_BURST, help_heading = "Performance")]
    pub request_throttle_burst: u32,

    /// Capacity of each channel between two stages. Default: 1000.
    #[arg(long, env, default_value_t = DEFAULT_STAGE_QUEUE_SIZE, help_heading = "Performance")]
    pub stage_queue_size: u32,

    // -----------------------------------------------------------------------
    // Logging options
    // -----------------------------------------------------------------------
    /// Verbosity level. -q (quiet), default (normal), -v, -vv, -vvv.
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Output logs in JSON format.
    #[arg(long, env, default_value_t = DEFAULT_JSON_TRACING, help_heading = "Logging")]
    pub json_tracing: bool,

    /// Enable AWS SDK tracing.
    #[arg(long, env, default_value_t = DEFAULT_AWS_SDK_TRACING, help_heading = "Logging")]
    pub aws_sdk_tracing: bool,

    /// Enable tracing span events.
    #[arg(long, env, default_value_t = DEFAULT_SPAN_EVENTS_TRACING, help_heading = "Logging")]
    pub span_events_tracing: bool,

    /// Disable colored output in logs.
    #[arg(long, env, default_value_t = DEFAULT_DISABLE_COLOR_TRACING, help_heading = "Logging")]
    pub disable_color_tracing: bool,

    // -----------------------------------------------------------------------
    // Retry options
    // -----------------------------------------------------------------------
    /// Maximum retry attempts for AWS SDK operations. Default: 10.
    #[arg(long, env, default_value_t = DEFAULT_AWS_MAX_ATTEMPTS, help_heading = "Retry")]
    pub aws_max_attempts: u32,

    /// Initial backoff in milliseconds for retries. Default: 100.
    #[arg(long, env, default_value_t = DEFAULT_INITIAL_BACKOFF_MILLISECONDS, help_heading = "Retry")]
    pub initial_backoff_milliseconds: u64,

    // -----------------------------------------------------------------------
    // Timeout options
    // -----------------------------------------------------------------------
    /// Overall operation timeout in milliseconds.
    #[arg(long, env, help_heading = "Timeout")]
    pub operation_timeout_milliseconds: Option<u64>,

    /// Per-attempt operation timeout in milliseconds.
    #[arg(long, env, help_heading = "Timeout")]
    pub operation_attempt_timeout_milliseconds: Option<u64>,

    /// Connection timeout in milliseconds.
    #[arg(long, env, help_heading = "Timeout")]
    pub connect_timeout_milliseconds: Option<u64>,

    /// Read timeout in milliseconds.
    #[arg(long, env, help_heading = "Timeout")]
    pub read_timeout_milliseconds: Option<u64>,

    // -----------------------------------------------------------------------
    // AWS configuration (shared)
    // -----------------------------------------------------------------------
    /// AWS config file path.
    #[arg(long, env, help_heading = "AWS")]
    pub aws_config_file: Option<PathBuf>,

    /// AWS shared credentials file path.
    #[arg(long, env, help_heading = "AWS")]
    pub aws_shared_credentials_file: Option<PathBuf>,

    /// Disable stalled stream protection.
    #[arg(long, env, default_value_t = DEFAULT_DISABLE_STALLED_STREAM_PROTECTION, help_heading = "AWS")]
    pub disable_stalled_stream_protection: bool,

    // -----------------------------------------------------------------------
    // Source AWS configuration
    // -----------------------------------------------------------------------
    /// AWS profile for the source.
    #[arg(long, env, conflicts_with = "source_access_key", value_parser = NonEmptyStringValueParser::new(), help_heading = "Source")]
    pub source_profile: Option<String>,

    /// AWS access key ID for the source.
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "Source")]
    pub source_access_key: Option<String>,

    /// AWS secret access key for the source.
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "Source")]
    pub source_secret_access_key: Option<String>,

    /// AWS session token for the source.
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "Source")]
    pub source_session_token: Option<String>,

    /// AWS region for the source.
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "Source")]
    pub source_region: Option<String>,

    /// Custom S3-compatible endpoint URL for the source (e.g. MinIO).
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "Source")]
    pub source_endpoint_url: Option<String>,

    /// Force path-style access for the source.
    #[arg(long, env, default_value_t = DEFAULT_FORCE_PATH_STYLE, help_heading = "Source")]
    pub source_force_path_style: bool,

    // -----------------------------------------------------------------------
    // Target AWS configuration
    // -----------------------------------------------------------------------
    /// AWS profile for the target.
    #[arg(long, env, conflicts_with = "target_access_key", value_parser = NonEmptyStringValueParser::new(), help_heading = "Target")]
    pub target_profile: Option<String>,

    /// AWS access key ID for the target.
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "Target")]
    pub target_access_key: Option<String>,

    /// AWS secret access key for the target.
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "Target")]
    pub target_secret_access_key: Option<String>,

    /// AWS session token for the target.
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "Target")]
    pub target_session_token: Option<String>,

    /// AWS region for the target.
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "Target")]
    pub target_region: Option<String>,

    /// Custom S3-compatible endpoint URL for the target (e.g. MinIO).
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "Target")]
    pub target_endpoint_url: Option<String>,

    /// Force path-style access for the target.
    #[arg(long, env, default_value_t = DEFAULT_FORCE_PATH_STYLE, help_heading = "Target")]
    pub target_force_path_style: bool,

    // -----------------------------------------------------------------------
    // Advanced options
    // -----------------------------------------------------------------------
    /// Treat skipped objects as errors (exit code 2 instead of 0).
    #[arg(long, env, default_value_t = DEFAULT_WARN_AS_ERROR, help_heading = "Advanced")]
    pub warn_as_error: bool,
}

// ---------------------------------------------------------------------------
// parse_from_args (public API)
// ---------------------------------------------------------------------------

/// Parse command-line arguments into a `CLIArgs` struct.
///
/// # Example
///
/// ```
/// use s3mv_rs::config::args::parse_from_args;
///
/// let args = vec!["s3mv", "s3://landing/in/", "s3://archive/out/", "--once"];
/// let cli_args = parse_from_args(args).unwrap();
/// assert!(cli_args.once);
/// ```
pub fn parse_from_args<I, T>(args: I) -> Result<CLIArgs, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    CLIArgs::try_parse_from(args)
}

/// Parse arguments and build a Config in one step.
pub fn build_config_from_args<I, T>(args: I) -> Result<Config, String>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli_args = CLIArgs::try_parse_from(args).map_err(|e| e.to_string())?;
    Config::try_from(cli_args)
}

// ---------------------------------------------------------------------------
// Config conversion
// ---------------------------------------------------------------------------

/// One side's AWS settings as given on the command line.
struct SideArgs<'a> {
    name: &'a str,
    profile: &'a Option<String>,
    access_key: &'a Option<String>,
    secret_access_key: &'a Option<String>,
    session_token: &'a Option<String>,
    region: &'a Option<String>,
    endpoint_url: &'a Option<String>,
    force_path_style: bool,
}

impl CLIArgs {
    fn source_side(&self) -> SideArgs<'_> {
        SideArgs {
            name: "source",
            profile: &self.source_profile,
            access_key: &self.source_access_key,
            secret_access_key: &self.source_secret_access_key,
            session_token: &self.source_session_token,
            region: &self.source_region,
            endpoint_url: &self.source_endpoint_url,
            force_path_style: self.source_force_path_style,
        }
    }

    fn target_side(&self) -> SideArgs<'_> {
        SideArgs {
            name: "target",
            profile: &self.target_profile,
            access_key: &self.target_access_key,
            secret_access_key: &self.target_secret_access_key,
            session_token: &self.target_session_token,
            region: &self.target_region,
            endpoint_url: &self.target_endpoint_url,
            force_path_style: self.target_force_path_style,
        }
    }

    fn build_client_config(&self, side: SideArgs<'_>) -> Result<ClientConfig, String> {
        let credential = if let Some(profile) = side.profile {
            S3Credentials::Profile(profile.clone())
        } else if let Some(access_key) = side.access_key {
            let secret_access_key = side.secret_access_key.clone().ok_or_else(|| {
                format!("{ERROR_MESSAGE_SECRET_KEY_REQUIRED} for the {}.", side.name)
            })?;
            S3Credentials::Credentials {
                access_keys: AccessKeys {
                    access_key: access_key.clone(),
                    secret_access_key,
                    session_token: side.session_token.clone(),
                },
            }
        } else {
            S3Credentials::FromEnvironment
        };

        Ok(ClientConfig {
            client_config_location: ClientConfigLocation {
                aws_config_file: self.aws_config_file.clone(),
                aws_shared_credentials_file: self.aws_shared_credentials_file.clone(),
            },
            credential,
            region: side.region.clone(),
            endpoint_url: side.endpoint_url.clone(),
            force_path_style: side.force_path_style,
            retry_config: RetryConfig {
                aws_max_attempts: self.aws_max_attempts,
                initial_backoff_milliseconds: self.initial_backoff_milliseconds,
            },
            cli_timeout_config: CLITimeoutConfig {
                operation_timeout_milliseconds: self.operation_timeout_milliseconds,
                operation_attempt_timeout_milliseconds: self.operation_attempt_timeout_milliseconds,
                connect_timeout_milliseconds: self.connect_timeout_milliseconds,
                read_timeout_milliseconds: self.read_timeout_milliseconds,
            },
            disable_stalled_stream_protection: self.disable_stalled_stream_protection,
            request_checksum_calculation: RequestChecksumCalculation::WhenRequired,
        })
    }

    fn build_tracing_config(&self) -> Option<TracingConfig> {
        let log_level = self.verbosity.log_level()?;

        Some(TracingConfig {
            tracing_level: log_level,
            json_tracing: self.json_tracing,
            aws_sdk_tracing: self.aws_sdk_tracing,
            span_events_tracing: self.span_events_tracing,
            disable_color_tracing: self.disable_color_tracing,
        })
    }

    fn parse_roots(&self) -> Result<(StoragePath, StoragePath, StorageScheme), String> {
        let source_scheme = StorageScheme::from_uri(&self.source).map_err(|e| e.to_string())?;
        let target_scheme = StorageScheme::from_uri(&self.target).map_err(|e| e.to_string())?;
        if source_scheme != target_scheme {
            return Err(ERROR_MESSAGE_SCHEME_MISMATCH.to_string());
        }

        let source = StoragePath::parse(&self.source).map_err(|e| e.to_string())?;
        let target = StoragePath::parse(&self.target).map_err(|e| e.to_string())?;

        Ok((source, target, source_scheme))
    }
}

impl TryFrom<CLIArgs> for Config {
    type Error = String;

    fn try_from(args: CLIArgs) -> Result<Self, Self::Error> {
        let (source, target, scheme) = args.parse_roots()?;
        let source_client_config = args.build_client_config(args.source_side())?;
        let target_client_config = args.build_client_config(args.target_side())?;
        let tracing_config = args.build_tracing_config();

        let empty_read_policy = if args.fail_on_empty_read {
            EmptyReadPolicy::Fail
        } else {
            EmptyReadPolicy::Skip
        };

        let config = Config {
            source,
            target,
            scheme,
            read_parallelism: args.read_parallelism,
            write_parallelism: args.write_parallelism,
            delete_parallelism: args.delete_parallelism,
            change_capture_interval: Duration::from_secs(args.change_capture_interval_seconds),
            elements_per_second: args.elements_per_second,
            request_throttle_burst: args.request_throttle_burst,
            stream_kind: args.stream_kind,
            stream_id: args.stream_id,
            run_once: args.once,
            backfill: args.backfill,
            empty_read_policy,
            stage_queue_size: args.stage_queue_size,
            warn_as_error: args.warn_as_error,
            source_client_config: Some(source_client_config),
            target_client_config: Some(target_client_config),
            tracing_config,
        };

        config.validate().map_err(|e| e.to_string())?;

        Ok(config)
    }
}
