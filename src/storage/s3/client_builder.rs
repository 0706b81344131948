use std::time::Duration;

use aws_config::meta::region::{ProvideRegion, RegionProviderChain};
use aws_config::retry::RetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, ConfigLoader, Region};
use aws_runtime::env_config::file::{EnvConfigFileKind, EnvConfigFiles};
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{Credentials, StalledStreamProtectionConfig};

use crate::config::ClientConfig;
use crate::types::S3Credentials;

const CREDENTIALS_PROVIDER_NAME: &str = "s3mv";

impl ClientConfig {
    /// Build an S3 client from this side's settings.
    ///
    /// Explicit settings win over anything found in the environment or the
    /// AWS profile files.
    pub async fn create_client(&self) -> Client {
        let sdk_config = self.load_config_loader().await.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(self.force_path_style)
            .request_checksum_calculation(self.request_checksum_calculation.clone())
            .build();

        Client::from_conf(s3_config)
    }

    async fn load_config_loader(&self) -> ConfigLoader {
        let mut config_loader = aws_config::defaults(BehaviorVersion::latest())
            .retry_config(self.build_retry_config())
            .timeout_config(self.build_timeout_config());

        if self.disable_stalled_stream_protection {
            config_loader =
                config_loader.stalled_stream_protection(StalledStreamProtectionConfig::disabled());
        }

        config_loader = match &self.credential {
            S3Credentials::Credentials { access_keys } => {
                let credentials = Credentials::new(
                    access_keys.access_key.to_string(),
                    access_keys.secret_access_key.to_string(),
                    access_keys.session_token.clone(),
                    None,
                    CREDENTIALS_PROVIDER_NAME,
                );
                config_loader.credentials_provider(credentials)
            }
            S3Credentials::Profile(profile_name) => config_loader
                .profile_name(profile_name)
                .profile_files(self.build_profile_files()),
            S3Credentials::FromEnvironment => config_loader,
        };

        if let Some(region) = self.build_region_provider().region().await {
            config_loader = config_loader.region(region);
        }

        if let Some(endpoint_url) = &self.endpoint_url {
            config_loader = config_loader.endpoint_url(endpoint_url);
        }

        config_loader
    }

    fn build_profile_files(&self) -> EnvConfigFiles {
        let mut profile_files_builder = EnvConfigFiles::builder();

        profile_files_builder = match &self.client_config_location.aws_config_file {
            Some(aws_config_file) => {
                profile_files_builder.with_file(EnvConfigFileKind::Config, aws_config_file)
            }
            None => profile_files_builder.include_default_config_file(true),
        };

        profile_files_builder = match &self.client_config_location.aws_shared_credentials_file {
            Some(aws_shared_credentials_file) => profile_files_builder
                .with_file(EnvConfigFileKind::Credentials, aws_shared_credentials_file),
            None => profile_files_builder.include_default_credentials_file(true),
        };

        profile_files_builder.build()
    }

    fn build_region_provider(&self) -> Box<dyn ProvideRegion> {
        let region = self.region.clone().map(Region::new);

        match &self.credential {
            S3Credentials::Profile(profile_name) => {
                let provider_region = aws_config::profile::ProfileFileRegionProvider::builder()
                    .profile_files(self.build_profile_files())
                    .profile_name(profile_name)
                    .build();
                Box::new(RegionProviderChain::first_try(region).or_else(provider_region))
            }
            S3Credentials::Credentials { .. } | S3Credentials::FromEnvironment => {
                Box::new(RegionProviderChain::first_try(region))
            }
        }
    }

    fn build_retry_config(&self) -> RetryConfig {
        RetryConfig::standard()
            .with_max_attempts(self.retry_config.aws_max_attempts)
            .with_initial_backoff(Duration::from_millis(
                self.retry_config.initial_backoff_milliseconds,
            ))
    }

    fn build_timeout_config(&self) -> TimeoutConfig {
        let timeout = &self.cli_timeout_config;
        let mut builder = TimeoutConfig::builder();

        builder
            .set_operation_timeout(timeout.operation_timeout_milliseconds.map(Duration::from_millis))
            .set_operation_attempt_timeout(
                timeout
                    .operation_attempt_timeout_milliseconds
                    .map(Duration::from_millis),
            )
            .set_connect_timeout(timeout.connect_timeout_milliseconds.map(Duration::from_millis))
            .set_read_timeout(timeout.read_timeout_milliseconds.map(Duration::from_millis));

        builder.build()
    }
}
