use std::ffi::OsString;
use std::sync::Arc;

use anyhow::Result;
use clap::error::ErrorKind;
use tracing::{debug, error, info, trace};

use s3mv_rs::config::Config;
use s3mv_rs::config::args::parse_from_args;
use s3mv_rs::metrics::InMemoryMetricsService;
use s3mv_rs::storage::create_storage_pair;
use s3mv_rs::types::error::{EXIT_CODE_NO_RETRY, EXIT_CODE_WARNING};
use s3mv_rs::{
    MigrationPipeline, create_pipeline_cancellation_token, exit_code_from_error,
    is_cancelled_error,
};

mod ctrl_c_handler;
mod tracing_init;

/// s3mv - Continuously moves objects from one S3 location to another.
///
/// This binary is a thin wrapper over the s3mv-rs library.
#[cfg_attr(coverage_nightly, coverage(off))]
#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config_exit_if_err();

    start_tracing_if_necessary(&config);

    trace!("config = {:?}", config);

    let exit_code = run(config).await;
    if exit_code != 0 {
        std::process::exit(exit_code);
    }

    Ok(())
}

/// Parse and validate the command line, or exit with the do-not-retry code.
#[cfg_attr(coverage_nightly, coverage(off))]
fn load_config_exit_if_err() -> Config {
    match load_config(std::env::args_os()) {
        Ok(config) => config,
        Err(e) => {
            let exit_code = exit_code_for_load_error(&e);
            let _ = e.print();
            std::process::exit(exit_code);
        }
    }
}

/// Both clap's own argument errors and validation failures of the parsed
/// arguments come back as a `clap::Error`.
fn load_config<I, T>(args: I) -> Result<Config, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli_args = parse_from_args(args)?;
    Config::try_from(cli_args)
        .map_err(|message| clap::Error::raw(ErrorKind::ValueValidation, format!("{message}\n")))
}

/// `--help` and `--version` succeed. Every other command line error is a
/// configuration error.
fn exit_code_for_load_error(e: &clap::Error) -> i32 {
    match e.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        _ => EXIT_CODE_NO_RETRY,
    }
}

fn start_tracing_if_necessary(config: &Config) -> bool {
    let Some(tracing_config) = config.tracing_config.as_ref() else {
        return false;
    };

    tracing_init::init_tracing(tracing_config);
    true
}

/// Run the migration and return the process exit code.
async fn run(config: Config) -> i32 {
    let cancellation_token = create_pipeline_cancellation_token();
    ctrl_c_handler::spawn_ctrl_c_handler(cancellation_token.clone());

    let (source, target) = match create_storage_pair(&config).await {
        Ok(storages) => storages,
        Err(e) => {
            error!(error = format!("{e:#}"), "failed to create storages.");
            return exit_code_from_error(&e);
        }
    };

    let metrics = Arc::new(InMemoryMetricsService::new());
    let mut pipeline = match MigrationPipeline::new(
        config,
        source,
        target,
        metrics.clone(),
        cancellation_token,
    ) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!("{}", e);
            return e.exit_code();
        }
    };

    let start_time = tokio::time::Instant::now();
    debug!("migration pipeline start.");

    let result = pipeline.run().await;

    let duration_sec = format!("{:.3}", start_time.elapsed().as_secs_f32());
    let stats = pipeline.get_stats();
    info!(
        duration_sec = duration_sec,
        listed = stats.listed_objects,
        migrated = stats.migrated_objects,
        migrated_bytes = stats.migrated_bytes,
        deleted = stats.deleted_objects,
        skipped = stats.skipped_objects,
        failed = stats.failed_objects,
        "migration summary."
    );
    for (name, tags, value) in metrics.snapshot() {
        debug!(metric = name, tags = ?tags, value = value, "metric total.");
    }

    match result {
        Ok(()) => {
            debug!(duration_sec = duration_sec, "s3mv has been completed.");
            0
        }
        Err(e) if is_cancelled_error(&e) => {
            debug!("migration cancelled by user.");
            0
        }
        Err(e) => {
            for message in pipeline.get_error_messages().unwrap_or_default() {
                error!("{}", message);
            }
            let exit_code = exit_code_from_error(&e);
            if exit_code == EXIT_CODE_WARNING {
                error!(duration_sec = duration_sec, "s3mv completed with warnings.");
            } else {
                error!(duration_sec = duration_sec, "s3mv failed.");
            }
            exit_code
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusty_fork::rusty_fork_test;

    #[test]
    fn unsupported_scheme_is_a_configuration_error() {
        let e = load_config(["s3mv", "gs://landing/in/", "s3://archive/"]).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::ValueValidation);
        assert_eq!(exit_code_for_load_error(&e), EXIT_CODE_NO_RETRY);

        let e = load_config(["s3mv", "s3://landing/in/", "gs://archive/"]).unwrap_err();
        assert_eq!(exit_code_for_load_error(&e), EXIT_CODE_NO_RETRY);
    }

    #[test]
    fn usage_errors_are_configuration_errors() {
        let e = load_config(["s3mv", "s3://landing/in/"]).unwrap_err();
        assert_eq!(exit_code_for_load_error(&e), EXIT_CODE_NO_RETRY);

        let e = load_config(["s3mv", "--no-such-flag", "s3://a/", "s3://b/"]).unwrap_err();
        assert_eq!(exit_code_for_load_error(&e), EXIT_CODE_NO_RETRY);
    }

    #[test]
    fn invalid_config_message_ends_with_newline() {
        let e = load_config(["s3mv", "s3://bucket/data/", "s3://bucket/data/archive/"])
            .unwrap_err();
        assert_eq!(exit_code_for_load_error(&e), EXIT_CODE_NO_RETRY);
        assert!(e.to_string().ends_with('\n'));
    }

    #[test]
    fn help_and_version_exit_successfully() {
        let e = load_config(["s3mv", "--help"]).unwrap_err();
        assert_eq!(exit_code_for_load_error(&e), 0);

        let e = load_config(["s3mv", "--version"]).unwrap_err();
        assert_eq!(exit_code_for_load_error(&e), 0);
    }

    rusty_fork_test! {
        #[test]
        fn with_tracing() {
            let args = vec![
                "s3mv",
                "-v",
                "s3://source-bucket/prefix/",
                "s3://target-bucket/prefix/",
            ];

            let config = load_config(args).unwrap();
            assert!(start_tracing_if_necessary(&config));
        }

        #[test]
        fn without_tracing() {
            let args = vec![
                "s3mv",
                "-qq",
                "s3://source-bucket/prefix/",
                "s3://target-bucket/prefix/",
            ];

            let config = load_config(args).unwrap();
            assert!(!start_tracing_if_necessary(&config));
        }
    }
}
