/*!
# Overview
s3mv-rs continuously moves objects from one S3 location to another.
Every object discovered under a source root is read, written under a
target root with the same relative key, and deleted from the source once
the write has succeeded.

## Features
- **Staged pipeline**: discovery, throttling, read, write and delete run as
  independent stages joined by bounded channels, with a worker pool per
  I/O stage
- **Rate shaping**: a token bucket limits how many objects enter the
  pipeline per second, with a configurable burst
- **Safe ordering**: a source object is deleted only after its copy has been
  written
- **Graceful shutdown**: cancelling stops discovery while objects already in
  flight are written and deleted
- **Metrics**: per-root counters tagged with bucket, key, stream kind and
  stream id
- **Library-First**: the s3mv CLI is a thin wrapper over this library

## As a Library

```toml
[dependencies]
s3mv-rs = "0.1"
tokio = { version = "1", features = ["full"] }
```

```no_run
use std::sync::Arc;

use s3mv_rs::config::Config;
use s3mv_rs::config::args::parse_from_args;
use s3mv_rs::metrics::InMemoryMetricsService;
use s3mv_rs::storage::create_storage_pair;
use s3mv_rs::{MigrationPipeline, create_pipeline_cancellation_token};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = vec!["s3mv", "s3://landing/incoming/", "s3://archive/2024/", "--once"];

    let config = Config::try_from(parse_from_args(args)?).map_err(anyhow::Error::msg)?;
    let (source, target) = create_storage_pair(&config).await?;
    let cancellation_token = create_pipeline_cancellation_token();

    let mut pipeline = MigrationPipeline::new(
        config,
        source,
        target,
        Arc::new(InMemoryMetricsService::new()),
        cancellation_token,
    )?;

    if let Err(e) = pipeline.run().await {
        eprintln!("{e:#}");
    }
    println!("{:?}", pipeline.get_stats());
    Ok(())
}
```
*/

#![allow(clippy::collapsible_if)]

pub mod config;
pub mod enumerator;
pub mod metrics;
pub mod pipeline;
pub mod reader;
pub mod remover;
pub mod stage;
pub mod storage;
pub mod supervisor;
pub mod throttle;
pub mod types;
pub mod writer;

#[cfg(test)]
mod test_utils;

pub use config::Config;
pub use config::args::CLIArgs;
pub use metrics::{InMemoryMetricsService, MetricsService};
pub use pipeline::MigrationPipeline;
pub use types::error::{S3mvError, exit_code_from_error, is_cancelled_error};
pub use types::token::{PipelineCancellationToken, create_pipeline_cancellation_token};
pub use types::{MigrationStats, StoragePath};
