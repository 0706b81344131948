// Subscriber setup for the s3mv binary. Events go to stdout.

use std::env;
use std::io::IsTerminal;

use tracing_subscriber::fmt::format::FmtSpan;

use s3mv_rs::config::TracingConfig;

const EVENT_FILTER_ENV_VAR: &str = "RUST_LOG";

const OWN_TARGETS: &[&str] = &["s3mv_rs", "s3mv"];
const AWS_SDK_TARGETS: &[&str] = &["aws_smithy_runtime", "aws_config", "aws_sigv4"];

fn directives(targets: &[&str], level: log::Level) -> String {
    targets
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Returns the filter directives and whether event targets are shown.
///
/// `--aws-sdk-tracing` takes precedence over `RUST_LOG`.
fn event_filter(config: &TracingConfig) -> (String, bool) {
    let level = config.tracing_level;

    if config.aws_sdk_tracing {
        let targets: Vec<&str> = OWN_TARGETS.iter().chain(AWS_SDK_TARGETS).copied().collect();
        return (directives(&targets, level), true);
    }

    match env::var(EVENT_FILTER_ENV_VAR) {
        Ok(filter) => (filter, true),
        Err(_) => (directives(OWN_TARGETS, level), false),
    }
}

pub fn init_tracing(config: &TracingConfig) {
    let span_events = if config.span_events_tracing {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };
    let ansi = !config.disable_color_tracing && std::io::stdout().is_terminal();
    let (filter, show_target) = event_filter(config);

    let builder = tracing_subscriber::fmt()
        .compact()
        .with_writer(std::io::stdout)
        .with_env_filter(filter)
        .with_target(show_target)
        .with_ansi(ansi)
        .with_span_events(span_events);

    if config.json_tracing {
        builder.json().init();
    } else {
        builder.init();
    }
}
