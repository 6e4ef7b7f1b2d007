//! proxy-delegate - delegate an X.509 proxy to a delegation endpoint
//!
//! Reads `delegation.yaml` (and the usual `X509_*` environment variables),
//! runs one delegation attempt and prints the delegation identifier on
//! success.

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use proxy_delegation::config::{LogFormat, LogTarget, LoggingConfig};
use proxy_delegation::{delegate, DelegationConfig, DelegationContext};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (before logging, so we know log format)
    let config = DelegationConfig::load().context("Failed to load configuration")?;

    // The guard must be kept alive so buffered log lines reach the file
    let _log_guard = init_logging(&config.logging);

    let request = config.to_request()?;
    let ctx = DelegationContext::from_config(&config);

    info!(endpoint = %request.endpoint, lifetime_secs = request.lifetime.as_secs(), "Delegating proxy");

    let id = delegate(&ctx, &request).await?;

    info!(delegation_id = %id, "Delegation complete");
    println!("{}", id);

    Ok(())
}

/// Initialize logging based on configuration
///
/// Console output goes to stderr; stdout only carries the delegation id.
fn init_logging(log_config: &LoggingConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{prelude::*, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_config.level));

    let mut layers = Vec::new();
    let mut guard = None;

    if matches!(log_config.target, LogTarget::Console | LogTarget::Both) {
        layers.push(format_layer(&log_config.format, std::io::stderr));
    }
    if matches!(log_config.target, LogTarget::File | LogTarget::Both) {
        let (writer, file_guard) = create_file_writer(log_config);
        layers.push(format_layer(&log_config.format, writer));
        guard = Some(file_guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .init();

    guard
}

/// Create a file writer with optional daily rotation
fn create_file_writer(
    log_config: &LoggingConfig,
) -> (
    tracing_appender::non_blocking::NonBlocking,
    tracing_appender::non_blocking::WorkerGuard,
) {
    // Ensure log directory exists
    if let Err(e) = std::fs::create_dir_all(&log_config.log_dir) {
        eprintln!(
            "Warning: Failed to create log directory {:?}: {}",
            log_config.log_dir, e
        );
    }

    let file_appender = if log_config.daily_rotation {
        tracing_appender::rolling::daily(&log_config.log_dir, &log_config.log_prefix)
    } else {
        tracing_appender::rolling::never(&log_config.log_dir, &log_config.log_prefix)
    };

    tracing_appender::non_blocking(file_appender)
}

/// One fmt layer in the configured format
fn format_layer<S, W>(format: &LogFormat, writer: W) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    use tracing_subscriber::fmt;

    match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_writer(writer)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(false)
            .with_writer(writer)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .with_writer(writer)
            .boxed(),
    }
}
