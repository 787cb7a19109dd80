//! Tracing setup and structured process events.

use std::io::IsTerminal;

use tracing::{Level, error, info, span};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Whether diagnostics on stderr may be colored.
///
/// True only if stderr is a terminal and `NO_COLOR` is not set.
#[must_use]
pub fn use_color() -> bool {
    std::io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none()
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the defaults. Verbose mode logs shepherd at debug
/// level with targets and span-close timings; otherwise a compact format
/// without targets is used.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(verbose: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            if verbose {
                EnvFilter::try_new("shepherd=debug,shepherd_runner=debug,info")
            } else {
                EnvFilter::try_new("shepherd=info,shepherd_runner=info,warn")
            }
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(use_color())
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false);

    if verbose {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                layer
                    .with_target(true)
                    .with_thread_names(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(layer.with_target(false).compact())
            .try_init()?;
    }

    Ok(())
}

/// Span covering one supervised process.
#[must_use]
pub fn process_span(command: &str) -> tracing::Span {
    span!(Level::INFO, "process", command = %command)
}

pub fn log_process_spawned(pid: u32, command: &str) {
    info!(pid, command = %command, "Process spawned");
}

pub fn log_process_completed(pid: u32, exit_code: i32, duration_ms: u128) {
    info!(pid, exit_code, duration_ms = %duration_ms, "Process completed");
}

pub fn log_process_failed(pid: Option<u32>, error: &str, duration_ms: u128) {
    error!(
        pid = pid.unwrap_or_default(),
        duration_ms = %duration_ms,
        error = %error,
        "Process failed"
    );
}
