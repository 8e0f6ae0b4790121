//! Common utilities for the `fcp` fan-out copy tool
//!
//! This crate contains the orchestration engine behind `fcp`: it runs one transfer (by default an
//! `scp` invocation) per remote host, bounds how many run at once, works out from exit status and
//! transcript whether each transfer really succeeded, retries failures in bounded rounds and
//! produces a final report.
//!
//! # Overview
//!
//! The engine is built from small parts, leaves first:
//!
//! - [`result_channel`] - write-once, atomically published per-task exit status
//! - [`executor`] - runs one transfer attempt for one host and publishes its classified status
//! - [`classify`] - turns an exit status plus transcript into a final status
//! - [`scheduler`] - admits tasks up to the parallelism cap and reaps finished ones
//! - [`retry`] - re-runs failed hosts in bounded rounds
//! - [`aggregate`] - reconciles the tally into a [`Report`]
//! - [`artifacts`] - per-task log/status file naming and cleanup
//!
//! [`fanout()`] ties these together.
//!
//! # Concurrency
//!
//! Every transfer is a separate OS process. A small tokio task per transfer waits for the
//! process and publishes its result; everything else runs on a single control flow that owns
//! all bookkeeping, so no locks are needed.
//!
//! # Logging
//!
//! [`run`] sets up a `tracing` subscriber writing to stderr. Verbosity follows the `-v` count
//! (`ERROR`, then `INFO`, `DEBUG`, `TRACE`) and `RUST_LOG` overrides it unless output is quiet.

pub mod aggregate;
pub mod artifacts;
pub mod classify;
pub mod config;
pub mod credential;
pub mod executor;
pub mod fanout;
pub mod hosts;
pub mod progress;
pub mod result_channel;
pub mod retry;
pub mod scheduler;

#[cfg(test)]
pub mod testutils;

pub use aggregate::Report;
pub use config::{ConfigError, FanoutSettings, OutputConfig, RuntimeConfig};
pub use fanout::fanout;
pub use hosts::read_host_list;
pub use progress::ProgressType;

fn log_level(output: &OutputConfig) -> &'static str {
    if output.quiet {
        return "off";
    }
    match output.verbose {
        0 => "error",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Sets up logging and the tokio runtime, then runs `func` to completion.
///
/// Returns `None` if the runtime could not be built or `func` failed; the error is logged.
/// On success the summary is printed to stdout when `output.print_summary` is set.
pub fn run<Fut, Summary>(
    output: OutputConfig,
    runtime: RuntimeConfig,
    func: impl FnOnce() -> Fut,
) -> Option<Summary>
where
    Summary: std::fmt::Display,
    Fut: std::future::Future<Output = anyhow::Result<Summary>>,
{
    // RUST_LOG overrides -v but never --quiet
    let filter = if output.quiet {
        tracing_subscriber::EnvFilter::new(log_level(&output))
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level(&output)))
    };
    if let Err(error) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
    {
        eprintln!("failed to initialize logging: {error}");
    }
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if runtime.max_workers > 0 {
        builder.worker_threads(runtime.max_workers);
    }
    if runtime.max_blocking_threads > 0 {
        builder.max_blocking_threads(runtime.max_blocking_threads);
    }
    let runtime = match builder.build() {
        Ok(runtime) => runtime,
        Err(error) => {
            tracing::error!("failed to create tokio runtime: {}", error);
            return None;
        }
    };
    match runtime.block_on(func()) {
        Ok(summary) => {
            if output.print_summary {
                println!("{summary}");
            }
            Some(summary)
        }
        Err(error) => {
            tracing::error!("{:#}", error);
            None
        }
    }
}
