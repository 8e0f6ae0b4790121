use tracing::instrument;

use crate::aggregate::{Report, aggregate};
use crate::artifacts::WorkDir;
use crate::config::{ConfigError, FanoutSettings};
use crate::executor::Launcher;
use crate::progress::ProgressSink;
use crate::retry::retry_failed;
use crate::scheduler::{Dispatcher, SchedulerState, dispatch};

/// Runs one transfer per host with bounded parallelism, retries failures and reports.
///
/// Per-host failures are part of the report, not errors; an error means the run could not be
/// set up.
#[instrument(skip(hosts, launcher, work_dir, progress), fields(hosts = hosts.len()))]
pub async fn fanout(
    hosts: Vec<String>,
    launcher: &dyn Launcher,
    work_dir: &WorkDir,
    settings: &FanoutSettings,
    progress: &dyn ProgressSink,
) -> anyhow::Result<Report> {
    settings.validate()?;
    if hosts.is_empty() {
        return Err(ConfigError::EmptyHostList.into());
    }
    let start = std::time::Instant::now();
    let ctx = Dispatcher {
        launcher,
        work_dir,
        progress,
    };
    let pool = throttle::SlotPool::new(settings.max_parallel);
    let mut state = SchedulerState::new(hosts);
    dispatch(&mut state, &ctx, &pool, settings.poll_interval).await;
    retry_failed(&mut state, &ctx, settings.retries, settings.retry_delay).await;
    progress.done();
    let mut report = aggregate(&state, start.elapsed());
    if settings.keep_artifacts {
        report.artifacts = Some(work_dir.root().to_path_buf());
    } else if let Err(error) = work_dir.purge(state.hosts()).await {
        tracing::warn!("failed cleaning up artifacts: {:#}", error);
    }
    Ok(report)
}
