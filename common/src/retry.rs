//! Retry controller
//!
//! Hosts left failed after the initial pass are re-run in bounded rounds. A round launches every
//! still-failed host at once, without going through the worker pool, and joins each task
//! directly.

use tracing::instrument;

use crate::progress::LaunchEvent;
use crate::scheduler::{Dispatcher, SchedulerState};

/// Runs up to `rounds` retry rounds and returns how many were actually run.
///
/// Round `n` runs attempt `n + 1`; the initial pass is round 0. `delay` is waited between
/// consecutive rounds, including between the initial pass and round 1.
#[instrument(skip(state, ctx))]
pub async fn retry_failed(
    state: &mut SchedulerState,
    ctx: &Dispatcher<'_>,
    rounds: u32,
    delay: std::time::Duration,
) -> u32 {
    let mut completed_rounds = 0;
    for round in 1..=rounds {
        let pending = state.tally().failed_hosts.clone();
        if pending.is_empty() {
            tracing::debug!("nothing left to retry");
            break;
        }
        tokio::time::sleep(delay).await;
        let attempt = round + 1;
        tracing::info!(
            "retry round {}/{}: {} host(s), attempt {}",
            round,
            rounds,
            pending.len(),
            attempt
        );
        ctx.progress.round_started(round, rounds, pending.len());
        let mut launched = Vec::with_capacity(pending.len());
        for index in pending {
            let task = state.begin_attempt(index, attempt, ctx.work_dir);
            match ctx.launcher.launch(&task) {
                Ok(handle) => {
                    let event = LaunchEvent {
                        host: &task.host,
                        id: handle.id,
                        attempt,
                        occupied: launched.len() + 1,
                        capacity: None,
                    };
                    tracing::info!("{}", event);
                    ctx.progress.launched(&event);
                    launched.push((index, handle));
                }
                Err(error) => {
                    tracing::error!("{}: launch failed: {:#}", &task.host, error);
                    ctx.progress.launch_failed(&task.host, attempt, &error);
                    state.keep_failed(index);
                }
            }
        }
        for (index, handle) in launched {
            let outcome = handle.join().await.outcome().await;
            let name = &state.hosts()[index].name;
            tracing::info!("{} (attempt {}): {}", name, attempt, outcome);
            ctx.progress.finished(name, attempt, outcome);
            if outcome.is_success() {
                state.promote(index);
            } else {
                state.keep_failed(index);
            }
        }
        completed_rounds = round;
    }
    completed_rounds
}
