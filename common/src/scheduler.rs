//! Worker pool scheduler and completion reaper
//!
//! All orchestration state lives in one [`SchedulerState`] owned by the single control flow and
//! passed by `&mut` to the dispatcher, the reaper and the retry controller. Outstanding task
//! records carry the worker slot they were admitted with; dropping a record on reap is the only
//! way a slot gets released, so a slot can never be freed twice.

use std::collections::{BTreeMap, HashMap};
use tracing::instrument;

use crate::artifacts::WorkDir;
use crate::executor::{Launcher, TaskHandle, TaskId, TaskSpec};
use crate::hosts::{Host, HostStatus};
use crate::progress::{LaunchEvent, ProgressSink};

/// Success/failure bookkeeping. Host lists hold positions in the host list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tally {
    pub success_count: usize,
    pub fail_count: usize,
    pub completed_hosts: Vec<usize>,
    pub failed_hosts: Vec<usize>,
}

#[derive(Debug)]
struct Outstanding {
    handle: TaskHandle,
    _slot: Option<throttle::Slot>,
}

#[derive(Debug)]
pub struct SchedulerState {
    hosts: Vec<Host>,
    outstanding: BTreeMap<TaskId, Outstanding>,
    reverse: HashMap<TaskId, usize>,
    tally: Tally,
    peak_outstanding: usize,
}

impl SchedulerState {
    #[must_use]
    pub fn new(names: Vec<String>) -> Self {
        Self {
            hosts: names.into_iter().map(Host::new).collect(),
            outstanding: BTreeMap::new(),
            reverse: HashMap::new(),
            tally: Tally::default(),
            peak_outstanding: 0,
        }
    }

    #[must_use]
    pub fn hosts(&self) -> &[Host] {
        &self.hosts
    }

    #[must_use]
    pub fn tally(&self) -> &Tally {
        &self.tally
    }

    /// Number of tasks launched through the pool and not yet reaped.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    /// Highest number of simultaneously outstanding tasks seen so far.
    #[must_use]
    pub fn peak_outstanding(&self) -> usize {
        self.peak_outstanding
    }

    #[must_use]
    pub fn host_of(&self, id: TaskId) -> Option<usize> {
        self.reverse.get(&id).copied()
    }

    /// Builds the task description for the next attempt of host `index` and marks it running.
    pub fn begin_attempt(&mut self, index: usize, attempt: u32, work_dir: &WorkDir) -> TaskSpec {
        let host = &mut self.hosts[index];
        host.attempt = attempt;
        host.status = HostStatus::Running;
        TaskSpec {
            index,
            host: host.name.clone(),
            attempt,
            paths: work_dir.paths(index, &host.name, attempt),
        }
    }

    /// Tracks a launched task until it is reaped.
    pub fn register(&mut self, index: usize, handle: TaskHandle, slot: Option<throttle::Slot>) {
        debug_assert!(
            !self.reverse.values().any(|&host| host == index),
            "host {index} already has an outstanding task"
        );
        let id = handle.id;
        self.reverse.insert(id, index);
        self.insert_record(handle, slot);
        tracing::trace!("registered {} for host #{}", id, index);
    }

    fn insert_record(&mut self, handle: TaskHandle, slot: Option<throttle::Slot>) {
        let previous = self.outstanding.insert(
            handle.id,
            Outstanding {
                handle,
                _slot: slot,
            },
        );
        debug_assert!(previous.is_none(), "task identity reused while outstanding");
        self.peak_outstanding = self.peak_outstanding.max(self.outstanding.len());
    }

    #[cfg(test)]
    pub(crate) fn insert_unmapped(&mut self, handle: TaskHandle, slot: Option<throttle::Slot>) {
        self.insert_record(handle, slot);
    }

    pub fn record_success(&mut self, index: usize) {
        self.hosts[index].status = HostStatus::Succeeded;
        self.tally.success_count += 1;
        self.tally.completed_hosts.push(index);
    }

    pub fn record_failure(&mut self, index: usize) {
        self.hosts[index].status = HostStatus::Failed;
        self.tally.fail_count += 1;
        self.tally.failed_hosts.push(index);
    }

    /// Marks a host that is still queued for retry as failed again, without touching the tally.
    pub fn keep_failed(&mut self, index: usize) {
        debug_assert!(self.tally.failed_hosts.contains(&index));
        self.hosts[index].status = HostStatus::Failed;
    }

    /// Moves a host that succeeded on retry from the failed list to the completed list.
    pub fn promote(&mut self, index: usize) {
        let Some(position) = self.tally.failed_hosts.iter().position(|&host| host == index) else {
            tracing::warn!("host #{} is not queued for retry, ignoring promotion", index);
            return;
        };
        self.tally.failed_hosts.remove(position);
        self.tally.fail_count = self.tally.fail_count.saturating_sub(1);
        self.record_success(index);
    }

    fn finished_tasks(&self) -> Vec<TaskId> {
        self.outstanding
            .iter()
            .filter(|(_, record)| !record.handle.is_alive())
            .map(|(id, _)| *id)
            .collect()
    }
}

/// Launch context shared by the dispatcher and the retry controller.
pub struct Dispatcher<'a> {
    pub launcher: &'a dyn Launcher,
    pub work_dir: &'a WorkDir,
    pub progress: &'a dyn ProgressSink,
}

/// Collects every finished outstanding task and returns how many were reaped.
///
/// Tasks that are still running are left alone, so calling this again without any task
/// finishing in between changes nothing.
pub async fn reap(state: &mut SchedulerState, progress: &dyn ProgressSink) -> usize {
    let finished = state.finished_tasks();
    for id in &finished {
        let Some(record) = state.outstanding.remove(id) else {
            continue;
        };
        let Outstanding {
            handle,
            _slot: slot,
        } = record;
        let channel = handle.join().await;
        // the slot goes back to the pool here, whatever the outcome
        drop(slot);
        let Some(index) = state.reverse.remove(id) else {
            tracing::warn!(
                "reaped orphan task {} with no host mapping (result file {:?}), counting it as a failure",
                id,
                channel.path()
            );
            state.tally.fail_count += 1;
            continue;
        };
        let outcome = channel.outcome().await;
        let host = &state.hosts[index];
        tracing::info!("{} (attempt {}): {}", &host.name, host.attempt, outcome);
        progress.finished(&host.name, host.attempt, outcome);
        if outcome.is_success() {
            state.record_success(index);
        } else {
            state.record_failure(index);
        }
    }
    finished.len()
}

/// Initial pass: launches one task per host in list order, never more than the pool allows at
/// once, then waits until every launched task has been reaped.
#[instrument(skip_all, fields(hosts = state.hosts.len(), max_parallel = pool.capacity()))]
pub async fn dispatch(
    state: &mut SchedulerState,
    ctx: &Dispatcher<'_>,
    pool: &throttle::SlotPool,
    poll_interval: std::time::Duration,
) {
    ctx.progress.start(state.hosts.len());
    for index in 0..state.hosts.len() {
        let slot = loop {
            if let Some(slot) = pool.try_acquire() {
                break slot;
            }
            tokio::time::sleep(poll_interval).await;
            reap(state, ctx.progress).await;
        };
        let task = state.begin_attempt(index, 1, ctx.work_dir);
        match ctx.launcher.launch(&task) {
            Ok(handle) => {
                let id = handle.id;
                state.register(index, handle, Some(slot));
                let event = LaunchEvent {
                    host: &task.host,
                    id,
                    attempt: task.attempt,
                    occupied: state.outstanding(),
                    capacity: Some(pool.capacity()),
                };
                tracing::info!("{}", event);
                ctx.progress.launched(&event);
            }
            Err(error) => {
                drop(slot);
                tracing::error!("{}: launch failed: {:#}", &task.host, error);
                ctx.progress.launch_failed(&task.host, task.attempt, &error);
                state.record_failure(index);
            }
        }
    }
    while state.outstanding() > 0 {
        tokio::time::sleep(poll_interval).await;
        reap(state, ctx.progress).await;
    }
    tracing::debug!(
        "initial pass done, peak outstanding: {}",
        state.peak_outstanding()
    );
}
