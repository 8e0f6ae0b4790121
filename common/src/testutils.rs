//! Test doubles for the orchestrator: a launcher that plays back scripted outcomes instead of
//! spawning processes, and a progress sink that records what it was told.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::classify::{Classifier, LogScanClassifier};
use crate::executor::{Launcher, TaskHandle, TaskId, TaskSpec};
use crate::progress::{LaunchEvent, ProgressSink};
use crate::result_channel::{Outcome, ResultChannel};

/// Outcome of one scripted attempt.
#[derive(Debug, Clone, Default)]
pub struct Script {
    /// Raw exit status; `None` means the task ends without publishing anything
    status: Option<u32>,
    log: String,
    delay: Option<std::time::Duration>,
}

impl Script {
    pub fn exit(status: u32) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn vanish() -> Self {
        Self::default()
    }

    pub fn log(mut self, log: &str) -> Self {
        self.log = log.to_string();
        self
    }

    pub fn delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[derive(Debug, Clone)]
pub struct Span {
    pub host: String,
    pub attempt: u32,
    pub start: std::time::Instant,
    pub end: std::time::Instant,
}

/// Launcher that runs each attempt as a tokio task following its [`Script`].
///
/// Attempts without a script exit 0 with an empty log. Log and status artifacts are written to
/// the task's real paths, and the raw status goes through the default log classifier.
#[derive(Debug)]
pub struct ScriptedLauncher {
    scripts: HashMap<(String, u32), Script>,
    spawn_failures: HashSet<(String, Option<u32>)>,
    default_delay: std::time::Duration,
    classifier: Arc<dyn Classifier>,
    next_id: AtomicU32,
    running: Arc<AtomicUsize>,
    peak_running: Arc<AtomicUsize>,
    launches: Mutex<Vec<(String, u32)>>,
    spans: Arc<Mutex<Vec<Span>>>,
}

impl ScriptedLauncher {
    pub fn new() -> Self {
        Self {
            scripts: HashMap::new(),
            spawn_failures: HashSet::new(),
            default_delay: std::time::Duration::from_millis(5),
            classifier: Arc::new(LogScanClassifier::new(std::path::Path::new("scp"))),
            next_id: AtomicU32::new(1000),
            running: Arc::new(AtomicUsize::new(0)),
            peak_running: Arc::new(AtomicUsize::new(0)),
            launches: Mutex::new(Vec::new()),
            spans: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn script(mut self, host: &str, attempt: u32, script: Script) -> Self {
        self.scripts.insert((host.to_string(), attempt), script);
        self
    }

    pub fn default_delay(mut self, delay: std::time::Duration) -> Self {
        self.default_delay = delay;
        self
    }

    /// Every launch for `host` fails.
    pub fn fail_spawn(mut self, host: &str) -> Self {
        self.spawn_failures.insert((host.to_string(), None));
        self
    }

    pub fn fail_spawn_attempt(mut self, host: &str, attempt: u32) -> Self {
        self.spawn_failures.insert((host.to_string(), Some(attempt)));
        self
    }

    /// Successful launches in launch order.
    pub fn launches(&self) -> Vec<(String, u32)> {
        self.launches.lock().unwrap().clone()
    }

    pub fn peak_running(&self) -> usize {
        self.peak_running.load(Ordering::SeqCst)
    }

    /// Start and end of every finished attempt, in order of completion.
    pub fn spans(&self) -> Vec<Span> {
        self.spans.lock().unwrap().clone()
    }

    fn fails_to_spawn(&self, task: &TaskSpec) -> bool {
        self.spawn_failures.contains(&(task.host.clone(), None))
            || self
                .spawn_failures
                .contains(&(task.host.clone(), Some(task.attempt)))
    }
}

impl Default for ScriptedLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl Launcher for ScriptedLauncher {
    fn launch(&self, task: &TaskSpec) -> anyhow::Result<TaskHandle> {
        if self.fails_to_spawn(task) {
            return Err(anyhow::anyhow!("scripted spawn failure for {}", task.host));
        }
        let script = self
            .scripts
            .get(&(task.host.clone(), task.attempt))
            .cloned()
            .unwrap_or_else(|| Script::exit(0));
        let channel = ResultChannel::new(task.paths.status.clone());
        channel.clear()?;
        std::fs::write(&task.paths.log, &script.log)?;
        let id = TaskId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.launches
            .lock()
            .unwrap()
            .push((task.host.clone(), task.attempt));
        let now_running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_running.fetch_max(now_running, Ordering::SeqCst);
        let delay = script.delay.unwrap_or(self.default_delay);
        let start = std::time::Instant::now();
        let join = tokio::spawn({
            let channel = channel.clone();
            let classifier = self.classifier.clone();
            let running = self.running.clone();
            let spans = self.spans.clone();
            let host = task.host.clone();
            let attempt = task.attempt;
            async move {
                tokio::time::sleep(delay).await;
                running.fetch_sub(1, Ordering::SeqCst);
                spans.lock().unwrap().push(Span {
                    host,
                    attempt,
                    start,
                    end: std::time::Instant::now(),
                });
                if let Some(status) = script.status {
                    let status = classifier.classify(status, &script.log);
                    channel.publish(status).await.unwrap();
                }
            }
        });
        Ok(TaskHandle::new(id, channel, join))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedLaunch {
    pub host: String,
    pub id: TaskId,
    pub attempt: u32,
    pub occupied: usize,
    pub capacity: Option<usize>,
}

#[derive(Debug, Default)]
pub struct RecordingProgress {
    launches: Mutex<Vec<RecordedLaunch>>,
    launch_failures: Mutex<Vec<(String, u32)>>,
    outcomes: Mutex<Vec<(String, u32, Outcome)>>,
    rounds: Mutex<Vec<(u32, u32, usize)>>,
}

impl RecordingProgress {
    pub fn launch_events(&self) -> Vec<RecordedLaunch> {
        self.launches.lock().unwrap().clone()
    }

    pub fn launch_failures(&self) -> Vec<(String, u32)> {
        self.launch_failures.lock().unwrap().clone()
    }

    pub fn outcomes(&self) -> Vec<(String, u32, Outcome)> {
        self.outcomes.lock().unwrap().clone()
    }

    pub fn rounds(&self) -> Vec<(u32, u32, usize)> {
        self.rounds.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingProgress {
    fn launched(&self, event: &LaunchEvent<'_>) {
        self.launches.lock().unwrap().push(RecordedLaunch {
            host: event.host.to_string(),
            id: event.id,
            attempt: event.attempt,
            occupied: event.occupied,
            capacity: event.capacity,
        });
    }

    fn launch_failed(&self, host: &str, attempt: u32, _error: &anyhow::Error) {
        self.launch_failures
            .lock()
            .unwrap()
            .push((host.to_string(), attempt));
    }

    fn finished(&self, host: &str, attempt: u32, outcome: Outcome) {
        self.outcomes
            .lock()
            .unwrap()
            .push((host.to_string(), attempt, outcome));
    }

    fn round_started(&self, round: u32, rounds: u32, hosts: usize) {
        self.rounds.lock().unwrap().push((round, rounds, hosts));
    }
}
