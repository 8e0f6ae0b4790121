//! Task executor: runs one transfer attempt for one host
//!
//! A launch spawns the transfer tool (or the credential driver wrapping it) with all output
//! going to the task's log artifact, then hands the child to a small tokio task that waits for
//! it, classifies the outcome and publishes the final status on the task's result channel.
//! The orchestrator never touches the child again; it only watches the tokio task's liveness
//! and reads the result channel.

use anyhow::{Context, anyhow};
use std::ffi::OsString;
use tracing::instrument;

use crate::artifacts::ArtifactPaths;
use crate::classify::Classifier;
use crate::config::ConfigError;
use crate::credential::Credential;
use crate::result_channel::ResultChannel;

/// Status used when no exit status can be determined for a finished process.
pub const UNKNOWN_STATUS: u32 = 255;

/// Line the credential driver appends to the log with the wrapped command's exit status.
pub const DRIVER_EXIT_MARKER: &str = "fcp-driver-exit:";

/// Environment variable carrying the credential into the driver process.
pub const DRIVER_SECRET_ENV: &str = "FCP_DRIVER_SECRET";

/// `expect` script answering password, host-key and confirmation prompts.
///
/// The wrapped command is passed as the script's arguments, the password through the
/// environment.
const DRIVER_SCRIPT: &str = r#"set timeout -1
log_user 1
set secret $env(FCP_DRIVER_SECRET)
spawn -noecho {*}$argv
expect {
    -nocase "(yes/no" { send -- "yes\r"; exp_continue }
    -nocase "are you sure" { send -- "yes\r"; exp_continue }
    -nocase -re "password\[^\n\]*:" { send -- "$secret\r"; exp_continue }
    eof
}
set result [wait]
set code [lindex $result 3]
if {[lindex $result 2] == -1} { set code 255 }
puts "fcp-driver-exit: $code"
exit $code
"#;

/// Process id of the spawned transfer (or driver) process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u32);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pid {}", self.0)
    }
}

/// What to run: one attempt for one host.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    /// Position of the host in the host list
    pub index: usize,
    pub host: String,
    pub attempt: u32,
    pub paths: ArtifactPaths,
}

/// An outstanding task as seen by the orchestrator.
#[derive(Debug)]
pub struct TaskHandle {
    pub id: TaskId,
    pub channel: ResultChannel,
    join: tokio::task::JoinHandle<()>,
}

impl TaskHandle {
    #[must_use]
    pub fn new(id: TaskId, channel: ResultChannel, join: tokio::task::JoinHandle<()>) -> Self {
        Self { id, channel, join }
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        !self.join.is_finished()
    }

    /// Waits for the task to finish and returns its result channel.
    pub async fn join(self) -> ResultChannel {
        let Self { id, channel, join } = self;
        if let Err(error) = join.await {
            tracing::error!("task {} ended abnormally: {}", id, error);
        }
        channel
    }
}

/// Starts transfer attempts.
///
/// `launch` returns once the attempt runs in the background; an error means nothing was
/// started and no result will ever be published for `task`.
///
/// Launching is synchronous and may do small blocking file operations (log, driver script,
/// stale result cleanup) on the calling runtime thread; the transfer itself never blocks it.
pub trait Launcher {
    fn launch(&self, task: &TaskSpec) -> anyhow::Result<TaskHandle>;
}

/// Transfer tool options accumulated from the command line.
#[derive(Debug, Clone, Default)]
pub struct ToolOptions {
    pub port: Option<u16>,
    pub identity: Option<std::path::PathBuf>,
    pub recursive: bool,
    /// Connection timeout in seconds
    pub connect_timeout: u64,
    /// Forbid interactive prompts (used when no credential driver is involved)
    pub batch_mode: bool,
    /// Ask the tool for protocol debug output
    pub tool_verbose: bool,
    /// Additional `-o` options
    pub extra: Vec<String>,
}

impl ToolOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connect_timeout == 0 {
            return Err(ConfigError::NonPositiveTimeout);
        }
        Ok(())
    }

    #[must_use]
    pub fn to_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        if self.tool_verbose {
            args.push("-v".into());
        }
        if self.recursive {
            args.push("-r".into());
        }
        if let Some(port) = self.port {
            args.push("-P".into());
            args.push(port.to_string().into());
        }
        if let Some(identity) = &self.identity {
            args.push("-i".into());
            args.push(identity.into());
        }
        args.push("-o".into());
        args.push(format!("ConnectTimeout={}", self.connect_timeout).into());
        if self.batch_mode {
            args.push("-o".into());
            args.push("BatchMode=yes".into());
        }
        for option in &self.extra {
            args.push("-o".into());
            args.push(option.into());
        }
        args
    }
}

/// The transfer shared by every host: same tool, options, sources and remote path.
#[derive(Debug, Clone)]
pub struct TransferSpec {
    pub tool: std::path::PathBuf,
    pub options: Vec<OsString>,
    pub sources: Vec<std::path::PathBuf>,
    /// Path on the remote host
    pub destination: String,
    /// Remote user, ignored for hosts that already name one
    pub user: Option<String>,
}

impl TransferSpec {
    /// Remote target for `host`, e.g. `deploy@web1:/srv/app`.
    #[must_use]
    pub fn target(&self, host: &str) -> String {
        let host_part = if host.contains(':') && !host.starts_with('[') {
            format!("[{host}]")
        } else {
            host.to_string()
        };
        match &self.user {
            Some(user) if !host.contains('@') => {
                format!("{}@{}:{}", user, host_part, self.destination)
            }
            _ => format!("{}:{}", host_part, self.destination),
        }
    }

    #[must_use]
    pub fn command_args(&self, host: &str) -> Vec<OsString> {
        let mut args = self.options.clone();
        args.extend(self.sources.iter().map(OsString::from));
        args.push(self.target(host).into());
        args
    }
}

/// Launches real transfers, optionally under the `expect` credential driver.
#[derive(Debug)]
pub struct TransferExecutor {
    spec: TransferSpec,
    credential: Option<Credential>,
    driver: std::path::PathBuf,
    classifier: std::sync::Arc<dyn Classifier>,
}

impl TransferExecutor {
    #[must_use]
    pub fn new(
        spec: TransferSpec,
        credential: Option<Credential>,
        classifier: std::sync::Arc<dyn Classifier>,
    ) -> Self {
        Self {
            spec,
            credential,
            driver: "expect".into(),
            classifier,
        }
    }

    /// Overrides the credential driver binary (default: `expect` from `PATH`).
    #[must_use]
    pub fn with_driver(mut self, driver: std::path::PathBuf) -> Self {
        self.driver = driver;
        self
    }

    fn command(&self, task: &TaskSpec) -> anyhow::Result<tokio::process::Command> {
        let args = self.spec.command_args(&task.host);
        match &self.credential {
            None => {
                let mut command = tokio::process::Command::new(&self.spec.tool);
                command.args(args);
                Ok(command)
            }
            Some(credential) => {
                std::fs::write(&task.paths.driver_script, DRIVER_SCRIPT).with_context(|| {
                    format!(
                        "failed writing driver script {:?}",
                        &task.paths.driver_script
                    )
                })?;
                let mut command = tokio::process::Command::new(&self.driver);
                command
                    .arg("-f")
                    .arg(&task.paths.driver_script)
                    .arg("--")
                    .arg(&self.spec.tool)
                    .args(args)
                    .env(DRIVER_SECRET_ENV, credential.expose());
                Ok(command)
            }
        }
    }

    fn spawn(
        &self,
        task: &TaskSpec,
        channel: &ResultChannel,
    ) -> anyhow::Result<tokio::process::Child> {
        // a status left by an earlier run in the same work directory must not stand in for ours
        channel.clear()?;
        let log = std::fs::File::create(&task.paths.log)
            .with_context(|| format!("failed creating log {:?}", &task.paths.log))?;
        let log_err = log
            .try_clone()
            .with_context(|| format!("failed duplicating log handle {:?}", &task.paths.log))?;
        let mut command = self.command(task)?;
        command
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::from(log))
            .stderr(std::process::Stdio::from(log_err));
        // the command's Debug output would include the driver secret, so log program and args
        tracing::debug!(
            "{}: running {:?} {:?}",
            &task.host,
            command.as_std().get_program(),
            command.as_std().get_args().collect::<Vec<_>>()
        );
        command
            .spawn()
            .with_context(|| format!("failed spawning transfer for {}", &task.host))
    }

    /// Cleans up after a launch that will never publish a result.
    fn abandon(&self, task: &TaskSpec, error: anyhow::Error) -> anyhow::Error {
        if self.credential.is_some() {
            remove_driver_script(&task.paths.driver_script);
        }
        error
    }
}

impl Launcher for TransferExecutor {
    fn launch(&self, task: &TaskSpec) -> anyhow::Result<TaskHandle> {
        let driven = self.credential.is_some();
        let channel = ResultChannel::new(task.paths.status.clone());
        let child = match self.spawn(task, &channel) {
            Ok(child) => child,
            Err(error) => return Err(self.abandon(task, error)),
        };
        let Some(pid) = child.id() else {
            return Err(self.abandon(
                task,
                anyhow!(
                    "transfer for {} exited before it could be tracked",
                    &task.host
                ),
            ));
        };
        let attempt = Attempt {
            host: task.host.clone(),
            attempt: task.attempt,
            log: task.paths.log.clone(),
            channel: channel.clone(),
            driver_script: driven.then(|| task.paths.driver_script.clone()),
            classifier: self.classifier.clone(),
        };
        let join = tokio::spawn(run_attempt(child, attempt));
        Ok(TaskHandle::new(TaskId(pid), channel, join))
    }
}

struct Attempt {
    host: String,
    attempt: u32,
    log: std::path::PathBuf,
    channel: ResultChannel,
    driver_script: Option<std::path::PathBuf>,
    classifier: std::sync::Arc<dyn Classifier>,
}

#[instrument(skip_all, fields(host = %attempt.host, attempt = attempt.attempt))]
async fn run_attempt(mut child: tokio::process::Child, attempt: Attempt) {
    let raw_status = match child.wait().await {
        Ok(status) => exit_status_code(status),
        Err(error) => {
            tracing::error!("failed waiting for transfer: {}", error);
            UNKNOWN_STATUS
        }
    };
    let transcript = match tokio::fs::read(&attempt.log).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(error) => {
            tracing::warn!("failed reading log {:?}: {}", &attempt.log, error);
            String::new()
        }
    };
    let raw_status = match &attempt.driver_script {
        Some(script) => {
            remove_driver_script(script);
            parse_driver_status(&transcript).unwrap_or(raw_status)
        }
        None => raw_status,
    };
    let status = attempt.classifier.classify(raw_status, &transcript);
    tracing::debug!("raw status: {}, final status: {}", raw_status, status);
    if let Err(error) = attempt.channel.publish(status).await {
        tracing::error!("{:#}", error);
        // whatever is there did not come from this attempt
        if let Err(error) = attempt.channel.retract().await {
            tracing::error!("{:#}", error);
        }
    }
}

fn remove_driver_script(path: &std::path::Path) {
    match std::fs::remove_file(path) {
        Err(error) if error.kind() != std::io::ErrorKind::NotFound => {
            tracing::warn!("failed removing driver script {:?}: {}", path, error);
        }
        _ => {}
    }
}

fn exit_status_code(status: std::process::ExitStatus) -> u32 {
    use std::os::unix::process::ExitStatusExt;
    if let Some(code) = status.code() {
        return u32::try_from(code).unwrap_or(UNKNOWN_STATUS);
    }
    status
        .signal()
        .and_then(|signal| u32::try_from(signal).ok())
        .map_or(UNKNOWN_STATUS, |signal| 128 + signal)
}

/// Exit status reported by the credential driver, taken from the last marker line.
#[must_use]
pub fn parse_driver_status(transcript: &str) -> Option<u32> {
    transcript
        .lines()
        .rev()
        .find_map(|line| line.trim().strip_prefix(DRIVER_EXIT_MARKER))
        .and_then(|value| value.trim().parse().ok())
}
