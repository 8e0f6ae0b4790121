//! Final-status classification from exit status and transcript
//!
//! Transfer tools can exit 0 after a failed transfer (e.g. when the remote side reports a
//! permission problem), so a zero exit status is confirmed against the task's log before it
//! counts as success.

/// Phrases that mark a transcript as failed, matched case-insensitively.
pub const ERROR_PHRASES: [&str; 6] = [
    "permission denied",
    "connection refused",
    "no such file or directory",
    "host key verification failed",
    "operation timed out",
    "authentication failed",
];

/// Status published when a zero exit status is overridden by the transcript.
pub const OVERRIDE_STATUS: u32 = 1;

/// Maps a raw exit status and the task's transcript to the status that gets published.
pub trait Classifier: std::fmt::Debug + Send + Sync {
    fn classify(&self, exit_status: u32, log: &str) -> u32;
}

/// Default classifier: scans non-debug transcript lines for [`ERROR_PHRASES`] and for error
/// lines reported by the transfer tool itself (`<tool>: ... error ...`).
#[derive(Debug, Clone)]
pub struct LogScanClassifier {
    tool_prefix: String,
}

impl LogScanClassifier {
    /// `tool` may be a bare name or a path; only its file name is used for the prefix.
    #[must_use]
    pub fn new(tool: &std::path::Path) -> Self {
        let name = tool
            .file_name()
            .map(|name| name.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        Self {
            tool_prefix: format!("{name}:"),
        }
    }

    /// Returns the first line that marks the transcript as failed.
    #[must_use]
    pub fn find_error<'a>(&self, log: &'a str) -> Option<&'a str> {
        log.lines().find(|line| {
            let lowered = line.trim_start().to_ascii_lowercase();
            if lowered.starts_with("debug") {
                return false;
            }
            ERROR_PHRASES.iter().any(|phrase| lowered.contains(phrase))
                || (lowered.starts_with(&self.tool_prefix) && lowered.contains("error"))
        })
    }
}

impl Classifier for LogScanClassifier {
    fn classify(&self, exit_status: u32, log: &str) -> u32 {
        if exit_status != 0 {
            return exit_status;
        }
        match self.find_error(log) {
            Some(line) => {
                tracing::debug!("exit status 0 overridden by transcript line: {:?}", line);
                OVERRIDE_STATUS
            }
            None => 0,
        }
    }
}
