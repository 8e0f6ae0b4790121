//! Progress reporting for the fan-out
//!
//! The orchestrator reports launches and completions to a [`ProgressSink`]. Every sink writes
//! to stderr so the final report on stdout stays machine-readable.

use std::io::IsTerminal;

use crate::executor::TaskId;
use crate::result_channel::Outcome;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ProgressType {
    /// Progress bar if stderr is a terminal, text updates otherwise
    #[default]
    #[value(alias = "Auto")]
    Auto,
    /// Animated progress bar
    #[value(alias = "ProgressBar")]
    ProgressBar,
    /// One line per event, appropriate for logging
    #[value(alias = "TextUpdates")]
    TextUpdates,
}

/// A task that was just launched.
#[derive(Debug, Clone, Copy)]
pub struct LaunchEvent<'a> {
    pub host: &'a str,
    pub id: TaskId,
    pub attempt: u32,
    /// Outstanding tasks including this one
    pub occupied: usize,
    /// Concurrency cap, `None` for retry rounds which are not capped
    pub capacity: Option<usize>,
}

impl std::fmt::Display for LaunchEvent<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "launched {} ({}, attempt {})", self.host, self.id, self.attempt)?;
        match self.capacity {
            Some(capacity) => write!(f, ", {}/{} slots in use", self.occupied, capacity),
            None => write!(f, ", {} running", self.occupied),
        }
    }
}

pub trait ProgressSink {
    /// Called once per pass with the number of hosts it covers.
    fn start(&self, _total: usize) {}
    fn launched(&self, event: &LaunchEvent<'_>);
    fn launch_failed(&self, host: &str, attempt: u32, error: &anyhow::Error);
    fn finished(&self, host: &str, attempt: u32, outcome: Outcome);
    fn round_started(&self, round: u32, rounds: u32, hosts: usize);
    fn done(&self) {}
}

#[derive(Debug, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn launched(&self, _event: &LaunchEvent<'_>) {}
    fn launch_failed(&self, _host: &str, _attempt: u32, _error: &anyhow::Error) {}
    fn finished(&self, _host: &str, _attempt: u32, _outcome: Outcome) {}
    fn round_started(&self, _round: u32, _rounds: u32, _hosts: usize) {}
}

#[derive(Debug, Default)]
pub struct TextProgress;

impl ProgressSink for TextProgress {
    fn launched(&self, event: &LaunchEvent<'_>) {
        eprintln!("{event}");
    }

    fn launch_failed(&self, host: &str, attempt: u32, error: &anyhow::Error) {
        eprintln!("failed launching {host} (attempt {attempt}): {error:#}");
    }

    fn finished(&self, host: &str, attempt: u32, outcome: Outcome) {
        eprintln!("finished {host} (attempt {attempt}): {outcome}");
    }

    fn round_started(&self, round: u32, rounds: u32, hosts: usize) {
        eprintln!("retry round {round}/{rounds}: {hosts} host(s)");
    }
}

#[derive(Debug)]
pub struct BarProgress {
    bar: indicatif::ProgressBar,
}

impl BarProgress {
    #[must_use]
    pub fn new() -> Self {
        let style = indicatif::ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        )
        .unwrap_or_else(|_| indicatif::ProgressStyle::default_bar())
        .progress_chars("=> ");
        let bar = indicatif::ProgressBar::new(0);
        bar.set_style(style);
        bar.enable_steady_tick(std::time::Duration::from_millis(200));
        Self { bar }
    }
}

impl Default for BarProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for BarProgress {
    fn start(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_position(0);
    }

    fn launched(&self, event: &LaunchEvent<'_>) {
        self.bar.set_message(event.to_string());
    }

    fn launch_failed(&self, host: &str, attempt: u32, error: &anyhow::Error) {
        self.bar
            .println(format!("failed launching {host} (attempt {attempt}): {error:#}"));
        self.bar.inc(1);
    }

    fn finished(&self, host: &str, attempt: u32, outcome: Outcome) {
        if !outcome.is_success() {
            self.bar
                .println(format!("{host} (attempt {attempt}): {outcome}"));
        }
        self.bar.inc(1);
    }

    fn round_started(&self, round: u32, rounds: u32, hosts: usize) {
        self.start(hosts);
        self.bar
            .set_message(format!("retry round {round}/{rounds}"));
    }

    fn done(&self) {
        self.bar.finish_and_clear();
    }
}

/// Builds the sink for `progress_type`; `quiet` silences progress entirely.
#[must_use]
pub fn make_sink(progress_type: ProgressType, quiet: bool) -> Box<dyn ProgressSink> {
    if quiet {
        return Box::new(NoProgress);
    }
    match progress_type {
        ProgressType::Auto if std::io::stderr().is_terminal() => Box::new(BarProgress::new()),
        ProgressType::Auto | ProgressType::TextUpdates => Box::new(TextProgress),
        ProgressType::ProgressBar => Box::new(BarProgress::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::ValueEnum;

    #[test]
    fn launch_event_display() {
        let capped = LaunchEvent {
            host: "h1",
            id: TaskId(42),
            attempt: 1,
            occupied: 2,
            capacity: Some(3),
        };
        assert_eq!(
            capped.to_string(),
            "launched h1 (pid 42, attempt 1), 2/3 slots in use"
        );
        let retry = LaunchEvent {
            capacity: None,
            attempt: 2,
            ..capped
        };
        assert_eq!(retry.to_string(), "launched h1 (pid 42, attempt 2), 2 running");
    }

    #[test]
    fn progress_type_accepts_both_spellings() {
        for (input, expected) in [
            ("auto", ProgressType::Auto),
            ("Auto", ProgressType::Auto),
            ("progress-bar", ProgressType::ProgressBar),
            ("ProgressBar", ProgressType::ProgressBar),
            ("text-updates", ProgressType::TextUpdates),
            ("TextUpdates", ProgressType::TextUpdates),
        ] {
            assert_eq!(ProgressType::from_str(input, false), Ok(expected), "{input}");
        }
        assert!(ProgressType::from_str("spinner", false).is_err());
    }
}
