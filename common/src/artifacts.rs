//! Per-task artifact naming and retention
//!
//! Every (host, attempt) pair owns a log file, a status file (the result channel) and, when a
//! credential driver is used, a transient driver script. All names are derived from the host's
//! position in the host list, its sanitized identifier and the attempt number, so the same
//! task always maps to the same paths and no two tasks share one.

use anyhow::Context;

use crate::hosts::Host;

/// Replaces every character that is not ASCII alphanumeric with `_`.
#[must_use]
pub fn sanitize_host(host: &str) -> String {
    host.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub log: std::path::PathBuf,
    pub status: std::path::PathBuf,
    pub driver_script: std::path::PathBuf,
}

impl ArtifactPaths {
    fn all(&self) -> [&std::path::Path; 3] {
        [&self.log, &self.status, &self.driver_script]
    }
}

/// Directory holding the artifacts of one fan-out run.
#[derive(Debug)]
pub struct WorkDir {
    root: std::path::PathBuf,
    created: bool,
}

impl WorkDir {
    /// Uses `root` if given, otherwise a per-process directory under the system temp dir.
    pub async fn create(root: Option<std::path::PathBuf>) -> anyhow::Result<Self> {
        let root = root.unwrap_or_else(|| {
            std::env::temp_dir().join(format!("fcp-{}", std::process::id()))
        });
        let created = !tokio::fs::try_exists(&root).await.unwrap_or(false);
        tokio::fs::create_dir_all(&root)
            .await
            .with_context(|| format!("failed creating work directory {:?}", &root))?;
        tracing::debug!("using work directory {:?} (created: {})", &root, created);
        Ok(Self { root, created })
    }

    #[must_use]
    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    #[must_use]
    pub fn paths(&self, index: usize, host: &str, attempt: u32) -> ArtifactPaths {
        let stem = format!("{}-{}.{}", sanitize_host(host), index, attempt);
        ArtifactPaths {
            log: self.root.join(format!("{stem}.log")),
            status: self.root.join(format!("{stem}.status")),
            driver_script: self.root.join(format!("{stem}.exp")),
        }
    }

    /// Removes the artifacts of every attempt of every host.
    ///
    /// Returns the number of files removed. The directory itself is removed only if this run
    /// created it and nothing else is left inside.
    pub async fn purge(&self, hosts: &[Host]) -> anyhow::Result<usize> {
        let mut removed = 0;
        for (index, host) in hosts.iter().enumerate() {
            for attempt in 1..=host.attempt {
                for path in self.paths(index, &host.name, attempt).all() {
                    match tokio::fs::remove_file(path).await {
                        Ok(()) => removed += 1,
                        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
                        Err(error) => {
                            return Err(error)
                                .with_context(|| format!("failed removing artifact {:?}", path));
                        }
                    }
                }
            }
        }
        if self.created {
            match tokio::fs::remove_dir(&self.root).await {
                Ok(()) => tracing::debug!("removed work directory {:?}", &self.root),
                Err(error) => {
                    tracing::debug!("leaving work directory {:?} in place: {}", &self.root, error);
                }
            }
        }
        tracing::debug!("purged {} artifact(s)", removed);
        Ok(removed)
    }
}
