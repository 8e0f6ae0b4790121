//! Write-once outcome publication for a single task
//!
//! The attempt task is the only writer; the reaper (or the retry controller) is the only reader.
//! Publishing goes through a temporary file that is renamed into place, so a reader either
//! sees no status file or a complete one.

/// Error type for result publication.
#[derive(Debug, thiserror::Error)]
pub enum ResultChannelError {
    #[error("result {0:?} was already published")]
    AlreadyPublished(std::path::PathBuf),
    #[error("failed publishing result to {path:?}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Final classification of a task as seen by the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    /// `status` is `None` when the result was missing or unreadable.
    Failed { status: Option<u32> },
}

impl Outcome {
    #[must_use]
    pub fn from_status(status: Option<u32>) -> Self {
        match status {
            Some(0) => Outcome::Succeeded,
            other => Outcome::Failed { status: other },
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Succeeded)
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Succeeded => write!(f, "ok"),
            Outcome::Failed { status: Some(status) } => write!(f, "failed (status {status})"),
            Outcome::Failed { status: None } => write!(f, "failed (no result)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResultChannel {
    path: std::path::PathBuf,
}

impl ResultChannel {
    #[must_use]
    pub fn new(path: std::path::PathBuf) -> Self {
        Self { path }
    }

    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn staging_path(&self) -> std::path::PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Removes any status (published or staged) left at this channel's path.
    ///
    /// Called before the attempt starts, so whatever the reader finds afterwards was written by
    /// this attempt. Blocking, like the rest of [`Launcher::launch`](crate::executor::Launcher).
    pub fn clear(&self) -> Result<(), ResultChannelError> {
        for path in [self.path.clone(), self.staging_path()] {
            match std::fs::remove_file(&path) {
                Ok(()) => tracing::debug!("removed stale result {:?}", &path),
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => return Err(ResultChannelError::Io { path, source }),
            }
        }
        Ok(())
    }

    /// Withdraws a published status so the reader falls back to failure.
    pub async fn retract(&self) -> Result<(), ResultChannelError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(ResultChannelError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Publishes `status`. Fails if a status was already published on this channel.
    pub async fn publish(&self, status: u32) -> Result<(), ResultChannelError> {
        let io_error = |source| ResultChannelError::Io {
            path: self.path.clone(),
            source,
        };
        if tokio::fs::try_exists(&self.path).await.map_err(io_error)? {
            return Err(ResultChannelError::AlreadyPublished(self.path.clone()));
        }
        let staging = self.staging_path();
        tokio::fs::write(&staging, format!("{status}\n"))
            .await
            .map_err(io_error)?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .map_err(io_error)?;
        tracing::trace!("published status {} to {:?}", status, &self.path);
        Ok(())
    }

    /// Reads the published status, `None` if it is missing or not a non-negative integer.
    pub async fn read(&self) -> Option<u32> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(error) => {
                tracing::debug!("no result at {:?}: {}", &self.path, error);
                return None;
            }
        };
        match text.trim().parse::<u32>() {
            Ok(status) => Some(status),
            Err(_) => {
                tracing::warn!("unparseable result {:?} in {:?}", text.trim(), &self.path);
                None
            }
        }
    }

    /// Reads the result and applies the conservative-failure policy.
    pub async fn outcome(&self) -> Outcome {
        Outcome::from_status(self.read().await)
    }
}
