use anyhow::Context;

use crate::config::ConfigError;

/// Lifecycle of a single host.
///
/// `Pending -> Running -> {Succeeded | Failed}`; a retry round moves `Failed` back to `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone)]
pub struct Host {
    pub name: String,
    /// Attempt number of the most recent launch (0 until first launch)
    pub attempt: u32,
    pub status: HostStatus,
}

impl Host {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attempt: 0,
            status: HostStatus::Pending,
        }
    }

    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(self.status, HostStatus::Succeeded | HostStatus::Failed)
    }
}

/// Extracts host identifiers from host list text.
///
/// One identifier per line, surrounding whitespace trimmed. Blank lines and lines starting
/// with `#` are skipped. Duplicates are kept.
#[must_use]
pub fn parse_host_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect()
}

/// Reads and parses a host list file, rejecting lists without any host.
pub async fn read_host_list(path: &std::path::Path) -> anyhow::Result<Vec<String>> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Err(ConfigError::MissingHostList(path.to_path_buf()).into());
    }
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed reading host list {:?}", path))?;
    let hosts = parse_host_list(&text);
    if hosts.is_empty() {
        return Err(ConfigError::EmptyHostList.into());
    }
    tracing::debug!("read {} host(s) from {:?}", hosts.len(), path);
    Ok(hosts)
}
