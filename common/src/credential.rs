use anyhow::{Context, anyhow};
use std::io::{BufRead, IsTerminal, Write};
use std::os::fd::AsFd;

use crate::config::ConfigError;

/// Environment variable the CLI reads a plaintext password from.
pub const PASSWORD_ENV: &str = "FCP_PASSWORD";

/// Plaintext password handed to the credential driver. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Credential(<redacted>)")
    }
}

/// Where the credential comes from, if anywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    None,
    Plaintext(Credential),
    Prompt,
}

impl CredentialSource {
    pub fn from_options(password: Option<String>, ask: bool) -> Result<Self, ConfigError> {
        match (password, ask) {
            (Some(_), true) => Err(ConfigError::ConflictingCredentials),
            (Some(password), false) => Ok(Self::Plaintext(Credential::new(password))),
            (None, true) => Ok(Self::Prompt),
            (None, false) => Ok(Self::None),
        }
    }

    /// Produces the credential, asking on the terminal for [`CredentialSource::Prompt`].
    ///
    /// Blocks while prompting.
    pub fn resolve(self) -> anyhow::Result<Option<Credential>> {
        match self {
            Self::None => Ok(None),
            Self::Plaintext(credential) => Ok(Some(credential)),
            Self::Prompt => prompt_password("password: ").map(Some),
        }
    }
}

/// Reads a password from stdin, with terminal echo disabled when stdin is a terminal.
pub fn prompt_password(prompt: &str) -> anyhow::Result<Credential> {
    let stdin = std::io::stdin();
    let mut stderr = std::io::stderr();
    write!(stderr, "{prompt}")?;
    stderr.flush()?;
    let mut line = String::new();
    if stdin.is_terminal() {
        use nix::sys::termios::{LocalFlags, SetArg, tcgetattr, tcsetattr};
        let original =
            tcgetattr(stdin.as_fd()).context("failed reading terminal attributes")?;
        let mut silent = original.clone();
        silent.local_flags.remove(LocalFlags::ECHO);
        tcsetattr(stdin.as_fd(), SetArg::TCSANOW, &silent)
            .context("failed disabling terminal echo")?;
        let read = stdin.lock().read_line(&mut line);
        // restore echo before looking at the read result
        tcsetattr(stdin.as_fd(), SetArg::TCSANOW, &original)
            .context("failed restoring terminal attributes")?;
        writeln!(stderr)?;
        read.context("failed reading password")?;
    } else {
        stdin
            .lock()
            .read_line(&mut line)
            .context("failed reading password")?;
    }
    let password = line.trim_end_matches(['\r', '\n']);
    if password.is_empty() {
        return Err(anyhow!("empty password"));
    }
    Ok(Credential::new(password))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflicting_options_are_rejected() {
        assert_eq!(
            CredentialSource::from_options(Some("pw".into()), true),
            Err(ConfigError::ConflictingCredentials)
        );
    }

    #[test]
    fn options_map_to_sources() -> anyhow::Result<()> {
        assert_eq!(
            CredentialSource::from_options(None, false)?,
            CredentialSource::None
        );
        assert_eq!(
            CredentialSource::from_options(None, true)?,
            CredentialSource::Prompt
        );
        let source = CredentialSource::from_options(Some("hunter2".into()), false)?;
        assert_eq!(source.resolve()?, Some(Credential::new("hunter2")));
        Ok(())
    }

    #[test]
    fn debug_output_is_redacted() {
        let credential = Credential::new("hunter2");
        assert!(!format!("{credential:?}").contains("hunter2"));
        assert!(!format!("{:?}", CredentialSource::Plaintext(credential)).contains("hunter2"));
    }
}
