//! SSH agent discovery

use std::env;
use std::path::PathBuf;
use tracing::debug;

const SSH_AUTH_SOCK: &str = "SSH_AUTH_SOCK";

/// Supplies the agent socket forwarded to builds as `--ssh default=<socket>`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SshAgentProvider {
    socket: Option<PathBuf>,
}

impl SshAgentProvider {
    /// Use the agent of the current session, if any
    pub fn from_env() -> Self {
        let socket = env::var_os(SSH_AUTH_SOCK)
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        match &socket {
            Some(path) => debug!("Using SSH agent at {}", path.display()),
            None => debug!("{} not set, builds run without an SSH agent", SSH_AUTH_SOCK),
        }

        Self { socket }
    }

    /// Use a fixed socket
    pub fn with_socket(socket: impl Into<PathBuf>) -> Self {
        Self {
            socket: Some(socket.into()),
        }
    }

    /// Agent reference handed to the backend
    pub fn default_agent(&self) -> Option<String> {
        self.socket
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
    }
}
