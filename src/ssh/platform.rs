//! Platform capability probe.
//!
//! Everything the orchestrator needs from the host OS (environment variables,
//! home directory, the default agent endpoint) is reached through
//! [`PlatformProbe`], with one implementation per platform family.

use std::path::PathBuf;

/// Environment variable holding the SSH agent socket
pub const AGENT_SOCKET_ENV: &str = "SSH_AUTH_SOCK";
/// Environment variable holding an SSH-specific username
pub const SSH_USER_ENV: &str = "SSH_USER";

/// Named pipe served by the OpenSSH for Windows authentication agent
pub const WINDOWS_AGENT_PIPE: &str = r"\\.\pipe\openssh-ssh-agent";

pub trait PlatformProbe: Send + Sync {
    /// Read an environment variable, treating empty values as unset
    fn env_var(&self, name: &str) -> Option<String>;

    fn home_dir(&self) -> Option<PathBuf>;

    /// Name of the generic login-user environment variable
    fn user_env_var(&self) -> &'static str;

    /// Agent endpoint to use when neither an explicit socket nor the
    /// environment provides one
    fn default_agent_socket(&self) -> Option<String>;
}

fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Unix-like systems: agents are only found through `SSH_AUTH_SOCK`
#[derive(Debug, Clone, Copy, Default)]
pub struct UnixPlatform;

impl PlatformProbe for UnixPlatform {
    fn env_var(&self, name: &str) -> Option<String> {
        read_env(name)
    }

    fn home_dir(&self) -> Option<PathBuf> {
        dirs::home_dir()
    }

    fn user_env_var(&self) -> &'static str {
        "USER"
    }

    fn default_agent_socket(&self) -> Option<String> {
        None
    }
}

/// Windows: falls back to the OpenSSH agent named pipe
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowsPlatform;

impl PlatformProbe for WindowsPlatform {
    fn env_var(&self, name: &str) -> Option<String> {
        read_env(name)
    }

    fn home_dir(&self) -> Option<PathBuf> {
        dirs::home_dir()
    }

    fn user_env_var(&self) -> &'static str {
        "USERNAME"
    }

    fn default_agent_socket(&self) -> Option<String> {
        Some(WINDOWS_AGENT_PIPE.to_string())
    }
}

/// Probe for the platform this binary was built for
pub fn current() -> Box<dyn PlatformProbe> {
    if cfg!(windows) {
        Box::new(WindowsPlatform)
    } else {
        Box::new(UnixPlatform)
    }
}
