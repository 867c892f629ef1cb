use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use jumpbox::{ConnectionOptions, HostKeyPolicy};

#[derive(Parser)]
#[command(name = "jumpbox", version, about = "SSH shells, commands and port forwards through a jump host")]
pub struct Cli {
    /// JSON file with connection options; flags override its values
    #[arg(short = 'c', long)]
    pub options: Option<PathBuf>,

    /// Target host
    #[arg(short = 'H', long)]
    pub host: Option<String>,

    /// Target port (default 22)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Jump host to reach the target through (port 22)
    #[arg(short = 'J', long)]
    pub bastion: Option<String>,

    /// Remote user (default: $SSH_USER, then $USER)
    #[arg(short, long)]
    pub user: Option<String>,

    /// Private key file (default: ~/.ssh/id_rsa)
    #[arg(short, long)]
    pub identity: Option<PathBuf>,

    /// Authenticate with and forward the local SSH agent
    #[arg(short = 'A', long)]
    pub agent_forward: bool,

    /// Agent socket (default: $SSH_AUTH_SOCK)
    #[arg(long)]
    pub agent_socket: Option<String>,

    /// Do not load ~/.ssh/id_rsa automatically
    #[arg(long)]
    pub no_default_key: bool,

    /// Never prompt for a key passphrase
    #[arg(long)]
    pub no_passphrase_prompt: bool,

    /// How to treat host keys missing from or changed in known_hosts
    #[arg(long, value_enum)]
    pub host_key_policy: Option<HostKeyPolicyArg>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Open an interactive shell
    Tty,

    /// Run a command and print its output
    Exec {
        /// Command line to run remotely
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Forward a local port through the target until interrupted
    Forward {
        /// Local port on 127.0.0.1 (0 picks a free one)
        #[arg(long)]
        from_port: u16,
        /// Destination host as seen from the target
        #[arg(long, default_value = "localhost")]
        to_host: String,
        /// Destination port
        #[arg(long)]
        to_port: u16,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum HostKeyPolicyArg {
    AcceptAny,
    AcceptNew,
    Strict,
}

impl From<HostKeyPolicyArg> for HostKeyPolicy {
    fn from(arg: HostKeyPolicyArg) -> Self {
        match arg {
            HostKeyPolicyArg::AcceptAny => HostKeyPolicy::AcceptAny,
            HostKeyPolicyArg::AcceptNew => HostKeyPolicy::AcceptNew,
            HostKeyPolicyArg::Strict => HostKeyPolicy::Strict,
        }
    }
}

impl Cli {
    /// Options file (if any) with command line flags applied on top
    pub fn connection_options(&self) -> Result<ConnectionOptions> {
        let mut options = match &self.options {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                serde_json::from_str::<ConnectionOptions>(&content)
                    .with_context(|| format!("Invalid connection options in {}", path.display()))?
            }
            None => ConnectionOptions::default(),
        };

        if let Some(host) = &self.host {
            options.end_host = host.clone();
        }
        if self.port.is_some() {
            options.end_port = self.port;
        }
        if let Some(bastion) = &self.bastion {
            options.bastion_host = Some(bastion.clone());
        }
        if let Some(user) = &self.user {
            options.username = Some(user.clone());
        }
        if let Some(path) = &self.identity {
            let key = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read private key {}", path.display()))?;
            options.private_key = Some(key);
        }
        if let Some(socket) = &self.agent_socket {
            options.agent_socket = Some(socket.clone());
        }
        if let Some(policy) = self.host_key_policy {
            options.transport.host_key_policy = policy.into();
        }
        options.agent_forward |= self.agent_forward;
        options.skip_auto_private_key |= self.no_default_key;
        options.no_passphrase_prompt |= self.no_passphrase_prompt;

        if options.end_host.is_empty() {
            anyhow::bail!("No target host: pass --host or set endHost in the options file");
        }

        Ok(options)
    }
}
