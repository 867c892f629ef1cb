pub mod agent;
pub mod bastion;
pub mod client;
pub mod credentials;
pub mod known_hosts;
pub mod platform;
pub mod port_forward;
pub mod registry;
pub mod shell;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use agent::AgentSocketResolver;
pub use bastion::establish_via_bastion;
pub use client::{RusshSession, RusshTransport};
pub use credentials::{CredentialResolver, PassphrasePrompt, ResolvedCredentials, TerminalPrompt};
pub use platform::PlatformProbe;
pub use port_forward::{ForwardHandle, ForwardingProxy};
pub use registry::{SessionId, SessionRegistry};
pub use shell::ShellDriver;
pub use transport::{BoxedStream, ConnectParams, ShellChannel, ShellEvent, Transport, TransportSession};
