pub mod connection;
pub mod error;
pub mod port_forward;

pub use connection::{ConnectionOptions, HostKeyPolicy, TransportOptions, DEFAULT_SSH_PORT};
pub use error::{Result, SshError};
pub use port_forward::ForwardingRule;
