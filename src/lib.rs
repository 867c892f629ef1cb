pub mod models;
pub mod orchestrator;
pub mod ssh;

pub use models::connection::{ConnectionOptions, HostKeyPolicy, TransportOptions};
pub use models::error::{Result, SshError};
pub use models::port_forward::ForwardingRule;
pub use orchestrator::Orchestrator;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is not set, by `-v` count
fn default_filter(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "jumpbox=warn,warn",
        1 => "jumpbox=info,warn",
        2 => "jumpbox=debug,info",
        _ => "trace",
    }
}

/// Install the global subscriber. Logs go to stderr so stdout carries only
/// remote shell output.
pub fn init_tracing(verbosity: u8) {
    let result = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter(verbosity).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();

    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}
