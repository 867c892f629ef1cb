mod cli;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Command};
use jumpbox::{ForwardingRule, Orchestrator, SshError};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    jumpbox::init_tracing(cli.verbose);

    let code = match run(cli).await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            if let Some(ssh) = e.downcast_ref::<SshError>() {
                eprintln!("Hint: {}", ssh.recovery_suggestion());
            }
            1
        }
    };

    // The stdin reader of an interactive shell may still be blocked on the
    // terminal; exiting here does not wait for it.
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<()> {
    let options = cli.connection_options()?;
    let orchestrator = Orchestrator::new(options)?;

    let result = match cli.command {
        Command::Tty => orchestrator.tty().await,
        Command::Exec { command } => orchestrator.execute_command(&command.join(" ")).await,
        Command::Forward {
            from_port,
            to_host,
            to_port,
        } => forward_until_interrupted(&orchestrator, ForwardingRule::new(from_port, Some(to_host), to_port)).await,
    };

    orchestrator.shutdown().await;
    Ok(result?)
}

async fn forward_until_interrupted(orchestrator: &Orchestrator, rule: ForwardingRule) -> jumpbox::Result<()> {
    let local_addr = orchestrator.forward(rule.clone()).await?;
    eprintln!(
        "Forwarding {} -> {}:{} (Ctrl-C to stop)",
        local_addr, rule.to_host, rule.to_port
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Interrupted, closing port forward");
    Ok(())
}
