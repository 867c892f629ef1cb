use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::models::error::{Result, SshError};
use crate::ssh::transport::{ShellChannel, ShellEvent, TransportSession};

const STDIN_BUFFER: usize = 8192;

/// Wires local input/output to a remote shell channel
pub struct ShellDriver<I, O> {
    input: I,
    output: O,
}

impl<I, O> ShellDriver<I, O>
where
    I: AsyncRead + Unpin + Send,
    O: AsyncWrite + Unpin + Send,
{
    pub fn new(input: I, output: O) -> Self {
        Self { input, output }
    }

    /// Interactive shell: input is piped to the channel until it ends, output
    /// is copied until the channel closes.
    pub async fn run_shell<S: TransportSession>(&mut self, session: &S) -> Result<()> {
        let mut channel = session.open_shell(true).await?;
        let mut buf = vec![0u8; STDIN_BUFFER];
        let mut input_open = true;

        loop {
            tokio::select! {
                read = self.input.read(&mut buf), if input_open => {
                    match read {
                        Ok(0) => {
                            input_open = false;
                            channel.close_write().await?;
                        }
                        Ok(n) => channel.write(&buf[..n]).await?,
                        Err(e) => {
                            tracing::warn!("Local input failed, closing write side: {}", e);
                            input_open = false;
                            channel.close_write().await?;
                        }
                    }
                }
                event = channel.next_event() => {
                    match event {
                        Some(event) => self.handle_event(event).await?,
                        None => break,
                    }
                }
            }
        }

        tracing::debug!("Shell channel closed");
        Ok(())
    }

    /// Send `command` followed by `exit`, close the write side and copy output
    /// until the channel closes.
    pub async fn run_command<S: TransportSession>(&mut self, session: &S, command: &str) -> Result<()> {
        let mut channel = session.open_shell(false).await?;

        let script = format!("{}\nexit\n", command);
        channel.write(script.as_bytes()).await?;
        channel.close_write().await?;

        while let Some(event) = channel.next_event().await {
            self.handle_event(event).await?;
        }

        tracing::debug!("Command channel closed");
        Ok(())
    }

    async fn handle_event(&mut self, event: ShellEvent) -> Result<()> {
        match event {
            ShellEvent::Stdout(data) => {
                self.output.write_all(&data).await?;
                self.output.flush().await?;
                Ok(())
            }
            ShellEvent::Stderr(data) => {
                Err(SshError::RemoteStream(String::from_utf8_lossy(&data).into_owned()))
            }
            ShellEvent::ExitStatus(code) => {
                tracing::debug!("Remote shell exited with status {}", code);
                Ok(())
            }
        }
    }
}
