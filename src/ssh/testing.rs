//! In-memory fakes for the platform, the passphrase prompt and the transport.
//!
//! Every mock shares one [`MockState`] so tests can assert on the exact
//! sequence of connects, channel opens and session ends across a whole
//! bastion chain.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::DuplexStream;
use tokio::sync::mpsc;

use crate::models::error::{Result, SshError};
use crate::ssh::credentials::PassphrasePrompt;
use crate::ssh::platform::{PlatformProbe, WINDOWS_AGENT_PIPE};
use crate::ssh::transport::{BoxedStream, ConnectParams, ShellChannel, ShellEvent, Transport, TransportSession};

const DUPLEX_CAPACITY: usize = 64 * 1024;

pub struct FakePlatform {
    windows: bool,
    env: HashMap<String, String>,
    home: Option<PathBuf>,
}

impl FakePlatform {
    pub fn unix() -> Self {
        Self {
            windows: false,
            env: HashMap::new(),
            home: None,
        }
    }

    pub fn windows() -> Self {
        Self {
            windows: true,
            ..Self::unix()
        }
    }

    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = Some(home.into());
        self
    }
}

impl PlatformProbe for FakePlatform {
    fn env_var(&self, key: &str) -> Option<String> {
        self.env.get(key).cloned()
    }

    fn home_dir(&self) -> Option<PathBuf> {
        self.home.clone()
    }

    fn user_env_var(&self) -> &'static str {
        if self.windows {
            "USERNAME"
        } else {
            "USER"
        }
    }

    fn default_agent_socket(&self) -> Option<String> {
        self.windows.then(|| WINDOWS_AGENT_PIPE.to_string())
    }
}

/// Prompt that always answers the same and counts how often it was asked
pub struct CountingPrompt {
    answer: String,
    calls: AtomicUsize,
}

impl CountingPrompt {
    pub fn new(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PassphrasePrompt for CountingPrompt {
    fn prompt(&self, _message: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.answer.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelOpen {
    pub host: String,
    pub bind_addr: String,
    pub bind_port: u16,
    pub dest_host: String,
    pub dest_port: u16,
}

pub struct MockState {
    log: Mutex<Vec<String>>,
    connects: Mutex<Vec<ConnectParams>>,
    channel_opens: Mutex<Vec<ChannelOpen>>,
    fail_hosts: Mutex<HashSet<String>>,
    fail_channel_opens: AtomicUsize,
    stall_channel_opens: AtomicUsize,
    tunnels: Mutex<Vec<BoxedStream>>,
    shell_events: Mutex<Vec<ShellEvent>>,
    hold_shell_open: AtomicBool,
    written: Mutex<Vec<u8>>,
    remote_tx: mpsc::UnboundedSender<DuplexStream>,
    remote_rx: Mutex<Option<mpsc::UnboundedReceiver<DuplexStream>>>,
}

impl MockState {
    fn new() -> Arc<Self> {
        let (remote_tx, remote_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            log: Mutex::new(Vec::new()),
            connects: Mutex::new(Vec::new()),
            channel_opens: Mutex::new(Vec::new()),
            fail_hosts: Mutex::new(HashSet::new()),
            fail_channel_opens: AtomicUsize::new(0),
            stall_channel_opens: AtomicUsize::new(0),
            tunnels: Mutex::new(Vec::new()),
            shell_events: Mutex::new(Vec::new()),
            hold_shell_open: AtomicBool::new(false),
            written: Mutex::new(Vec::new()),
            remote_tx,
            remote_rx: Mutex::new(Some(remote_rx)),
        })
    }

    fn record(&self, event: String) {
        self.log.lock().unwrap().push(event);
    }

    fn take_one(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn take_remote_ends(&self) -> mpsc::UnboundedReceiver<DuplexStream> {
        self.remote_rx
            .lock()
            .unwrap()
            .take()
            .expect("remote ends already taken")
    }
}

/// Transport that never touches the network
#[derive(Clone)]
pub struct MockTransport {
    state: Arc<MockState>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self { state: MockState::new() }
    }

    pub fn fail_host(self, host: &str) -> Self {
        self.state.fail_hosts.lock().unwrap().insert(host.to_string());
        self
    }

    pub fn fail_next_channel_opens(self, count: usize) -> Self {
        self.state.fail_channel_opens.store(count, Ordering::SeqCst);
        self
    }

    /// Channel opens that never complete
    pub fn stall_next_channel_opens(self, count: usize) -> Self {
        self.state.stall_channel_opens.store(count, Ordering::SeqCst);
        self
    }

    /// Events every opened shell will deliver, in order
    pub fn with_shell_events(self, events: Vec<ShellEvent>) -> Self {
        *self.state.shell_events.lock().unwrap() = events;
        self
    }

    /// Keep shells open after their scripted events until the write side closes
    pub fn hold_shell_open(self) -> Self {
        self.state.hold_shell_open.store(true, Ordering::SeqCst);
        self
    }

    pub fn events(&self) -> Vec<String> {
        self.state.log.lock().unwrap().clone()
    }

    pub fn connects(&self) -> Vec<ConnectParams> {
        self.state.connects.lock().unwrap().clone()
    }

    pub fn channel_opens(&self) -> Vec<ChannelOpen> {
        self.state.channel_opens.lock().unwrap().clone()
    }

    /// Bytes written to any shell so far
    pub fn written(&self) -> Vec<u8> {
        self.state.written.lock().unwrap().clone()
    }

    /// Oldest stream a connect was tunneled over
    pub fn take_tunnel(&self) -> Option<BoxedStream> {
        let mut tunnels = self.state.tunnels.lock().unwrap();
        (!tunnels.is_empty()).then(|| tunnels.remove(0))
    }

    /// Remote halves of every forwarded channel, in open order
    pub fn take_remote_ends(&self) -> mpsc::UnboundedReceiver<DuplexStream> {
        self.state.take_remote_ends()
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Session = MockSession;

    async fn connect(&self, params: &ConnectParams, tunnel: Option<BoxedStream>) -> Result<MockSession> {
        let route = if tunnel.is_some() { " via tunnel" } else { "" };
        self.state
            .record(format!("connect {}:{}{}", params.host, params.port, route));
        self.state.connects.lock().unwrap().push(params.clone());

        if let Some(stream) = tunnel {
            self.state.tunnels.lock().unwrap().push(stream);
        }

        if self.state.fail_hosts.lock().unwrap().contains(&params.host) {
            return Err(SshError::ConnectionFailed(
                params.host.clone(),
                "Connection refused".to_string(),
            ));
        }

        Ok(MockSession {
            host: params.host.clone(),
            state: self.state.clone(),
        })
    }
}

pub struct MockSession {
    host: String,
    state: Arc<MockState>,
}

impl MockSession {
    /// Standalone session with its own state, plus the receiver for the
    /// remote halves of its forwarded channels
    pub fn new(host: &str) -> (Self, mpsc::UnboundedReceiver<DuplexStream>) {
        let state = MockState::new();
        let remote_ends = state.take_remote_ends();
        (
            Self {
                host: host.to_string(),
                state,
            },
            remote_ends,
        )
    }

    pub fn fail_next_channel_opens(&self, count: usize) {
        self.state.fail_channel_opens.store(count, Ordering::SeqCst);
    }

    pub fn stall_next_channel_opens(&self, count: usize) {
        self.state.stall_channel_opens.store(count, Ordering::SeqCst);
    }

    pub fn channel_opens(&self) -> Vec<ChannelOpen> {
        self.state.channel_opens.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransportSession for MockSession {
    type Shell = MockShell;

    async fn open_forwarded_channel(
        &self,
        bind_addr: &str,
        bind_port: u16,
        dest_host: &str,
        dest_port: u16,
    ) -> Result<BoxedStream> {
        self.state.record(format!(
            "open {}:{}->{}:{} on {}",
            bind_addr, bind_port, dest_host, dest_port, self.host
        ));
        self.state.channel_opens.lock().unwrap().push(ChannelOpen {
            host: self.host.clone(),
            bind_addr: bind_addr.to_string(),
            bind_port,
            dest_host: dest_host.to_string(),
            dest_port,
        });

        if MockState::take_one(&self.state.stall_channel_opens) {
            std::future::pending::<()>().await;
        }
        if MockState::take_one(&self.state.fail_channel_opens) {
            return Err(SshError::ChannelOpenFailed {
                host: dest_host.to_string(),
                port: dest_port,
                reason: "administratively prohibited".to_string(),
            });
        }

        let (local, remote) = tokio::io::duplex(DUPLEX_CAPACITY);
        // Receiver may be gone when the test does not care about the far side
        let _ = self.state.remote_tx.send(remote);
        Ok(Box::new(local))
    }

    async fn open_shell(&self, interactive: bool) -> Result<MockShell> {
        let mode = if interactive { "interactive" } else { "command" };
        self.state.record(format!("shell {} on {}", mode, self.host));

        Ok(MockShell {
            events: self.state.shell_events.lock().unwrap().clone().into(),
            hold_open: self.state.hold_shell_open.load(Ordering::SeqCst),
            eof: false,
            state: self.state.clone(),
        })
    }

    async fn end(&self) {
        self.state.record(format!("end {}", self.host));
    }
}

pub struct MockShell {
    events: VecDeque<ShellEvent>,
    hold_open: bool,
    eof: bool,
    state: Arc<MockState>,
}

#[async_trait]
impl ShellChannel for MockShell {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.state.written.lock().unwrap().extend_from_slice(data);
        Ok(())
    }

    async fn close_write(&mut self) -> Result<()> {
        self.eof = true;
        self.state.record("shell eof".to_string());
        Ok(())
    }

    async fn next_event(&mut self) -> Option<ShellEvent> {
        if let Some(event) = self.events.pop_front() {
            return Some(event);
        }
        if self.hold_open && !self.eof {
            std::future::pending::<()>().await;
        }
        None
    }
}
