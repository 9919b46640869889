// Remote command execution. The monitor core only sees the RemoteShell and
// RemoteSession traits; SshShell is the keyed ssh2 implementation.

use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, anyhow};

use crate::config::ServerConfig;

/// TCP connect bound for one session attempt.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// The one command the monitor runs per poll.
pub fn vnstat_command(interface: &str) -> String {
    format!("vnstat -i {} --json", interface)
}

/// Opens keyed, timed sessions against monitored hosts.
pub trait RemoteShell: Send + Sync {
    fn connect(&self, server: &ServerConfig) -> anyhow::Result<Box<dyn RemoteSession>>;
}

/// A single remote session. Closed when dropped; closing is idempotent.
pub trait RemoteSession: Send {
    /// Runs a command and returns its stdout. A non-zero exit status is an
    /// error carrying the status and stderr.
    fn run(&mut self, command: &str) -> anyhow::Result<Vec<u8>>;
}

/// Hook for deployments that want strict host-key checking. Receives the
/// host ip and the raw key; returning false rejects the connection.
pub type HostKeyVerifier = dyn Fn(&str, &[u8]) -> bool + Send + Sync;

pub struct SshShell {
    private_key: String,
    read_timeout: Duration,
    host_key_verifier: Option<Box<HostKeyVerifier>>,
}

impl SshShell {
    pub fn new(private_key: String, read_timeout: Duration) -> Self {
        Self {
            private_key,
            read_timeout,
            host_key_verifier: None,
        }
    }

    /// Installs a host-key check. Without one, any host key is accepted;
    /// see the README's security recommendations.
    pub fn with_host_key_verifier(mut self, verifier: Box<HostKeyVerifier>) -> Self {
        self.host_key_verifier = Some(verifier);
        self
    }

    /// Reads the monitor's PEM private key. Called once at startup; a missing
    /// or unreadable key is fatal.
    pub fn load_private_key() -> anyhow::Result<String> {
        let path = Self::key_path()?;
        std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read private key {}", path.display()))
    }

    /// Key path: `BANDWIDTH_MONITOR_KEY` env override, else
    /// `~/.ssh/bandwidth_monitor_ed25519`.
    pub fn key_path() -> anyhow::Result<PathBuf> {
        if let Ok(path) = std::env::var("BANDWIDTH_MONITOR_KEY") {
            return Ok(PathBuf::from(path));
        }
        let home = std::env::var("HOME").context("HOME is not set")?;
        Ok(PathBuf::from(home).join(".ssh").join("bandwidth_monitor_ed25519"))
    }
}

impl RemoteShell for SshShell {
    fn connect(&self, server: &ServerConfig) -> anyhow::Result<Box<dyn RemoteSession>> {
        let addr = (server.ip.as_str(), server.port)
            .to_socket_addrs()
            .with_context(|| format!("failed to resolve {}:{}", server.ip, server.port))?
            .next()
            .ok_or_else(|| anyhow!("no address for {}:{}", server.ip, server.port))?;

        let stream = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT)
            .with_context(|| format!("failed to dial {}", addr))?;

        let mut session = ssh2::Session::new().context("failed to create SSH session")?;
        session.set_tcp_stream(stream);
        session.set_timeout(self.read_timeout.as_millis() as u32);
        session.handshake().context("SSH handshake failed")?;

        if let Some(verifier) = &self.host_key_verifier {
            let (key, _) = session
                .host_key()
                .ok_or_else(|| anyhow!("no host key presented by {}", server.ip))?;
            anyhow::ensure!(verifier(&server.ip, key), "host key rejected for {}", server.ip);
        }

        session
            .userauth_pubkey_memory(&server.user, None, &self.private_key, None)
            .with_context(|| format!("key authentication failed for {}@{}", server.user, server.ip))?;

        Ok(Box::new(SshSession { session }))
    }
}

struct SshSession {
    session: ssh2::Session,
}

impl RemoteSession for SshSession {
    fn run(&mut self, command: &str) -> anyhow::Result<Vec<u8>> {
        let mut channel = self
            .session
            .channel_session()
            .context("failed to open channel")?;
        channel
            .exec(command)
            .with_context(|| format!("failed to exec '{}'", command))?;

        let mut stdout = Vec::new();
        channel
            .read_to_end(&mut stdout)
            .context("failed to read command output")?;
        let mut stderr = String::new();
        let _ = channel.stderr().read_to_string(&mut stderr);

        channel.wait_close().context("failed to close channel")?;
        let status = channel.exit_status().context("failed to read exit status")?;
        if status != 0 {
            return Err(anyhow!(
                "command failed with status {}: {}",
                status,
                stderr.trim()
            ));
        }
        Ok(stdout)
    }
}
