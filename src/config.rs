// Dashboard settings plus the monitored server list. JSON on disk, written
// with 0600 permissions; read-only after process start.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// One monitored host. `name` is the unique key across the fleet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    pub name: String,
    pub ip: String,
    pub user: String,
    pub port: u16,
    pub interface: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub dashboard_enabled: bool,
    pub listen_port: u16,
    /// Poll cadence in seconds.
    pub poll_interval: u64,
    pub auth_user: String,
    pub auth_pass: String,
    pub auth_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dashboard_enabled: true,
            listen_port: 8080,
            poll_interval: 5,
            auth_user: "admin".to_string(),
            auth_pass: String::new(),
            auth_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
}

/// Loose shape used to detect the legacy servers-only file format.
#[derive(Deserialize)]
struct RawConfig {
    settings: Option<Settings>,
    #[serde(default)]
    servers: Vec<ServerConfig>,
}

impl Config {
    /// Config file path: `CONFIG_FILE` env override, else `servers.json` in
    /// the working directory.
    pub fn config_path() -> PathBuf {
        std::env::var("CONFIG_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("servers.json"))
    }

    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Loads and validates the config. A missing file is created with
    /// defaults. A legacy file carrying only the `servers` array is migrated
    /// forward: the original is kept as `<path>.bak` and the merged format
    /// written in its place.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            let config = Config::default();
            config
                .save_to(path)
                .with_context(|| format!("failed to create config file {}", path.display()))?;
            return Ok(config);
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let raw: RawConfig = serde_json::from_str(&data)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;

        let migrate = raw.settings.is_none();
        let config = Config {
            settings: raw.settings.unwrap_or_default(),
            servers: raw.servers,
        };
        config.validate()?;

        if migrate {
            let mut backup = path.as_os_str().to_owned();
            backup.push(".bak");
            std::fs::rename(path, &backup)
                .with_context(|| format!("failed to back up legacy config {}", path.display()))?;
            config
                .save_to(path)
                .context("failed to write migrated config")?;
            tracing::info!(path = %path.display(), "migrated legacy config; original kept as .bak");
        }

        Ok(config)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: Config = serde_json::from_str(s).context("failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to serialize config")?;
        write_private(path, data.as_bytes())
            .with_context(|| format!("failed to write config file {}", path.display()))
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.settings.listen_port > 0,
            "settings.listenPort must be between 1 and 65535, got {}",
            self.settings.listen_port
        );
        anyhow::ensure!(
            self.settings.poll_interval > 0,
            "settings.pollInterval must be > 0, got {}",
            self.settings.poll_interval
        );

        let mut names = HashSet::new();
        for server in &self.servers {
            anyhow::ensure!(!server.name.is_empty(), "server name must be non-empty");
            anyhow::ensure!(
                !server.ip.is_empty(),
                "server '{}': ip must be non-empty",
                server.name
            );
            anyhow::ensure!(
                !server.user.is_empty(),
                "server '{}': user must be non-empty",
                server.name
            );
            anyhow::ensure!(
                !server.interface.is_empty(),
                "server '{}': interface must be non-empty",
                server.name
            );
            anyhow::ensure!(
                server.port > 0,
                "server '{}': port must be between 1 and 65535",
                server.name
            );
            anyhow::ensure!(
                names.insert(server.name.as_str()),
                "duplicate server name '{}'",
                server.name
            );
        }
        Ok(())
    }

    /// Adds a server; the name must not already be configured.
    pub fn add_server(&mut self, server: ServerConfig) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.get_server(&server.name).is_none(),
            "server with name '{}' already exists",
            server.name
        );
        self.servers.push(server);
        self.validate()
    }

    /// Replaces the server registered under `name`. Renames are allowed as
    /// long as the new name is not already taken by another server.
    pub fn update_server(&mut self, name: &str, updated: ServerConfig) -> anyhow::Result<()> {
        let index = self
            .servers
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| anyhow::anyhow!("server '{}' not found", name))?;
        anyhow::ensure!(
            updated.name == name || self.get_server(&updated.name).is_none(),
            "server with name '{}' already exists",
            updated.name
        );
        self.servers[index] = updated;
        self.validate()
    }

    /// Removes a server by name; returns whether it existed.
    pub fn remove_server(&mut self, name: &str) -> bool {
        let before = self.servers.len();
        self.servers.retain(|s| s.name != name);
        self.servers.len() != before
    }

    pub fn get_server(&self, name: &str) -> Option<&ServerConfig> {
        self.servers.iter().find(|s| s.name == name)
    }
}

#[cfg(unix)]
fn write_private(path: &Path, data: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(data)
}

#[cfg(not(unix))]
fn write_private(path: &Path, data: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, data)
}
