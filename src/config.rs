use anyhow::Context;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::warn;

pub const DEFAULT_CONFIG_FILE: &str = "statuspanel.toml";

const DEFAULT_CONFIG: &str = r#"
[panel]
host = "127.0.0.1"
port = 5080

[upstream]
status_url = "http://127.0.0.1:5757/config/status"
logout_url = "http://127.0.0.1:5757/logout"
entry_url = "http://127.0.0.1:5757/"
# cookie = "session=..."
# fetch_timeout_ms = 10000

[session]
# user = "admin"
"#;

#[derive(Deserialize, Clone, Debug, Default)]
pub struct Config {
    #[serde(default)]
    pub panel: PanelConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub labels: Labels,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5080
}

#[derive(Deserialize, Clone, Debug)]
pub struct PanelConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_status_url() -> String {
    "http://127.0.0.1:5757/config/status".to_string()
}

fn default_logout_url() -> String {
    "http://127.0.0.1:5757/logout".to_string()
}

fn default_entry_url() -> String {
    "http://127.0.0.1:5757/".to_string()
}

/// Where the monitored server lives.
#[derive(Deserialize, Clone, Debug)]
pub struct UpstreamConfig {
    #[serde(default = "default_status_url")]
    pub status_url: String,
    #[serde(default = "default_logout_url")]
    pub logout_url: String,
    /// Login page the browser is sent to when the session is gone
    #[serde(default = "default_entry_url")]
    pub entry_url: String,
    /// Sent verbatim as the Cookie header
    pub cookie: Option<String>,
    pub fetch_timeout_ms: Option<u64>,
}

impl UpstreamConfig {
    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            status_url: default_status_url(),
            logout_url: default_logout_url(),
            entry_url: default_entry_url(),
            cookie: None,
            fetch_timeout_ms: None,
        }
    }
}

#[derive(Deserialize, Clone, Debug, Default)]
pub struct SessionConfig {
    pub user: Option<String>,
}

/// Display text for the panel. Any subset can be overridden in `[labels]`.
#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Labels {
    pub text_server_running: String,
    pub text_server_not_running: String,
    pub label_time_started: String,
    pub label_up_time: String,
    pub label_server_version: String,
    pub label_os_version: String,
    pub label_web_server_port: String,
    pub label_open_protocol_port: String,
    pub label_opcua: String,
    pub label_num_clients: String,
    pub label_num_machines: String,
    pub label_connected_clients: String,
    pub label_connected_machines: String,
    pub label_unknown: String,
    pub label_none: String,
    pub label_na: String,
    pub btn_logout: String,
}

impl Default for Labels {
    fn default() -> Self {
        Self {
            text_server_running: "Server is running".to_string(),
            text_server_not_running: "Server is not running".to_string(),
            label_time_started: "Time started".to_string(),
            label_up_time: "Up time".to_string(),
            label_server_version: "Server version".to_string(),
            label_os_version: "OS version".to_string(),
            label_web_server_port: "Web server port".to_string(),
            label_open_protocol_port: "Open protocol port".to_string(),
            label_opcua: "OPC UA".to_string(),
            label_num_clients: "Number of clients".to_string(),
            label_num_machines: "Number of machines".to_string(),
            label_connected_clients: "Connected clients".to_string(),
            label_connected_machines: "Connected machines".to_string(),
            label_unknown: "Unknown".to_string(),
            label_none: "None".to_string(),
            label_na: "N/A".to_string(),
            btn_logout: "Log out".to_string(),
        }
    }
}

impl Config {
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        toml::from_str(text).context("Failed to parse configuration")
    }
}

/// Load the configuration file, writing a default one first if it is missing.
pub async fn load_or_create(path: &Path) -> anyhow::Result<Config> {
    let text = match fs::read_to_string(path).await {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "configuration file not found, creating default");
            fs::write(path, DEFAULT_CONFIG)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            DEFAULT_CONFIG.to_string()
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {}", path.display()));
        }
    };

    Config::parse(&text).with_context(|| format!("Invalid configuration in {}", path.display()))
}
