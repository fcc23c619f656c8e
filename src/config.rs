use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub node_id: Option<String>,
    pub hostname: Option<String>,

    pub bind_addr: String,
    pub raft_port: u16,
    pub voter: bool,

    pub data_dir: PathBuf,

    /// Nodes to join through. Empty on the node that founds the cluster.
    pub peers: Vec<PeerConfig>,

    pub bootstrap: BootstrapSettings,

    pub membership_refresh_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerConfig {
    pub node_id: String,
    pub hostname: String,
    pub raft_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapSettings {
    pub join_backoff_ms: u64,
    pub max_attempts: u32,
    pub retry_interval_ms: u64,
    pub rpc_timeout_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: None,
            hostname: None,
            bind_addr: "0.0.0.0".to_string(),
            raft_port: 8300,
            voter: true,
            data_dir: PathBuf::from("/var/lib/metaraft"),
            peers: Vec::new(),
            bootstrap: BootstrapSettings::default(),
            membership_refresh_secs: 5,
        }
    }
}

impl Default for BootstrapSettings {
    fn default() -> Self {
        Self {
            join_backoff_ms: 50,
            max_attempts: 3,
            retry_interval_ms: 1000,
            rpc_timeout_ms: 5000,
        }
    }
}

impl BootstrapSettings {
    pub fn join_backoff(&self) -> Duration {
        Duration::from_millis(self.join_backoff_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }
}

impl NodeConfig {
    pub fn load(path: &PathBuf) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, path: &PathBuf) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Falls back to the hostname so the id survives restarts.
    pub fn effective_node_id(&self) -> String {
        self.node_id
            .clone()
            .unwrap_or_else(|| self.effective_hostname())
    }

    pub fn effective_hostname(&self) -> String {
        self.hostname.clone().unwrap_or_else(|| {
            hostname::get()
                .map(|h| h.to_string_lossy().to_string())
                .unwrap_or_else(|_| "localhost".to_string())
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.raft_port)
    }

    /// Address other nodes dial to reach this one.
    pub fn raft_addr(&self) -> String {
        format!("{}:{}", self.effective_hostname(), self.raft_port)
    }

    pub fn port_by_node(&self) -> HashMap<String, u16> {
        let mut ports: HashMap<String, u16> = self
            .peers
            .iter()
            .map(|p| (p.node_id.clone(), p.raft_port))
            .collect();
        ports.insert(self.effective_node_id(), self.raft_port);
        ports
    }
}
