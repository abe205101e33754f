//! Configuration for the snmpfleet simulator

use std::collections::HashSet;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
}

/// One virtual agent. `walk`, `ip` and `port` are required; everything else
/// has a serving default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Defaults to `ip:port`.
    pub name: Option<String>,
    /// Defaults to the built-in device: no modifiers, no VLANs.
    pub device: Option<PathBuf>,
    pub walk: PathBuf,
    pub ip: String,
    pub port: u16,
    #[serde(default = "default_community")]
    pub community: String,
}

fn default_community() -> String {
    "public".to_string()
}

impl AgentConfig {
    pub fn name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{}:{}", self.ip, self.port))
    }

    /// Transport-layer address form.
    pub fn address(&self) -> String {
        format!("{}/{}", self.ip, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            format: LogFormat::Compact,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LogFormat {
    #[serde(rename = "json")]
    Json,
    #[serde(rename = "compact")]
    Compact,
    #[serde(rename = "full")]
    Full,
}

impl FleetConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: FleetConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    pub fn load_from_env() -> Result<Self> {
        let mut settings = config::Config::builder();

        // Load from environment variables with SNMPFLEET_ prefix
        settings = settings.add_source(
            config::Environment::with_prefix("SNMPFLEET")
                .separator("_")
        );

        let config = settings.build()?;
        let fleet_config = config.try_deserialize()?;
        Ok(fleet_config)
    }

    pub fn validate(&self) -> Result<()> {
        let mut endpoints = HashSet::new();
        for agent in &self.agents {
            if agent.ip.parse::<IpAddr>().is_err() {
                return Err(Error::parse(format!(
                    "Agent {:?}: invalid bind address {:?}",
                    agent.name(),
                    agent.ip
                )));
            }
            if agent.walk.as_os_str().is_empty() {
                return Err(Error::parse(format!(
                    "Agent {:?}: walk file is required",
                    agent.name()
                )));
            }
            if !endpoints.insert((agent.ip.clone(), agent.port)) {
                return Err(Error::parse(format!(
                    "Duplicate agent endpoint {}",
                    agent.address()
                )));
            }
        }
        Ok(())
    }

    pub fn default_config() -> Self {
        Self {
            logging: LoggingConfig::default(),
            agents: vec![AgentConfig {
                name: Some("example-router".to_string()),
                device: None,
                walk: PathBuf::from("walks/example.walk"),
                ip: "127.0.0.1".to_string(),
                port: 16100,
                community: default_community(),
            }],
        }
    }
}
