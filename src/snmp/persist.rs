//! Per-agent persisted engine state
//!
//! Two small files live alongside each agent's walk: the boot counter and an
//! engine-config snapshot. Their names are the URL-encoded agent name (RFC
//! 3986, UTF-8) so arbitrary agent names stay filesystem-safe.

use std::path::{Path, PathBuf};

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::Result;

fn encoded(name: &str) -> String {
    utf8_percent_encode(name, NON_ALPHANUMERIC).to_string()
}

pub fn boot_counter_path(walk_dir: &Path, agent_name: &str) -> PathBuf {
    walk_dir.join(format!("{}.BC.cfg", encoded(agent_name)))
}

pub fn engine_config_path(walk_dir: &Path, agent_name: &str) -> PathBuf {
    walk_dir.join(format!("{}.Config.cfg", encoded(agent_name)))
}

/// Read, increment and write back the boot counter. A missing or garbled
/// file restarts the count at 1.
pub fn increment_boot_counter(path: &Path) -> Result<u32> {
    let previous = match std::fs::read_to_string(path) {
        Ok(text) => text.trim().parse::<u32>().unwrap_or_else(|_| {
            warn!(path = %path.display(), "Unreadable boot counter, resetting");
            0
        }),
        Err(_) => 0,
    };
    let count = previous.wrapping_add(1);
    std::fs::write(path, format!("{}\n", count))?;
    Ok(count)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    pub agent: String,
    pub address: String,
    pub boot_count: u32,
}

pub fn write_engine_config(path: &Path, config: &EngineConfig) -> Result<()> {
    std::fs::write(path, serde_json::to_string_pretty(config)?)?;
    Ok(())
}
