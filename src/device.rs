//! Device descriptors: per-OID modifier bindings and VLAN views
//!
//! A device tells an agent how to make a captured walk behave like live
//! hardware: which OID prefixes get which value modifiers, and which VLAN
//! community contexts the agent exposes. Descriptors are YAML files parsed
//! once and shared through an explicitly injected [`DeviceFactory`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde::Deserialize;
use tracing::warn;

use crate::modifier::{Modifier, ModifierProperties};
use crate::snmp::oid::Oid;

#[derive(Debug, Deserialize)]
struct DeviceSpec {
    name: String,
    #[serde(default)]
    vlans: Vec<u64>,
    #[serde(default)]
    modifiers: Vec<ModifierSpec>,
}

#[derive(Debug, Deserialize)]
struct ModifierSpec {
    oid: String,
    class: String,
    #[serde(default)]
    properties: serde_yaml::Mapping,
}

/// One modifier attached to an OID prefix. Applicable to every OID under
/// that prefix.
#[derive(Debug, Clone)]
pub struct ModifierBinding {
    pub prefix: Oid,
    pub modifier: Modifier,
}

impl ModifierBinding {
    pub fn applies_to(&self, oid: &Oid) -> bool {
        oid.starts_with(&self.prefix)
    }
}

#[derive(Debug, Clone)]
pub struct Device {
    pub name: String,
    pub vlans: Vec<u64>,
    pub modifiers: Vec<ModifierBinding>,
}

impl Device {
    /// All modifiers whose prefix covers `oid`, in descriptor order.
    pub fn modifiers_for(&self, oid: &Oid) -> Vec<&Modifier> {
        self.modifiers
            .iter()
            .filter(|binding| binding.applies_to(oid))
            .map(|binding| &binding.modifier)
            .collect()
    }

    /// The community contexts this device serves: the default context plus
    /// one per VLAN.
    pub fn contexts(&self) -> Vec<String> {
        let mut contexts = vec![String::new()];
        contexts.extend(self.vlans.iter().map(u64::to_string));
        contexts
    }
}

static DEFAULT_DEVICE: Lazy<Arc<Device>> = Lazy::new(|| {
    Arc::new(Device {
        name: "default".to_string(),
        vlans: Vec::new(),
        modifiers: Vec::new(),
    })
});

fn parse_spec(text: &str) -> Result<Device, serde_yaml::Error> {
    let spec: DeviceSpec = serde_yaml::from_str(text)?;
    let mut modifiers = Vec::new();
    for modifier_spec in spec.modifiers {
        let prefix: Oid = match modifier_spec.oid.parse() {
            Ok(prefix) => prefix,
            Err(_) => {
                warn!(
                    device = %spec.name,
                    oid = %modifier_spec.oid,
                    "Invalid modifier OID prefix, dropping binding"
                );
                continue;
            }
        };
        let properties = ModifierProperties::new(modifier_spec.properties);
        // Unknown classes log inside from_config and are dropped here.
        if let Some(modifier) = Modifier::from_config(&modifier_spec.class, &properties) {
            modifiers.push(ModifierBinding { prefix, modifier });
        }
    }
    Ok(Device {
        name: spec.name,
        vlans: spec.vlans,
        modifiers,
    })
}

/// Parsed-device cache, read-mostly after startup. Owned by the fleet and
/// handed to each agent rather than living in a process global.
#[derive(Default)]
pub struct DeviceFactory {
    cache: DashMap<PathBuf, Arc<Device>>,
}

impl DeviceFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The device used when an agent names no descriptor: no modifiers, no
    /// VLANs.
    pub fn default_device(&self) -> Arc<Device> {
        Arc::clone(&DEFAULT_DEVICE)
    }

    /// Load a descriptor, reusing the cached parse for a path seen before.
    /// A missing or unparsable descriptor logs and falls back to the
    /// default device; the agent still starts.
    pub fn load(&self, path: &Path) -> Arc<Device> {
        if let Some(cached) = self.cache.get(path) {
            return Arc::clone(&cached);
        }
        let device = match std::fs::read_to_string(path) {
            Ok(text) => match parse_spec(&text) {
                Ok(device) => Arc::new(device),
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        "Unparsable device descriptor ({}), using default device", e
                    );
                    self.default_device()
                }
            },
            Err(e) => {
                warn!(
                    path = %path.display(),
                    "Cannot read device descriptor ({}), using default device", e
                );
                self.default_device()
            }
        };
        self.cache.insert(path.to_path_buf(), Arc::clone(&device));
        device
    }
}
