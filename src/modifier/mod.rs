//! Per-OID value modifiers
//!
//! A modifier rewrites a stored variable each time it is read, so a walk
//! captured once keeps producing plausible time-varying values. Modifiers are
//! configured on a device descriptor by a `class` tag plus a property map and
//! are looked up through [`Modifier::from_config`]; unknown tags are logged
//! and dropped rather than failing the device.

pub mod community;
pub mod numeric;
pub mod octets;

use std::collections::BTreeMap;

use tracing::warn;

use crate::snmp::value::Variable;

pub use community::CommunityContextModifier;
pub use numeric::{NumericKind, NumericModifier};
pub use octets::OctetStringModifier;

/// Typed accessors over the `properties` map of a modifier binding.
///
/// Values come from YAML, so everything is permissive: a missing key or a
/// value of the wrong shape reads as `None` and the caller falls back to its
/// default. Keys are accepted in camelCase (the descriptor convention) and
/// snake_case.
#[derive(Debug, Clone, Default)]
pub struct ModifierProperties(serde_yaml::Mapping);

impl ModifierProperties {
    pub fn new(mapping: serde_yaml::Mapping) -> Self {
        Self(mapping)
    }

    fn lookup(&self, key: &str) -> Option<&serde_yaml::Value> {
        if let Some(value) = self.0.get(&serde_yaml::Value::from(key)) {
            return Some(value);
        }
        let snake: String = key
            .chars()
            .flat_map(|c| {
                if c.is_ascii_uppercase() {
                    vec!['_', c.to_ascii_lowercase()]
                } else {
                    vec![c]
                }
            })
            .collect();
        self.0.get(&serde_yaml::Value::from(snake.as_str()))
    }

    pub fn get_integer(&self, key: &str) -> Option<i32> {
        self.lookup(key)?.as_i64()?.try_into().ok()
    }

    pub fn get_long(&self, key: &str) -> Option<i64> {
        self.lookup(key)?.as_i64()
    }

    pub fn get_unsigned_long(&self, key: &str) -> Option<u64> {
        self.lookup(key)?.as_u64()
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        Some(self.lookup(key)?.as_str()?.to_string())
    }

    pub fn get_string_list(&self, key: &str) -> Option<Vec<String>> {
        let seq = self.lookup(key)?.as_sequence()?;
        Some(
            seq.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
        )
    }
}

/// Per-context expansion result of a community-context modifier.
pub type ContextBindings = BTreeMap<crate::snmp::oid::Oid, Variable>;

/// One configured modifier. Value type owned by its device; cheap to clone.
#[derive(Debug, Clone)]
pub enum Modifier {
    Numeric(NumericModifier),
    OctetString(OctetStringModifier),
    CommunityContext(CommunityContextModifier),
}

impl Modifier {
    /// Resolve a `class` tag to a modifier. Tags are matched after
    /// lowercasing, dropping separators and a trailing `modifier` suffix, so
    /// `Counter32Modifier`, `counter32` and `counter-32` all resolve alike.
    pub fn from_config(class: &str, properties: &ModifierProperties) -> Option<Modifier> {
        let tag: String = class
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        let tag = tag.strip_suffix("modifier").unwrap_or(&tag);

        match tag {
            "integer32" => Some(Modifier::Numeric(NumericModifier::new(
                NumericKind::Integer32,
                properties,
            ))),
            "unsigned32" | "gauge32" | "uint32" => Some(Modifier::Numeric(NumericModifier::new(
                NumericKind::Gauge32,
                properties,
            ))),
            "counter32" => Some(Modifier::Numeric(NumericModifier::new(
                NumericKind::Counter32,
                properties,
            ))),
            "counter64" => Some(Modifier::Numeric(NumericModifier::new(
                NumericKind::Counter64,
                properties,
            ))),
            "timeticks" => Some(Modifier::Numeric(NumericModifier::new(
                NumericKind::TimeTicks,
                properties,
            ))),
            "sysuptime" => Some(Modifier::Numeric(NumericModifier::new(
                NumericKind::SysUpTime,
                properties,
            ))),
            "octetstring" => Some(Modifier::OctetString(OctetStringModifier::new(properties))),
            "communitycontext" | "communityindexcommunitycontext" => Some(
                Modifier::CommunityContext(CommunityContextModifier::new(properties)),
            ),
            _ => {
                warn!(class, "Unknown modifier class, dropping modifier");
                None
            }
        }
    }

    /// Apply to a value, producing the next value. Community-context
    /// modifiers do not transform single values and pass them through; the
    /// agent assembler consumes them via [`CommunityContextModifier::expand`].
    pub fn modify(&self, variable: &Variable) -> Variable {
        match self {
            Modifier::Numeric(m) => m.modify(variable),
            Modifier::OctetString(m) => m.modify(variable),
            Modifier::CommunityContext(_) => variable.clone(),
        }
    }

    pub fn as_community_context(&self) -> Option<&CommunityContextModifier> {
        match self {
            Modifier::CommunityContext(m) => Some(m),
            _ => None,
        }
    }
}

#[cfg(test)]
pub(crate) fn props_from_yaml(yaml: &str) -> ModifierProperties {
    ModifierProperties::new(serde_yaml::from_str(yaml).unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_properties_accessors() {
        let props = props_from_yaml("{minimum: 5, maximumStep: 9, mode: rotate}");
        assert_eq!(props.get_integer("minimum"), Some(5));
        assert_eq!(props.get_unsigned_long("maximumStep"), Some(9));
        assert_eq!(props.get_string("mode").as_deref(), Some("rotate"));
        assert_eq!(props.get_long("missing"), None);
    }

    #[test]
    fn test_properties_snake_case_fallback() {
        let props = props_from_yaml("{minimum_step: 3}");
        assert_eq!(props.get_long("minimumStep"), Some(3));
    }

    #[test]
    fn test_registry_resolves_aliases() {
        let props = ModifierProperties::default();
        assert!(Modifier::from_config("Counter32Modifier", &props).is_some());
        assert!(Modifier::from_config("counter32", &props).is_some());
        assert!(Modifier::from_config("sysUpTime", &props).is_some());
        assert!(Modifier::from_config("CommunityContextModifier", &props)
            .and_then(|m| m.as_community_context().cloned())
            .is_some());
    }

    #[test]
    fn test_registry_unknown_tag_dropped() {
        let props = ModifierProperties::default();
        assert!(Modifier::from_config("FancyNewModifier", &props).is_none());
    }
}
