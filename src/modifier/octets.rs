//! Octet-string modifier cycling through a configured value list

use rand::seq::SliceRandom;
use tracing::warn;

use super::ModifierProperties;
use crate::snmp::value::Variable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Random,
    Rotate,
}

/// Replaces an octet-string value with one from a configured list, either
/// picked uniformly at random or rotated in order. Rotation is derived from
/// the current value's position in the list, so the modifier itself carries
/// no cursor state.
#[derive(Debug, Clone)]
pub struct OctetStringModifier {
    values: Vec<Vec<u8>>,
    mode: Mode,
}

impl OctetStringModifier {
    pub fn new(properties: &ModifierProperties) -> Self {
        let values: Vec<Vec<u8>> = properties
            .get_string_list("values")
            .unwrap_or_default()
            .into_iter()
            .map(String::into_bytes)
            .collect();
        if values.is_empty() {
            warn!("Octet-string modifier configured without values, passing through");
        }
        let mode = match properties.get_string("mode").as_deref() {
            Some("rotate") => Mode::Rotate,
            Some("random") | None => Mode::Random,
            Some(other) => {
                warn!(mode = other, "Unknown octet-string mode, using random");
                Mode::Random
            }
        };
        Self { values, mode }
    }

    pub fn modify(&self, variable: &Variable) -> Variable {
        let current = match variable {
            Variable::OctetString(bytes) => bytes,
            _ => {
                warn!(
                    syntax = variable.syntax(),
                    "Octet-string modifier applied to mismatched syntax, passing through"
                );
                return variable.clone();
            }
        };
        let next = match self.mode {
            Mode::Random => self.values.choose(&mut rand::thread_rng()),
            Mode::Rotate => {
                let index = self
                    .values
                    .iter()
                    .position(|v| v == current)
                    .map(|i| (i + 1) % self.values.len())
                    .unwrap_or(0);
                self.values.get(index)
            }
        };
        match next {
            Some(next) => Variable::OctetString(next.clone()),
            None => variable.clone(),
        }
    }
}
