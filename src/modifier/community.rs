//! Community-context expansion of walk bindings
//!
//! Some tables (BRIDGE-MIB most prominently) are served per VLAN through
//! community-indexed contexts: the same OID answers with a different value in
//! `community@10` than in `community@20`. This modifier does not transform a
//! single value; the agent assembler asks it to expand one walk binding into
//! the bindings a given context should carry, and drops the original.

use super::ModifierProperties;
use super::ContextBindings;
use crate::snmp::oid::Oid;
use crate::snmp::value::Variable;

#[derive(Debug, Clone)]
pub struct CommunityContextModifier {
    /// Added to the context's VLAN identifier to derive the served value
    /// (an interface-index base, typically).
    index_offset: u64,
}

impl CommunityContextModifier {
    pub fn new(properties: &ModifierProperties) -> Self {
        Self {
            index_offset: properties.get_unsigned_long("indexOffset").unwrap_or(0),
        }
    }

    /// Bindings that `context` should carry in place of `(oid, base)`.
    ///
    /// The default context gets none: a community-indexed object only exists
    /// inside the VLAN views. A VLAN context maps the OID to the VLAN's
    /// derived index; a context that is not a VLAN number keeps the captured
    /// value so an unexpected context still answers coherently.
    pub fn expand(&self, context: &str, oid: &Oid, base: &Variable) -> ContextBindings {
        let mut bindings = ContextBindings::new();
        if context.is_empty() {
            return bindings;
        }
        match context.parse::<u64>() {
            Ok(vlan) => {
                let index = vlan.saturating_add(self.index_offset);
                bindings.insert(oid.clone(), Variable::UInt32(index as u32));
            }
            Err(_) => {
                bindings.insert(oid.clone(), base.clone());
            }
        }
        bindings
    }
}
