//! View-based access control
//!
//! A pared-down VACM: named view trees (lists of OID subtrees) and security
//! groups mapping security names to a read and a write view. Community
//! strings act as the security name for v1/v2c requests. The SNMPv3 user
//! profiles are assembled for completeness but stay inert while the engine
//! speaks v1/v2c only.

use std::collections::HashMap;

use super::oid::Oid;

#[derive(Debug, Clone)]
struct Group {
    security_names: Vec<String>,
    read_view: Option<String>,
    write_view: Option<String>,
}

#[derive(Debug, Default)]
pub struct AccessControl {
    views: HashMap<String, Vec<Oid>>,
    groups: HashMap<String, Group>,
}

impl AccessControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a view tree. Repeated calls extend the view.
    pub fn add_view(&mut self, view: &str, subtree: Oid) {
        self.views.entry(view.to_string()).or_default().push(subtree);
    }

    pub fn add_group(
        &mut self,
        group: &str,
        security_names: &[&str],
        read_view: Option<&str>,
        write_view: Option<&str>,
    ) {
        self.groups.insert(
            group.to_string(),
            Group {
                security_names: security_names.iter().map(|s| s.to_string()).collect(),
                read_view: read_view.map(str::to_string),
                write_view: write_view.map(str::to_string),
            },
        );
    }

    fn view_covers(&self, view: &Option<String>, oid: &Oid) -> bool {
        let Some(view) = view else { return false };
        self.views
            .get(view)
            .map(|subtrees| subtrees.iter().any(|subtree| oid.starts_with(subtree)))
            .unwrap_or(false)
    }

    fn group_of(&self, security_name: &str) -> Option<&Group> {
        self.groups
            .values()
            .find(|group| group.security_names.iter().any(|n| n == security_name))
    }

    pub fn can_read(&self, security_name: &str, oid: &Oid) -> bool {
        self.group_of(security_name)
            .map(|group| self.view_covers(&group.read_view, oid))
            .unwrap_or(false)
    }

    pub fn can_write(&self, security_name: &str, oid: &Oid) -> bool {
        self.group_of(security_name)
            .map(|group| self.view_covers(&group.write_view, oid))
            .unwrap_or(false)
    }
}
