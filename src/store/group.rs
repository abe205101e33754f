//! Sorted-map managed object group
//!
//! One group owns one registered subtree `[root, root.next_peer())` of a
//! walk. GET/GETNEXT read the map (advancing modified variables as they are
//! read); SET mutates it under the two-phase-commit protocol. A single mutex
//! guards map and undo buffer; every callback phase takes it as a unit, so
//! concurrent reads never observe a half-applied commit.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Mutex;

use tracing::warn;

use super::modified::ModifiedVariable;
use crate::snmp::oid::Oid;
use crate::snmp::scope::{ErrorStatus, ManagedObject, MoQuery, MoScope, SubRequest};
use crate::snmp::value::Variable;

/// What a group stores per OID: a plain captured value, or one wrapped in a
/// modifier chain that advances on every read.
#[derive(Debug, Clone)]
pub enum StoredVariable {
    Static(Variable),
    Modified(ModifiedVariable),
}

impl StoredVariable {
    pub fn syntax(&self) -> u8 {
        match self {
            StoredVariable::Static(v) => v.syntax(),
            StoredVariable::Modified(m) => m.syntax(),
        }
    }

    fn read(&mut self) -> Variable {
        match self {
            StoredVariable::Static(v) => v.clone(),
            StoredVariable::Modified(m) => m.advance(),
        }
    }
}

struct GroupInner {
    map: BTreeMap<Oid, StoredVariable>,
    undo: Vec<(Oid, StoredVariable)>,
}

pub struct MoGroup {
    root: Oid,
    context: Option<String>,
    inner: Mutex<GroupInner>,
}

impl MoGroup {
    /// A whole-subtree group. Keys outside the root's scope are a caller
    /// bug; they are dropped with a warning rather than corrupting `find`.
    pub fn new(root: Oid, context: Option<&str>, bindings: BTreeMap<Oid, StoredVariable>) -> Self {
        let scope = MoScope::subtree(&root);
        let mut map = BTreeMap::new();
        for (oid, stored) in bindings {
            if scope.covers(&oid) {
                map.insert(oid, stored);
            } else {
                warn!(%oid, root = %root, "Binding outside group scope, dropping");
            }
        }
        Self {
            root,
            context: context.map(str::to_string),
            inner: Mutex::new(GroupInner {
                map,
                undo: Vec::new(),
            }),
        }
    }

    /// A single-entry group used by the per-OID registration fallback.
    pub fn single(oid: Oid, stored: StoredVariable, context: Option<&str>) -> Self {
        let mut bindings = BTreeMap::new();
        bindings.insert(oid.clone(), stored);
        Self::new(oid, context, bindings)
    }

    pub fn root(&self) -> &Oid {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GroupInner> {
        // A poisoned lock means a panic mid-phase; the map itself is always
        // structurally valid, so serving on is better than cascading.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ManagedObject for MoGroup {
    fn scope(&self) -> MoScope {
        let scope = MoScope::subtree(&self.root);
        match &self.context {
            Some(context) => scope.with_context(context),
            None => scope,
        }
    }

    fn find(&self, query: &MoQuery) -> Option<Oid> {
        let inner = self.lock();
        let bound = if query.lower_included {
            Bound::Included(query.lower.clone())
        } else {
            Bound::Excluded(query.lower.clone())
        };
        inner
            .map
            .range((bound, Bound::Unbounded))
            .next()
            .map(|(oid, _)| oid.clone())
    }

    fn get(&self, sub: &mut SubRequest) {
        let mut inner = self.lock();
        let oid = sub.binding.oid.clone();
        sub.binding.variable = match inner.map.get_mut(&oid) {
            Some(stored) => stored.read(),
            None => Variable::NoSuchInstance,
        };
        sub.mark_complete();
    }

    fn next(&self, sub: &mut SubRequest) -> bool {
        let mut inner = self.lock();
        let candidate = inner
            .map
            .range((
                Bound::Excluded(sub.binding.oid.clone()),
                Bound::Unbounded,
            ))
            .next()
            .map(|(oid, _)| oid.clone());
        match candidate {
            Some(oid) => {
                let value = inner
                    .map
                    .get_mut(&oid)
                    .map(StoredVariable::read)
                    .unwrap_or(Variable::Null);
                sub.binding.oid = oid;
                sub.binding.variable = value;
                sub.mark_complete();
                true
            }
            None => false,
        }
    }

    fn prepare(&self, sub: &mut SubRequest) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let oid = sub.binding.oid.clone();
        let new_value = sub.binding.variable.clone();

        // Row-status probes arrive with a Null payload and are a no-op.
        if new_value.syntax() == crate::snmp::value::syntax::NULL {
            sub.mark_complete();
            return;
        }

        if !MoScope::subtree(&self.root).covers(&oid) {
            sub.set_error(ErrorStatus::NoCreation);
        } else {
            match inner.map.get(&oid) {
                None => sub.set_error(ErrorStatus::NoCreation),
                Some(stored) if stored.syntax() != new_value.syntax() => {
                    sub.set_error(ErrorStatus::InconsistentValue);
                }
                Some(stored) => {
                    if !inner.undo.iter().any(|(stashed, _)| stashed == &oid) {
                        let previous = stored.clone();
                        inner.undo.push((oid, previous));
                    }
                }
            }
        }
        sub.mark_complete();
    }

    fn commit(&self, sub: &mut SubRequest) {
        let mut inner = self.lock();
        if sub.has_error() {
            sub.set_error(ErrorStatus::CommitFailed);
        } else if sub.binding.variable.syntax() != crate::snmp::value::syntax::NULL {
            inner.map.insert(
                sub.binding.oid.clone(),
                StoredVariable::Static(sub.binding.variable.clone()),
            );
        }
        sub.mark_complete();
    }

    fn undo(&self, sub: &mut SubRequest) {
        let mut inner = self.lock();
        // Copied back unconditionally; an empty buffer makes this a no-op.
        let restores: Vec<_> = inner.undo.drain(..).collect();
        for (oid, previous) in restores {
            inner.map.insert(oid, previous);
        }
        sub.mark_complete();
    }

    fn cleanup(&self, sub: &mut SubRequest) {
        let mut inner = self.lock();
        inner.undo.clear();
        sub.mark_complete();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn oid(s: &str) -> Oid {
        s.parse().unwrap()
    }

    fn system_group() -> MoGroup {
        let mut bindings = BTreeMap::new();
        bindings.insert(
            oid("1.3.6.1.2.1.1.1.0"),
            StoredVariable::Static(Variable::octet_string("x")),
        );
        bindings.insert(
            oid("1.3.6.1.2.1.1.9.0"),
            StoredVariable::Static(Variable::Integer32(5)),
        );
        MoGroup::new(oid("1.3.6.1.2.1.1"), None, bindings)
    }

    #[test]
    fn test_get_hit_clones_value() {
        let group = system_group();
        let mut sub = SubRequest::new(oid("1.3.6.1.2.1.1.1.0"));
        group.get(&mut sub);
        assert!(sub.completed);
        assert_eq!(sub.binding.variable, Variable::octet_string("x"));
    }

    #[test]
    fn test_get_miss_yields_no_such_instance() {
        let group = system_group();
        let before = group.len();
        let mut sub = SubRequest::new(oid("1.3.6.1.2.1.1.2.0"));
        group.get(&mut sub);
        assert_eq!(sub.binding.variable, Variable::NoSuchInstance);
        assert_eq!(group.len(), before);
    }

    #[test]
    fn test_find_respects_inclusion_flag() {
        let group = system_group();
        let inclusive = MoQuery {
            lower: oid("1.3.6.1.2.1.1.1.0"),
            lower_included: true,
        };
        assert_eq!(group.find(&inclusive), Some(oid("1.3.6.1.2.1.1.1.0")));
        let exclusive = MoQuery::next_of(&oid("1.3.6.1.2.1.1.1.0"));
        assert_eq!(group.find(&exclusive), Some(oid("1.3.6.1.2.1.1.9.0")));
    }

    #[test]
    fn test_next_walks_and_ends() {
        let group = system_group();
        let mut sub = SubRequest::new(oid("1.3.6.1.2.1.1"));
        assert!(group.next(&mut sub));
        assert_eq!(sub.binding.oid, oid("1.3.6.1.2.1.1.1.0"));
        assert_eq!(sub.binding.variable, Variable::octet_string("x"));

        let mut sub = SubRequest::new(oid("1.3.6.1.2.1.1.9.0"));
        assert!(!group.next(&mut sub));
    }

    #[test]
    fn test_set_prepare_commit_visible_to_get() {
        let group = system_group();
        let target = oid("1.3.6.1.2.1.1.9.0");
        let mut sub = SubRequest::with_value(target.clone(), Variable::Integer32(7));
        group.prepare(&mut sub);
        assert!(!sub.has_error());
        group.commit(&mut sub);
        let mut cleanup = SubRequest::new(target.clone());
        group.cleanup(&mut cleanup);

        let mut get = SubRequest::new(target);
        group.get(&mut get);
        assert_eq!(get.binding.variable, Variable::Integer32(7));
    }

    #[test]
    fn test_set_wrong_syntax_is_inconsistent() {
        let group = system_group();
        let mut sub = SubRequest::with_value(
            oid("1.3.6.1.2.1.1.9.0"),
            Variable::octet_string("hello"),
        );
        group.prepare(&mut sub);
        assert_eq!(sub.status, ErrorStatus::InconsistentValue);
    }

    #[test]
    fn test_set_outside_scope_is_no_creation() {
        let group = system_group();
        let mut sub =
            SubRequest::with_value(oid("1.3.6.1.2.1.2.1.0"), Variable::Integer32(1));
        group.prepare(&mut sub);
        assert_eq!(sub.status, ErrorStatus::NoCreation);
    }

    #[test]
    fn test_set_absent_oid_is_no_creation() {
        let group = system_group();
        let mut sub =
            SubRequest::with_value(oid("1.3.6.1.2.1.1.4.0"), Variable::Integer32(1));
        group.prepare(&mut sub);
        assert_eq!(sub.status, ErrorStatus::NoCreation);
    }

    #[test]
    fn test_failed_commit_then_undo_restores() {
        let group = system_group();
        let target = oid("1.3.6.1.2.1.1.9.0");
        let mut sub = SubRequest::with_value(target.clone(), Variable::Integer32(7));
        group.prepare(&mut sub);
        assert!(!sub.has_error());

        // Another subrequest in the PDU failed; this one is committed with a
        // stale error and must roll back.
        sub.set_error(ErrorStatus::ResourceUnavailable);
        group.commit(&mut sub);
        assert_eq!(sub.status, ErrorStatus::CommitFailed);
        group.undo(&mut sub);

        let mut get = SubRequest::new(target);
        group.get(&mut get);
        assert_eq!(get.binding.variable, Variable::Integer32(5));
    }

    #[test]
    fn test_undo_with_empty_buffer_is_noop() {
        let group = system_group();
        let mut sub = SubRequest::new(oid("1.3.6.1.2.1.1.9.0"));
        group.undo(&mut sub);
        let mut get = SubRequest::new(oid("1.3.6.1.2.1.1.9.0"));
        group.get(&mut get);
        assert_eq!(get.binding.variable, Variable::Integer32(5));
    }

    #[test]
    fn test_null_set_is_row_status_noop() {
        let group = system_group();
        let mut sub = SubRequest::new(oid("1.3.6.1.2.1.1.9.0"));
        group.prepare(&mut sub);
        assert!(sub.completed);
        assert!(!sub.has_error());
        group.commit(&mut sub);
        let mut get = SubRequest::new(oid("1.3.6.1.2.1.1.9.0"));
        group.get(&mut get);
        assert_eq!(get.binding.variable, Variable::Integer32(5));
    }

    #[test]
    fn test_out_of_scope_bindings_dropped_at_construction() {
        let mut bindings = BTreeMap::new();
        bindings.insert(
            oid("1.3.6.1.2.1.1.1.0"),
            StoredVariable::Static(Variable::Integer32(1)),
        );
        bindings.insert(
            oid("1.3.6.1.9.9.9.0"),
            StoredVariable::Static(Variable::Integer32(2)),
        );
        let group = MoGroup::new(oid("1.3.6.1.2.1.1"), None, bindings);
        assert_eq!(group.len(), 1);
    }

    #[test]
    fn test_concurrent_reads_during_commit() {
        let group = Arc::new(system_group());
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let group = Arc::clone(&group);
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let mut sub = SubRequest::new(oid("1.3.6.1.2.1.1.9.0"));
                        group.get(&mut sub);
                        match sub.binding.variable {
                            Variable::Integer32(_) => {}
                            ref other => panic!("unexpected value {:?}", other),
                        }
                    }
                })
            })
            .collect();
        for i in 0..100 {
            let mut sub = SubRequest::with_value(
                oid("1.3.6.1.2.1.1.9.0"),
                Variable::Integer32(i),
            );
            group.prepare(&mut sub);
            group.commit(&mut sub);
            let mut cleanup = SubRequest::new(oid("1.3.6.1.2.1.1.9.0"));
            group.cleanup(&mut cleanup);
        }
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
