//! Managed-object callback contract between the engine and the store

use std::fmt;

use super::oid::Oid;
use super::value::{Variable, VariableBinding};

/// SNMP error status codes (RFC 3416)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorStatus {
    NoError = 0,
    TooBig = 1,
    NoSuchName = 2,
    BadValue = 3,
    ReadOnly = 4,
    GenErr = 5,
    NoAccess = 6,
    WrongType = 7,
    WrongLength = 8,
    WrongEncoding = 9,
    WrongValue = 10,
    NoCreation = 11,
    InconsistentValue = 12,
    ResourceUnavailable = 13,
    CommitFailed = 14,
    UndoFailed = 15,
    AuthorizationError = 16,
    NotWritable = 17,
    InconsistentName = 18,
}

impl ErrorStatus {
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// A half-open OID interval, optionally tagged with the context that owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoScope {
    pub lower: Oid,
    pub lower_included: bool,
    pub upper: Oid,
    pub upper_included: bool,
    pub context: Option<String>,
}

impl MoScope {
    /// The scope of a whole subtree: `[root, root.next_peer())`.
    pub fn subtree(root: &Oid) -> Self {
        Self {
            lower: root.clone(),
            lower_included: true,
            upper: root.next_peer(),
            upper_included: false,
            context: None,
        }
    }

    pub fn with_context(mut self, context: &str) -> Self {
        self.context = Some(context.to_string());
        self
    }

    pub fn covers(&self, oid: &Oid) -> bool {
        let above_lower = match oid.cmp(&self.lower) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Equal => self.lower_included,
            std::cmp::Ordering::Less => false,
        };
        let below_upper = match oid.cmp(&self.upper) {
            std::cmp::Ordering::Less => true,
            std::cmp::Ordering::Equal => self.upper_included,
            std::cmp::Ordering::Greater => false,
        };
        above_lower && below_upper
    }

    /// Two scopes intersect iff their intervals overlap and their contexts
    /// match.
    pub fn intersects(&self, other: &MoScope) -> bool {
        if self.context != other.context {
            return false;
        }
        let self_below = match self.upper.cmp(&other.lower) {
            std::cmp::Ordering::Less => true,
            std::cmp::Ordering::Equal => !(self.upper_included && other.lower_included),
            std::cmp::Ordering::Greater => false,
        };
        let other_below = match other.upper.cmp(&self.lower) {
            std::cmp::Ordering::Less => true,
            std::cmp::Ordering::Equal => !(other.upper_included && self.lower_included),
            std::cmp::Ordering::Greater => false,
        };
        !(self_below || other_below)
    }
}

impl fmt::Display for MoScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}, {}{}",
            if self.lower_included { '[' } else { '(' },
            self.lower,
            self.upper,
            if self.upper_included { ']' } else { ')' },
        )
    }
}

/// A GETNEXT-style range query against one managed object.
#[derive(Debug, Clone)]
pub struct MoQuery {
    pub lower: Oid,
    pub lower_included: bool,
}

impl MoQuery {
    pub fn next_of(oid: &Oid) -> Self {
        Self {
            lower: oid.clone(),
            lower_included: false,
        }
    }
}

/// One variable binding's slice of a PDU, handed to the owning managed
/// object a phase at a time.
#[derive(Debug, Clone)]
pub struct SubRequest {
    pub binding: VariableBinding,
    pub status: ErrorStatus,
    pub completed: bool,
}

impl SubRequest {
    pub fn new(oid: Oid) -> Self {
        Self {
            binding: VariableBinding::new(oid, Variable::Null),
            status: ErrorStatus::NoError,
            completed: false,
        }
    }

    pub fn with_value(oid: Oid, variable: Variable) -> Self {
        Self {
            binding: VariableBinding::new(oid, variable),
            status: ErrorStatus::NoError,
            completed: false,
        }
    }

    pub fn set_error(&mut self, status: ErrorStatus) {
        self.status = status;
    }

    pub fn has_error(&self) -> bool {
        self.status != ErrorStatus::NoError
    }

    pub fn mark_complete(&mut self) {
        self.completed = true;
    }
}

/// Callback interface the engine drives. Invoked synchronously from worker
/// tasks; implementations guard their own state.
pub trait ManagedObject: Send + Sync {
    fn scope(&self) -> MoScope;

    /// Smallest OID in this object that satisfies `query`, or `None`.
    fn find(&self, query: &MoQuery) -> Option<Oid>;

    /// GET: answer `sub.binding.oid`, `NoSuchInstance` when absent.
    fn get(&self, sub: &mut SubRequest);

    /// GETNEXT: advance to the next OID within this object. Returns false
    /// when this object has nothing past the query and the engine should try
    /// the next registration.
    fn next(&self, sub: &mut SubRequest) -> bool;

    // SET two-phase commit
    fn prepare(&self, sub: &mut SubRequest);
    fn commit(&self, sub: &mut SubRequest);
    fn undo(&self, sub: &mut SubRequest);
    fn cleanup(&self, sub: &mut SubRequest);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(s: &str) -> Oid {
        s.parse().unwrap()
    }

    #[test]
    fn test_subtree_scope_covers() {
        let scope = MoScope::subtree(&oid("1.3.6.1.2.1.1"));
        assert!(scope.covers(&oid("1.3.6.1.2.1.1")));
        assert!(scope.covers(&oid("1.3.6.1.2.1.1.1.0")));
        assert!(!scope.covers(&oid("1.3.6.1.2.1.2")));
        assert!(!scope.covers(&oid("1.3.6.1.2.1.0")));
    }

    #[test]
    fn test_intersection() {
        let a = MoScope::subtree(&oid("1.3.6.1.2.1.1"));
        let b = MoScope::subtree(&oid("1.3.6.1.2.1.1.1"));
        let c = MoScope::subtree(&oid("1.3.6.1.2.1.2"));
        assert!(a.intersects(&b));
        assert!(b.intersects(&a));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn test_contexts_partition_scopes() {
        let a = MoScope::subtree(&oid("1.3.6.1.2.1.1")).with_context("10");
        let b = MoScope::subtree(&oid("1.3.6.1.2.1.1")).with_context("20");
        let c = MoScope::subtree(&oid("1.3.6.1.2.1.1")).with_context("10");
        assert!(!a.intersects(&b));
        assert!(a.intersects(&c));
    }

    #[test]
    fn test_adjacent_subtrees_do_not_intersect() {
        let a = MoScope::subtree(&oid("1.3.6.1.2.1.1"));
        let b = MoScope::subtree(&oid("1.3.6.1.2.1.2"));
        assert!(!a.intersects(&b));
        assert_eq!(a.upper, b.lower);
    }
}
