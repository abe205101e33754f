//! Object identifiers with the lexicographic ordering SNMP retrieval relies on

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// An SNMP object identifier: an immutable ordered sequence of u32 subids.
///
/// `Ord` is lexicographic over the subid sequence, so a prefix sorts before
/// every OID underneath it. That is the order GETNEXT walks in.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Oid(Vec<u32>);

impl Oid {
    pub fn new(subids: Vec<u32>) -> Self {
        Self(subids)
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn subids(&self) -> &[u32] {
        &self.0
    }

    pub fn last(&self) -> Option<u32> {
        self.0.last().copied()
    }

    /// Compare only the first `n` subids of both OIDs. Subids beyond `n` are
    /// ignored; a side shorter than `n` compares by length.
    pub fn left_most_compare(&self, n: usize, other: &Oid) -> Ordering {
        let a = &self.0[..self.0.len().min(n)];
        let b = &other.0[..other.0.len().min(n)];
        a.cmp(b)
    }

    /// True if `self` starts with all of `prefix`'s subids.
    pub fn starts_with(&self, prefix: &Oid) -> bool {
        self.0.len() >= prefix.0.len() && self.0[..prefix.0.len()] == prefix.0[..]
    }

    /// The smallest OID of the same length strictly greater than `self`:
    /// last subid + 1. `[root, root.next_peer())` spans root's subtree.
    pub fn next_peer(&self) -> Oid {
        let mut subids = self.0.clone();
        if let Some(last) = subids.last_mut() {
            *last = last.wrapping_add(1);
        }
        Oid(subids)
    }

    /// The prefix of length `n` (the whole OID if shorter).
    pub fn trim_to(&self, n: usize) -> Oid {
        Oid(self.0[..self.0.len().min(n)].to_vec())
    }

    /// Strip the final subid. Empty input stays empty.
    pub fn parent(&self) -> Oid {
        let mut subids = self.0.clone();
        subids.pop();
        Oid(subids)
    }

    /// Length of the longest common prefix with `other`.
    pub fn common_prefix_len(&self, other: &Oid) -> usize {
        self.0
            .iter()
            .zip(other.0.iter())
            .take_while(|(a, b)| a == b)
            .count()
    }

    /// Append one subid, returning a new OID.
    pub fn child(&self, subid: u32) -> Oid {
        let mut subids = self.0.clone();
        subids.push(subid);
        Oid(subids)
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for subid in &self.0 {
            if !first {
                write!(f, ".")?;
            }
            write!(f, "{}", subid)?;
            first = false;
        }
        Ok(())
    }
}

impl FromStr for Oid {
    type Err = Error;

    /// Parse dotted notation. A leading dot is tolerated (walk dumps use both
    /// `1.3.6.1` and `.1.3.6.1`).
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim_start_matches('.');
        if trimmed.is_empty() {
            return Err(Error::parse(format!("Invalid OID: {:?}", s)));
        }
        let subids: std::result::Result<Vec<u32>, _> =
            trimmed.split('.').map(|part| part.parse::<u32>()).collect();
        match subids {
            Ok(subids) => Ok(Oid(subids)),
            Err(_) => Err(Error::parse(format!("Invalid OID: {:?}", s))),
        }
    }
}

impl From<&[u32]> for Oid {
    fn from(subids: &[u32]) -> Self {
        Oid(subids.to_vec())
    }
}
