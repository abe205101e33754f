//! Subtree root extraction for managed-object registration
//!
//! Given the ordered OID set of a walk, compute the minimal set of subtree
//! roots such that every OID has exactly one root as a prefix and no root is
//! a prefix of another. Each root becomes one registered managed-object
//! group covering `[root, root.next_peer())`.

use crate::snmp::oid::Oid;

/// Compute the roots of `oids` (must be sorted ascending, as a
/// `BTreeMap`'s key iteration yields them). The result is sorted, deduped
/// and pairwise prefix-free.
pub fn extract_roots(oids: &[Oid]) -> Vec<Oid> {
    // Candidates are the longest common prefixes of adjacent OIDs.
    let mut candidates: Vec<Oid> = Vec::new();
    for pair in oids.windows(2) {
        let n = pair[0].common_prefix_len(&pair[1]);
        if n > 0 {
            candidates.push(pair[0].trim_to(n));
        }
    }
    candidates.sort();
    candidates.dedup();

    // A candidate is a root iff none of its proper prefixes is itself a
    // candidate; the shorter candidate covers it otherwise.
    let mut roots: Vec<Oid> = Vec::new();
    for candidate in &candidates {
        let mut prefix = candidate.parent();
        let mut covered = false;
        while !prefix.is_empty() {
            if candidates.binary_search(&prefix).is_ok() {
                covered = true;
                break;
            }
            prefix = prefix.parent();
        }
        if !covered && !roots.contains(candidate) {
            roots.push(candidate.clone());
        }
    }

    // OIDs the pairwise pass left uncovered (a singleton walk, or an isolated
    // leaf sharing no prefix with its neighbors) contribute their parent.
    for oid in oids {
        if !roots.iter().any(|root| oid.starts_with(root)) {
            let root = if oid.len() > 1 { oid.parent() } else { oid.clone() };
            if !roots.contains(&root) {
                roots.push(root);
            }
        }
    }
    roots.sort();

    // Coarsen: keep the shorter of any prefix-related pair so the result
    // stays prefix-free. Sorted order puts a prefix directly before the OIDs
    // underneath it.
    let mut pruned: Vec<Oid> = Vec::new();
    for root in roots {
        match pruned.last() {
            Some(prev) if root.starts_with(prev) => {}
            _ => pruned.push(root),
        }
    }
    pruned
}
