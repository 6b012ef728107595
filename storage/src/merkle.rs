// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

//! A binary merkle tree over the leaf hashes of a revision.
//!
//! Leaves are kept in ascending key order. Each level pairs adjacent nodes
//! left to right; when a level has an odd number of nodes, the last one is
//! promoted to the next level unchanged. The root of an empty tree is
//! [`TrieHash::empty`].

use crate::TrieHash;
use crate::hashednode::hash_branch;

/// One step of a path from a leaf to the root. `None` means the node had
/// no sibling at that level and was promoted.
pub type PathStep = Option<TrieHash>;

/// All levels of the tree, from the leaves up to the root.
#[derive(Debug, Clone, Default)]
pub struct MerkleTree {
    levels: Vec<Vec<TrieHash>>,
}

impl MerkleTree {
    /// Build the tree from leaf hashes in ascending key order.
    #[must_use]
    pub fn new(leaves: Vec<TrieHash>) -> Self {
        if leaves.is_empty() {
            return Self::default();
        }

        let mut levels = vec![leaves];
        while let Some(level) = levels.last().filter(|level| level.len() > 1) {
            let next = level
                .chunks(2)
                .map(|pair| match pair {
                    [left, right] => hash_branch(left, right),
                    [single] => *single,
                    _ => unreachable!("chunks(2) yields one or two items"),
                })
                .collect();
            levels.push(next);
        }

        Self { levels }
    }

    /// The number of leaves
    #[must_use]
    pub fn len(&self) -> usize {
        self.levels.first().map_or(0, Vec::len)
    }

    /// True if the tree has no leaves
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The root hash of the tree
    #[must_use]
    pub fn root_hash(&self) -> TrieHash {
        self.levels
            .last()
            .and_then(|level| level.first())
            .copied()
            .unwrap_or_else(TrieHash::empty)
    }

    /// The hash of the leaf at `index`, if any
    #[must_use]
    pub fn leaf(&self, index: usize) -> Option<&TrieHash> {
        self.levels.first().and_then(|leaves| leaves.get(index))
    }

    /// Returns the sibling hashes from the leaf at `index` up to (but not
    /// including) the root, or `None` if `index` is out of range.
    #[must_use]
    pub fn path(&self, index: usize) -> Option<Vec<PathStep>> {
        if index >= self.len() {
            return None;
        }

        let mut position = index;
        let mut path = Vec::with_capacity(self.levels.len().saturating_sub(1));
        for level in self.levels.iter().take(self.levels.len() - 1) {
            let sibling = position ^ 1;
            path.push(level.get(sibling).copied());
            position /= 2;
        }
        Some(path)
    }
}

/// The number of path steps a leaf needs in a tree with `leaf_count`
/// leaves.
#[must_use]
pub const fn path_len(leaf_count: usize) -> usize {
    let mut width = leaf_count;
    let mut depth = 0;
    while width > 1 {
        width = width.div_ceil(2);
        depth += 1;
    }
    depth
}

/// Recompute the root hash from a leaf hash and its path.
///
/// Returns `None` if the path is inconsistent with the shape of a tree
/// with `leaf_count` leaves: wrong length, a missing sibling where one
/// must exist, or a sibling where the node is promoted.
#[must_use]
pub fn compute_root(
    leaf: TrieHash,
    index: usize,
    leaf_count: usize,
    path: &[PathStep],
) -> Option<TrieHash> {
    if index >= leaf_count || path.len() != path_len(leaf_count) {
        return None;
    }

    let mut hash = leaf;
    let mut position = index;
    let mut width = leaf_count;
    for step in path {
        let has_sibling = (position ^ 1) < width;
        hash = match (step, has_sibling) {
            (Some(sibling), true) if position % 2 == 0 => hash_branch(&hash, sibling),
            (Some(sibling), true) => hash_branch(sibling, &hash),
            (None, false) => hash,
            _ => return None,
        };
        position /= 2;
        width = width.div_ceil(2);
    }
    Some(hash)
}
