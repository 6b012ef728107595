// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

use thiserror::Error;

use crate::api;
use crate::hashednode::hash_leaf;
use crate::merkle::{MerkleTree, PathStep, compute_root, path_len};
use crate::{Key, TrieHash, Value};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProofError {
    #[error("leaf index {index} out of bounds for {leaf_count} leaves")]
    IndexOutOfBounds { index: usize, leaf_count: usize },
    #[error("proof path has {got} steps, expected {expected}")]
    PathLength { got: usize, expected: usize },
    #[error("proof leaves disagree on the leaf count")]
    LeafCountMismatch,
    #[error("unexpected hash")]
    UnexpectedHash,
    #[error("unexpected value")]
    UnexpectedValue,
    #[error("value mismatch")]
    ValueMismatch,
    #[error("expected value but got None")]
    ExpectedValue,
    #[error("proof is for a different key")]
    KeyMismatch,
    #[error("neighbouring leaves are not adjacent")]
    NotAdjacent,
    #[error("neighbouring leaves do not bracket the key")]
    NotBracketed,
}

impl ProofError {
    /// True if the error means the proof is shaped wrong, rather than
    /// well-formed but not valid for the given key and root.
    #[must_use]
    pub const fn is_malformed(&self) -> bool {
        matches!(
            self,
            ProofError::IndexOutOfBounds { .. }
                | ProofError::PathLength { .. }
                | ProofError::LeafCountMismatch
        )
    }
}

/// The position of a single leaf together with the sibling hashes that
/// lead from it to the root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeafProof {
    pub key: Key,
    pub value: Value,
    pub index: usize,
    pub leaf_count: usize,
    pub path: Box<[PathStep]>,
}

impl LeafProof {
    pub(crate) fn new(tree: &MerkleTree, index: usize, key: Key, value: Value) -> Option<Self> {
        let path = tree.path(index)?;
        Some(Self {
            key,
            value,
            index,
            leaf_count: tree.len(),
            path: path.into_boxed_slice(),
        })
    }

    fn check_shape(&self) -> Result<(), ProofError> {
        if self.index >= self.leaf_count {
            return Err(ProofError::IndexOutOfBounds {
                index: self.index,
                leaf_count: self.leaf_count,
            });
        }
        let expected = path_len(self.leaf_count);
        if self.path.len() != expected {
            return Err(ProofError::PathLength {
                got: self.path.len(),
                expected,
            });
        }
        Ok(())
    }

    /// Checks that this leaf hashes up to `root_hash`.
    fn verify_root(&self, root_hash: &TrieHash) -> Result<(), ProofError> {
        self.check_shape()?;
        let leaf = hash_leaf(&self.key, &self.value);
        match compute_root(leaf, self.index, self.leaf_count, &self.path) {
            Some(hash) if hash == *root_hash => Ok(()),
            _ => Err(ProofError::UnexpectedHash),
        }
    }
}

/// A proof that a given key-value pair either exists or does not exist in
/// a revision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Proof {
    /// The key is present; this is the leaf holding it.
    Inclusion(LeafProof),
    /// The key is absent; these are the leaves immediately below and above
    /// where it would be. Either is `None` at the edge of the tree, and
    /// both are `None` for an empty tree.
    Exclusion {
        left: Option<LeafProof>,
        right: Option<LeafProof>,
    },
}

impl Proof {
    /// Build the proof for a key given where a binary search over the
    /// sorted leaves placed it: `Ok(index)` if found, `Err(insert_at)`
    /// otherwise. `leaf_at` loads the key and value of a leaf.
    pub(crate) fn build<F>(
        tree: &MerkleTree,
        position: Result<usize, usize>,
        mut leaf_at: F,
    ) -> Result<Proof, api::Error>
    where
        F: FnMut(usize) -> Result<(Key, Value), api::Error>,
    {
        let mut leaf_proof = |index: usize| -> Result<LeafProof, api::Error> {
            let (key, value) = leaf_at(index)?;
            // the entry must still be the one the tree was built from
            if tree.leaf(index) != Some(&hash_leaf(&key, &value)) {
                return Err(ProofError::UnexpectedHash.into());
            }
            LeafProof::new(tree, index, key, value).ok_or(
                ProofError::IndexOutOfBounds {
                    index,
                    leaf_count: tree.len(),
                }
                .into(),
            )
        };

        match position {
            Ok(index) => Ok(Proof::Inclusion(leaf_proof(index)?)),
            Err(insert_at) => {
                let left = match insert_at.checked_sub(1) {
                    Some(index) => Some(leaf_proof(index)?),
                    None => None,
                };
                let right = if insert_at < tree.len() {
                    Some(leaf_proof(insert_at)?)
                } else {
                    None
                };
                Ok(Proof::Exclusion { left, right })
            }
        }
    }

    /// Verify this proof against `root_hash`.
    ///
    /// With `Some(expected_value)` the proof must show that `key` maps to
    /// that value. With `None` it must show that `key` is absent.
    pub fn verify<K: AsRef<[u8]>, V: AsRef<[u8]>>(
        &self,
        key: K,
        expected_value: Option<V>,
        root_hash: &TrieHash,
    ) -> Result<(), ProofError> {
        let key = key.as_ref();
        match (self, expected_value) {
            (Proof::Inclusion(leaf), Some(expected_value)) => {
                leaf.verify_root(root_hash)?;
                if *leaf.key != *key {
                    return Err(ProofError::KeyMismatch);
                }
                if *leaf.value != *expected_value.as_ref() {
                    return Err(ProofError::ValueMismatch);
                }
                Ok(())
            }
            (Proof::Inclusion(leaf), None) => {
                leaf.check_shape()?;
                // We were expecting `key` to map to None.
                Err(ProofError::UnexpectedValue)
            }
            (Proof::Exclusion { left, right }, None) => {
                verify_exclusion(key, left.as_ref(), right.as_ref(), root_hash)
            }
            (Proof::Exclusion { left, right }, Some(_)) => {
                for leaf in left.iter().chain(right) {
                    leaf.check_shape()?;
                }
                Err(ProofError::ExpectedValue)
            }
        }
    }

    /// Verify this proof as a non-membership assertion for `key`.
    ///
    /// Returns `Ok(true)` only for a valid exclusion proof. An inclusion
    /// proof, or an exclusion proof that does not hold for this root,
    /// returns `Ok(false)`. A structurally malformed proof is an error.
    pub fn verify_non_membership<K: AsRef<[u8]>>(
        &self,
        key: K,
        root_hash: &TrieHash,
    ) -> Result<bool, ProofError> {
        match self.verify(key, None::<&[u8]>, root_hash) {
            Ok(()) => Ok(true),
            Err(err) if err.is_malformed() => Err(err),
            Err(_) => Ok(false),
        }
    }
}

fn verify_exclusion(
    key: &[u8],
    left: Option<&LeafProof>,
    right: Option<&LeafProof>,
    root_hash: &TrieHash,
) -> Result<(), ProofError> {
    for leaf in left.iter().chain(right.iter()) {
        leaf.verify_root(root_hash)?;
    }

    match (left, right) {
        (None, None) => {
            if root_hash.is_empty() {
                Ok(())
            } else {
                Err(ProofError::UnexpectedHash)
            }
        }
        (Some(left), Some(right)) => {
            if left.leaf_count != right.leaf_count {
                return Err(ProofError::LeafCountMismatch);
            }
            if left.index + 1 != right.index {
                return Err(ProofError::NotAdjacent);
            }
            if *left.key < *key && *key < *right.key {
                Ok(())
            } else {
                Err(ProofError::NotBracketed)
            }
        }
        // key sorts before every leaf
        (None, Some(right)) => {
            if right.index != 0 {
                return Err(ProofError::NotAdjacent);
            }
            if *key < *right.key {
                Ok(())
            } else {
                Err(ProofError::NotBracketed)
            }
        }
        // key sorts after every leaf
        (Some(left), None) => {
            if left.index + 1 != left.leaf_count {
                return Err(ProofError::NotAdjacent);
            }
            if *left.key < *key {
                Ok(())
            } else {
                Err(ProofError::NotBracketed)
            }
        }
    }
}
