// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

use std::collections::BTreeMap;

use crate::api::{self, DbView};
use crate::hashednode::hash_leaf;
use crate::merkle::MerkleTree;
use crate::proof::Proof;
use crate::{Key, TrieHash, Value};

/// An in-memory view, hashed and proven exactly like a [`crate::Revision`].
#[derive(Debug, Default, Clone)]
pub struct MemView {
    entries: Vec<(Key, Value)>,
    tree: MerkleTree,
}

impl MemView {
    /// Create a view from a sorted map of entries
    #[must_use]
    pub fn new(map: BTreeMap<Key, Value>) -> Self {
        let entries: Vec<(Key, Value)> = map.into_iter().collect();
        let tree = MerkleTree::new(entries.iter().map(|(k, v)| hash_leaf(k, v)).collect());
        Self { entries, tree }
    }

    /// The number of entries in this view
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if this view has no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, key: &[u8]) -> Result<usize, usize> {
        self.entries.binary_search_by(|(k, _)| (**k).cmp(key))
    }
}

impl<K: AsRef<[u8]>, V: AsRef<[u8]>> FromIterator<(K, V)> for MemView {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::new(
            iter.into_iter()
                .map(|(k, v)| (Box::from(k.as_ref()), Box::from(v.as_ref())))
                .collect(),
        )
    }
}

/// Iterator over the entries of a [`MemView`]
#[derive(Debug)]
pub struct MemIter<'view>(std::slice::Iter<'view, (Key, Value)>);

impl Iterator for MemIter<'_> {
    type Item = Result<(Key, Value), api::Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(k, v)| Ok((k.clone(), v.clone())))
    }
}

impl DbView for MemView {
    type Proof = Proof;
    type Iter<'view> = MemIter<'view>;

    fn iter(&self) -> Result<Self::Iter<'_>, api::Error> {
        Ok(MemIter(self.entries.iter()))
    }

    fn root_hash(&self) -> Result<TrieHash, api::Error> {
        Ok(self.tree.root_hash())
    }

    fn single_key_proof(&self, key: &[u8]) -> Result<Proof, api::Error> {
        Proof::build(&self.tree, self.position(key), |index| {
            self.entries
                .get(index)
                .cloned()
                .ok_or_else(|| {
                    crate::proof::ProofError::IndexOutOfBounds {
                        index,
                        leaf_count: self.entries.len(),
                    }
                    .into()
                })
        })
    }

    fn verify_non_membership(&self, proof: &Proof, key: &[u8]) -> Result<bool, api::Error> {
        Ok(proof.verify_non_membership(key, &self.tree.root_hash())?)
    }
}
