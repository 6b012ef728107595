// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

use integer_encoding::VarInt;
use sha2::{Digest, Sha256};

use crate::TrieHash;

const LEAF_TAG: u8 = 0x00;
const BRANCH_TAG: u8 = 0x01;

/// Something that can absorb bytes of a hash preimage.
pub trait HasUpdate {
    /// Append `data` to the preimage
    fn update<T: AsRef<[u8]>>(&mut self, data: T);
}

impl HasUpdate for Vec<u8> {
    fn update<T: AsRef<[u8]>>(&mut self, data: T) {
        self.extend(data.as_ref());
    }
}

impl HasUpdate for Sha256 {
    fn update<T: AsRef<[u8]>>(&mut self, data: T) {
        sha2::Digest::update(self, data);
    }
}

/// A preimage of a hash.
pub trait Preimage {
    /// Returns the hash of this preimage.
    fn to_hash(&self) -> TrieHash {
        let mut hasher = Sha256::new();
        self.write(&mut hasher);
        hasher.finalize().into()
    }

    /// Write this hash preimage to `buf`.
    fn write(&self, buf: &mut impl HasUpdate);
}

/// A key/value pair at the bottom of the tree.
#[derive(Debug, Clone, Copy)]
pub struct LeafPreimage<'a> {
    /// The key, without any namespace prefix
    pub key: &'a [u8],
    /// The value stored at `key`
    pub value: &'a [u8],
}

impl Preimage for LeafPreimage<'_> {
    fn write(&self, buf: &mut impl HasUpdate) {
        buf.update([LEAF_TAG]);
        buf.update(self.key.len().encode_var_vec());
        buf.update(self.key);
        buf.update(self.value.len().encode_var_vec());
        buf.update(self.value);
    }
}

/// An interior node combining two child hashes.
#[derive(Debug, Clone, Copy)]
pub struct BranchPreimage<'a> {
    /// The child covering the lower half of the keys
    pub left: &'a TrieHash,
    /// The child covering the upper half of the keys
    pub right: &'a TrieHash,
}

impl Preimage for BranchPreimage<'_> {
    fn write(&self, buf: &mut impl HasUpdate) {
        buf.update([BRANCH_TAG]);
        buf.update(self.left);
        buf.update(self.right);
    }
}

/// Returns the hash of the leaf holding `key` and `value`.
#[must_use]
pub fn hash_leaf(key: &[u8], value: &[u8]) -> TrieHash {
    LeafPreimage { key, value }.to_hash()
}

/// Returns the hash of a branch with the given children.
#[must_use]
pub fn hash_branch(left: &TrieHash, right: &TrieHash) -> TrieHash {
    BranchPreimage { left, right }.to_hash()
}
