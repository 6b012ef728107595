// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

use std::fmt::{self, Debug, Display, Formatter, UpperHex};

use sha2::digest::generic_array::GenericArray;
use sha2::digest::typenum;

/// Length in bytes of a [`TrieHash`]
pub const TRIE_HASH_LEN: usize = 32;

/// A hash value inside a merkle tree. This is also the root commitment
/// that identifies a snapshot.
#[derive(PartialEq, Eq, Clone, Copy, Default, Hash, PartialOrd, Ord)]
pub struct TrieHash([u8; TRIE_HASH_LEN]);

impl TrieHash {
    /// The root hash of a tree without any leaves
    #[must_use]
    pub const fn empty() -> Self {
        TrieHash([0; TRIE_HASH_LEN])
    }

    /// Returns true if this is the root hash of an empty tree
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::empty()
    }
}

impl std::ops::Deref for TrieHash {
    type Target = [u8; TRIE_HASH_LEN];
    fn deref(&self) -> &[u8; TRIE_HASH_LEN] {
        &self.0
    }
}

impl AsRef<[u8]> for TrieHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; TRIE_HASH_LEN]> for TrieHash {
    fn from(value: [u8; TRIE_HASH_LEN]) -> Self {
        TrieHash(value)
    }
}

impl From<GenericArray<u8, typenum::U32>> for TrieHash {
    fn from(value: GenericArray<u8, typenum::U32>) -> Self {
        let mut bytes = [0u8; TRIE_HASH_LEN];
        bytes.copy_from_slice(value.as_slice());
        TrieHash(bytes)
    }
}

impl Debug for TrieHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl Display for TrieHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        Debug::fmt(self, f)
    }
}

impl UpperHex for TrieHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        f.write_str(&hex::encode_upper(self.0))
    }
}
