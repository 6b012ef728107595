// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

use std::path::PathBuf;

use crate::proof::ProofError;
use crate::{Key, TrieHash, Value};

/// The suffix every database directory must carry
pub const DB_SUFFIX: &str = ".db";

/// Errors returned through the API
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The path handed to [`crate::Db::open`] does not end in [`DB_SUFFIX`]
    #[error("database directory {0:?} must end with {DB_SUFFIX}")]
    InvalidDbPath(PathBuf),

    /// The database directory does not exist and creation was not requested
    #[error("database directory {0:?} does not exist")]
    DbNotFound(PathBuf),

    /// The requested version was never committed
    #[error("version {version} not found")]
    VersionNotFound { version: u64 },

    /// A commit was attempted for a version that already exists
    #[error("version {version} already exists")]
    VersionExists { version: u64 },

    /// The underlying storage engine failed
    #[error("storage error: {0}")]
    Sled(#[from] sled::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A proof could not be generated or checked
    #[error("proof error: {0}")]
    Proof(#[from] ProofError),
}

/// A key/value operation. Only put (upsert) and delete are supported
#[derive(Debug)]
pub enum BatchOp<K, V> {
    Put { key: K, value: V },
    Delete { key: K },
}

/// A list of operations applied together by [`crate::Db::commit`]
pub type Batch<K, V> = Vec<BatchOp<K, V>>;

/// A convenience implementation to convert a vector of key/value
/// pairs into a batch of insert operations
pub fn vec_into_batch<K, V>(value: Vec<(K, V)>) -> Batch<K, V> {
    value
        .into_iter()
        .map(|(key, value)| BatchOp::Put { key, value })
        .collect()
}

/// A read-only view of the tree at a single version.
///
/// This is everything a consumer needs to compare two views: ascending
/// iteration, the root commitment, and the ability to produce a proof for a
/// key in one view and check it against another.
pub trait DbView {
    /// Evidence about a single key, produced by [`DbView::single_key_proof`]
    type Proof;

    /// Ascending iterator over the entries of this view. Dropping it
    /// releases any resources it holds.
    type Iter<'view>: Iterator<Item = Result<(Key, Value), Error>>
    where
        Self: 'view;

    /// Iterate every entry in strictly ascending key order
    fn iter(&self) -> Result<Self::Iter<'_>, Error>;

    /// The root hash committing to every entry in this view
    fn root_hash(&self) -> Result<TrieHash, Error>;

    /// Obtain a proof for `key`. If `key` is present this is a membership
    /// proof, otherwise a non-membership proof.
    fn single_key_proof(&self, key: &[u8]) -> Result<Self::Proof, Error>;

    /// Check `proof` against this view's root as evidence that `key` is
    /// absent.
    fn verify_non_membership(&self, proof: &Self::Proof, key: &[u8]) -> Result<bool, Error>;
}
