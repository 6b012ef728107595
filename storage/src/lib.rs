// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

#![warn(missing_debug_implementations, rust_2018_idioms)]
#![deny(unsafe_code)]

//! # chdbg-storage: versioned, authenticated key-value snapshots
//!
//! A [`Db`] keeps every committed version of a key-value tree. Loading a
//! version yields a [`Revision`], which iterates its entries in ascending
//! key order, commits to them with a root [`TrieHash`], and produces and
//! checks [`Proof`]s of membership or non-membership.
//!
//! Consumers should depend on the [`DbView`] trait rather than on
//! [`Revision`]; [`MemView`] implements the same trait in memory.

pub mod api;
mod db;
mod hashednode;
/// Logger module for handling logging functionality
pub mod logger;
mod mem;
pub mod merkle;
mod proof;
mod trie_hash;

// re-export these so callers don't need to know where they are
pub use api::{Batch, BatchOp, DB_SUFFIX, DbView, vec_into_batch};
pub use db::{DEFAULT_NAMESPACE, Db, DbConfig, Revision, RevisionIter, split_db_path};
pub use hashednode::{BranchPreimage, HasUpdate, LeafPreimage, Preimage, hash_branch, hash_leaf};
pub use mem::{MemIter, MemView};
pub use proof::{LeafProof, Proof, ProofError};
pub use trie_hash::{TRIE_HASH_LEN, TrieHash};

/// A key in a revision, with any namespace prefix removed
pub type Key = Box<[u8]>;

/// A value in a revision
pub type Value = Box<[u8]>;
