// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

#![warn(missing_debug_implementations, rust_2018_idioms)]
#![deny(unsafe_code)]

//! # chdbg: compare two replicas of an authenticated tree
//!
//! Two copies of the same tree, replayed independently, should be
//! byte-identical at every version. [`compare::compare_dbs`] loads both at
//! one version and reports every way they differ:
//!
//! - keys present on one side only,
//! - keys present on both sides with different values,
//! - keys whose values agree but whose proofs do not.
//!
//! The walk itself lives in [`diff`] and works on anything implementing
//! [`chdbg_storage::DbView`]. Differences go to a [`reporter::Reporter`],
//! which prints the first few and counts the rest.
//!
//! The root hashes of the two sides are compared separately from the walk;
//! either signal on its own makes the run a mismatch.

use std::path::PathBuf;

use chdbg_storage::api;

pub mod compare;
pub mod diff;
pub mod reporter;
pub mod weave;

pub use compare::{DiffSummary, compare_dbs};
pub use diff::{DiffIter, DiffRecord, Labels, diff_views};
pub use reporter::{DEFAULT_MAX_REPORTS, Reporter};

/// Errors from a comparison run
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A database could not be opened
    #[error("{}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: api::Error,
    },

    /// A database does not have the requested version
    #[error("{}: {source}", path.display())]
    Load {
        path: PathBuf,
        version: u64,
        #[source]
        source: api::Error,
    },

    /// Reading entries or proofs failed part way through the walk
    #[error(transparent)]
    Walk(#[from] api::Error),

    /// The diagnostic stream could not be written
    #[error("writing report: {0}")]
    Report(#[from] std::io::Error),

    /// The run completed and the two databases differ
    #[error("database mismatch at version {version} with {differences} differences")]
    Mismatch { version: u64, differences: usize },
}
