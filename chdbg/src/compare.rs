// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

use std::fs;
use std::io::Write;
use std::path::Path;

use chdbg_storage::{DB_SUFFIX, Db, DbConfig, DbView, Revision, TrieHash, split_db_path};
use log::{debug, info};

use crate::Error;
use crate::diff::{Labels, diff_views};
use crate::reporter::{PREFIX, Reporter};

/// The outcome of walking two views at one version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffSummary {
    pub version: u64,
    /// Every difference found by the walk, printed or not
    pub differences: usize,
    pub root_a: TrieHash,
    pub root_b: TrieHash,
}

impl DiffSummary {
    #[must_use]
    pub fn roots_match(&self) -> bool {
        self.root_a == self.root_b
    }

    /// No differences and the same root hash on both sides
    #[must_use]
    pub fn is_identical(&self) -> bool {
        self.roots_match() && self.differences == 0
    }

    /// `Ok` if identical, [`Error::Mismatch`] otherwise
    pub fn into_result(self) -> Result<Self, Error> {
        if self.is_identical() {
            Ok(self)
        } else {
            Err(Error::Mismatch {
                version: self.version,
                differences: self.differences,
            })
        }
    }
}

/// Compare two views already loaded at `version`.
///
/// The root hashes are read up front; if they differ a line saying so is
/// written to `out` before the walk starts. Differences found by the walk
/// are written to `out` through a [`Reporter`].
pub fn compare_views<L, R, W>(
    left: &L,
    right: &R,
    version: u64,
    labels: &Labels,
    mut out: W,
) -> Result<DiffSummary, Error>
where
    L: DbView,
    R: DbView<Proof = L::Proof>,
    W: Write,
{
    let root_a = left.root_hash()?;
    let root_b = right.root_hash()?;
    if root_a != root_b {
        writeln!(out, "{PREFIX}hash mismatch: {root_a:X} != {root_b:X}")?;
    }

    let mut reporter = Reporter::new(&mut out);
    let differences = diff_views(left, right, &mut reporter, labels)?;
    info!("walked version {version}: {differences} differences");

    Ok(DiffSummary {
        version,
        differences,
        root_a,
        root_b,
    })
}

/// Open the databases at `db_a` and `db_b`, load both at `version` and
/// compare them. Diagnostics go to `out`.
///
/// Returns [`Error::Mismatch`] when the run completes but the two sides
/// differ, either in their root hashes or in any key.
pub fn compare_dbs<W: Write>(
    db_a: &Path,
    db_b: &Path,
    version: u64,
    cfg: &DbConfig,
    out: W,
) -> Result<DiffSummary, Error> {
    let first = open(db_a, cfg)?;
    let second = if resolves_to(db_b, first.path()) {
        // sled holds an exclusive lock on its directory
        debug!("{} and {} are the same database", db_a.display(), db_b.display());
        first.clone()
    } else {
        open(db_b, cfg)?
    };

    let rev_a = load(&first, db_a, version)?;
    let rev_b = load(&second, db_b, version)?;

    let labels = Labels {
        a: db_a.display().to_string(),
        b: db_b.display().to_string(),
    };
    compare_views(&rev_a, &rev_b, version, &labels, out)?.into_result()
}

fn open(path: &Path, cfg: &DbConfig) -> Result<Db, Error> {
    Db::open(path, cfg.clone()).map_err(|source| Error::Open {
        path: path.to_path_buf(),
        source,
    })
}

fn load(db: &Db, path: &Path, version: u64) -> Result<Revision, Error> {
    let rev = db.revision(version).map_err(|source| Error::Load {
        path: path.to_path_buf(),
        version,
        source,
    })?;
    debug!(
        "{}: {} entries at version {}",
        path.display(),
        rev.len(),
        rev.version()
    );
    Ok(rev)
}

/// True if `path` names the database directory `dir`, which is canonical.
fn resolves_to(path: &Path, dir: &Path) -> bool {
    split_db_path(path)
        .ok()
        .and_then(|(name, parent)| {
            fs::canonicalize(parent.join(format!("{name}{DB_SUFFIX}"))).ok()
        })
        .is_some_and(|candidate| candidate == dir)
}
