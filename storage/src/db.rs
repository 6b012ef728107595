// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

//! A versioned store on top of sled.
//!
//! A database lives in a directory whose name ends in [`DB_SUFFIX`]. Every
//! committed version is a separate sled tree holding a full copy of the
//! entries at that version. Entries are stored under a namespace prefix
//! which is stripped before any caller sees them.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use typed_builder::TypedBuilder;

use crate::api::{self, Batch, BatchOp, DB_SUFFIX, DbView};
use crate::hashednode::hash_leaf;
use crate::logger::{debug, trace};
use crate::merkle::MerkleTree;
use crate::proof::Proof;
use crate::{Key, TrieHash, Value};

/// The key namespace every entry lives under unless configured otherwise
pub const DEFAULT_NAMESPACE: &[u8] = b"s/k:lockup/";

const VERSION_TREE_PREFIX: &str = "version/";

/// Database configuration.
#[derive(Clone, TypedBuilder, Debug)]
pub struct DbConfig {
    /// Whether to create the database directory when it is missing.
    #[builder(default = false)]
    pub create_if_missing: bool,
    /// The key prefix entries are confined to.
    #[builder(default = Box::from(DEFAULT_NAMESPACE), setter(into))]
    pub namespace: Box<[u8]>,
}

/// Split a database path into the database name and its parent directory.
///
/// The path is made absolute, then [`DB_SUFFIX`] is stripped: `/a/b/state.db`
/// becomes `("state", "/a/b")`.
pub fn split_db_path<P: AsRef<Path>>(path: P) -> Result<(String, PathBuf), api::Error> {
    let path = path.as_ref();
    let absolute: PathBuf = std::path::absolute(path)?.components().collect();
    let invalid = || api::Error::InvalidDbPath(path.to_path_buf());

    let stripped = absolute
        .to_str()
        .and_then(|s| s.strip_suffix(DB_SUFFIX))
        .map(Path::new)
        .ok_or_else(invalid)?;
    let name = stripped
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .ok_or_else(invalid)?;
    let parent = stripped.parent().ok_or_else(invalid)?;

    Ok((name.to_string(), parent.to_path_buf()))
}

fn version_tree_name(version: u64) -> String {
    format!("{VERSION_TREE_PREFIX}{version:020}")
}

fn parse_version_tree_name(name: &[u8]) -> Option<u64> {
    std::str::from_utf8(name)
        .ok()?
        .strip_prefix(VERSION_TREE_PREFIX)?
        .parse()
        .ok()
}

/// A versioned database
#[derive(Clone, Debug)]
pub struct Db {
    db: sled::Db,
    path: PathBuf,
    cfg: DbConfig,
}

impl Db {
    /// Open the database at `path`, which must end with [`DB_SUFFIX`].
    pub fn open<P: AsRef<Path>>(path: P, cfg: DbConfig) -> Result<Self, api::Error> {
        let (name, parent) = split_db_path(&path)?;
        let dir = parent.join(format!("{name}{DB_SUFFIX}"));

        if !dir.is_dir() {
            if !cfg.create_if_missing {
                return Err(api::Error::DbNotFound(dir));
            }
            fs::create_dir_all(&dir)?;
        }
        // aliases of one directory must compare equal through `Db::path`
        let dir = fs::canonicalize(&dir)?;

        debug!("opening database {name} in {}", parent.display());
        let db = sled::open(&dir)?;
        Ok(Self { db, path: dir, cfg })
    }

    /// The canonical directory this database was opened from
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every committed version, ascending
    pub fn versions(&self) -> Vec<u64> {
        let mut versions: Vec<u64> = self
            .db
            .tree_names()
            .iter()
            .filter_map(|name| parse_version_tree_name(name))
            .collect();
        versions.sort_unstable();
        versions
    }

    fn has_version(&self, version: u64) -> bool {
        let name = version_tree_name(version);
        self.db
            .tree_names()
            .iter()
            .any(|tree| tree.as_ref() == name.as_bytes())
    }

    /// Load the revision committed at `version`
    pub fn revision(&self, version: u64) -> Result<Revision, api::Error> {
        if !self.has_version(version) {
            debug!(
                "version {version} not in {}; available: {:?}",
                self.path.display(),
                self.versions()
            );
            return Err(api::Error::VersionNotFound { version });
        }
        let tree = self.db.open_tree(version_tree_name(version))?;
        Revision::load(version, tree, self.cfg.namespace.clone())
    }

    /// Commit a new version containing the latest version below it with
    /// `batch` applied on top.
    pub fn commit<K: AsRef<[u8]>, V: AsRef<[u8]>>(
        &self,
        version: u64,
        batch: Batch<K, V>,
    ) -> Result<(), api::Error> {
        if self.has_version(version) {
            return Err(api::Error::VersionExists { version });
        }

        let base = self.versions().into_iter().rev().find(|v| *v < version);
        let tree = self.db.open_tree(version_tree_name(version))?;

        let mut writes = sled::Batch::default();
        if let Some(base) = base {
            trace!("version {version} starts from version {base}");
            for item in self.db.open_tree(version_tree_name(base))?.iter() {
                let (key, value) = item?;
                writes.insert(key, value);
            }
        }
        for op in batch {
            match op {
                BatchOp::Put { key, value } => {
                    writes.insert(self.namespaced(key.as_ref()), value.as_ref());
                }
                BatchOp::Delete { key } => writes.remove(self.namespaced(key.as_ref())),
            }
        }
        tree.apply_batch(writes)?;
        self.db.flush()?;
        debug!("committed version {version} to {}", self.path.display());
        Ok(())
    }

    fn namespaced(&self, key: &[u8]) -> Vec<u8> {
        let mut full = Vec::with_capacity(self.cfg.namespace.len() + key.len());
        full.extend_from_slice(&self.cfg.namespace);
        full.extend_from_slice(key);
        full
    }
}

/// A read-only view of a [`Db`] at a single committed version.
#[derive(Debug)]
pub struct Revision {
    version: u64,
    tree: sled::Tree,
    namespace: Box<[u8]>,
    keys: Vec<Key>,
    merkle: MerkleTree,
}

impl Revision {
    fn load(version: u64, tree: sled::Tree, namespace: Box<[u8]>) -> Result<Self, api::Error> {
        let mut keys = Vec::new();
        let mut leaves = Vec::new();
        for item in tree.scan_prefix(&namespace) {
            let (key, value) = item?;
            let key = strip_namespace(&key, &namespace);
            leaves.push(hash_leaf(key, &value));
            keys.push(Box::from(key));
        }
        debug!("loaded version {version} with {} entries", keys.len());

        Ok(Self {
            version,
            tree,
            namespace,
            keys,
            merkle: MerkleTree::new(leaves),
        })
    }

    /// The version this revision was loaded at
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// The number of entries in this revision
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// True if this revision has no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// The value stored at `key`, if any
    pub fn val(&self, key: &[u8]) -> Result<Option<Value>, api::Error> {
        let mut full = self.namespace.to_vec();
        full.extend_from_slice(key);
        Ok(self.tree.get(full)?.map(|value| Box::from(value.as_ref())))
    }

    fn leaf_at(&self, index: usize) -> Result<(Key, Value), api::Error> {
        let key = self
            .keys
            .get(index)
            .ok_or(crate::proof::ProofError::IndexOutOfBounds {
                index,
                leaf_count: self.keys.len(),
            })?;
        let value = self.val(key)?.ok_or_else(|| {
            api::Error::Io(std::io::Error::other(format!(
                "key {} vanished from version {}",
                hex::encode(key),
                self.version
            )))
        })?;
        Ok((key.clone(), value))
    }
}

fn strip_namespace<'a>(key: &'a [u8], namespace: &[u8]) -> &'a [u8] {
    key.strip_prefix(namespace).unwrap_or(key)
}

/// Ascending iterator over a [`Revision`], with the namespace stripped.
pub struct RevisionIter<'rev> {
    inner: sled::Iter,
    namespace: &'rev [u8],
}

impl fmt::Debug for RevisionIter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RevisionIter")
            .field("namespace", &String::from_utf8_lossy(self.namespace))
            .finish_non_exhaustive()
    }
}

impl Iterator for RevisionIter<'_> {
    type Item = Result<(Key, Value), api::Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.inner.next()?;
        Some(item.map_err(Into::into).map(|(key, value)| {
            (
                Box::from(strip_namespace(&key, self.namespace)),
                Box::from(value.as_ref()),
            )
        }))
    }
}

impl DbView for Revision {
    type Proof = Proof;
    type Iter<'rev> = RevisionIter<'rev>;

    fn iter(&self) -> Result<Self::Iter<'_>, api::Error> {
        Ok(RevisionIter {
            inner: self.tree.scan_prefix(&self.namespace),
            namespace: &self.namespace,
        })
    }

    fn root_hash(&self) -> Result<TrieHash, api::Error> {
        Ok(self.merkle.root_hash())
    }

    fn single_key_proof(&self, key: &[u8]) -> Result<Proof, api::Error> {
        let position = self.keys.binary_search_by(|k| (**k).cmp(key));
        Proof::build(&self.merkle, position, |index| self.leaf_at(index))
    }

    fn verify_non_membership(&self, proof: &Proof, key: &[u8]) -> Result<bool, api::Error> {
        Ok(proof.verify_non_membership(key, &self.merkle.root_hash())?)
    }
}
