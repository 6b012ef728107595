// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

//! Ordered merge of two views.
//!
//! Both views are walked in ascending key order in lockstep. Key order is
//! the only thing that decides which side advances; values are compared
//! only once the keys are equal, and equal keys always advance both sides.
//!
//! When the values of a shared key agree, a proof for the key is taken from
//! the left view and the right view is asked to accept it as evidence that
//! the key is absent. A consistent pair of views must refuse; if the right
//! view accepts, the two views disagree somewhere below the leaves and the
//! key is reported as a proof anomaly.

use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};
use std::io::Write;

use chdbg_storage::{DbView, Key, Value, api};

use crate::Error;
use crate::reporter::Reporter;
use crate::weave::{encode_id, parse_weave_key};

/// One difference between the left (A) and right (B) view
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffRecord {
    /// Present in A only
    MissingInB { key: Key },
    /// Present in B only
    MissingInA { key: Key },
    /// Present in both with different values
    ValueMismatch { key: Key, left: Value, right: Value },
    /// Present in both with the same value, but B accepted A's proof as
    /// evidence of absence
    ProofAnomaly { key: Key, left: Value, right: Value },
}

impl DiffRecord {
    /// The key this record is about
    #[must_use]
    pub fn key(&self) -> &[u8] {
        match self {
            DiffRecord::MissingInB { key }
            | DiffRecord::MissingInA { key }
            | DiffRecord::ValueMismatch { key, .. }
            | DiffRecord::ProofAnomaly { key, .. } => key,
        }
    }

    /// Render this record for the diagnostic stream
    #[must_use]
    pub const fn describe<'a>(&'a self, labels: &'a Labels) -> Describe<'a> {
        Describe {
            record: self,
            labels,
        }
    }
}

/// How the two sides are named in diagnostics, usually their paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Labels {
    pub a: String,
    pub b: String,
}

/// A [`DiffRecord`] formatted against a pair of [`Labels`]
#[derive(Debug)]
pub struct Describe<'a> {
    record: &'a DiffRecord,
    labels: &'a Labels,
}

impl Display for Describe<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let key = parse_weave_key(self.record.key());
        match self.record {
            DiffRecord::MissingInB { .. } => write!(f, "{}: missing key {key}", self.labels.b),
            DiffRecord::MissingInA { .. } => write!(f, "{}: missing key {key}", self.labels.a),
            DiffRecord::ValueMismatch { left, right, .. } => write!(
                f,
                "key {key}: value mismatch\nvalue a {}\nvalue b {}",
                encode_id(left),
                encode_id(right)
            ),
            DiffRecord::ProofAnomaly { left, right, .. } => write!(
                f,
                "key {key}: proofs failed\nvalue a {}\nvalue b {}",
                encode_id(left),
                encode_id(right)
            ),
        }
    }
}

/// Iterator over the differences between two views, in key order.
///
/// The iterator owns one entry iterator per view; both are released when
/// it is dropped, whether or not the walk finished. After yielding an
/// error it yields nothing more.
pub struct DiffIter<'v, L, R>
where
    L: DbView,
    R: DbView<Proof = L::Proof>,
{
    left_view: &'v L,
    right_view: &'v R,
    left: L::Iter<'v>,
    right: R::Iter<'v>,
    left_head: Option<(Key, Value)>,
    right_head: Option<(Key, Value)>,
    done: bool,
}

impl<'v, L: DbView, R: DbView<Proof = L::Proof>> DiffIter<'v, L, R> {
    /// Start walking `left` and `right`
    pub fn new(left_view: &'v L, right_view: &'v R) -> Result<Self, api::Error> {
        let mut left = left_view.iter()?;
        let mut right = right_view.iter()?;
        let left_head = left.next().transpose()?;
        let right_head = right.next().transpose()?;
        Ok(Self {
            left_view,
            right_view,
            left,
            right,
            left_head,
            right_head,
            done: false,
        })
    }

    fn advance_left(&mut self) -> Result<(), api::Error> {
        self.left_head = self.left.next().transpose()?;
        Ok(())
    }

    fn advance_right(&mut self) -> Result<(), api::Error> {
        self.right_head = self.right.next().transpose()?;
        Ok(())
    }

    /// Walk until the next difference, or the end of both views.
    fn step(&mut self) -> Result<Option<DiffRecord>, api::Error> {
        loop {
            match (self.left_head.take(), self.right_head.take()) {
                (None, None) => return Ok(None),
                (Some((key, _)), None) => {
                    self.advance_left()?;
                    return Ok(Some(DiffRecord::MissingInB { key }));
                }
                (None, Some((key, _))) => {
                    self.advance_right()?;
                    return Ok(Some(DiffRecord::MissingInA { key }));
                }
                (Some(left), Some(right)) => match left.0.cmp(&right.0) {
                    Ordering::Less => {
                        self.right_head = Some(right);
                        self.advance_left()?;
                        return Ok(Some(DiffRecord::MissingInB { key: left.0 }));
                    }
                    Ordering::Greater => {
                        self.left_head = Some(left);
                        self.advance_right()?;
                        return Ok(Some(DiffRecord::MissingInA { key: right.0 }));
                    }
                    Ordering::Equal => {
                        self.advance_left()?;
                        self.advance_right()?;
                        let (key, left_value) = left;
                        let (_, right_value) = right;
                        if let Some(record) = self.compare_shared(key, left_value, right_value)? {
                            return Ok(Some(record));
                        }
                    }
                },
            }
        }
    }

    fn compare_shared(
        &self,
        key: Key,
        left: Value,
        right: Value,
    ) -> Result<Option<DiffRecord>, api::Error> {
        if left != right {
            return Ok(Some(DiffRecord::ValueMismatch { key, left, right }));
        }

        // `key` is in the left view, so this is a membership proof
        let proof = self.left_view.single_key_proof(&key)?;
        if self.right_view.verify_non_membership(&proof, &key)? {
            log::debug!("right view accepted non-membership of {}", parse_weave_key(&key));
            return Ok(Some(DiffRecord::ProofAnomaly { key, left, right }));
        }
        Ok(None)
    }
}

impl<'v, L: DbView, R: DbView<Proof = L::Proof>> Iterator for DiffIter<'v, L, R> {
    type Item = Result<DiffRecord, api::Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.step() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

impl<'v, L: DbView, R: DbView<Proof = L::Proof>> fmt::Debug for DiffIter<'v, L, R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiffIter")
            .field("left_head", &self.left_head.as_ref().map(|(k, _)| k))
            .field("right_head", &self.right_head.as_ref().map(|(k, _)| k))
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

/// Walk `left` and `right` to the end, recording every difference in
/// `reporter`. Returns the total number of differences recorded.
///
/// An error from either view stops the walk; differences never do.
pub fn diff_views<L, R, W>(
    left: &L,
    right: &R,
    reporter: &mut Reporter<W>,
    labels: &Labels,
) -> Result<usize, Error>
where
    L: DbView,
    R: DbView<Proof = L::Proof>,
    W: Write,
{
    for record in DiffIter::new(left, right)? {
        let record = record?;
        reporter.record(record.describe(labels))?;
    }
    Ok(reporter.count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chdbg_storage::{MemView, Proof, ProofError, TrieHash};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng, rng};
    use std::cell::Cell;
    use std::collections::BTreeMap;
    use test_case::test_case;

    fn key(k: &str) -> Key {
        Box::from(k.as_bytes())
    }

    fn labels() -> Labels {
        Labels {
            a: "a.db".to_string(),
            b: "b.db".to_string(),
        }
    }

    fn diff(left: &MemView, right: &MemView) -> Vec<DiffRecord> {
        DiffIter::new(left, right)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap()
    }

    /// Accepts every non-membership proof for the keys in `anomalies`.
    struct Lenient {
        inner: MemView,
        anomalies: Vec<Key>,
    }

    impl DbView for Lenient {
        type Proof = Proof;
        type Iter<'view> = chdbg_storage::MemIter<'view>;

        fn iter(&self) -> Result<Self::Iter<'_>, api::Error> {
            self.inner.iter()
        }

        fn root_hash(&self) -> Result<TrieHash, api::Error> {
            self.inner.root_hash()
        }

        fn single_key_proof(&self, key: &[u8]) -> Result<Proof, api::Error> {
            self.inner.single_key_proof(key)
        }

        fn verify_non_membership(&self, proof: &Proof, key: &[u8]) -> Result<bool, api::Error> {
            if self.anomalies.iter().any(|k| **k == *key) {
                return Ok(true);
            }
            self.inner.verify_non_membership(proof, key)
        }
    }

    /// Fails proof generation after `remaining` successful calls.
    struct Flaky {
        inner: MemView,
        remaining: Cell<usize>,
    }

    impl DbView for Flaky {
        type Proof = Proof;
        type Iter<'view> = chdbg_storage::MemIter<'view>;

        fn iter(&self) -> Result<Self::Iter<'_>, api::Error> {
            self.inner.iter()
        }

        fn root_hash(&self) -> Result<TrieHash, api::Error> {
            self.inner.root_hash()
        }

        fn single_key_proof(&self, key: &[u8]) -> Result<Proof, api::Error> {
            match self.remaining.get() {
                0 => Err(api::Error::Io(std::io::Error::other("proof failed"))),
                n => {
                    self.remaining.set(n - 1);
                    self.inner.single_key_proof(key)
                }
            }
        }

        fn verify_non_membership(&self, proof: &Proof, key: &[u8]) -> Result<bool, api::Error> {
            self.inner.verify_non_membership(proof, key)
        }
    }

    /// Entry iterator that fails once `remaining` entries have been read.
    struct Truncated<'view> {
        inner: chdbg_storage::MemIter<'view>,
        remaining: usize,
    }

    impl Iterator for Truncated<'_> {
        type Item = Result<(Key, Value), api::Error>;

        fn next(&mut self) -> Option<Self::Item> {
            if self.remaining == 0 {
                return Some(Err(api::Error::Io(std::io::Error::other("read failed"))));
            }
            self.remaining -= 1;
            self.inner.next()
        }
    }

    /// Iteration fails after `readable` entries.
    struct ShortRead {
        inner: MemView,
        readable: usize,
    }

    impl DbView for ShortRead {
        type Proof = Proof;
        type Iter<'view> = Truncated<'view>;

        fn iter(&self) -> Result<Self::Iter<'_>, api::Error> {
            Ok(Truncated {
                inner: self.inner.iter()?,
                remaining: self.readable,
            })
        }

        fn root_hash(&self) -> Result<TrieHash, api::Error> {
            self.inner.root_hash()
        }

        fn single_key_proof(&self, key: &[u8]) -> Result<Proof, api::Error> {
            self.inner.single_key_proof(key)
        }

        fn verify_non_membership(&self, proof: &Proof, key: &[u8]) -> Result<bool, api::Error> {
            self.inner.verify_non_membership(proof, key)
        }
    }

    /// Rejects every proof it is asked to check as malformed.
    struct Unverifiable {
        inner: MemView,
    }

    impl DbView for Unverifiable {
        type Proof = Proof;
        type Iter<'view> = chdbg_storage::MemIter<'view>;

        fn iter(&self) -> Result<Self::Iter<'_>, api::Error> {
            self.inner.iter()
        }

        fn root_hash(&self) -> Result<TrieHash, api::Error> {
            self.inner.root_hash()
        }

        fn single_key_proof(&self, key: &[u8]) -> Result<Proof, api::Error> {
            self.inner.single_key_proof(key)
        }

        fn verify_non_membership(&self, _proof: &Proof, _key: &[u8]) -> Result<bool, api::Error> {
            Err(ProofError::IndexOutOfBounds {
                index: 9,
                leaf_count: 1,
            }
            .into())
        }
    }

    #[test]
    fn identical_views() {
        let items = [("acct:1", "100"), ("acct:2", "200"), ("acct:3", "300")];
        let a = MemView::from_iter(items);
        let b = MemView::from_iter(items);
        assert!(diff(&a, &b).is_empty());
        assert_eq!(a.root_hash().unwrap(), b.root_hash().unwrap());
    }

    #[test]
    fn empty_views() {
        assert!(diff(&MemView::default(), &MemView::default()).is_empty());
    }

    #[test]
    fn missing_keys_interleave() {
        let a = MemView::from_iter([("acct:1", "100"), ("acct:2", "200")]);
        let b = MemView::from_iter([("acct:1", "100"), ("acct:3", "300")]);

        assert_eq!(
            diff(&a, &b),
            vec![
                DiffRecord::MissingInB { key: key("acct:2") },
                DiffRecord::MissingInA { key: key("acct:3") },
            ]
        );
    }

    #[test]
    fn one_side_empty() {
        let a = MemView::from_iter([("a", "1"), ("b", "2")]);
        let b = MemView::default();

        assert_eq!(
            diff(&a, &b),
            vec![
                DiffRecord::MissingInB { key: key("a") },
                DiffRecord::MissingInB { key: key("b") },
            ]
        );
        assert_eq!(
            diff(&b, &a),
            vec![
                DiffRecord::MissingInA { key: key("a") },
                DiffRecord::MissingInA { key: key("b") },
            ]
        );
    }

    #[test]
    fn value_mismatch() {
        let a = MemView::from_iter([("acct:1", "100"), ("acct:2", "200")]);
        let b = MemView::from_iter([("acct:1", "101"), ("acct:2", "200")]);

        assert_eq!(
            diff(&a, &b),
            vec![DiffRecord::ValueMismatch {
                key: key("acct:1"),
                left: key("100"),
                right: key("101"),
            }]
        );
    }

    #[test]
    fn prefix_keys_order_before_extensions() {
        let a = MemView::from_iter([("ab", "1")]);
        let b = MemView::from_iter([("a", "1"), ("abc", "1")]);
        assert_eq!(
            diff(&a, &b),
            vec![
                DiffRecord::MissingInA { key: key("a") },
                DiffRecord::MissingInB { key: key("ab") },
                DiffRecord::MissingInA { key: key("abc") },
            ]
        );
    }

    #[test]
    fn proof_anomaly_with_equal_values() {
        let items = [("acct:1", "100"), ("acct:2", "200"), ("acct:3", "300")];
        let a = MemView::from_iter(items);
        let b = Lenient {
            inner: MemView::from_iter(items),
            anomalies: vec![key("acct:2")],
        };

        let records: Vec<_> = DiffIter::new(&a, &b)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            records,
            vec![DiffRecord::ProofAnomaly {
                key: key("acct:2"),
                left: key("200"),
                right: key("200"),
            }]
        );
    }

    #[test]
    fn mismatched_values_skip_the_proof_check() {
        let a = MemView::from_iter([("k", "1")]);
        let b = Lenient {
            inner: MemView::from_iter([("k", "2")]),
            anomalies: vec![key("k")],
        };
        let records: Vec<_> = DiffIter::new(&a, &b)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert!(matches!(
            records.as_slice(),
            [DiffRecord::ValueMismatch { .. }]
        ));
    }

    #[test]
    fn proof_error_stops_the_walk() {
        let a = Flaky {
            inner: MemView::from_iter([("a", "1"), ("b", "2"), ("c", "3")]),
            remaining: Cell::new(1),
        };
        let b = MemView::from_iter([("a", "1"), ("b", "2"), ("c", "3"), ("d", "4")]);

        {
            let mut iter = DiffIter::new(&a, &b).unwrap();
            assert!(matches!(iter.next(), Some(Err(api::Error::Io(_)))));
            // nothing after the error, not even the missing "d"
            assert!(iter.next().is_none());
        }

        let mut reporter = Reporter::new(Vec::new());
        let a = Flaky {
            inner: a.inner,
            remaining: Cell::new(0),
        };
        let err = diff_views(&a, &b, &mut reporter, &labels()).unwrap_err();
        assert!(matches!(err, Error::Walk(_)), "{err:?}");
        assert_eq!(reporter.count(), 0);
    }

    #[test]
    fn read_error_mid_walk_stops_the_walk() {
        let a = ShortRead {
            inner: MemView::from_iter([("a", "1"), ("b", "2"), ("c", "3")]),
            readable: 2,
        };
        let b = MemView::from_iter([("a", "0"), ("b", "2"), ("c", "3"), ("d", "4")]);

        {
            let mut iter = DiffIter::new(&a, &b).unwrap();
            assert!(matches!(
                iter.next(),
                Some(Ok(DiffRecord::ValueMismatch { .. }))
            ));
            assert!(matches!(iter.next(), Some(Err(api::Error::Io(_)))));
            assert!(iter.next().is_none());
            assert!(iter.next().is_none());
        }

        let mut reporter = Reporter::new(Vec::new());
        let err = diff_views(&a, &b, &mut reporter, &labels()).unwrap_err();
        assert!(matches!(err, Error::Walk(api::Error::Io(_))), "{err:?}");
        // only the mismatch read before the failure was reported
        assert_eq!(reporter.count(), 1);
        let out = String::from_utf8(reporter.into_inner()).unwrap();
        assert!(out.starts_with("chdbg: key a: value mismatch"), "{out}");
        assert!(!out.contains("missing key"), "{out}");
    }

    #[test]
    fn verify_error_stops_the_walk() {
        let a = MemView::from_iter([("a", "1"), ("b", "2")]);
        let b = Unverifiable {
            inner: MemView::from_iter([("a", "1"), ("b", "2"), ("c", "3")]),
        };

        {
            let mut iter = DiffIter::new(&a, &b).unwrap();
            assert!(matches!(
                iter.next(),
                Some(Err(api::Error::Proof(ProofError::IndexOutOfBounds { .. })))
            ));
            assert!(iter.next().is_none());
        }

        let mut reporter = Reporter::new(Vec::new());
        let err = diff_views(&a, &b, &mut reporter, &labels()).unwrap_err();
        assert!(matches!(err, Error::Walk(api::Error::Proof(_))), "{err:?}");
        assert_eq!(reporter.count(), 0);
        assert!(reporter.into_inner().is_empty());
    }

    #[test_case(&[0xff, 0x01], "FF01")]
    #[test_case(b"acct:\x00\x07", "acct:0007")]
    fn binary_keys_render_as_hex(raw: &[u8], rendered: &str) {
        let a = MemView::from_iter([(raw, b"v".as_slice())]);
        let b = MemView::default();
        let mut reporter = Reporter::new(Vec::new());
        let count = diff_views(&a, &b, &mut reporter, &labels()).unwrap();
        assert_eq!(count, 1);
        let out = String::from_utf8(reporter.into_inner()).unwrap();
        assert_eq!(out, format!("chdbg: b.db: missing key {rendered}\n"));
    }

    #[test]
    fn describe_formats() {
        let labels = labels();
        let mismatch = DiffRecord::ValueMismatch {
            key: key("acct:1"),
            left: key("100"),
            right: Box::from(&[0xffu8][..]),
        };
        assert_eq!(
            mismatch.describe(&labels).to_string(),
            "key acct:1: value mismatch\nvalue a 100\nvalue b FF"
        );
        let anomaly = DiffRecord::ProofAnomaly {
            key: key("acct:1"),
            left: key("100"),
            right: key("100"),
        };
        assert_eq!(
            anomaly.describe(&labels).to_string(),
            "key acct:1: proofs failed\nvalue a 100\nvalue b 100"
        );
        let missing = DiffRecord::MissingInA { key: key("acct:9") };
        assert_eq!(missing.describe(&labels).to_string(), "a.db: missing key acct:9");
    }

    #[test]
    fn fifteen_missing_keys_are_capped() {
        let a = MemView::from_iter((0..15).map(|i| (format!("acct:{i:02}"), "1")));
        let b = MemView::default();
        let mut reporter = Reporter::new(Vec::new());

        let count = diff_views(&a, &b, &mut reporter, &labels()).unwrap();
        assert_eq!(count, 15);

        let out = String::from_utf8(reporter.into_inner()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 11);
        assert_eq!(lines[0], "chdbg: b.db: missing key acct:00");
        assert_eq!(lines[9], "chdbg: b.db: missing key acct:09");
        assert_eq!(lines[10], "chdbg: ... (additional diffs omitted)");
    }

    fn random_map(rng: &mut StdRng, size: usize) -> BTreeMap<Key, Value> {
        (0..size)
            .map(|_| {
                let k: [u8; 2] = [rng.random_range(0..8), rng.random_range(0..=255)];
                let v: [u8; 1] = [rng.random_range(0..3)];
                (Box::from(&k[..]), Box::from(&v[..]))
            })
            .collect()
    }

    #[test]
    fn random_views_classify_every_key_once() {
        let seed = std::env::var("CHDBG_TEST_SEED")
            .ok()
            .map_or_else(|| rng().random(), |s| s.parse().unwrap());
        let mut rng = StdRng::seed_from_u64(seed);

        for _ in 0..20 {
            let left = random_map(&mut rng, 200);
            let right = random_map(&mut rng, 200);

            let mut expected = Vec::new();
            for (k, v) in &left {
                match right.get(k) {
                    None => expected.push(DiffRecord::MissingInB { key: k.clone() }),
                    Some(rv) if rv != v => expected.push(DiffRecord::ValueMismatch {
                        key: k.clone(),
                        left: v.clone(),
                        right: rv.clone(),
                    }),
                    Some(_) => {}
                }
            }
            for k in right.keys().filter(|k| !left.contains_key(*k)) {
                expected.push(DiffRecord::MissingInA { key: k.clone() });
            }
            expected.sort_by(|a, b| a.key().cmp(b.key()));

            let records = diff(&MemView::new(left), &MemView::new(right));
            assert_eq!(records, expected, "seed {seed}");
        }
    }
}
