// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

use std::fmt::Display;
use std::io::{self, Write};

/// How many differences are printed before the rest are only counted
pub const DEFAULT_MAX_REPORTS: usize = 10;

/// Prefix of every diagnostic line
pub const PREFIX: &str = "chdbg: ";

/// Counts differences and prints the first few of them.
///
/// Every call to [`Reporter::record`] is counted. The first `max` messages
/// are written out; the one right after that is replaced by a single
/// notice that further differences are omitted.
#[derive(Debug)]
pub struct Reporter<W> {
    out: W,
    count: usize,
    max: usize,
}

impl<W: Write> Reporter<W> {
    /// A reporter printing up to [`DEFAULT_MAX_REPORTS`] differences
    pub const fn new(out: W) -> Self {
        Self::with_max(out, DEFAULT_MAX_REPORTS)
    }

    /// A reporter printing up to `max` differences
    pub const fn with_max(out: W, max: usize) -> Self {
        Self { out, count: 0, max }
    }

    /// Record one difference.
    pub fn record(&mut self, message: impl Display) -> io::Result<()> {
        self.count += 1;
        if self.count <= self.max {
            writeln!(self.out, "{PREFIX}{message}")
        } else if self.count == self.max + 1 {
            writeln!(self.out, "{PREFIX}... (additional diffs omitted)")
        } else {
            Ok(())
        }
    }

    /// Every difference recorded so far, printed or not
    pub const fn count(&self) -> usize {
        self.count
    }

    /// Give back the underlying writer
    pub fn into_inner(self) -> W {
        self.out
    }
}
