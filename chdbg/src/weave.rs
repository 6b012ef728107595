// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

//! Display of weave keys: an ASCII prefix and an id, separated by `:`.
//!
//! Only used to make diagnostics readable. Nothing here takes part in
//! comparing keys.

const SEPARATOR: u8 = b':';

/// Render `key` for display. The key is split at the first `:` and each
/// side is encoded on its own with [`encode_id`].
#[must_use]
pub fn parse_weave_key(key: &[u8]) -> String {
    match key.iter().position(|b| *b == SEPARATOR) {
        None => encode_id(key),
        Some(cut) => {
            let (prefix, id) = key.split_at(cut);
            // skip the separator itself
            let id = id.get(1..).unwrap_or_default();
            format!("{}:{}", encode_id(prefix), encode_id(id))
        }
    }
}

/// The id as a string if every byte is printable ASCII, upper-case hex
/// otherwise.
#[must_use]
pub fn encode_id(id: &[u8]) -> String {
    if id.iter().all(|b| (0x20..0x80).contains(b)) {
        id.iter().map(|b| char::from(*b)).collect()
    } else {
        hex::encode_upper(id)
    }
}
