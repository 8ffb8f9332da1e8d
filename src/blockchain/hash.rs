//! Block digests.
//!
//! A block is hashed as SHA-256 over its canonical JSON rendering: object keys
//! sorted at every level, `", "` / `": "` separators and every character
//! outside printable ASCII written as a `\uXXXX` escape. Any implementation
//! producing the same bytes links to the same chain.

use std::io::{self, Write};

use serde::Serialize;
use serde_json::ser::{Formatter, Serializer};
use sha2::{Digest, Sha256};

use super::Block;
use crate::error::Result;

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Digest of a block; 64 lowercase hex characters.
pub fn hash(block: &Block) -> Result<String> {
    Ok(sha256_hex(&canonical_bytes(block)?))
}

/// Canonical JSON text of any serializable value.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String> {
    // Output is ASCII-only, so the lossy conversion never substitutes.
    Ok(String::from_utf8_lossy(&canonical_bytes(value)?).into_owned())
}

fn canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    // Going through `Value` sorts the keys (its map is a BTreeMap).
    let value = serde_json::to_value(value)?;
    let mut buf = Vec::with_capacity(256);
    let mut ser = Serializer::with_formatter(&mut buf, CanonicalFormatter);
    value.serialize(&mut ser)?;
    Ok(buf)
}

struct CanonicalFormatter;

impl Formatter for CanonicalFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        for ch in fragment.chars() {
            if (' '..='~').contains(&ch) {
                writer.write_all(&[ch as u8])?;
            } else {
                let mut units = [0u16; 2];
                for unit in ch.encode_utf16(&mut units) {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }
}
