//! Compact interned identifiers.
//!
//! Sources, tags, argument names and state tags are short labels drawn
//! from a restricted 63-character alphabet (`_`, `a`-`z`, `A`-`Z`,
//! `0`-`9`). Up to 10 characters are packed 6 bits each into a `u64`
//! with the length in the top nibble, so an [`Ident`] is `Copy`, cheap
//! to compare and directly usable as a hash-map key via [`Ident::value`].

use std::fmt;

const CHARS: &[u8; 63] = b"_abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Maximum number of characters an identifier can hold.
pub const MAX_LEN: usize = 10;

fn encode(c: u8) -> Option<u64> {
    match c {
        b'_' => Some(0),
        b'a'..=b'z' => Some(1 + u64::from(c - b'a')),
        b'A'..=b'Z' => Some(27 + u64::from(c - b'A')),
        b'0'..=b'9' => Some(53 + u64::from(c - b'0')),
        _ => None,
    }
}

/// An opaque short label with value equality.
///
/// Construction is total: characters outside the restricted alphabet
/// map to `_` and input longer than [`MAX_LEN`] is truncated, so wire
/// data can never fail to become an identifier.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ident(u64);

impl Ident {
    pub fn new(name: &str) -> Self {
        let mut value = 0u64;
        let mut len = 0u64;
        for &b in name.as_bytes().iter().take(MAX_LEN) {
            let code = encode(b).unwrap_or(0);
            value |= code << (6 * len);
            len += 1;
        }
        Ident(value | (len << 60))
    }

    /// The packed representation, usable as a map key.
    pub fn value(self) -> u64 {
        self.0
    }

    pub fn len(self) -> usize {
        ((self.0 >> 60) & 0xF) as usize
    }

    pub fn is_empty(self) -> bool {
        self.len() == 0
    }

    /// Decode back into the label string.
    pub fn name(self) -> String {
        let mut out = String::with_capacity(self.len());
        for i in 0..self.len() {
            let code = ((self.0 >> (6 * i)) & 0x3F) as usize;
            out.push(char::from(CHARS[code]));
        }
        out
    }

    /// True when this identifier equals `Ident::new(name)`.
    pub fn matches(self, name: &str) -> bool {
        self == Ident::new(name)
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl fmt::Debug for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ident({:?})", self.name())
    }
}

impl From<&str> for Ident {
    fn from(name: &str) -> Self {
        Ident::new(name)
    }
}
