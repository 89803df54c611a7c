//! Record-relative paths and constant match patterns.
//!
//! Every scalar inside a record is addressed by its path from the
//! record root, whose segment is always `_`. Array elements contribute
//! index segments. Patterns are written against that shape: a literal
//! segment matches itself, `_` matches any single segment, and a
//! trailing `*` matches any remainder.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seg {
    Key(String),
    Idx(usize),
}

/// A path from the record root down to one value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Path {
    segs: Vec<Seg>,
}

impl Path {
    /// The record-root path (`_`).
    pub fn root() -> Self {
        Path {
            segs: vec![Seg::Key("_".to_owned())],
        }
    }

    pub fn push_key(&mut self, key: &str) {
        self.segs.push(Seg::Key(key.to_owned()));
    }

    pub fn push_idx(&mut self, idx: usize) {
        self.segs.push(Seg::Idx(idx));
    }

    pub fn pop(&mut self) {
        self.segs.pop();
    }

    pub fn len(&self) -> usize {
        self.segs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segs.is_empty()
    }

    /// True when the final segment is the given key.
    pub fn ends_with(&self, key: &str) -> bool {
        matches!(self.segs.last(), Some(Seg::Key(k)) if k == key)
    }

    /// Glob match against a constant pattern.
    pub fn like(&self, pattern: &Pattern) -> bool {
        let mut segs = self.segs.iter();
        for pat in pattern.0 {
            match pat {
                Pat::Rest => return true,
                Pat::Any => {
                    if segs.next().is_none() {
                        return false;
                    }
                }
                Pat::Lit(lit) => match segs.next() {
                    Some(Seg::Key(k)) if k == lit => {}
                    _ => return false,
                },
            }
        }
        segs.next().is_none()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.segs.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            match seg {
                Seg::Key(k) => f.write_str(k)?,
                Seg::Idx(n) => write!(f, "{n}")?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pat {
    /// Matches exactly this key segment.
    Lit(&'static str),
    /// Matches any single segment (key or index).
    Any,
    /// Matches any remaining segments; only valid in last position.
    Rest,
}

/// A constant path pattern.
#[derive(Debug, Clone, Copy)]
pub struct Pattern(pub &'static [Pat]);

// Patterns shared by the record parsers. The leading `Any` stands for
// the record root segment.
pub const P_TYPE: Pattern = Pattern(&[Pat::Any, Pat::Lit("t")]);
pub const P_OFFSET: Pattern = Pattern(&[Pat::Any, Pat::Lit("ts")]);
pub const P_SOURCE: Pattern = Pattern(&[Pat::Any, Pat::Lit("src")]);
pub const P_INSTANCE: Pattern = Pattern(&[Pat::Any, Pat::Lit("iid")]);
pub const P_TAG: Pattern = Pattern(&[Pat::Any, Pat::Lit("tag")]);
pub const P_ARG_OBJ: Pattern = Pattern(&[Pat::Any, Pat::Lit("a"), Pat::Any]);
pub const P_ARG_FIELD: Pattern = Pattern(&[Pat::Any, Pat::Lit("a"), Pat::Any, Pat::Rest]);
