//! Domain tags
//!
//! A tag addresses a domain by its position in the tree: the root is `"."`
//! and a child of `t` at index `i` is `t + "." + i` (so `".0.2.1"` is the
//! second child's third child's second child of the first node). Prefix
//! checks work on whole path segments, never on raw characters.

use crate::error::{LocalityError, Result};
use serde::Serialize;
use std::fmt;

/// Dot-separated domain path
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct DomainTag(String);

impl DomainTag {
    /// Tag of the root domain
    pub const ROOT: &'static str = ".";

    /// The root tag
    pub fn root() -> Self {
        Self(Self::ROOT.to_string())
    }

    /// Parse and validate a tag, rejecting anything longer than `max_len`
    pub fn parse(s: &str, max_len: usize) -> Result<Self> {
        if !s.is_ascii() {
            return Err(LocalityError::invalid_tag(s, "tag must be ASCII"));
        }
        if !s.starts_with('.') {
            return Err(LocalityError::invalid_tag(s, "tag must start with '.'"));
        }
        if s.len() > max_len {
            return Err(LocalityError::TagTooLong {
                tag: s.to_string(),
                max: max_len,
            });
        }
        if s == Self::ROOT {
            return Ok(Self::root());
        }

        for segment in s[1..].split('.') {
            if segment.is_empty() {
                return Err(LocalityError::invalid_tag(s, "empty path segment"));
            }
            if !segment.bytes().all(|b| b.is_ascii_digit()) {
                return Err(LocalityError::invalid_tag(s, format!("segment '{}' is not a number", segment)));
            }
            if segment.len() > 1 && segment.starts_with('0') {
                return Err(LocalityError::invalid_tag(s, format!("segment '{}' has a leading zero", segment)));
            }
        }

        Ok(Self(s.to_string()))
    }

    /// Parse a list of tags
    pub fn parse_all<S: AsRef<str>>(tags: &[S], max_len: usize) -> Result<Vec<Self>> {
        tags.iter().map(|t| Self::parse(t.as_ref(), max_len)).collect()
    }

    /// Tag of the child at `index`
    pub fn child(&self, index: usize, max_len: usize) -> Result<Self> {
        let tag = if self.is_root() {
            format!(".{}", index)
        } else {
            format!("{}.{}", self.0, index)
        };
        if tag.len() > max_len {
            return Err(LocalityError::TagTooLong { tag, max: max_len });
        }
        Ok(Self(tag))
    }

    fn from_segments(segments: &[usize]) -> Self {
        if segments.is_empty() {
            return Self::root();
        }
        let mut tag = String::new();
        for segment in segments {
            tag.push('.');
            tag.push_str(&segment.to_string());
        }
        Self(tag)
    }

    /// The tag as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the root tag
    pub fn is_root(&self) -> bool {
        self.0 == Self::ROOT
    }

    /// Relative indices along the path from the root
    pub fn segments(&self) -> Vec<usize> {
        if self.is_root() {
            return Vec::new();
        }
        self.0[1..].split('.').filter_map(|s| s.parse().ok()).collect()
    }

    /// Number of path segments (0 for the root)
    pub fn depth(&self) -> usize {
        if self.is_root() {
            0
        } else {
            self.0.matches('.').count()
        }
    }

    /// Whether `other` equals this tag or lies below it
    pub fn is_prefix_of(&self, other: &DomainTag) -> bool {
        if self.is_root() || self.0 == other.0 {
            return true;
        }
        other.0.len() > self.0.len()
            && other.0.starts_with(&self.0)
            && other.0.as_bytes()[self.0.len()] == b'.'
    }

    /// Longest common path prefix of all tags; the root when they share nothing
    pub fn common_prefix(tags: &[DomainTag]) -> DomainTag {
        let mut iter = tags.iter();
        let mut prefix = match iter.next() {
            Some(first) => first.segments(),
            None => return Self::root(),
        };

        for tag in iter {
            let segments = tag.segments();
            let shared = prefix
                .iter()
                .zip(segments.iter())
                .take_while(|(a, b)| a == b)
                .count();
            prefix.truncate(shared);
            if prefix.is_empty() {
                break;
            }
        }

        Self::from_segments(&prefix)
    }
}

impl fmt::Display for DomainTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DomainTag {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
