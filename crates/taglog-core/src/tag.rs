//! Tags: `key:value` labels attached to events for cross-cutting correlation.
//!
//! A [`Tags`] set is canonical: elements are deduplicated and ordered by their
//! string form, so two sets built from the same tags in any order compare
//! equal and serialize to the same bytes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Maximum length of the key and of the value part of a tag.
pub const MAX_TAG_PART_LEN: usize = 50;

/// A single `key:value` tag.
///
/// The key is 1–50 characters of `[A-Za-z0-9_-]`. The value is 1–50
/// characters of `[A-Za-z0-9_:-]`; it may itself contain colons, the first
/// colon of the string form always separates key from value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag {
    raw: String,
    split: usize,
}

fn check_part(raw: &str, part: &str, allow_colon: bool) -> Result<(), ValidationError> {
    if part.is_empty() {
        return Err(ValidationError::InvalidTag {
            raw: raw.to_string(),
            reason: "key and value must be non-empty",
        });
    }
    if part.chars().count() > MAX_TAG_PART_LEN {
        return Err(ValidationError::InvalidTag {
            raw: raw.to_string(),
            reason: "key and value must be at most 50 characters",
        });
    }
    let valid = part
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || (allow_colon && c == ':'));
    if !valid {
        return Err(ValidationError::InvalidTag {
            raw: raw.to_string(),
            reason: if allow_colon {
                "value allows only ASCII letters, digits, '-', '_' and ':'"
            } else {
                "key allows only ASCII letters, digits, '-' and '_'"
            },
        });
    }
    Ok(())
}

impl Tag {
    /// Build a tag from its key and value.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidTag`] if either part is empty, too
    /// long, or contains characters outside the allowed set.
    pub fn new(key: &str, value: &str) -> Result<Self, ValidationError> {
        let raw = format!("{key}:{value}");
        check_part(&raw, key, false)?;
        check_part(&raw, value, true)?;
        Ok(Self {
            raw,
            split: key.len(),
        })
    }

    /// Parse the `key:value` string form.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidTag`] if there is no colon or either
    /// part fails validation.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let Some((key, value)) = raw.split_once(':') else {
            return Err(ValidationError::InvalidTag {
                raw: raw.to_string(),
                reason: "expected 'key:value'",
            });
        };
        Self::new(key, value)
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.raw[..self.split]
    }

    #[must_use]
    pub fn value(&self) -> &str {
        &self.raw[self.split + 1..]
    }

    /// Canonical `key:value` string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for Tag {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for Tag {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl Serialize for Tag {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for Tag {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// A canonical, deduplicated set of [`Tag`]s.
///
/// May be empty: events are allowed to carry no tags. Criteria reject empty
/// sets at their own construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tags(BTreeSet<Tag>);

impl Tags {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn single(tag: Tag) -> Self {
        Self(BTreeSet::from([tag]))
    }

    /// Parse and normalize a list of `key:value` strings.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] encountered.
    pub fn try_from_strings<I, S>(raw: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        raw.into_iter()
            .map(|s| Tag::parse(s.as_ref()))
            .collect::<Result<BTreeSet<_>, _>>()
            .map(Self)
    }

    /// Union of both sets. Returns `self` untouched when `other` adds nothing.
    #[must_use]
    pub fn merge(self, other: &Self) -> Self {
        if other.0.is_subset(&self.0) {
            return self;
        }
        let mut merged = self.0;
        merged.extend(other.0.iter().cloned());
        Self(merged)
    }

    #[must_use]
    pub fn contains(&self, tag: &Tag) -> bool {
        self.0.contains(tag)
    }

    /// Whether the sets share at least one tag.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        let (small, large) = if self.0.len() <= other.0.len() {
            (&self.0, &other.0)
        } else {
            (&other.0, &self.0)
        };
        small.iter().any(|t| large.contains(t))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate tags in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.0.iter()
    }

    #[must_use]
    pub fn to_strings(&self) -> Vec<String> {
        self.0.iter().map(ToString::to_string).collect()
    }
}

impl FromIterator<Tag> for Tags {
    fn from_iter<I: IntoIterator<Item = Tag>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<Tag> for Tags {
    fn from(tag: Tag) -> Self {
        Self::single(tag)
    }
}

impl<'a> IntoIterator for &'a Tags {
    type Item = &'a Tag;
    type IntoIter = std::collections::btree_set::Iter<'a, Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for Tags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for tag in &self.0 {
            if !first {
                f.write_str(",")?;
            }
            first = false;
            f.write_str(tag.as_str())?;
        }
        Ok(())
    }
}
