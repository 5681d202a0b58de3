//! Keyword store: the ordered keyword table inside a mapped segment

use crate::error::{ShmError, ShmResult};
use crate::keyword::{Keyword, KeywordEntry, KeywordValue};
use common::consts::MAX_KEYWORDS;
use std::fmt;

/// View of a segment's keyword table.
///
/// Borrowed from a handle; reads and writes go straight to the mapping, so a
/// value set through one handle is visible through every other handle
/// attached to the same segment. Cardinality and order are fixed at creation.
#[derive(Clone, Copy)]
pub struct KeywordStore<'a> {
    entries: &'a [KeywordEntry],
}

impl<'a> KeywordStore<'a> {
    pub(crate) fn new(entries: &'a [KeywordEntry]) -> Self {
        Self { entries }
    }

    /// Number of declared keywords
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the segment was created without keywords
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `name` is declared
    pub fn contains(&self, name: &str) -> bool {
        self.entry(name).is_ok()
    }

    /// Declared names in declaration order
    pub fn names(&self) -> impl Iterator<Item = &'a str> + 'a {
        self.entries.iter().filter_map(KeywordEntry::name)
    }

    /// Snapshot of one keyword.
    pub fn get(&self, name: &str) -> ShmResult<Keyword> {
        self.entry(name)?.load()
    }

    /// Overwrite the value of `name`.
    ///
    /// The variant of `value` must match the declared type, otherwise
    /// `TypeMismatch` is returned and the stored value is left untouched.
    pub fn set_value(&self, name: &str, value: impl Into<KeywordValue>) -> ShmResult<()> {
        let value = value.into();
        self.entry(name)?.store(&value)?;
        tracing::trace!("keyword {} = {}", name, value);
        Ok(())
    }

    /// Overwrite a STRING keyword; `OutOfRange` if `text` does not fit.
    pub fn set_string(&self, name: &str, text: &str) -> ShmResult<()> {
        self.set_value(name, KeywordValue::string(text)?)
    }

    /// Value of a LONG keyword
    pub fn get_long(&self, name: &str) -> ShmResult<i64> {
        let keyword = self.get(name)?;
        keyword
            .value()
            .as_long()
            .ok_or_else(|| type_mismatch(&keyword, "LONG"))
    }

    /// Value of a DOUBLE keyword
    pub fn get_double(&self, name: &str) -> ShmResult<f64> {
        let keyword = self.get(name)?;
        keyword
            .value()
            .as_double()
            .ok_or_else(|| type_mismatch(&keyword, "DOUBLE"))
    }

    /// Value of a STRING keyword
    pub fn get_string(&self, name: &str) -> ShmResult<String> {
        let keyword = self.get(name)?;
        keyword
            .value()
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| type_mismatch(&keyword, "STRING"))
    }

    /// Keywords in declaration order. Each call starts from the first entry.
    pub fn iter(&self) -> KeywordIter<'a> {
        KeywordIter {
            entries: self.entries.iter(),
        }
    }

    /// Snapshot of every keyword.
    pub fn to_vec(&self) -> ShmResult<Vec<Keyword>> {
        self.iter().collect()
    }

    fn entry(&self, name: &str) -> ShmResult<&'a KeywordEntry> {
        self.entries
            .iter()
            .find(|e| e.name() == Some(name))
            .ok_or_else(|| ShmError::KeywordNotFound {
                name: name.to_string(),
            })
    }
}

impl fmt::Debug for KeywordStore<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<'a> IntoIterator for &KeywordStore<'a> {
    type Item = ShmResult<Keyword>;
    type IntoIter = KeywordIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over a keyword table; yields consistent snapshots.
pub struct KeywordIter<'a> {
    entries: std::slice::Iter<'a, KeywordEntry>,
}

impl Iterator for KeywordIter<'_> {
    type Item = ShmResult<Keyword>;

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.next().map(KeywordEntry::load)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

impl ExactSizeIterator for KeywordIter<'_> {}

/// Check a keyword declaration list before it is written into a new segment.
pub fn validate_declarations(keywords: &[Keyword]) -> ShmResult<()> {
    if keywords.len() > MAX_KEYWORDS {
        return Err(ShmError::out_of_range(format!(
            "{} keywords exceed the limit of {MAX_KEYWORDS}",
            keywords.len()
        )));
    }
    for (index, keyword) in keywords.iter().enumerate() {
        if keywords[..index].iter().any(|k| k.name() == keyword.name()) {
            return Err(ShmError::DuplicateKeyword {
                name: keyword.name().to_string(),
            });
        }
    }
    Ok(())
}

fn type_mismatch(keyword: &Keyword, requested: &str) -> ShmError {
    ShmError::TypeMismatch {
        what: format!("keyword {}", keyword.name()),
        expected: keyword.keyword_type().to_string(),
        found: requested.to_string(),
    }
}
