//! Typed keywords and their fixed-width entries in the segment header

use crate::error::{ShmError, ShmResult};
use crate::version::VersionCounter;
use common::consts::{KEYWORD_COMMENT_LEN, KEYWORD_NAME_LEN, KEYWORD_TEXT_LEN};
use serde::{Deserialize, Serialize};
use static_assertions::const_assert_eq;
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Keyword name, at most [`KEYWORD_NAME_LEN`] bytes.
pub type KeywordName = heapless::String<KEYWORD_NAME_LEN>;

/// Keyword string value, at most [`KEYWORD_TEXT_LEN`] bytes.
pub type KeywordText = heapless::String<KEYWORD_TEXT_LEN>;

/// Keyword comment, at most [`KEYWORD_COMMENT_LEN`] bytes.
pub type KeywordComment = heapless::String<KEYWORD_COMMENT_LEN>;

const TEXT_WORDS: usize = KEYWORD_TEXT_LEN / 8;

/// Declared type of a keyword. The discriminant is the stored tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u32)]
pub enum KeywordType {
    /// Signed 64-bit integer
    Long = 1,
    /// 64-bit float
    Double = 2,
    /// UTF-8 string up to [`KEYWORD_TEXT_LEN`] bytes
    String = 3,
}

impl KeywordType {
    /// Convert from a stored tag. Returns `None` for unknown tags.
    pub const fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            1 => Some(KeywordType::Long),
            2 => Some(KeywordType::Double),
            3 => Some(KeywordType::String),
            _ => None,
        }
    }

    /// Upper-case name used in errors and logs
    pub const fn as_str(self) -> &'static str {
        match self {
            KeywordType::Long => "LONG",
            KeywordType::Double => "DOUBLE",
            KeywordType::String => "STRING",
        }
    }
}

impl fmt::Display for KeywordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keyword payload; the variant fixes the keyword's type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KeywordValue {
    /// Integer value
    Long(i64),
    /// Floating-point value
    Double(f64),
    /// Text value
    String(KeywordText),
}

impl KeywordValue {
    /// Build a string value, rejecting text wider than the fixed field.
    pub fn string(text: &str) -> ShmResult<Self> {
        Ok(KeywordValue::String(fixed_str(text, "keyword string value")?))
    }

    /// Type implied by the variant
    pub fn keyword_type(&self) -> KeywordType {
        match self {
            KeywordValue::Long(_) => KeywordType::Long,
            KeywordValue::Double(_) => KeywordType::Double,
            KeywordValue::String(_) => KeywordType::String,
        }
    }

    /// Integer payload, if this is a `Long`
    pub fn as_long(&self) -> Option<i64> {
        match self {
            KeywordValue::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Float payload, if this is a `Double`
    pub fn as_double(&self) -> Option<f64> {
        match self {
            KeywordValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Text payload, if this is a `String`
    pub fn as_str(&self) -> Option<&str> {
        match self {
            KeywordValue::String(v) => Some(v.as_str()),
            _ => None,
        }
    }
}

impl From<i64> for KeywordValue {
    fn from(value: i64) -> Self {
        KeywordValue::Long(value)
    }
}

impl From<f64> for KeywordValue {
    fn from(value: f64) -> Self {
        KeywordValue::Double(value)
    }
}

impl fmt::Display for KeywordValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeywordValue::Long(v) => write!(f, "{v}"),
            KeywordValue::Double(v) => write!(f, "{v}"),
            KeywordValue::String(v) => write!(f, "'{v}'"),
        }
    }
}

/// One named, typed, commented metadata value.
///
/// Deserialization goes through [`Keyword::new`], so a decoded keyword obeys
/// the same width and NUL rules as one built in code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawKeyword")]
pub struct Keyword {
    name: KeywordName,
    value: KeywordValue,
    comment: KeywordComment,
}

impl Keyword {
    /// Declare a keyword. Fails with `OutOfRange` if the name is empty, any
    /// field is wider than its fixed slot, or any text contains a NUL byte.
    pub fn new(name: &str, value: KeywordValue, comment: &str) -> ShmResult<Self> {
        if name.is_empty() {
            return Err(ShmError::out_of_range("keyword name must be non-empty"));
        }
        if let KeywordValue::String(text) = &value {
            check_no_nul(text, "keyword string value")?;
        }
        Ok(Self {
            name: fixed_str(name, "keyword name")?,
            value,
            comment: fixed_str(comment, "keyword comment")?,
        })
    }

    /// Integer keyword
    pub fn long(name: &str, value: i64, comment: &str) -> ShmResult<Self> {
        Self::new(name, KeywordValue::Long(value), comment)
    }

    /// Floating-point keyword
    pub fn double(name: &str, value: f64, comment: &str) -> ShmResult<Self> {
        Self::new(name, KeywordValue::Double(value), comment)
    }

    /// String keyword
    pub fn string(name: &str, value: &str, comment: &str) -> ShmResult<Self> {
        Self::new(name, KeywordValue::string(value)?, comment)
    }

    /// Keyword name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared type
    pub fn keyword_type(&self) -> KeywordType {
        self.value.keyword_type()
    }

    /// Current value
    pub fn value(&self) -> &KeywordValue {
        &self.value
    }

    /// Human-readable description
    pub fn comment(&self) -> &str {
        &self.comment
    }
}

/// Serialized form of a [`Keyword`], validated on conversion.
#[derive(Deserialize)]
struct RawKeyword {
    name: String,
    value: KeywordValue,
    #[serde(default)]
    comment: String,
}

impl TryFrom<RawKeyword> for Keyword {
    type Error = ShmError;

    fn try_from(raw: RawKeyword) -> ShmResult<Self> {
        Keyword::new(&raw.name, raw.value, &raw.comment)
    }
}

/// Fixed-width keyword table entry as laid out in the mapping.
///
/// `name`, `type_tag` and `comment` are written once before the segment is
/// published and never change. The value lives in `numeric` (LONG/DOUBLE bit
/// pattern) or `text` (STRING, NUL padded) and is only touched under the
/// entry's `seq` counter.
#[repr(C)]
pub struct KeywordEntry {
    name: [u8; KEYWORD_NAME_LEN],
    type_tag: u32,
    seq: AtomicU32,
    numeric: AtomicU64,
    text: [AtomicU64; TEXT_WORDS],
    comment: [u8; KEYWORD_COMMENT_LEN],
}

/// Size of one keyword table entry in bytes.
pub const KEYWORD_ENTRY_SIZE: usize = core::mem::size_of::<KeywordEntry>();

const_assert_eq!(core::mem::size_of::<KeywordEntry>(), 176);
const_assert_eq!(core::mem::align_of::<KeywordEntry>(), 8);

impl KeywordEntry {
    /// Serialize a declared keyword into a fresh (zeroed, unpublished) entry.
    ///
    /// # Safety
    ///
    /// `dst` must be valid for writes of one `KeywordEntry`, 8-byte aligned,
    /// and not yet visible to any other handle.
    pub(crate) unsafe fn write_new(dst: *mut KeywordEntry, keyword: &Keyword) {
        let mut name = [0u8; KEYWORD_NAME_LEN];
        name[..keyword.name.len()].copy_from_slice(keyword.name.as_bytes());
        let mut comment = [0u8; KEYWORD_COMMENT_LEN];
        comment[..keyword.comment.len()].copy_from_slice(keyword.comment.as_bytes());

        let entry = KeywordEntry {
            name,
            type_tag: keyword.keyword_type() as u32,
            seq: AtomicU32::new(0),
            numeric: AtomicU64::new(0),
            text: Default::default(),
            comment,
        };
        // SAFETY: guaranteed by the caller.
        unsafe { dst.write(entry) };
        // Entry is private until the header magic is published.
        store_value(unsafe { &*dst }, &keyword.value);
    }

    /// Name as stored, or `None` if it is not valid UTF-8.
    pub fn name(&self) -> Option<&str> {
        decode_fixed(&self.name)
    }

    /// Comment as stored, or `None` if it is not valid UTF-8.
    pub fn comment(&self) -> Option<&str> {
        decode_fixed(&self.comment)
    }

    /// Declared type, or `None` for a corrupt tag.
    pub fn keyword_type(&self) -> Option<KeywordType> {
        KeywordType::from_tag(self.type_tag)
    }

    /// Check the immutable fields of an entry read from an opened segment.
    pub(crate) fn validate(&self, segment: &str, index: usize) -> ShmResult<()> {
        if self.keyword_type().is_none() {
            return Err(ShmError::format_mismatch(
                segment,
                format!("keyword #{index} has unknown type tag {}", self.type_tag),
            ));
        }
        match self.name() {
            Some(name) if !name.is_empty() => {}
            _ => {
                return Err(ShmError::format_mismatch(
                    segment,
                    format!("keyword #{index} has an empty or non UTF-8 name"),
                ));
            }
        }
        if self.comment().is_none() {
            return Err(ShmError::format_mismatch(
                segment,
                format!("keyword #{index} has a non UTF-8 comment"),
            ));
        }
        Ok(())
    }

    /// Consistent snapshot of the keyword.
    pub fn load(&self) -> ShmResult<Keyword> {
        let keyword_type = self
            .keyword_type()
            .ok_or_else(|| ShmError::out_of_range("corrupt keyword type tag"))?;
        let counter = VersionCounter::new(&self.seq);

        let value = match keyword_type {
            KeywordType::Long => {
                KeywordValue::Long(counter.read(|| self.numeric.load(Ordering::Relaxed))? as i64)
            }
            KeywordType::Double => KeywordValue::Double(f64::from_bits(
                counter.read(|| self.numeric.load(Ordering::Relaxed))?,
            )),
            KeywordType::String => {
                let words = counter.read(|| {
                    let mut words = [0u64; TEXT_WORDS];
                    for (dst, src) in words.iter_mut().zip(&self.text) {
                        *dst = src.load(Ordering::Relaxed);
                    }
                    words
                })?;
                let mut bytes = [0u8; KEYWORD_TEXT_LEN];
                for (chunk, word) in bytes.chunks_exact_mut(8).zip(words) {
                    chunk.copy_from_slice(&word.to_le_bytes());
                }
                let text = decode_fixed(&bytes)
                    .ok_or_else(|| ShmError::out_of_range("keyword string is not UTF-8"))?;
                KeywordValue::String(fixed_str(text, "keyword string value")?)
            }
        };

        Ok(Keyword {
            name: fixed_str(self.name().unwrap_or_default(), "keyword name")?,
            value,
            comment: fixed_str(self.comment().unwrap_or_default(), "keyword comment")?,
        })
    }

    /// Overwrite the value in place; the variant must match the declared type.
    pub fn store(&self, value: &KeywordValue) -> ShmResult<()> {
        let declared = self
            .keyword_type()
            .ok_or_else(|| ShmError::out_of_range("corrupt keyword type tag"))?;
        if declared != value.keyword_type() {
            return Err(ShmError::TypeMismatch {
                what: format!("keyword {}", self.name().unwrap_or("?")),
                expected: declared.to_string(),
                found: value.keyword_type().to_string(),
            });
        }
        if let KeywordValue::String(text) = value {
            check_no_nul(text, "keyword string value")?;
        }
        let _guard = VersionCounter::new(&self.seq).begin_write()?;
        store_value(self, value);
        Ok(())
    }
}

/// Raw value store; the caller holds the entry's write guard or owns the entry.
fn store_value(entry: &KeywordEntry, value: &KeywordValue) {
    match value {
        KeywordValue::Long(v) => entry.numeric.store(*v as u64, Ordering::Relaxed),
        KeywordValue::Double(v) => entry.numeric.store(v.to_bits(), Ordering::Relaxed),
        KeywordValue::String(text) => {
            let mut bytes = [0u8; KEYWORD_TEXT_LEN];
            bytes[..text.len()].copy_from_slice(text.as_bytes());
            for (word, chunk) in entry.text.iter().zip(bytes.chunks_exact(8)) {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(chunk);
                word.store(u64::from_le_bytes(raw), Ordering::Relaxed);
            }
        }
    }
}

/// Stored text is NUL padded, so an embedded NUL would end it early.
fn check_no_nul(text: &str, what: &str) -> ShmResult<()> {
    if text.contains('\0') {
        return Err(ShmError::out_of_range(format!(
            "{what} {text:?} contains a NUL byte"
        )));
    }
    Ok(())
}

/// Copy `text` into a fixed-capacity string, failing instead of truncating.
fn fixed_str<const N: usize>(text: &str, what: &str) -> ShmResult<heapless::String<N>> {
    check_no_nul(text, what)?;
    let mut out = heapless::String::<N>::new();
    out.push_str(text).map_err(|_| {
        ShmError::out_of_range(format!(
            "{what} {text:?} is {} bytes, limit is {N}",
            text.len()
        ))
    })?;
    Ok(out)
}

/// NUL-padded bytes to `&str`.
fn decode_fixed(bytes: &[u8]) -> Option<&str> {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    std::str::from_utf8(&bytes[..end]).ok()
}
