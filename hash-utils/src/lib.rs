//! Hashing primitives used across the crate to give resources and jobs a
//! stable, content-addressed identity.
//!
//! [`HashContent`] is a small tree of primitives (the "hash content") that a
//! value renders itself into; [`content_digest`] turns that tree into a
//! canonical string and then a fixed-width BLAKE2s digest. Maps are sorted by
//! key and sets are sorted by their canonicalized element before rendering,
//! so permuting either does not change the digest. Sequences preserve order.
//!
//! [`str_seahash`] is a second, non-cryptographic digest used where only a
//! fast fingerprint of raw bytes is needed (e.g. scratch-directory naming);
//! it never substitutes for [`content_digest`] as a content-addressed
//! identity.

use blake2::{
    digest::{Update, VariableOutput},
    Blake2sVar,
};
use common::eyre::Result;

/// The length, in bytes, of the BLAKE2s digest used for content identity.
pub const DIGEST_SIZE: usize = 8;

/// A deterministic tree of primitives that captures all semantically
/// identifying state of a hashable value.
///
/// This is the target type that [`Hashable::hash_content`] implementations
/// build; it intentionally mirrors a small, JSON-like value model rather than
/// the type being hashed, so two different Rust types with the same semantic
/// content hash identically.
#[derive(Debug, Clone, PartialEq)]
pub enum HashContent {
    /// The absence of a value.
    Null,
    Bool(bool),
    Int(i64),
    /// Floating point values are rendered via their `Display` form so that
    /// equal values always produce the same canonical string.
    Float(f64),
    Str(String),
    /// An ordered sequence; item order is part of the identity.
    Seq(Vec<HashContent>),
    /// An unordered collection; canonicalized and sorted before rendering so
    /// element order never affects the digest.
    Set(Vec<HashContent>),
    /// An unordered mapping; sorted by key before rendering.
    Map(Vec<(String, HashContent)>),
}

impl HashContent {
    /// Convenience constructor for [`HashContent::Seq`] from anything
    /// iterable of [`Hashable`] values.
    pub fn seq<T: Hashable>(items: impl IntoIterator<Item = T>) -> Self {
        HashContent::Seq(items.into_iter().map(|i| i.hash_content()).collect())
    }

    /// Convenience constructor for [`HashContent::Set`] from anything
    /// iterable of [`Hashable`] values.
    pub fn set<T: Hashable>(items: impl IntoIterator<Item = T>) -> Self {
        HashContent::Set(items.into_iter().map(|i| i.hash_content()).collect())
    }
}

impl From<&str> for HashContent {
    fn from(value: &str) -> Self {
        HashContent::Str(value.to_string())
    }
}

impl From<String> for HashContent {
    fn from(value: String) -> Self {
        HashContent::Str(value)
    }
}

impl From<i64> for HashContent {
    fn from(value: i64) -> Self {
        HashContent::Int(value)
    }
}

impl From<f64> for HashContent {
    fn from(value: f64) -> Self {
        HashContent::Float(value)
    }
}

impl From<bool> for HashContent {
    fn from(value: bool) -> Self {
        HashContent::Bool(value)
    }
}

impl<T: Into<HashContent>> From<Option<T>> for HashContent {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => HashContent::Null,
        }
    }
}

/// Quote and escape a string the way a canonical rendering needs to: distinct
/// strings must never render to the same quoted form.
fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        if c == '\'' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('\'');
    out
}

/// Render a [`HashContent`] tree into a canonical string.
///
/// - Mappings are sorted by key.
/// - Sets are sorted by their own canonicalized rendering.
/// - Sequences preserve insertion order.
pub fn canonical_string(content: &HashContent) -> String {
    match content {
        HashContent::Null => "None".to_string(),
        HashContent::Bool(b) => b.to_string(),
        HashContent::Int(i) => i.to_string(),
        HashContent::Float(f) => format!("{f:?}"),
        HashContent::Str(s) => quote(s),
        HashContent::Seq(items) => {
            let rendered: Vec<String> = items.iter().map(canonical_string).collect();
            format!("[{}]", rendered.join(", "))
        }
        HashContent::Set(items) => {
            let mut rendered: Vec<String> = items.iter().map(canonical_string).collect();
            rendered.sort();
            format!("{{{}}}", rendered.join(", "))
        }
        HashContent::Map(entries) => {
            let mut sorted: Vec<&(String, HashContent)> = entries.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(&b.0));
            let rendered: Vec<String> = sorted
                .iter()
                .map(|(k, v)| format!("({}, {})", quote(k), canonical_string(v)))
                .collect();
            format!("[{}]", rendered.join(", "))
        }
    }
}

/// Compute the BLAKE2s-8 content digest of a [`HashContent`] tree, hex
/// encoded (16 hex characters).
pub fn content_digest(content: &HashContent) -> String {
    let canonical = canonical_string(content);
    let mut hasher =
        Blake2sVar::new(DIGEST_SIZE).expect("DIGEST_SIZE is a valid blake2s output size");
    hasher.update(canonical.as_bytes());
    let mut buf = [0u8; DIGEST_SIZE];
    hasher
        .finalize_variable(&mut buf)
        .expect("buffer is exactly DIGEST_SIZE bytes");
    hex::encode(buf)
}

/// The short, human-readable form of a digest: its last 8 hex characters.
pub fn short_digest(long: &str) -> String {
    let len = long.len();
    long[len.saturating_sub(8)..].to_string()
}

/// A fast, non-cryptographic fingerprint of raw bytes (SeaHash). Used where a
/// content digest is overkill, e.g. deduplicating scratch-directory names.
/// Never a substitute for [`content_digest`] as a content-addressed identity.
pub fn str_seahash(content: &str) -> Result<u64> {
    Ok(seahash::hash(content.as_bytes()))
}

/// A value that can be reduced to a [`HashContent`] tree for content-addressed
/// identity.
///
/// Implementors are expected to cache the resulting digest themselves where
/// mutation makes memoization worthwhile (e.g. a [`Job`][crate] whose input
/// bindings change); `Hashable` itself is not memoized so it composes simply
/// with immutable value types.
pub trait Hashable {
    /// Produce the deterministic tree of primitives identifying this value.
    fn hash_content(&self) -> HashContent;

    /// The full digest, hex encoded.
    fn long_hash(&self) -> String {
        content_digest(&self.hash_content())
    }

    /// The short, human-readable form of [`Hashable::long_hash`].
    fn short_hash(&self) -> String {
        short_digest(&self.long_hash())
    }
}

impl Hashable for HashContent {
    fn hash_content(&self) -> HashContent {
        self.clone()
    }
}

impl Hashable for str {
    fn hash_content(&self) -> HashContent {
        HashContent::Str(self.to_string())
    }
}

impl Hashable for String {
    fn hash_content(&self) -> HashContent {
        HashContent::Str(self.clone())
    }
}
