use std::fmt;

use common::indexmap::IndexMap;
use hash_utils::{HashContent, Hashable};

/// The separator between a fork's name and its value: `skullstrip-afni`.
pub const KEYVAL_SEP: char = '-';
/// The separator between forks: `skullstrip-afni+nuisance-gsr`.
pub const FORK_SEP: char = '+';

/// An ordered mapping from fork-name to fork-value, representing a single
/// pipeline branch choice (e.g. `skullstrip -> afni`, `nuisance -> gsr`).
///
/// Insertion order is preserved and is what the total ordering and the
/// rendered string are based on; it is not re-sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Strategy {
    forks: IndexMap<String, String>,
}

impl Strategy {
    /// An empty strategy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a strategy from an ordered list of (name, value) pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut forks = IndexMap::new();
        for (k, v) in pairs {
            forks.insert(k.into(), v.into());
        }
        Self { forks }
    }

    /// Parse the `name-value+name-value` encoding used in the `desc` entity.
    ///
    /// Each fork must be a `name-value` pair; forks are separated by `+`.
    /// Returns an error if any chunk does not contain the `-` separator.
    pub fn parse(s: &str) -> Result<Self, String> {
        if s.is_empty() {
            return Ok(Self::new());
        }
        let mut forks = IndexMap::new();
        for chunk in s.split(FORK_SEP) {
            let (name, value) = chunk.split_once(KEYVAL_SEP).ok_or_else(|| {
                format!(
                    "fork \"{chunk}\" must be in the form \"name{KEYVAL_SEP}value\""
                )
            })?;
            if name.is_empty() || value.is_empty() {
                return Err(format!("fork \"{chunk}\" has an empty name or value"));
            }
            forks.insert(name.to_string(), value.to_string());
        }
        Ok(Self { forks })
    }

    pub fn is_empty(&self) -> bool {
        self.forks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.forks.len()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.forks.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.forks.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.forks.keys().map(String::as_str)
    }

    /// `self` is satisfied by `other` iff every fork in `self` is either
    /// absent from `other` or equal to `other`'s value for that fork.
    ///
    /// This is the subset relation used when `self` acts as a filter.
    pub fn is_satisfied_by(&self, other: &Strategy) -> bool {
        self.forks
            .iter()
            .all(|(name, value)| match other.get(name) {
                Some(other_value) => other_value == value,
                None => true,
            })
    }

    /// Merge `other`'s forks on top of `self`'s, with `other` winning on
    /// conflicting names.
    pub fn merged_with(&self, other: &Strategy) -> Strategy {
        let mut forks = self.forks.clone();
        for (k, v) in &other.forks {
            forks.insert(k.clone(), v.clone());
        }
        Strategy { forks }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .forks
            .iter()
            .map(|(k, v)| format!("{k}{KEYVAL_SEP}{v}"))
            .collect();
        write!(f, "{}", rendered.join(&FORK_SEP.to_string()))
    }
}

impl Hashable for Strategy {
    fn hash_content(&self) -> HashContent {
        HashContent::Seq(
            self.forks
                .iter()
                .map(|(k, v)| {
                    HashContent::Seq(vec![HashContent::Str(k.clone()), HashContent::Str(v.clone())])
                })
                .collect(),
        )
    }
}

/// Total ordering over strategies: lexicographic over (name, value) pairs in
/// insertion order.
impl PartialOrd for Strategy {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Strategy {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        let a: Vec<(&str, &str)> = self.iter().collect();
        let b: Vec<(&str, &str)> = other.iter().collect();
        a.cmp(&b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_multi_fork_desc_value() {
        let s = Strategy::parse("skullstrip-afni+nuis-gsr").unwrap();
        assert_eq!(s.get("skullstrip"), Some("afni"));
        assert_eq!(s.get("nuis"), Some("gsr"));
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn rejects_fork_without_separator() {
        assert!(Strategy::parse("skullstrip").is_err());
    }

    #[test]
    fn renders_back_to_its_source_string() {
        let s = Strategy::parse("skullstrip-afni+nuis-gsr").unwrap();
        assert_eq!(s.to_string(), "skullstrip-afni+nuis-gsr");
    }

    #[test]
    fn subset_matching_ignores_forks_absent_from_target() {
        let filter = Strategy::from_pairs([("skullstrip", "afni")]);
        let full = Strategy::from_pairs([("skullstrip", "afni"), ("nuis", "gsr")]);
        assert!(filter.is_satisfied_by(&full));

        let conflicting = Strategy::from_pairs([("skullstrip", "bet")]);
        assert!(!filter.is_satisfied_by(&conflicting));

        let unrelated = Strategy::from_pairs([("nuis", "gsr")]);
        assert!(filter.is_satisfied_by(&unrelated));
    }

    #[test]
    fn ordering_is_lexicographic_by_insertion_order() {
        let a = Strategy::from_pairs([("skullstrip", "afni")]);
        let b = Strategy::from_pairs([("skullstrip", "bet")]);
        assert!(a < b);
    }

    #[test]
    fn hash_content_is_order_sensitive_like_an_ordered_map() {
        let a = Strategy::from_pairs([("a", "1"), ("b", "2")]);
        let b = Strategy::from_pairs([("b", "2"), ("a", "1")]);
        // Differing insertion order is a differing strategy identity: this
        // mirrors the source's sequence-of-pairs hash content, not a sorted
        // map, since fork declaration order can be semantically meaningful.
        assert_ne!(a.hash_content(), b.hash_content());
    }
}
