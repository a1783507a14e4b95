//! Normalization of operator-entered code lists.
//!
//! Airport, facility, carrier, and callsign lists arrive either as free text
//! (`"KJFK, klga;KEWR ZNY"`) or as JSON arrays. Both shapes normalize to the
//! same [`CodeList`]: upper-cased, trimmed, de-duplicated in first-seen order.

use serde::{Deserialize, Deserializer, Serialize};

/// Wildcard entry meaning "no restriction" in facility lists.
pub const WILDCARD: &str = "ALL";

/// Normalizes a single code: trims, upper-cases, and collapses inner
/// whitespace runs to one space.
///
/// # Example
///
/// ```rust
/// use tmi_core::codes::normalize_code;
///
/// assert_eq!(normalize_code("  kjfk "), "KJFK");
/// ```
#[must_use]
pub fn normalize_code(raw: &str) -> String {
    raw.split_whitespace()
        .map(str::to_uppercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Splits free text on commas, semicolons, and whitespace into normalized codes.
///
/// Empty fragments are dropped and duplicates keep their first position.
#[must_use]
pub fn split_codes(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for part in raw.split(|c: char| c == ',' || c == ';' || c.is_whitespace()) {
        let code = part.trim().to_uppercase();
        if !code.is_empty() && !out.contains(&code) {
            out.push(code);
        }
    }
    out
}

/// An ordered, normalized list of codes.
///
/// An empty list never matches anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CodeList(Vec<String>);

impl CodeList {
    /// Builds a list from already-separated entries, normalizing each one.
    #[must_use]
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<String> = Vec::new();
        for entry in entries {
            for code in split_codes(entry.as_ref()) {
                if !out.contains(&code) {
                    out.push(code);
                }
            }
        }
        Self(out)
    }

    /// Parses free text into a list.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        Self(split_codes(raw))
    }

    /// Returns true if the list has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the list contains the [`WILDCARD`] entry.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.0.iter().any(|c| c == WILDCARD)
    }

    /// Returns true if `code` (normalized) is in the list.
    ///
    /// Always false for an empty list.
    #[must_use]
    pub fn contains(&self, code: &str) -> bool {
        if self.0.is_empty() {
            return false;
        }
        let needle = normalize_code(code);
        self.0.iter().any(|c| *c == needle)
    }

    /// Returns the first entry matching `code`, if any.
    #[must_use]
    pub fn find(&self, code: &str) -> Option<&str> {
        let needle = normalize_code(code);
        self.0.iter().find(|c| **c == needle).map(String::as_str)
    }

    /// Merges another list into this one, keeping first-seen order.
    #[must_use]
    pub fn union(mut self, other: &Self) -> Self {
        for code in &other.0 {
            if !self.0.contains(code) {
                self.0.push(code.clone());
            }
        }
        self
    }

    /// Iterates over the entries.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Returns the entries as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl<'de> Deserialize<'de> for CodeList {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            List(Vec<String>),
        }

        Ok(match Option::<Raw>::deserialize(deserializer)? {
            None => Self::default(),
            Some(Raw::Text(text)) => Self::parse(&text),
            Some(Raw::List(items)) => Self::from_entries(items),
        })
    }
}

impl<S: AsRef<str>> FromIterator<S> for CodeList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::from_entries(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn split_handles_mixed_separators_and_dedupes() {
        assert_eq!(
            split_codes(" kjfk, KLGA;kewr  KJFK\tzny "),
            vec!["KJFK", "KLGA", "KEWR", "ZNY"]
        );
        assert!(split_codes(" ,; ").is_empty());
    }

    #[test]
    fn empty_list_never_matches() {
        let list = CodeList::default();
        assert!(!list.contains(""));
        assert!(!list.contains("KJFK"));
    }

    #[test]
    fn contains_is_case_and_whitespace_insensitive() {
        let list = CodeList::parse("KJFK KLGA");
        assert!(list.contains(" kjfk "));
        assert_eq!(list.find("klga"), Some("KLGA"));
        assert!(!list.contains("KEWR"));
    }

    #[test]
    fn deserializes_from_text_array_or_null() {
        let text: CodeList = serde_json::from_str("\"zny, zdc\"").unwrap();
        let array: CodeList = serde_json::from_str("[\"zny\", \"ZDC ZOB\"]").unwrap();
        let null: CodeList = serde_json::from_str("null").unwrap();
        assert_eq!(text.as_slice(), ["ZNY", "ZDC"]);
        assert_eq!(array.as_slice(), ["ZNY", "ZDC", "ZOB"]);
        assert!(null.is_empty());
    }

    #[test]
    fn wildcard_detection() {
        assert!(CodeList::parse("all").is_wildcard());
        assert!(!CodeList::parse("ZNY").is_wildcard());
    }

    #[test]
    fn union_preserves_order() {
        let merged = CodeList::parse("ZNY ZDC").union(&CodeList::parse("ZDC ZBW"));
        assert_eq!(merged.as_slice(), ["ZNY", "ZDC", "ZBW"]);
    }

    proptest! {
        #[test]
        fn split_output_is_normalized_and_unique(raw in "[a-zA-Z0-9 ,;]{0,64}") {
            let codes = split_codes(&raw);
            for (i, code) in codes.iter().enumerate() {
                prop_assert!(!code.is_empty());
                prop_assert_eq!(code, &code.to_uppercase());
                prop_assert!(!codes[i + 1..].contains(code));
            }
        }
    }
}
