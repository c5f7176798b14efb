//! Source-to-destination topic mapping.
//!
//! [`TopicMapping`] is built once at startup from a mapping file and is
//! immutable afterwards; a topic without an entry maps to itself.
//!
//! File format: UTF-8 text, one mapping per line,
//! `<source-topic><whitespace><destination-topic>`. Lines that do not
//! match are logged as errors and skipped.

use std::collections::HashMap;
use std::path::Path;

use tracing::error;

use crate::error::MirrorError;

/// Immutable mapping from source topic name to destination topic name.
#[derive(Debug, Clone, Default)]
pub struct TopicMapping {
    entries: HashMap<String, String>,
}

impl TopicMapping {
    /// Creates an empty mapping: every topic maps to itself.
    #[must_use]
    pub fn identity() -> Self {
        Self::default()
    }

    /// Builds a mapping from explicit pairs.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: Into<String>,
    {
        let entries = pairs
            .into_iter()
            .map(|(src, dst)| (src.into(), dst.into()))
            .collect();
        Self { entries }
    }

    /// Loads a mapping from a file, skipping malformed lines.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::Mapping`] if the file cannot be read.
    /// Malformed lines are not errors: they are logged and skipped.
    pub fn from_file(path: &Path) -> Result<Self, MirrorError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            MirrorError::Mapping(format!("cannot read {}: {e}", path.display()))
        })?;
        Ok(Self::parse(&contents))
    }

    /// Parses mapping file contents, skipping malformed lines.
    #[must_use]
    pub fn parse(contents: &str) -> Self {
        let mut entries = HashMap::new();
        for (idx, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut tokens = line.split_whitespace();
            match (tokens.next(), tokens.next(), tokens.next()) {
                (Some(src), Some(dst), None) => {
                    entries.insert(src.to_string(), dst.to_string());
                }
                _ => {
                    error!(line = idx + 1, content = line, "malformed topic mapping line, skipping");
                }
            }
        }
        Self { entries }
    }

    /// Resolves the destination topic for a source topic.
    ///
    /// A topic without an entry maps to itself.
    #[must_use]
    pub fn resolve<'a>(&'a self, source_topic: &'a str) -> &'a str {
        self.entries
            .get(source_topic)
            .map_or(source_topic, String::as_str)
    }

    /// Returns the number of explicit mapping entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no explicit entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_resolves_to_self() {
        let mapping = TopicMapping::identity();
        assert_eq!(mapping.resolve("events"), "events");
        assert!(mapping.is_empty());
    }

    #[test]
    fn test_parse_basic() {
        let mapping = TopicMapping::parse("a b\nc d\n");
        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping.resolve("a"), "b");
        assert_eq!(mapping.resolve("c"), "d");
        assert_eq!(mapping.resolve("e"), "e");
    }

    #[test]
    fn test_parse_tabs_and_extra_whitespace() {
        let mapping = TopicMapping::parse("  src\t\tdst  \n");
        assert_eq!(mapping.resolve("src"), "dst");
    }

    #[test]
    fn test_parse_skips_malformed_lines() {
        let mapping = TopicMapping::parse("only-one-token\na b c\nsrc dst\n");
        assert_eq!(mapping.len(), 1);
        assert_eq!(mapping.resolve("src"), "dst");
    }

    #[test]
    fn test_parse_skips_blank_lines() {
        let mapping = TopicMapping::parse("\n\na b\n\n");
        assert_eq!(mapping.len(), 1);
    }

    #[test]
    fn test_last_entry_wins() {
        let mapping = TopicMapping::parse("a b\na c\n");
        assert_eq!(mapping.resolve("a"), "c");
    }

    #[test]
    fn test_from_pairs() {
        let mapping = TopicMapping::from_pairs([("x", "y")]);
        assert_eq!(mapping.resolve("x"), "y");
        assert_eq!(mapping.resolve("y"), "y");
    }

    #[test]
    fn test_from_file_missing_path() {
        let result = TopicMapping::from_file(std::path::Path::new("/nonexistent/mapping"));
        let err = result.unwrap_err();
        assert!(matches!(err, MirrorError::Mapping(_)));
        assert!(err.to_string().contains("/nonexistent/mapping"));
    }
}
