//! Index identity.

use crate::types::quote_qualified;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Suffix PostgreSQL gives the new index built by `REINDEX CONCURRENTLY`.
const CONCURRENT_REINDEX_SUFFIX: &str = "_ccnew";

/// An index in one database, with the size facts used for selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostgresIndex {
    /// Name of the database connection the index lives in.
    pub database: String,
    /// Schema of the index.
    pub schema: String,
    /// Index name.
    pub name: String,
    /// On-disk size in bytes.
    pub ondisk_size_bytes: u64,
    /// Estimated bloat in bytes, when an estimate exists.
    pub bloat_size_bytes: Option<u64>,
    /// Whether the index is unique.
    pub unique: bool,
    /// Whether the index is valid (an interrupted concurrent build leaves
    /// an invalid index behind).
    pub valid: bool,
}

impl PostgresIndex {
    /// Create a valid, non-unique index with no size facts.
    pub fn new(
        database: impl Into<String>,
        schema: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            database: database.into(),
            schema: schema.into(),
            name: name.into(),
            ondisk_size_bytes: 0,
            bloat_size_bytes: None,
            unique: false,
            valid: true,
        }
    }

    /// Set the on-disk size.
    pub fn with_ondisk_size(mut self, bytes: u64) -> Self {
        self.ondisk_size_bytes = bytes;
        self
    }

    /// Set the bloat estimate.
    pub fn with_bloat_size(mut self, bytes: u64) -> Self {
        self.bloat_size_bytes = Some(bytes);
        self
    }

    /// Mark the index valid or invalid.
    pub fn with_valid(mut self, valid: bool) -> Self {
        self.valid = valid;
        self
    }

    /// `schema.name`.
    pub fn identifier(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    /// Quoted `"schema"."name"` for use in statements.
    pub fn quoted_identifier(&self) -> String {
        quote_qualified(&self.schema, &self.name)
    }

    /// Whether this is the temporary index of an interrupted
    /// `REINDEX CONCURRENTLY` (`<name>_ccnew`, `<name>_ccnew1`, ...).
    pub fn is_leftover_temporary(&self) -> bool {
        match self.name.rfind(CONCURRENT_REINDEX_SUFFIX) {
            Some(pos) => self.name[pos + CONCURRENT_REINDEX_SUFFIX.len()..]
                .chars()
                .all(|c| c.is_ascii_digit()),
            None => false,
        }
    }

    /// Estimated bloat as a fraction of the on-disk size.
    pub fn relative_bloat(&self) -> Option<f64> {
        match (self.bloat_size_bytes, self.ondisk_size_bytes) {
            (Some(_), 0) | (None, _) => None,
            (Some(bloat), size) => Some(bloat as f64 / size as f64),
        }
    }
}

impl fmt::Display for PostgresIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.database, self.schema, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier() {
        let index = PostgresIndex::new("main", "public", "index_events_on_id");
        assert_eq!(index.identifier(), "public.index_events_on_id");
        assert_eq!(index.quoted_identifier(), "\"public\".\"index_events_on_id\"");
        assert_eq!(index.to_string(), "main.public.index_events_on_id");
    }

    #[test]
    fn test_leftover_temporary_detection() {
        let leftover =
            |name: &str| PostgresIndex::new("main", "public", name).is_leftover_temporary();

        assert!(leftover("index_events_on_id_ccnew"));
        assert!(leftover("index_events_on_id_ccnew1"));
        assert!(leftover("index_events_on_id_ccnew12"));
        assert!(!leftover("index_events_on_id"));
        assert!(!leftover("index_events_on_id_ccnew_x"));
        assert!(!leftover("index_ccnew_events_on_id"));
    }

    #[test]
    fn test_relative_bloat() {
        let index = PostgresIndex::new("main", "public", "i").with_ondisk_size(1000);
        assert_eq!(index.relative_bloat(), None);
        assert_eq!(index.clone().with_bloat_size(250).relative_bloat(), Some(0.25));
        assert_eq!(
            PostgresIndex::new("main", "public", "i").with_bloat_size(1).relative_bloat(),
            None
        );
    }
}
