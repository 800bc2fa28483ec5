//! Composite keys.
//!
//! The backing table has a single text primary key built as
//! `partition ++ "@@" ++ row`. Neither component may contain the separator,
//! and the join itself must not produce a second one (a partition ending in
//! `@` or a row starting with `@`), otherwise the key could not be split back
//! unambiguously and prefix scans over one partition could leak rows of
//! another. NUL characters are rejected as well, PostgreSQL text cannot hold
//! them.

use std::fmt;

/// Separator between the partition and row components.
pub const SEPARATOR: &str = "@@";

/// A key component contains [`SEPARATOR`], would form one at the join, or
/// contains a NUL character.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Partition key {partition:?} or row key {row:?} do not form a valid '@@' key")]
pub struct KeyFormatError {
    pub partition: String,
    pub row: String,
}

/// Validated `partition@@row` key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CompositeKey {
    encoded: String,
    split: usize,
}

impl CompositeKey {
    /// Builds a key, rejecting components that would make it ambiguous.
    pub fn new(partition: &str, row: &str) -> Result<Self, KeyFormatError> {
        validate(partition, row)?;
        Ok(Self {
            encoded: format!("{partition}{SEPARATOR}{row}"),
            split: partition.len(),
        })
    }

    /// Parses a key read back from the backend.
    pub fn parse(encoded: &str) -> Result<Self, KeyFormatError> {
        let invalid = || KeyFormatError {
            partition: encoded.to_string(),
            row: String::new(),
        };
        let (partition, row) = encoded.split_once(SEPARATOR).ok_or_else(invalid)?;
        if row.contains(SEPARATOR) {
            return Err(invalid());
        }
        Self::new(partition, row)
    }

    pub fn partition(&self) -> &str {
        &self.encoded[..self.split]
    }

    pub fn row(&self) -> &str {
        &self.encoded[self.split + SEPARATOR.len()..]
    }

    pub fn as_str(&self) -> &str {
        &self.encoded
    }

    pub fn into_parts(self) -> (String, String) {
        (self.partition().to_string(), self.row().to_string())
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded)
    }
}

/// Key prefix covering every row of `partition` whose row key starts with
/// `row_prefix`.
pub fn prefix(partition: &str, row_prefix: &str) -> Result<String, KeyFormatError> {
    validate(partition, row_prefix)?;
    Ok(format!("{partition}{SEPARATOR}{row_prefix}"))
}

fn validate(partition: &str, row: &str) -> Result<(), KeyFormatError> {
    if partition.contains(SEPARATOR)
        || row.contains(SEPARATOR)
        || partition.ends_with('@')
        || row.starts_with('@')
        || partition.contains('\0')
        || row.contains('\0')
    {
        return Err(KeyFormatError {
            partition: partition.to_string(),
            row: row.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_splits_back_into_components() {
        let cases = [
            ("BTC:M:ADDRESS:bc1q", "0a1b-0000000001"),
            ("p", ""),
            ("", "r"),
            ("a@b", "b@c"),
            ("tx%_*", "[x]?"),
            ("日本", "語"),
        ];
        for (partition, row) in cases {
            let key = CompositeKey::new(partition, row).unwrap();
            assert_eq!(key.partition(), partition);
            assert_eq!(key.row(), row);
            assert_eq!(key.as_str().matches(SEPARATOR).count(), 1);

            let parsed = CompositeKey::parse(key.as_str()).unwrap();
            assert_eq!(parsed, key);
            assert_eq!(
                parsed.into_parts(),
                (partition.to_string(), row.to_string())
            );
        }
    }

    #[test]
    fn test_invalid_components_are_rejected() {
        for (partition, row) in [
            ("a@@b", "r"),
            ("p", "x@@"),
            ("@@", "@@"),
            ("a@", "b"),
            ("a", "@b"),
            ("p\0", "r"),
            ("p", "r\0w"),
        ] {
            let err = CompositeKey::new(partition, row).unwrap_err();
            assert_eq!(err.partition, partition);
            assert_eq!(err.row, row);
            assert!(prefix(partition, row).is_err());
        }
    }

    #[test]
    fn test_parse_rejects_ambiguous_keys() {
        assert!(CompositeKey::parse("no-separator").is_err());
        assert!(CompositeKey::parse("a@@b@@c").is_err());
    }

    #[test]
    fn test_prefix_of_whole_partition() {
        assert_eq!(prefix("wallet", "").unwrap(), "wallet@@");
        assert_eq!(prefix("wallet", "0/1").unwrap(), "wallet@@0/1");
    }
}
