//! Migration units and the records of their application.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// A versioned schema change with paired apply/revert scripts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationUnit {
    pub version: i64,
    pub name: String,
    pub up_sql: String,
    pub down_sql: Option<String>,
    /// SHA-256 of `up_sql`, hex encoded
    pub checksum: String,
}

impl MigrationUnit {
    pub fn new(
        version: i64,
        name: impl Into<String>,
        up_sql: impl Into<String>,
        down_sql: Option<String>,
    ) -> Self {
        let up_sql = up_sql.into();
        Self {
            version,
            name: name.into(),
            checksum: checksum(&up_sql),
            up_sql,
            down_sql,
        }
    }

    /// `<version>_<name>`, as found on disk
    pub fn label(&self) -> String {
        format!("{}_{}", self.version, self.name)
    }
}

/// Checksum stored alongside each applied unit.
pub fn checksum(sql: &str) -> String {
    hex::encode(Sha256::digest(sql.as_bytes()))
}

/// An applied schema change, as stored in the bookkeeping table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    pub checksum: String,
    pub applied_at: DateTime<Utc>,
}

/// One discovered unit and whether it has been applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    pub version: i64,
    pub name: String,
    pub applied_at: Option<DateTime<Utc>>,
}

impl MigrationStatus {
    pub fn is_applied(&self) -> bool {
        self.applied_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_is_stable_sha256() {
        let unit = MigrationUnit::new(1, "init", "CREATE TABLE t (id INTEGER);", None);
        assert_eq!(unit.checksum.len(), 64);
        assert_eq!(unit.checksum, checksum("CREATE TABLE t (id INTEGER);"));
        assert_ne!(unit.checksum, checksum("CREATE TABLE t (id BIGINT);"));
    }

    #[test]
    fn test_label() {
        let unit = MigrationUnit::new(20240101120000, "add_users", "", None);
        assert_eq!(unit.label(), "20240101120000_add_users");
    }
}
