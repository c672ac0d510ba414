use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Storage and execution tier a table currently lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Location {
    /// Materialized under the local storage root and served by the local engine.
    Local,
    /// Only available in the remote warehouse.
    Remote,
}

impl Location {
    /// Returns the canonical lowercase label used in logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }

    #[must_use]
    pub const fn is_local(&self) -> bool {
        matches!(self, Self::Local)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry record for a single table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableEntry {
    /// Unique table name (registry key).
    pub name: String,
    /// Current tier.
    pub location: Location,
    /// Number of successfully executed queries that referenced the table.
    pub usage_count: u64,
    /// Time of the most recent usage bookkeeping, if any.
    pub last_used_at: Option<DateTime<Utc>>,
}

impl TableEntry {
    /// Creates an unused entry.
    #[must_use]
    pub fn new(name: impl Into<String>, location: Location) -> Self {
        Self {
            name: name.into(),
            location,
            usage_count: 0,
            last_used_at: None,
        }
    }
}

/// SQL dialects understood by the translator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    /// Warehouse dialect queries are written in.
    #[default]
    BigQuery,
    DuckDb,
    Postgres,
    /// ANSI-ish dialect accepted by DataFusion.
    Generic,
}

impl SqlDialect {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BigQuery => "bigquery",
            Self::DuckDb => "duckdb",
            Self::Postgres => "postgres",
            Self::Generic => "generic",
        }
    }
}

impl fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SqlDialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bigquery" => Ok(Self::BigQuery),
            "duckdb" => Ok(Self::DuckDb),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "generic" => Ok(Self::Generic),
            other => Err(format!("unsupported SQL dialect `{other}`")),
        }
    }
}

/// Result of a routed query.
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    /// Tier the query was executed on.
    pub tier: Location,
    /// Tables referenced by the query, in order of first appearance.
    pub tables: Vec<String>,
    /// Rows returned by the engine.
    pub batches: Vec<RecordBatch>,
}

impl QueryOutcome {
    /// Total number of rows across all batches.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_display() {
        assert_eq!(Location::Local.to_string(), "local");
        assert_eq!(Location::Remote.to_string(), "remote");
        assert!(Location::Local.is_local());
        assert!(!Location::Remote.is_local());
    }

    #[test]
    fn test_new_entry_is_unused() {
        let entry = TableEntry::new("store_sales", Location::Remote);
        assert_eq!(entry.usage_count, 0);
        assert!(entry.last_used_at.is_none());
    }

    #[test]
    fn test_dialect_from_str() {
        assert_eq!("BigQuery".parse::<SqlDialect>().unwrap(), SqlDialect::BigQuery);
        assert_eq!("postgresql".parse::<SqlDialect>().unwrap(), SqlDialect::Postgres);
        assert!("oracle".parse::<SqlDialect>().is_err());
    }

    #[test]
    fn test_entry_serialization() {
        let entry = TableEntry::new("item", Location::Local);
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"location\":\"local\""));
        let back: TableEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }
}
