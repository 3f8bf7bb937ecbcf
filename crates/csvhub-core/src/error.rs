//! Error taxonomy shared by every csvhub crate.

use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Errors that can occur in catalog operations
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("File not found: {0}")]
    FileNotFound(i64),

    #[error("Join task not found: {0}")]
    TaskNotFound(String),

    #[error("Conflict detected: {0}")]
    ConflictError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid range: skip={skip}, limit={limit} (limit must be positive, skip must not be negative)")]
    InvalidRange { skip: i64, limit: i64 },

    #[error("CSV parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Join error: {0}")]
    Join(#[from] JoinError),

    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl CatalogError {
    /// Stable snake_case identifier used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            CatalogError::ValidationError(_) => "validation_error",
            CatalogError::InvalidRange { .. } => "invalid_range",
            CatalogError::FileNotFound(_) | CatalogError::TaskNotFound(_) => "not_found",
            CatalogError::ConflictError(_) => "conflict",
            CatalogError::Parse(_) => "parse_error",
            CatalogError::Fetch(_) => "fetch_error",
            CatalogError::Join(_) => "join_error",
            CatalogError::Sqlite(_)
            | CatalogError::Dataset(_)
            | CatalogError::SerializationError(_)
            | CatalogError::Other(_) => "internal_error",
        }
    }

    /// Returns true when the caller can fix the request and retry.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            CatalogError::ValidationError(_)
                | CatalogError::InvalidRange { .. }
                | CatalogError::FileNotFound(_)
                | CatalogError::TaskNotFound(_)
                | CatalogError::ConflictError(_)
                | CatalogError::Parse(_)
                | CatalogError::Join(_)
        )
    }
}

impl From<serde_json::Error> for CatalogError {
    fn from(err: serde_json::Error) -> Self {
        CatalogError::SerializationError(err.to_string())
    }
}

/// Result type for catalog operations
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Failures while turning CSV bytes into a dataset.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("input contains no header line")]
    EmptyInput,

    #[error("input is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("duplicate column name '{name}' in header")]
    DuplicateColumn { name: String },

    #[error("line {line}: {reason}")]
    Malformed { line: usize, reason: String },
}

/// Failures while retrieving rows from a remote API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("remote API unreachable: {0}")]
    Unreachable(String),

    #[error("remote API did not respond within {0:?}")]
    Timeout(Duration),

    #[error("remote API returned HTTP status {0}")]
    BadStatus(u16),

    #[error("remote API returned a malformed body: {0}")]
    MalformedBody(String),
}

/// Which input of a join an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinSide {
    /// The stored catalog file
    Left,
    /// The remote API response
    Right,
}

impl fmt::Display for JoinSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinSide::Left => write!(f, "left"),
            JoinSide::Right => write!(f, "right"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JoinError {
    #[error("unknown {side} join column '{name}'")]
    UnknownColumn { side: JoinSide, name: String },
}

/// Violations of the [`TabularDataset`](crate::TabularDataset) shape invariants.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DatasetError {
    #[error("duplicate column name '{0}'")]
    DuplicateColumn(String),

    #[error("row {row} has {actual} values but the dataset has {expected} columns")]
    RowWidth {
        row: usize,
        expected: usize,
        actual: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(CatalogError::FileNotFound(7).kind(), "not_found");
        assert_eq!(
            CatalogError::Fetch(FetchError::BadStatus(500)).kind(),
            "fetch_error"
        );
        assert_eq!(CatalogError::Other("boom".into()).kind(), "internal_error");
    }

    #[test]
    fn test_client_errors() {
        assert!(CatalogError::ValidationError("x".into()).is_client_error());
        assert!(CatalogError::InvalidRange { skip: 0, limit: 0 }.is_client_error());
        assert!(!CatalogError::Fetch(FetchError::Timeout(Duration::from_secs(1))).is_client_error());
        assert!(!CatalogError::Other("x".into()).is_client_error());
    }

    #[test]
    fn test_join_error_names_side_and_column() {
        let err = JoinError::UnknownColumn {
            side: JoinSide::Left,
            name: "doesNotExist".to_string(),
        };
        assert_eq!(err.to_string(), "unknown left join column 'doesNotExist'");
    }
}
