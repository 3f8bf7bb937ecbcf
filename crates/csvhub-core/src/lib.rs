//! csvhub Core
//!
//! Core types, CSV codec and join engine for the csvhub file catalog.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod csv;
pub mod join;
pub mod validation;

mod dataset;
mod error;

pub use dataset::{CellValue, Records, RowRef, TabularDataset};
pub use error::{
    CatalogError, DatasetError, FetchError, JoinError, JoinSide, ParseError, Result,
};

/// Listing row for a catalog file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSummary {
    pub id: i64,
    pub file_name: String,
}

/// Where a joined file came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    /// Id of the catalog file used as the left side (not a live handle)
    pub source_file_id: i64,
    /// Address of the remote API used as the right side
    pub remote_address: String,
    /// When the join ran
    pub joined_at: DateTime<Utc>,
}

/// Metadata for a stored file
///
/// The rows themselves are loaded separately by id, so listing and metadata
/// lookups never materialize a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Store-assigned unique id
    pub id: i64,
    /// Unique file name
    pub file_name: String,
    /// When the entry was stored
    pub created_at: DateTime<Utc>,
    pub row_count: usize,
    pub column_count: usize,
    /// Column names in order
    pub columns: Vec<String>,
    /// Present for files produced by a join
    pub provenance: Option<Provenance>,
    /// Ragged-row warnings recorded while parsing
    pub warnings: Vec<String>,
}

impl CatalogEntry {
    pub fn summary(&self) -> FileSummary {
        FileSummary {
            id: self.id,
            file_name: self.file_name.clone(),
        }
    }
}

/// A fully built entry waiting for the store to assign its id
#[derive(Debug, Clone)]
pub struct NewCatalogEntry {
    pub file_name: String,
    pub dataset: TabularDataset,
    pub provenance: Option<Provenance>,
    pub warnings: Vec<String>,
}

impl NewCatalogEntry {
    pub fn new(file_name: impl Into<String>, dataset: TabularDataset) -> Self {
        Self {
            file_name: file_name.into(),
            dataset,
            provenance: None,
            warnings: Vec::new(),
        }
    }

    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = Some(provenance);
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }
}

/// Parameters of a join between a stored file and a remote API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRequest {
    pub source_file_id: i64,
    pub remote_address: String,
    pub new_file_name: String,
    /// Key column on the stored file
    pub left_key: String,
    /// Key column on the remote records
    pub right_key: String,
}
