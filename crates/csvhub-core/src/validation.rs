//! Input validation for catalog requests
//!
//! Provides validation functions for:
//! - File names supplied on upload and join
//! - Pagination parameters
//! - Remote API addresses and join key names
//! - Catalog `file://` URIs (path traversal)

use crate::{CatalogError, Result};
use url::Url;

/// Maximum length for file names
pub const MAX_FILE_NAME_LEN: usize = 255;

/// Maximum length for join key column names
pub const MAX_COLUMN_NAME_LEN: usize = 1024;

/// Default page size when `limit` is omitted
pub const DEFAULT_LIST_LIMIT: i64 = 100;

/// Validate a file name and return it without surrounding whitespace.
///
/// Requirements:
/// - Not empty after trimming
/// - <= 255 characters
/// - No control characters
pub fn validate_file_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CatalogError::ValidationError(
            "File name cannot be empty".to_string(),
        ));
    }

    let len = name.chars().count();
    if len > MAX_FILE_NAME_LEN {
        return Err(CatalogError::ValidationError(format!(
            "File name too long: {} > {} characters",
            len, MAX_FILE_NAME_LEN
        )));
    }

    if name.chars().any(char::is_control) {
        return Err(CatalogError::ValidationError(
            "File name contains control characters".to_string(),
        ));
    }

    Ok(name)
}

/// Validate pagination parameters and convert them to offsets.
///
/// Any positive `limit` is accepted; a limit past the end of the catalog
/// returns whatever is left.
pub fn validate_page(skip: i64, limit: i64) -> Result<(usize, usize)> {
    if skip < 0 || limit <= 0 {
        return Err(CatalogError::InvalidRange { skip, limit });
    }
    let skip = usize::try_from(skip).map_err(|_| CatalogError::InvalidRange { skip, limit })?;
    Ok((skip, usize::try_from(limit).unwrap_or(usize::MAX)))
}

/// Validate a remote API address.
///
/// Only absolute `http` and `https` URLs with a host are accepted.
pub fn validate_remote_address(address: &str) -> Result<Url> {
    let address = address.trim();
    if address.is_empty() {
        return Err(CatalogError::ValidationError(
            "API address cannot be empty".to_string(),
        ));
    }

    let url = Url::parse(address)
        .map_err(|e| CatalogError::ValidationError(format!("Invalid API address: {}", e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(CatalogError::ValidationError(format!(
            "Unsupported API address scheme '{}' (expected http or https)",
            url.scheme()
        )));
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(CatalogError::ValidationError(
            "API address must include a host".to_string(),
        ));
    }

    Ok(url)
}

/// Validate a join key column name. `which` names the parameter in messages.
pub fn validate_key_column(name: &str, which: &str) -> Result<()> {
    if name.is_empty() {
        return Err(CatalogError::ValidationError(format!(
            "{} cannot be empty",
            which
        )));
    }

    if name.len() > MAX_COLUMN_NAME_LEN {
        return Err(CatalogError::ValidationError(format!(
            "{} too long: {} > {} bytes",
            which,
            name.len(),
            MAX_COLUMN_NAME_LEN
        )));
    }

    Ok(())
}

/// Validate file:// URI path for traversal attacks
///
/// Prevents:
/// - .. path components
/// - Null bytes
pub fn validate_file_uri_path(path: &str) -> Result<()> {
    if path.contains('\0') {
        return Err(CatalogError::ValidationError(
            "File path contains null byte".to_string(),
        ));
    }

    if std::path::Path::new(path)
        .components()
        .any(|c| matches!(c, std::path::Component::ParentDir))
    {
        return Err(CatalogError::ValidationError(
            "File path cannot contain '..' components".to_string(),
        ));
    }

    Ok(())
}
