//! Request parameter validation.

use git2::Oid;

use crate::error::AppError;

/// Checks a package name against the CommonJS registry restrictions: it
/// must be non-empty, must not start with `-`, must not be `.` or `..`,
/// and must not contain `/`.
pub fn is_valid_name(name: &str) -> bool {
    if name.is_empty() || name == "." || name == ".." {
        return false;
    }
    if name.starts_with('-') {
        return false;
    }
    !name.contains('/')
}

/// Rejects invalid package names before any storage access.
pub fn validate_name(name: &str) -> Result<(), AppError> {
    if is_valid_name(name) {
        Ok(())
    } else {
        tracing::debug!(name = %name, "rejected invalid package name");
        Err(AppError::InvalidName)
    }
}

/// Parses a download `version` path segment as a full object id.
///
/// `Oid::from_str` accepts abbreviated hashes, so the length is checked
/// first; download URLs always carry all 40 hex characters.
pub fn parse_object_id(version: &str) -> Result<Oid, AppError> {
    if version.len() != 40 {
        return Err(AppError::InvalidObjectId);
    }
    Oid::from_str(version).map_err(|_| AppError::InvalidObjectId)
}
