//! Validation Support
//!
//! Field-level checks shared by the query string decoder, the search compiler
//! and the planner. Every failure is reported as a [`ValidationError`] naming
//! the offending token so the caller can surface it as a client error.
//!
//! # Example
//!
//! ```rust
//! use crudquery::validation::{validate_field_path, detect_sql_injection};
//!
//! assert!(validate_field_path("company.projects.id").is_ok());
//! assert!(validate_field_path("name; DROP TABLE users").is_err());
//! assert!(detect_sql_injection(" ASC; SELECT CAST( version() AS INTEGER); --").is_err());
//! ```

use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;

// Basic safety limits
const MAX_FIELD_PATH_LENGTH: usize = 255;
const MAX_FIELD_SEGMENTS: usize = 8;

/// Validation error with field name and message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    /// The field or query token that failed validation
    pub field: String,
    /// Human-readable error message
    pub message: String,
}

impl ValidationError {
    /// Create a new validation error
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Patterns borrowed from the classic SQL injection signatures: quotes and
/// comment markers, `=` followed by a terminator, `'or` and `'union`.
static SQL_INJECTION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)(%27)|(')|(--)|(%23)|(#)",
        r"(?i)((%3D)|(=))[^\n]*((%27)|(')|(--)|(%3B)|(;))",
        r"(?i)\w*((%27)|('))((%6F)|o|(%4F))((%72)|r|(%52))",
        r"(?i)((%27)|('))union",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

/// Reject a field that matches any known SQL injection signature.
///
/// # Errors
///
/// Returns a [`ValidationError`] naming the field when a signature matches.
pub fn detect_sql_injection(field: &str) -> Result<(), ValidationError> {
    if SQL_INJECTION_PATTERNS.iter().any(|re| re.is_match(field)) {
        tracing::warn!(field = %field, "SQL injection pattern rejected");
        return Err(ValidationError::new(field, "SQL injection detected"));
    }
    Ok(())
}

fn is_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Check that a field path is a dot-separated list of plain identifiers.
///
/// # Errors
///
/// Returns a [`ValidationError`] if the path is empty, too long, or any
/// segment is not an identifier.
pub fn validate_field_path(field: &str) -> Result<(), ValidationError> {
    if field.is_empty() {
        return Err(ValidationError::new(field, "field must not be empty"));
    }
    if field.len() > MAX_FIELD_PATH_LENGTH {
        return Err(ValidationError::new(field, "field path is too long"));
    }
    let segments: Vec<&str> = field.split('.').collect();
    if segments.len() > MAX_FIELD_SEGMENTS {
        return Err(ValidationError::new(field, "field path is nested too deeply"));
    }
    if !segments.iter().all(|segment| is_identifier(segment)) {
        return Err(ValidationError::new(field, "invalid field name"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::new("filter", "invalid operator");
        assert_eq!(err.to_string(), "filter: invalid operator");
    }

    #[test]
    fn test_valid_field_paths() {
        for field in ["id", "name", "company_id", "company.projects.id", "_private"] {
            assert!(validate_field_path(field).is_ok(), "{field} should be valid");
        }
    }

    #[test]
    fn test_invalid_field_paths() {
        for field in ["", "1abc", "company..id", "name ASC", "a-b", "company.", ".id"] {
            assert!(validate_field_path(field).is_err(), "{field} should be invalid");
        }
    }

    #[test]
    fn test_field_path_too_deep() {
        let field = vec!["a"; MAX_FIELD_SEGMENTS + 1].join(".");
        assert!(validate_field_path(&field).is_err());
    }

    #[test]
    fn test_sql_injection_detected() {
        let attempts = [
            " ASC; SELECT CAST( version() AS INTEGER); --",
            "name'--",
            "id' or 1=1",
            "x#",
            "name' union select",
        ];
        for attempt in attempts {
            let err = detect_sql_injection(attempt).unwrap_err();
            assert_eq!(err.field, attempt);
            assert_eq!(err.message, "SQL injection detected");
        }
    }

    #[test]
    fn test_plain_fields_pass_injection_check() {
        for field in ["id", "company.name", "createdAt", "user_order"] {
            assert!(detect_sql_injection(field).is_ok(), "{field} should pass");
        }
    }
}
