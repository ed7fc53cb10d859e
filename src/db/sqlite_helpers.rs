//! SQLite helper utilities for type conversion
//!
//! Timestamps are stored as RFC 3339 TEXT and booleans as INTEGER.

use chrono::Utc;

// ============================================================================
// Timestamp Helpers
// ============================================================================

/// Get current UTC timestamp as ISO8601 string for SQLite
#[inline]
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339()
}

// ============================================================================
// Query Helpers
// ============================================================================

/// Escape `%` and `_` for a `LIKE ... ESCAPE '\'` pattern and wrap in wildcards.
pub fn like_contains(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}
