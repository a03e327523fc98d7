//! Milvus filter-expression builders.
//!
//! Milvus filters are textual expressions, so every interpolated value goes
//! through [`escape_string`]. Building expressions anywhere else in the crate
//! is a bug.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::SearchFilters;

/// Escape a value for embedding inside a double-quoted expression literal.
/// Backslashes are doubled before quotes so an input ending in `\"` cannot
/// smuggle a terminator through.
pub fn escape_string(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn quoted(value: &str) -> String {
    format!("\"{}\"", escape_string(value))
}

pub fn id_equals(id: &str) -> String {
    format!("id == {}", quoted(id))
}

pub fn id_in(ids: &[String]) -> String {
    let quoted_ids: Vec<String> = ids.iter().map(|id| quoted(id)).collect();
    format!("id in [{}]", quoted_ids.join(", "))
}

pub fn user_id_equals(user_id: Uuid) -> String {
    format!("user_id == {}", quoted(&user_id.to_string()))
}

fn published_after(min: DateTime<Utc>) -> String {
    format!("published_at >= {}", min.timestamp())
}

/// Render search filters to an expression, `None` when unconstrained.
pub fn entry_search_filter(filters: &SearchFilters) -> Option<String> {
    let mut clauses = Vec::new();

    if let Some(feed_id) = filters.feed_id {
        clauses.push(format!("feed_id == {}", quoted(&feed_id.to_string())));
    }
    if let Some(min) = filters.min_published_at {
        clauses.push(published_after(min));
    }

    if clauses.is_empty() {
        None
    } else {
        Some(clauses.join(" and "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_escape_plain() {
        assert_eq!(escape_string("abc-123"), "abc-123");
    }

    #[test]
    fn test_escape_quotes_and_backslashes() {
        assert_eq!(escape_string(r#"a"b"#), r#"a\"b"#);
        assert_eq!(escape_string(r"a\b"), r"a\\b");
        // Backslash-then-quote must not collapse into an escaped escape
        assert_eq!(escape_string(r#"\""#), r#"\\\""#);
    }

    #[test]
    fn test_injection_attempt_stays_inside_literal() {
        let hostile = r#"" OR 1==1 OR id==""#;
        let expr = id_equals(hostile);
        assert_eq!(expr, r#"id == "\" OR 1==1 OR id==\"""#);
    }

    #[test]
    fn test_id_in() {
        let ids = vec!["a".to_string(), "b".to_string()];
        assert_eq!(id_in(&ids), r#"id in ["a", "b"]"#);
    }

    #[test]
    fn test_search_filter_rendering() {
        assert_eq!(entry_search_filter(&SearchFilters::default()), None);

        let feed_id = Uuid::nil();
        let filters = SearchFilters {
            feed_id: Some(feed_id),
            min_published_at: Some(Utc.timestamp_opt(1_700_000_000, 0).unwrap()),
        };
        assert_eq!(
            entry_search_filter(&filters).unwrap(),
            format!("feed_id == \"{feed_id}\" and published_at >= 1700000000")
        );
    }
}
