//! Translate [`EvidenceFilters`] into a parameterized evidence query.

use chrono::Days;
use rusqlite::types::Value;

use evidex_core::filters::{EvidenceFilters, Tri};

/// Columns selected for every evidence listing, in row-mapping order.
pub const EVIDENCE_COLUMNS: &str = "id, path, operation_slug, server_uuid, content_type, \
                                    description, error, recorded_date, upload_date";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// A statement plus the arguments for its `?` placeholders, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterQuery {
    pub sql: String,
    pub args: Vec<Value>,
}

/// Build the evidence listing query for `filters`.
///
/// Conditions are emitted in a fixed order so argument positions are
/// stable: error presence, submission state, operation slug, content type,
/// start date, end date. The two tri-state conditions bind no arguments.
/// The end date is inclusive at day granularity, so the bound used is the
/// following day, exclusive. An end date of `NaiveDate::MAX` has no following
/// day and already covers every stored date, so it adds no condition.
pub fn build_query(filters: &EvidenceFilters) -> FilterQuery {
    let mut conditions: Vec<&str> = Vec::new();
    let mut args: Vec<Value> = Vec::new();

    match filters.has_error {
        // At least one character, so an empty string counts as no error.
        Tri::Yes => conditions.push("error LIKE '_%'"),
        Tri::No => conditions.push("error = ''"),
        Tri::Any => {}
    }
    match filters.submitted {
        Tri::Yes => conditions.push("upload_date IS NOT NULL"),
        Tri::No => conditions.push("upload_date IS NULL"),
        Tri::Any => {}
    }
    if let Some(slug) = filters.operation_slug.as_deref().filter(|s| !s.is_empty()) {
        conditions.push("operation_slug = ?");
        args.push(Value::Text(slug.to_string()));
    }
    if let Some(content_type) = filters.content_type.as_deref().filter(|s| !s.is_empty()) {
        conditions.push("content_type = ?");
        args.push(Value::Text(content_type.to_string()));
    }
    if let Some(start) = filters.start_date {
        conditions.push("recorded_date >= ?");
        args.push(Value::Text(start.format(DATE_FORMAT).to_string()));
    }
    if let Some(day_after) = filters
        .end_date
        .and_then(|end| end.checked_add_days(Days::new(1)))
    {
        conditions.push("recorded_date < ?");
        args.push(Value::Text(day_after.format(DATE_FORMAT).to_string()));
    }

    let mut sql = format!("SELECT {} FROM evidence", EVIDENCE_COLUMNS);
    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }
    sql.push_str(" ORDER BY recorded_date ASC, id ASC");

    FilterQuery { sql, args }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn text(value: &str) -> Value {
        Value::Text(value.to_string())
    }

    fn placeholder_count(sql: &str) -> usize {
        sql.matches('?').count()
    }

    #[test]
    fn test_no_filters_has_no_where() {
        let query = build_query(&EvidenceFilters::default());
        assert_eq!(
            query.sql,
            format!(
                "SELECT {} FROM evidence ORDER BY recorded_date ASC, id ASC",
                EVIDENCE_COLUMNS
            )
        );
        assert!(query.args.is_empty());
    }

    #[test]
    fn test_tri_state_conditions_bind_nothing() {
        let query = build_query(&EvidenceFilters {
            has_error: Tri::Yes,
            submitted: Tri::No,
            ..Default::default()
        });
        assert!(query
            .sql
            .contains(" WHERE error LIKE '_%' AND upload_date IS NULL ORDER BY"));
        assert!(query.args.is_empty());

        let query = build_query(&EvidenceFilters {
            has_error: Tri::No,
            submitted: Tri::Yes,
            ..Default::default()
        });
        assert!(query
            .sql
            .contains(" WHERE error = '' AND upload_date IS NOT NULL ORDER BY"));
    }

    #[test]
    fn test_all_conditions_in_fixed_order() {
        let query = build_query(&EvidenceFilters {
            has_error: Tri::No,
            submitted: Tri::Yes,
            operation_slug: Some("op".into()),
            content_type: Some("image".into()),
            start_date: NaiveDate::from_ymd_opt(2021, 1, 1),
            end_date: NaiveDate::from_ymd_opt(2021, 1, 31),
        });
        assert!(query.sql.ends_with(
            " WHERE error = '' AND upload_date IS NOT NULL AND operation_slug = ? \
             AND content_type = ? AND recorded_date >= ? AND recorded_date < ? \
             ORDER BY recorded_date ASC, id ASC"
        ));
        assert_eq!(
            query.args,
            vec![text("op"), text("image"), text("2021-01-01"), text("2021-02-01")]
        );
    }

    #[test]
    fn test_end_date_is_inclusive() {
        let query = build_query(&EvidenceFilters {
            end_date: NaiveDate::from_ymd_opt(2020, 2, 28),
            ..Default::default()
        });
        assert_eq!(query.args, vec![text("2020-02-29")]);
    }

    #[test]
    fn test_max_end_date_is_unbounded() {
        let query = build_query(&EvidenceFilters {
            end_date: Some(NaiveDate::MAX),
            ..Default::default()
        });
        assert!(!query.sql.contains("WHERE"));
        assert!(query.args.is_empty());
    }

    #[test]
    fn test_empty_strings_are_not_filters() {
        let query = build_query(&EvidenceFilters {
            operation_slug: Some(String::new()),
            content_type: Some(String::new()),
            ..Default::default()
        });
        assert!(!query.sql.contains("WHERE"));
        assert!(query.args.is_empty());
    }

    #[test]
    fn test_placeholders_match_args_for_every_combination() {
        let tris = [Tri::Any, Tri::Yes, Tri::No];
        let slugs = [None, Some(String::new()), Some("op".to_string())];
        let dates = [None, NaiveDate::from_ymd_opt(2021, 6, 1)];
        for has_error in tris {
            for submitted in tris {
                for slug in &slugs {
                    for content_type in &slugs {
                        for start_date in dates {
                            for end_date in dates {
                                let filters = EvidenceFilters {
                                    has_error,
                                    submitted,
                                    operation_slug: slug.clone(),
                                    content_type: content_type.clone(),
                                    start_date,
                                    end_date,
                                };
                                let query = build_query(&filters);
                                assert_eq!(placeholder_count(&query.sql), query.args.len());
                                assert!(!query.sql.contains("WHERE  "));
                                assert!(!query.sql.contains("WHERE ORDER"));
                                assert_eq!(query.sql.contains(" WHERE "), !filters.is_empty());
                            }
                        }
                    }
                }
            }
        }
    }
}
