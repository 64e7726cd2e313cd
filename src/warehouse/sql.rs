//! SQL builders
//!
//! Table identifiers are validated before being spliced into SQL and string
//! literals are quote-escaped. Field expressions from the org source config
//! are trusted as written in the job file.

use crate::config::{DateRange, OrgSourceConfig, OrgSourceLayout};
use crate::error::{Error, Result};
use crate::schema::{ColumnMode, TableSchema};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

/// Regex for `table`, `schema.table` or `catalog.schema.table`
static IDENTIFIER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*){0,2}$").unwrap()
});

/// Check that a table identifier is safe to splice into SQL
pub fn validate_identifier(identifier: &str) -> Result<()> {
    if IDENTIFIER_REGEX.is_match(identifier) {
        Ok(())
    } else {
        Err(Error::InvalidIdentifier {
            identifier: identifier.to_string(),
        })
    }
}

/// Check that a column name is a single unqualified identifier
pub fn validate_column(column: &str) -> Result<()> {
    if column.contains('.') {
        return Err(Error::InvalidIdentifier {
            identifier: column.to_string(),
        });
    }
    validate_identifier(column)
}

/// Quote a string literal
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Quote a list of string literals for an IN clause
fn quote_list(values: &[String]) -> String {
    values
        .iter()
        .map(|v| quote_literal(v))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Schema part of a qualified identifier (`a.b.c` → `a.b`)
pub fn schema_of(identifier: &str) -> Option<&str> {
    identifier.rsplit_once('.').map(|(schema, _)| schema)
}

/// Query returning `changed_at`, `user`, `org` ordered by change time ascending
pub fn org_changes_query(source: &OrgSourceConfig) -> Result<String> {
    validate_identifier(&source.table)?;

    let user = source.user_field();
    let org = source.org_field();
    let changed_at = source.changed_at_field();

    let mut conditions = vec![
        format!("{user} IS NOT NULL"),
        format!("{org} IS NOT NULL"),
    ];
    for pattern in &source.exclude_user_patterns {
        conditions.push(format!("{user} NOT LIKE {}", quote_literal(pattern)));
    }
    let where_clause = conditions.join("\n  AND ");

    let query = match source.layout {
        OrgSourceLayout::Changelog => format!(
            "SELECT\n  CAST(MIN({changed_at}) AS VARCHAR) AS changed_at,\n  LOWER({user}) AS \"user\",\n  {org} AS org\nFROM {table}\nWHERE {where_clause}\nGROUP BY 2, 3\nORDER BY MIN({changed_at}), 2, 3",
            table = source.table,
        ),
        OrgSourceLayout::Latest => format!(
            "SELECT\n  CAST({changed_at} AS VARCHAR) AS changed_at,\n  LOWER({user}) AS \"user\",\n  {org} AS org\nFROM {table}\nWHERE {where_clause}\nORDER BY {changed_at}, 2, 3",
            table = source.table,
        ),
    };

    Ok(query)
}

/// Filters applied to the events query
#[derive(Debug, Clone, Default)]
pub struct EventFilter<'a> {
    pub event_types: &'a [String],
    pub channels: &'a [String],
    pub exclude_email_patterns: &'a [String],
    pub date_range: Option<&'a DateRange>,
}

/// Query selecting every column of matching events
pub fn events_query(table: &str, filter: &EventFilter<'_>) -> Result<String> {
    validate_identifier(table)?;

    let mut conditions = Vec::new();

    if !filter.event_types.is_empty() {
        conditions.push(format!("event IN ({})", quote_list(filter.event_types)));
    }
    if !filter.channels.is_empty() {
        conditions.push(format!("channel IN ({})", quote_list(filter.channels)));
    }
    for pattern in filter.exclude_email_patterns {
        conditions.push(format!("email NOT LIKE {}", quote_literal(pattern)));
    }
    if let Some(range) = filter.date_range {
        validate_column(&range.column)?;
        conditions.push(format!(
            "\"{col}\" >= {start} AND \"{col}\" < {end}",
            col = range.column,
            start = quote_literal(&range.start.format("%Y-%m-%d").to_string()),
            end = quote_literal(&range.end.format("%Y-%m-%d").to_string()),
        ));
    }

    let mut query = format!("SELECT * FROM {table}");
    if !conditions.is_empty() {
        query = format!("{query}\nWHERE {}", conditions.join("\n  AND "));
    }
    Ok(query)
}

/// DDL creating the destination table if it is missing
pub fn create_table_sql(table: &str, schema: &TableSchema) -> Result<String> {
    validate_identifier(table)?;

    let columns = schema
        .columns()
        .iter()
        .map(|c| {
            let not_null = if c.mode == ColumnMode::Required {
                " NOT NULL"
            } else {
                ""
            };
            format!("\"{}\" {}{not_null}", c.name, c.column_type.sql_type())
        })
        .collect::<Vec<_>>()
        .join(", ");

    Ok(format!("CREATE TABLE IF NOT EXISTS {table} ({columns})"))
}

/// Append rows from a newline-delimited JSON file with explicit column types
pub fn load_sql(table: &str, file: &Path, schema: &TableSchema) -> Result<String> {
    validate_identifier(table)?;

    let names = schema
        .columns()
        .iter()
        .map(|c| format!("\"{}\"", c.name))
        .collect::<Vec<_>>()
        .join(", ");

    let types = schema
        .columns()
        .iter()
        .map(|c| format!("{}: {}", quote_literal(&c.name), quote_literal(c.column_type.sql_type())))
        .collect::<Vec<_>>()
        .join(", ");

    Ok(format!(
        "INSERT INTO {table} ({names}) SELECT {names} FROM read_json({path}, format = 'newline_delimited', columns = {{{types}}})",
        path = quote_literal(&file.to_string_lossy()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDescriptor, ScalarType};
    use chrono::NaiveDate;
    use std::path::PathBuf;
    use test_case::test_case;

    fn changelog_source() -> OrgSourceConfig {
        OrgSourceConfig {
            table: "firestore.user_changelog".to_string(),
            credential: PathBuf::from("/secrets/org.json"),
            layout: OrgSourceLayout::Changelog,
            user_field: None,
            org_field: None,
            changed_at_field: None,
            exclude_user_patterns: vec!["%fenix%".to_string()],
        }
    }

    #[test_case("events" ; "bare table")]
    #[test_case("analytics.events" ; "schema qualified")]
    #[test_case("warehouse.analytics.events_v2" ; "catalog qualified")]
    fn test_valid_identifiers(identifier: &str) {
        assert!(validate_identifier(identifier).is_ok());
    }

    #[test_case("" ; "empty")]
    #[test_case("1events" ; "leading digit")]
    #[test_case("a.b.c.d" ; "too many parts")]
    #[test_case("events; DROP TABLE x" ; "injection")]
    #[test_case("my-project.events" ; "dash")]
    fn test_invalid_identifiers(identifier: &str) {
        assert!(matches!(
            validate_identifier(identifier),
            Err(Error::InvalidIdentifier { .. })
        ));
    }

    #[test]
    fn test_quote_literal() {
        assert_eq!(quote_literal("plain"), "'plain'");
        assert_eq!(quote_literal("o'brien"), "'o''brien'");
    }

    #[test]
    fn test_schema_of() {
        assert_eq!(schema_of("events"), None);
        assert_eq!(schema_of("analytics.events"), Some("analytics"));
        assert_eq!(schema_of("db.analytics.events"), Some("db.analytics"));
    }

    #[test]
    fn test_org_changes_query_changelog() {
        let query = org_changes_query(&changelog_source()).unwrap();

        assert!(query.contains("CAST(MIN(\"timestamp\") AS VARCHAR) AS changed_at"));
        assert!(query.contains("LOWER(json_extract_string(data, '$.user_email')) AS \"user\""));
        assert!(query.contains("FROM firestore.user_changelog"));
        assert!(query.contains("json_extract_string(data, '$.user_email') NOT LIKE '%fenix%'"));
        assert!(query.contains("GROUP BY 2, 3"));
        assert!(query.contains("ORDER BY MIN(\"timestamp\"), 2, 3"));
    }

    #[test]
    fn test_org_changes_query_latest() {
        let mut source = changelog_source();
        source.layout = OrgSourceLayout::Latest;
        source.exclude_user_patterns.clear();

        let query = org_changes_query(&source).unwrap();
        assert!(!query.contains("GROUP BY"));
        assert!(query.contains("CAST(updated_at AS VARCHAR) AS changed_at"));
        assert!(query.contains("ORDER BY updated_at, 2, 3"));
    }

    #[test]
    fn test_events_query_filters() {
        let event_types = vec!["open".to_string(), "click".to_string()];
        let channels = vec!["celltelligence".to_string()];
        let excluded = vec!["%fenix%".to_string(), "%dbala%".to_string()];
        let range = DateRange {
            column: "timestamp".to_string(),
            start: NaiveDate::from_ymd_opt(2021, 1, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2021, 2, 1).unwrap(),
        };

        let query = events_query(
            "prod.events",
            &EventFilter {
                event_types: &event_types,
                channels: &channels,
                exclude_email_patterns: &excluded,
                date_range: Some(&range),
            },
        )
        .unwrap();

        assert_eq!(
            query,
            "SELECT * FROM prod.events\n\
             WHERE event IN ('open', 'click')\n  \
             AND channel IN ('celltelligence')\n  \
             AND email NOT LIKE '%fenix%'\n  \
             AND email NOT LIKE '%dbala%'\n  \
             AND \"timestamp\" >= '2021-01-01' AND \"timestamp\" < '2021-02-01'"
        );
    }

    #[test]
    fn test_events_query_without_filters() {
        let query = events_query("events", &EventFilter::default()).unwrap();
        assert_eq!(query, "SELECT * FROM events");
    }

    #[test]
    fn test_events_query_escapes_literals() {
        let channels = vec!["it's".to_string()];
        let query = events_query(
            "events",
            &EventFilter {
                channels: &channels,
                ..EventFilter::default()
            },
        )
        .unwrap();
        assert!(query.contains("channel IN ('it''s')"));
    }

    #[test]
    fn test_create_table_sql() {
        let schema = TableSchema::new(vec![
            ColumnDescriptor::new("email", ScalarType::String, ColumnMode::Required),
            ColumnDescriptor::nullable("post_id", ScalarType::Integer),
        ]);
        let sql = create_table_sql("analytics.enriched", &schema).unwrap();
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS analytics.enriched (\"email\" VARCHAR NOT NULL, \"post_id\" BIGINT)"
        );
    }

    #[test]
    fn test_load_sql() {
        let schema = TableSchema::new(vec![
            ColumnDescriptor::nullable("email", ScalarType::String),
            ColumnDescriptor::nullable("post_date", ScalarType::Timestamp),
        ]);
        let sql = load_sql("enriched", Path::new("/tmp/events.json"), &schema).unwrap();
        assert_eq!(
            sql,
            "INSERT INTO enriched (\"email\", \"post_date\") SELECT \"email\", \"post_date\" FROM read_json('/tmp/events.json', format = 'newline_delimited', columns = {'email': 'VARCHAR', 'post_date': 'TIMESTAMP'})"
        );
    }
}
