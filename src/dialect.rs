//! SQL dialects for the relational drivers
//!
//! Each dialect knows how to quote identifiers and literals; the builders
//! below assemble the handful of statements the drivers issue for browsing.
//!
//! Filters are raw boolean expressions typed by the user into the filter
//! box and are appended verbatim after `WHERE`. They are not parameterized:
//! whoever can type a filter can run any predicate the connected account is
//! allowed to run.

use crate::models::enums::{DatabaseType, SortOrder};

/// Trait for database-specific SQL dialect
pub trait SqlDialect: Send + Sync {
    /// Quote an identifier (table/column name)
    fn quote_ident(&self, ident: &str) -> String;

    /// Quote a string literal
    fn quote_string(&self, s: &str) -> String {
        format!("'{}'", s.replace('\'', "''"))
    }

    /// Emit LIMIT clause
    fn emit_limit(&self, limit: i64, offset: i64) -> String {
        if offset > 0 {
            format!(" LIMIT {} OFFSET {}", limit, offset)
        } else {
            format!(" LIMIT {}", limit)
        }
    }

    /// `schema.table`, or just `table` when no schema applies
    fn qualified_table(&self, schema: &str, table: &str) -> String {
        if schema.is_empty() {
            self.quote_ident(table)
        } else {
            format!("{}.{}", self.quote_ident(schema), self.quote_ident(table))
        }
    }
}

/// MySQL dialect
pub struct MySqlDialect;

impl SqlDialect for MySqlDialect {
    fn quote_ident(&self, ident: &str) -> String {
        format!("`{}`", ident.replace('`', "``"))
    }

    fn quote_string(&self, s: &str) -> String {
        // backslash is an escape character in MySQL string literals
        format!("'{}'", s.replace('\\', "\\\\").replace('\'', "''"))
    }
}

/// PostgreSQL dialect
pub struct PostgresDialect;

impl SqlDialect for PostgresDialect {
    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }
}

/// SQLite dialect
pub struct SqliteDialect;

impl SqlDialect for SqliteDialect {
    fn quote_ident(&self, ident: &str) -> String {
        format!("`{}`", ident.replace('`', "``"))
    }
}

/// Dialect of a relational backend; `None` for MongoDB.
pub fn dialect_for(kind: DatabaseType) -> Option<&'static dyn SqlDialect> {
    match kind {
        DatabaseType::MySQL => Some(&MySqlDialect),
        DatabaseType::PostgreSQL => Some(&PostgresDialect),
        DatabaseType::SQLite => Some(&SqliteDialect),
        DatabaseType::MongoDB => None,
    }
}

/// Trim a user predicate and drop a leading `WHERE` keyword if one was typed.
pub fn normalize_predicate(filter: &str) -> &str {
    let trimmed = filter.trim();
    let keyword = trimmed.as_bytes().get(5).is_some_and(u8::is_ascii_whitespace)
        && trimmed[..5].eq_ignore_ascii_case("where");
    if keyword { trimmed[6..].trim_start() } else { trimmed }
}

fn where_clause(filter: &str) -> String {
    let predicate = normalize_predicate(filter);
    if predicate.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", predicate)
    }
}

/// `SELECT * FROM <table> [WHERE <filter>] [ORDER BY ...] [LIMIT ...]`
pub fn select_sql(
    dialect: &dyn SqlDialect,
    table_ref: &str,
    filter: &str,
    order_by: Option<(&str, SortOrder)>,
    limit: Option<i64>,
    offset: i64,
) -> String {
    let mut sql = format!("SELECT * FROM {}{}", table_ref, where_clause(filter));
    if let Some((column, order)) = order_by {
        sql.push_str(&format!(
            " ORDER BY {} {}",
            dialect.quote_ident(column),
            order.as_sql()
        ));
    }
    if let Some(limit) = limit {
        sql.push_str(&dialect.emit_limit(limit, offset.max(0)));
    }
    sql
}

/// `SELECT COUNT(*) FROM <table> [WHERE <filter>]`
pub fn count_sql(table_ref: &str, filter: &str) -> String {
    format!("SELECT COUNT(*) FROM {}{}", table_ref, where_clause(filter))
}

/// AND-combine raw predicates. With more than one term every term is
/// parenthesized so an `OR` inside one term cannot leak into the others.
pub fn combine_predicates(terms: &[String]) -> String {
    let terms: Vec<&str> = terms
        .iter()
        .map(|t| normalize_predicate(t))
        .filter(|t| !t.is_empty())
        .collect();
    match terms.as_slice() {
        [] => String::new(),
        [single] => single.to_string(),
        many => many
            .iter()
            .map(|t| format!("({})", t))
            .collect::<Vec<_>>()
            .join(" AND "),
    }
}

/// Equality predicate used for foreign-key navigation: `<column> = '<value>'`,
/// the value escaped as a string literal of the dialect.
pub fn equality_predicate(dialect: &dyn SqlDialect, column: &str, value: &str) -> String {
    format!("{} = {}", column, dialect.quote_string(value))
}

/// Statements that produce a result set rather than an affected-row count.
pub fn returns_rows(sql: &str) -> bool {
    let first = sql
        .trim_start()
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or("")
        .to_ascii_uppercase();
    matches!(
        first.as_str(),
        "SELECT" | "WITH" | "SHOW" | "PRAGMA" | "EXPLAIN" | "DESCRIBE" | "DESC" | "VALUES" | "TABLE"
    ) || sql.to_ascii_uppercase().contains(" RETURNING ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_quoted_per_dialect() {
        assert_eq!(MySqlDialect.quote_ident("order"), "`order`");
        assert_eq!(MySqlDialect.quote_ident("we`ird"), "`we``ird`");
        assert_eq!(PostgresDialect.quote_ident("user"), "\"user\"");
        assert_eq!(PostgresDialect.quote_ident("a\"b"), "\"a\"\"b\"");
        assert_eq!(SqliteDialect.quote_ident("group"), "`group`");
        assert_eq!(
            PostgresDialect.qualified_table("sales", "order"),
            "\"sales\".\"order\""
        );
        assert_eq!(MySqlDialect.qualified_table("", "select"), "`select`");
    }

    #[test]
    fn string_literals_are_escaped() {
        assert_eq!(PostgresDialect.quote_string("O'Brien"), "'O''Brien'");
        assert_eq!(MySqlDialect.quote_string(r"a\'b"), r"'a\\''b'");
    }

    #[test]
    fn select_builder_emits_clauses_in_order() {
        let table = PostgresDialect.qualified_table("public", "user");
        let sql = select_sql(
            &PostgresDialect,
            &table,
            "status = 'active'",
            Some(("id", SortOrder::Desc)),
            Some(100),
            200,
        );
        assert_eq!(
            sql,
            "SELECT * FROM \"public\".\"user\" WHERE status = 'active' ORDER BY \"id\" DESC LIMIT 100 OFFSET 200"
        );

        let sql = select_sql(&MySqlDialect, "`order`", "  ", None, Some(10), 0);
        assert_eq!(sql, "SELECT * FROM `order` LIMIT 10");

        let sql = select_sql(&SqliteDialect, "`t`", "WHERE a = 1", None, None, 0);
        assert_eq!(sql, "SELECT * FROM `t` WHERE a = 1");
    }

    #[test]
    fn leading_where_is_dropped_after_any_whitespace() {
        assert_eq!(normalize_predicate("where\n  a = 1"), "a = 1");
        assert_eq!(normalize_predicate(" WHERE\ta = 1"), "a = 1");
        assert_eq!(normalize_predicate("whereabouts = 'x'"), "whereabouts = 'x'");
        assert_eq!(
            count_sql("`t`", "Where\r\nx > 1"),
            "SELECT COUNT(*) FROM `t` WHERE x > 1"
        );
    }

    #[test]
    fn count_builder_reuses_filter() {
        assert_eq!(count_sql("`t`", ""), "SELECT COUNT(*) FROM `t`");
        assert_eq!(count_sql("`t`", "x > 1"), "SELECT COUNT(*) FROM `t` WHERE x > 1");
    }

    #[test]
    fn multiple_predicates_are_parenthesized() {
        assert_eq!(combine_predicates(&[]), "");
        assert_eq!(combine_predicates(&["a = 1".to_string()]), "a = 1");
        assert_eq!(
            combine_predicates(&["a = 1 OR b = 2".to_string(), " c = 3 ".to_string()]),
            "(a = 1 OR b = 2) AND (c = 3)"
        );
        assert_eq!(
            combine_predicates(&["".to_string(), "x = 1".to_string()]),
            "x = 1"
        );
    }

    #[test]
    fn equality_predicate_doubles_quotes() {
        assert_eq!(equality_predicate(&SqliteDialect, "id", "42"), "id = '42'");
        assert_eq!(
            equality_predicate(&PostgresDialect, "name", "O'Hara"),
            "name = 'O''Hara'"
        );
        assert!(dialect_for(DatabaseType::MongoDB).is_none());
    }

    #[test]
    fn row_returning_statements_are_detected() {
        assert!(returns_rows("  select 1"));
        assert!(returns_rows("WITH x AS (SELECT 1) SELECT * FROM x"));
        assert!(returns_rows("PRAGMA table_info('t')"));
        assert!(returns_rows("DELETE FROM t WHERE id = 1 RETURNING id"));
        assert!(!returns_rows("UPDATE t SET a = 1"));
        assert!(!returns_rows("INSERT INTO t VALUES (1)"));
    }
}
