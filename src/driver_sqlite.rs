use async_trait::async_trait;
use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Connection, Row, SqliteConnection, SqlitePool};

use crate::dialect::{self, SqlDialect, SqliteDialect};
use crate::driver::{self, Driver, DriverOptions, TableData, TableMap};
use crate::errors::DriverError;
use crate::helpers;
use crate::models::enums::DatabaseType;
use crate::models::structs::{
    IndexInfo, PaginatedResult, Pagination, RelationInfo, TableColumn, TriggerInfo,
};
use crate::structure::{self, IndexColumnRow};

/// Schema key SQLite tables are listed under
pub const MAIN_SCHEMA: &str = "main";

static TRIGGER_HEAD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)\bTRIGGER\b.*?\b(?:(BEFORE|AFTER|INSTEAD\s+OF)\s+)?(INSERT|UPDATE|DELETE)\b")
        .expect("static regex")
});

pub struct SqliteDriver {
    pool: Option<SqlitePool>,
    options: DriverOptions,
}

impl SqliteDriver {
    pub fn new(options: DriverOptions) -> Self {
        Self { pool: None, options }
    }

    fn pool(&self) -> Result<&SqlitePool, DriverError> {
        self.pool.as_ref().ok_or(DriverError::NotConnected)
    }

    fn connect_options(url: &str) -> Result<SqliteConnectOptions, DriverError> {
        let path = helpers::sqlite_path(url);
        if path.trim().is_empty() {
            return Err(DriverError::InvalidUrl(url.to_string()));
        }
        // foreign_keys(true) issues `PRAGMA foreign_keys = ON` on every pooled connection
        Ok(SqliteConnectOptions::new()
            .filename(&path)
            .foreign_keys(true)
            .create_if_missing(false))
    }

    async fn primary_key_of(&self, table: &str) -> Result<Option<String>, DriverError> {
        let pk: Option<String> =
            sqlx::query_scalar("SELECT name FROM pragma_table_info(?1) WHERE pk > 0 ORDER BY pk LIMIT 1")
                .bind(table)
                .fetch_optional(self.pool()?)
                .await?;
        Ok(pk)
    }
}

#[async_trait]
impl Driver for SqliteDriver {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::SQLite
    }

    async fn connect(&mut self, url: &str) -> Result<(), DriverError> {
        let options = Self::connect_options(url)?;
        let pool = SqlitePoolOptions::new()
            .max_connections(self.options.max_connections)
            .acquire_timeout(self.options.acquire_timeout)
            .connect_with(options)
            .await
            .map_err(|e| DriverError::Connection(e.to_string()))?;
        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(|e| DriverError::Connection(e.to_string()))?;
        info!("Opened SQLite database {}", helpers::sqlite_path(url));
        self.pool = Some(pool);
        Ok(())
    }

    async fn test_connection(&self, url: &str) -> Result<(), DriverError> {
        let options = Self::connect_options(url)?;
        let mut conn = SqliteConnection::connect_with(&options)
            .await
            .map_err(|e| DriverError::Connection(e.to_string()))?;
        conn.ping()
            .await
            .map_err(|e| DriverError::Connection(e.to_string()))?;
        let _ = conn.close().await;
        Ok(())
    }

    async fn get_tables(&self, _database: &str) -> Result<TableMap, DriverError> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(self.pool()?)
        .await?;
        let mut map = TableMap::new();
        map.insert(MAIN_SCHEMA.to_string(), names);
        Ok(map)
    }

    async fn get_table_columns(
        &self,
        _database: &str,
        table: &str,
    ) -> Result<Vec<TableColumn>, DriverError> {
        let pool = self.pool()?;
        let rows = sqlx::query("SELECT * FROM pragma_table_info(?1) ORDER BY cid")
            .bind(table)
            .fetch_all(pool)
            .await?;
        if rows.is_empty() {
            return Err(DriverError::Query(format!("no such table: {}", table)));
        }
        let fk_columns: Vec<String> = structure::degrade(
            "foreign-key markers",
            table,
            sqlx::query_scalar(r#"SELECT "from" FROM pragma_foreign_key_list(?1)"#)
                .bind(table)
                .fetch_all(pool)
                .await
                .map_err(DriverError::from),
        );

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get("name")?;
            let data_type: String = row.try_get::<Option<String>, _>("type")?.unwrap_or_default();
            let not_null: i64 = row.try_get("notnull")?;
            let pk: i64 = row.try_get("pk")?;
            let default_value: Option<String> = row.try_get("dflt_value").ok().flatten();
            let key = if pk > 0 {
                "PRI"
            } else if fk_columns.contains(&name) {
                "MUL"
            } else {
                ""
            };
            let extra = if pk > 0 && data_type.eq_ignore_ascii_case("INTEGER") {
                "rowid"
            } else {
                ""
            };
            columns.push(TableColumn {
                name,
                data_type,
                nullable: not_null == 0 && pk == 0,
                key: key.to_string(),
                default_value,
                extra: extra.to_string(),
            });
        }
        Ok(columns)
    }

    async fn get_table_data_with_filter(
        &self,
        database: &str,
        table: &str,
        filter: &str,
    ) -> Result<TableData, DriverError> {
        let columns = self.get_table_columns(database, table).await?;
        let window = Pagination::new(1, self.options.row_limit);
        let sql = dialect::select_sql(
            &SqliteDialect,
            &SqliteDialect.quote_ident(table),
            filter,
            driver::resolve_order(&window, &columns),
            Some(self.options.row_limit),
            0,
        );
        debug!("SQLite: {}", sql);
        let rows = sqlx::query(&sql).fetch_all(self.pool()?).await?;
        let mut data = vec![driver::header_row(driver::result_headers(&rows), &columns)];
        data.extend(convert_sqlite_rows_to_table_data(&rows));
        Ok(data)
    }

    async fn get_table_data_with_filter_paginated(
        &self,
        database: &str,
        table: &str,
        filter: &str,
        pagination: &Pagination,
    ) -> Result<PaginatedResult, DriverError> {
        let pool = self.pool()?;
        let columns = self.get_table_columns(database, table).await?;
        let table_ref = SqliteDialect.quote_ident(table);

        let count_sql = dialect::count_sql(&table_ref, filter);
        debug!("SQLite: {}", count_sql);
        let total: i64 = sqlx::query_scalar(&count_sql).fetch_one(pool).await?;

        let sql = dialect::select_sql(
            &SqliteDialect,
            &table_ref,
            filter,
            driver::resolve_order(pagination, &columns),
            Some(pagination.limit(self.options.row_limit)),
            pagination.offset(),
        );
        debug!("SQLite: {}", sql);
        let rows = sqlx::query(&sql).fetch_all(pool).await?;
        let mut data = vec![driver::header_row(driver::result_headers(&rows), &columns)];
        data.extend(convert_sqlite_rows_to_table_data(&rows));
        debug!("SQLite: page {} of '{}' has {} rows (total {})", pagination.page, table, rows.len(), total);
        Ok(PaginatedResult::new(data, total, pagination))
    }

    async fn get_index_info(
        &self,
        _database: &str,
        table: &str,
    ) -> Result<Vec<IndexInfo>, DriverError> {
        let pool = self.pool()?;
        let indexes = sqlx::query(r#"SELECT name, "unique", origin FROM pragma_index_list(?1) ORDER BY seq"#)
            .bind(table)
            .fetch_all(pool)
            .await?;
        let mut rows = Vec::new();
        for index in indexes {
            let name: String = index.try_get("name")?;
            let unique: i64 = index.try_get("unique")?;
            let origin: String = index.try_get("origin")?;
            let cols: Vec<Option<String>> =
                sqlx::query_scalar("SELECT name FROM pragma_index_info(?1) ORDER BY seqno")
                    .bind(&name)
                    .fetch_all(pool)
                    .await?;
            // expression indexes report a NULL column name
            for column_name in cols.into_iter().map(|c| c.unwrap_or_else(|| "<expr>".to_string())) {
                rows.push(IndexColumnRow {
                    index_name: name.clone(),
                    column_name,
                    unique: unique != 0,
                    primary: origin == "pk",
                    method: Some("btree".to_string()),
                });
            }
        }
        Ok(structure::group_index_rows(rows))
    }

    async fn get_relation_info(
        &self,
        _database: &str,
        table: &str,
    ) -> Result<Vec<RelationInfo>, DriverError> {
        let rows = sqlx::query("SELECT * FROM pragma_foreign_key_list(?1) ORDER BY id, seq")
            .bind(table)
            .fetch_all(self.pool()?)
            .await?;
        let mut relations = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.try_get("id")?;
            let referenced_table: String = row.try_get("table")?;
            let column: String = row.try_get("from")?;
            // `to` is NULL when the FK points at the parent's primary key implicitly
            let referenced_column = match row.try_get::<Option<String>, _>("to")? {
                Some(to) => to,
                None => self
                    .primary_key_of(&referenced_table)
                    .await?
                    .unwrap_or_else(|| "rowid".to_string()),
            };
            relations.push(RelationInfo {
                constraint_name: format!("fk_{}_{}", table, id),
                column,
                referenced_table,
                referenced_column,
                on_update: structure::normalize_rule(row.try_get("on_update").ok()),
                on_delete: structure::normalize_rule(row.try_get("on_delete").ok()),
            });
        }
        Ok(structure::single_column_relations(relations))
    }

    async fn get_trigger_info(
        &self,
        _database: &str,
        table: &str,
    ) -> Result<Vec<TriggerInfo>, DriverError> {
        let rows: Vec<(String, Option<String>)> = sqlx::query_as(
            "SELECT name, sql FROM sqlite_master WHERE type = 'trigger' AND tbl_name = ?1 ORDER BY name",
        )
        .bind(table)
        .fetch_all(self.pool()?)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(name, sql)| {
                let sql = sql.unwrap_or_default();
                let (timing, event) = parse_trigger_head(&sql);
                TriggerInfo {
                    name,
                    event,
                    timing,
                    statement: sql,
                }
            })
            .collect())
    }

    async fn execute_query(&self, query: &str) -> Result<TableData, DriverError> {
        let pool = self.pool()?;
        debug!("SQLite raw: {}", query);
        if dialect::returns_rows(query) {
            let rows = sqlx::query(query).fetch_all(pool).await?;
            let mut data = vec![driver::result_headers(&rows).unwrap_or_default()];
            data.extend(convert_sqlite_rows_to_table_data(&rows));
            Ok(data)
        } else {
            let result = sqlx::query(query).execute(pool).await?;
            Ok(vec![
                vec!["rows_affected".to_string()],
                vec![result.rows_affected().to_string()],
            ])
        }
    }

    async fn close(&self) {
        if let Some(pool) = &self.pool {
            pool.close().await;
        }
    }
}

/// (timing, event) from a `CREATE TRIGGER` statement; SQLite defaults to BEFORE.
fn parse_trigger_head(sql: &str) -> (String, String) {
    match TRIGGER_HEAD.captures(sql) {
        Some(caps) => {
            let timing = caps
                .get(1)
                .map(|m| m.as_str().split_whitespace().collect::<Vec<_>>().join(" ").to_ascii_uppercase())
                .unwrap_or_else(|| "BEFORE".to_string());
            (timing, caps[2].to_ascii_uppercase())
        }
        None => (String::new(), String::new()),
    }
}

// Render SQLite rows as strings, dispatching on the column's declared type
pub(crate) fn convert_sqlite_rows_to_table_data(rows: &[sqlx::sqlite::SqliteRow]) -> Vec<Vec<String>> {
    use sqlx::{Column, TypeInfo};

    let mut table_data = Vec::with_capacity(rows.len());

    for row in rows {
        let mut row_data = Vec::new();

        for (col_idx, column) in row.columns().iter().enumerate() {
            let column_name = column.name();
            let type_name = column.type_info().name();

            let value_str = match type_name {
                "INTEGER" => match row.try_get::<Option<i64>, _>(col_idx) {
                    Ok(Some(val)) => val.to_string(),
                    Ok(None) => "NULL".to_string(),
                    Err(_) => text_or_marker(row, col_idx, column_name, type_name),
                },
                "REAL" => match row.try_get::<Option<f64>, _>(col_idx) {
                    Ok(Some(val)) => val.to_string(),
                    Ok(None) => "NULL".to_string(),
                    Err(_) => text_or_marker(row, col_idx, column_name, type_name),
                },
                "TEXT" => text_or_marker(row, col_idx, column_name, type_name),
                "BLOB" => match row.try_get::<Option<Vec<u8>>, _>(col_idx) {
                    Ok(Some(val)) => format!("<BLOB {} bytes>", val.len()),
                    Ok(None) => "NULL".to_string(),
                    Err(_) => text_or_marker(row, col_idx, column_name, type_name),
                },
                "NUMERIC" => {
                    if let Ok(Some(val)) = row.try_get::<Option<i64>, _>(col_idx) {
                        val.to_string()
                    } else if let Ok(Some(val)) = row.try_get::<Option<f64>, _>(col_idx) {
                        val.to_string()
                    } else {
                        text_or_marker(row, col_idx, column_name, type_name)
                    }
                }
                // Boolean type (stored as INTEGER 0/1)
                "BOOLEAN" => match row.try_get::<Option<i64>, _>(col_idx) {
                    Ok(Some(0)) => "false".to_string(),
                    Ok(Some(1)) => "true".to_string(),
                    Ok(Some(val)) => val.to_string(),
                    Ok(None) => "NULL".to_string(),
                    Err(_) => text_or_marker(row, col_idx, column_name, type_name),
                },
                // SQLite has no native date type; values are TEXT, REAL or INTEGER
                "DATE" | "DATETIME" | "TIMESTAMP" | "TIME" => {
                    match row.try_get::<Option<String>, _>(col_idx) {
                        Ok(Some(val)) => val,
                        Ok(None) => "NULL".to_string(),
                        Err(_) => match row.try_get::<Option<i64>, _>(col_idx) {
                            Ok(Some(val)) => val.to_string(),
                            _ => format!("Error reading DATE/TIME from column {}", column_name),
                        },
                    }
                }
                _ => {
                    if let Ok(Some(val)) = row.try_get::<Option<String>, _>(col_idx) {
                        val
                    } else if let Ok(None) = row.try_get::<Option<String>, _>(col_idx) {
                        "NULL".to_string()
                    } else if let Ok(Some(val)) = row.try_get::<Option<i64>, _>(col_idx) {
                        val.to_string()
                    } else if let Ok(Some(val)) = row.try_get::<Option<f64>, _>(col_idx) {
                        val.to_string()
                    } else if let Ok(Some(val)) = row.try_get::<Option<Vec<u8>>, _>(col_idx) {
                        format!("<BLOB {} bytes>", val.len())
                    } else {
                        format!("Unsupported type '{}' in column {}", type_name, column_name)
                    }
                }
            };

            row_data.push(value_str);
        }
        table_data.push(row_data);
    }

    table_data
}

fn text_or_marker(row: &sqlx::sqlite::SqliteRow, idx: usize, column_name: &str, type_name: &str) -> String {
    match row.try_get::<Option<String>, _>(idx) {
        Ok(Some(val)) => val,
        Ok(None) => "NULL".to_string(),
        Err(_) => match row.try_get::<Option<i64>, _>(idx) {
            Ok(Some(val)) => val.to_string(),
            _ => match row.try_get::<Option<f64>, _>(idx) {
                Ok(Some(val)) => val.to_string(),
                _ => format!("Error reading {} from column {}", type_name, column_name),
            },
        },
    }
}
