use async_trait::async_trait;
use log::{debug, error, info};
use sqlx::mysql::{MySqlPoolOptions, MySqlRow};
use sqlx::{Column, Connection, MySqlConnection, MySqlPool, Row};

use crate::dialect::{self, MySqlDialect, SqlDialect};
use crate::driver::{self, Driver, DriverOptions, TableData, TableMap};
use crate::errors::DriverError;
use crate::helpers;
use crate::models::enums::DatabaseType;
use crate::models::structs::{
    IndexInfo, PaginatedResult, Pagination, RelationInfo, TableColumn, TriggerInfo,
};
use crate::structure::{self, IndexColumnRow};

const SYSTEM_SCHEMAS: [&str; 4] = ["information_schema", "performance_schema", "mysql", "sys"];

pub struct MySqlDriver {
    pool: Option<MySqlPool>,
    options: DriverOptions,
    /// Database named in the URL (or reported by `DATABASE()`)
    database: String,
}

impl MySqlDriver {
    pub fn new(options: DriverOptions) -> Self {
        Self {
            pool: None,
            options,
            database: String::new(),
        }
    }

    fn pool(&self) -> Result<&MySqlPool, DriverError> {
        self.pool.as_ref().ok_or(DriverError::NotConnected)
    }

    fn db<'a>(&'a self, database: &'a str) -> &'a str {
        if database.is_empty() { &self.database } else { database }
    }

    fn table_ref(&self, database: &str, table: &str) -> String {
        MySqlDialect.qualified_table(self.db(database), table)
    }
}

#[async_trait]
impl Driver for MySqlDriver {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::MySQL
    }

    async fn connect(&mut self, url: &str) -> Result<(), DriverError> {
        let client_url = helpers::normalize_mysql_url(url)?;
        let pool = MySqlPoolOptions::new()
            .max_connections(self.options.max_connections)
            .acquire_timeout(self.options.acquire_timeout)
            .test_before_acquire(true)
            .connect(&client_url)
            .await
            .map_err(|e| {
                error!("MySQL connect to {} failed: {}", helpers::redact_url(url), e);
                DriverError::Connection(e.to_string())
            })?;

        self.database = match helpers::database_from_url(url) {
            Some(db) => db,
            None => sqlx::query_scalar::<_, Option<String>>("SELECT DATABASE()")
                .fetch_one(&pool)
                .await
                .map_err(|e| DriverError::Connection(e.to_string()))?
                .unwrap_or_default(),
        };
        info!(
            "Connected to MySQL {} (database '{}')",
            helpers::redact_url(url),
            self.database
        );
        self.pool = Some(pool);
        Ok(())
    }

    async fn test_connection(&self, url: &str) -> Result<(), DriverError> {
        let client_url = helpers::normalize_mysql_url(url)?;
        let mut conn = MySqlConnection::connect(&client_url)
            .await
            .map_err(|e| DriverError::Connection(e.to_string()))?;
        conn.ping()
            .await
            .map_err(|e| DriverError::Connection(e.to_string()))?;
        let _ = conn.close().await;
        Ok(())
    }

    async fn get_tables(&self, database: &str) -> Result<TableMap, DriverError> {
        let pool = self.pool()?;
        let schemas: Vec<String> = match self.db(database) {
            "" => {
                let all: Vec<String> = sqlx::query_scalar(
                    "SELECT CAST(SCHEMA_NAME AS CHAR) FROM INFORMATION_SCHEMA.SCHEMATA ORDER BY SCHEMA_NAME",
                )
                .fetch_all(pool)
                .await?;
                all.into_iter()
                    .filter(|s| !SYSTEM_SCHEMAS.contains(&s.as_str()))
                    .collect()
            }
            db => vec![db.to_string()],
        };

        let mut map = TableMap::new();
        for schema in schemas {
            let tables: Vec<String> = sqlx::query_scalar(
                "SELECT CAST(TABLE_NAME AS CHAR) FROM INFORMATION_SCHEMA.TABLES WHERE TABLE_SCHEMA = ? AND TABLE_TYPE = 'BASE TABLE' ORDER BY TABLE_NAME",
            )
            .bind(&schema)
            .fetch_all(pool)
            .await?;
            map.insert(schema, tables);
        }
        Ok(map)
    }

    async fn get_table_columns(
        &self,
        database: &str,
        table: &str,
    ) -> Result<Vec<TableColumn>, DriverError> {
        let rows = sqlx::query(
            "SELECT COLUMN_NAME, COLUMN_TYPE, IS_NULLABLE, COLUMN_KEY, COLUMN_DEFAULT, EXTRA \
             FROM INFORMATION_SCHEMA.COLUMNS WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? ORDER BY ORDINAL_POSITION",
        )
        .bind(self.db(database))
        .bind(table)
        .fetch_all(self.pool()?)
        .await?;
        if rows.is_empty() {
            return Err(DriverError::Query(format!(
                "table '{}.{}' doesn't exist",
                self.db(database),
                table
            )));
        }
        Ok(rows
            .iter()
            .map(|row| TableColumn {
                name: text_at(row, 0).unwrap_or_default(),
                data_type: text_at(row, 1).unwrap_or_default(),
                nullable: text_at(row, 2).is_some_and(|v| v.eq_ignore_ascii_case("YES")),
                key: text_at(row, 3).unwrap_or_default(),
                default_value: text_at(row, 4),
                extra: text_at(row, 5).unwrap_or_default(),
            })
            .collect())
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
            &MySqlDialect,
            &self.table_ref(database, table),
            filter,
            driver::resolve_order(&window, &columns),
            Some(self.options.row_limit),
            0,
        );
        debug!("MySQL: {}", sql);
        let rows = sqlx::query(&sql).fetch_all(self.pool()?).await?;
        let mut data = vec![driver::header_row(driver::result_headers(&rows), &columns)];
        data.extend(convert_mysql_rows_to_table_data(&rows));
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
        let table_ref = self.table_ref(database, table);

        let count_sql = dialect::count_sql(&table_ref, filter);
        debug!("MySQL: {}", count_sql);
        let total: i64 = sqlx::query_scalar(&count_sql).fetch_one(pool).await?;

        let sql = dialect::select_sql(
            &MySqlDialect,
            &table_ref,
            filter,
            driver::resolve_order(pagination, &columns),
            Some(pagination.limit(self.options.row_limit)),
            pagination.offset(),
        );
        debug!("MySQL: {}", sql);
        let rows = sqlx::query(&sql).fetch_all(pool).await?;
        let mut data = vec![driver::header_row(driver::result_headers(&rows), &columns)];
        data.extend(convert_mysql_rows_to_table_data(&rows));
        Ok(PaginatedResult::new(data, total, pagination))
    }

    async fn get_index_info(
        &self,
        database: &str,
        table: &str,
    ) -> Result<Vec<IndexInfo>, DriverError> {
        let rows = sqlx::query(
            "SELECT INDEX_NAME, COLUMN_NAME, NON_UNIQUE, INDEX_TYPE FROM INFORMATION_SCHEMA.STATISTICS \
             WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? ORDER BY INDEX_NAME, SEQ_IN_INDEX",
        )
        .bind(self.db(database))
        .bind(table)
        .fetch_all(self.pool()?)
        .await?;
        let index_rows = rows
            .iter()
            .map(|row| {
                let index_name = text_at(row, 0).unwrap_or_default();
                IndexColumnRow {
                    primary: index_name == "PRIMARY",
                    index_name,
                    column_name: text_at(row, 1).unwrap_or_else(|| "<expr>".to_string()),
                    unique: int_at(row, 2) == Some(0),
                    method: text_at(row, 3),
                }
            })
            .collect();
        Ok(structure::group_index_rows(index_rows))
    }

    async fn get_relation_info(
        &self,
        database: &str,
        table: &str,
    ) -> Result<Vec<RelationInfo>, DriverError> {
        let rows = sqlx::query(
            "SELECT k.CONSTRAINT_NAME, k.COLUMN_NAME, k.REFERENCED_TABLE_NAME, k.REFERENCED_COLUMN_NAME, \
                    r.UPDATE_RULE, r.DELETE_RULE \
             FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE k \
             LEFT JOIN INFORMATION_SCHEMA.REFERENTIAL_CONSTRAINTS r \
               ON r.CONSTRAINT_SCHEMA = k.CONSTRAINT_SCHEMA AND r.CONSTRAINT_NAME = k.CONSTRAINT_NAME \
             WHERE k.TABLE_SCHEMA = ? AND k.TABLE_NAME = ? AND k.REFERENCED_TABLE_NAME IS NOT NULL \
             ORDER BY k.CONSTRAINT_NAME, k.ORDINAL_POSITION",
        )
        .bind(self.db(database))
        .bind(table)
        .fetch_all(self.pool()?)
        .await?;
        let relations = rows
            .iter()
            .map(|row| RelationInfo {
                constraint_name: text_at(row, 0).unwrap_or_default(),
                column: text_at(row, 1).unwrap_or_default(),
                referenced_table: text_at(row, 2).unwrap_or_default(),
                referenced_column: text_at(row, 3).unwrap_or_default(),
                on_update: structure::normalize_rule(text_at(row, 4)),
                on_delete: structure::normalize_rule(text_at(row, 5)),
            })
            .collect();
        Ok(structure::single_column_relations(relations))
    }

    async fn get_trigger_info(
        &self,
        database: &str,
        table: &str,
    ) -> Result<Vec<TriggerInfo>, DriverError> {
        let rows = sqlx::query(
            "SELECT TRIGGER_NAME, EVENT_MANIPULATION, ACTION_TIMING, ACTION_STATEMENT FROM INFORMATION_SCHEMA.TRIGGERS \
             WHERE EVENT_OBJECT_SCHEMA = ? AND EVENT_OBJECT_TABLE = ? ORDER BY TRIGGER_NAME",
        )
        .bind(self.db(database))
        .bind(table)
        .fetch_all(self.pool()?)
        .await?;
        Ok(rows
            .iter()
            .map(|row| TriggerInfo {
                name: text_at(row, 0).unwrap_or_default(),
                event: text_at(row, 1).unwrap_or_default(),
                timing: text_at(row, 2).unwrap_or_default(),
                statement: text_at(row, 3).unwrap_or_default(),
            })
            .collect())
    }

    async fn execute_query(&self, query: &str) -> Result<TableData, DriverError> {
        let pool = self.pool()?;
        debug!("MySQL raw: {}", query);
        if dialect::returns_rows(query) {
            let rows = sqlx::query(query).fetch_all(pool).await?;
            let mut data = vec![driver::result_headers(&rows).unwrap_or_default()];
            data.extend(convert_mysql_rows_to_table_data(&rows));
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

// information_schema columns come back as VARCHAR on some servers and
// VARBINARY/LONGBLOB on others
fn text_at(row: &MySqlRow, idx: usize) -> Option<String> {
    if let Ok(val) = row.try_get::<Option<String>, _>(idx) {
        return val;
    }
    match row.try_get::<Option<Vec<u8>>, _>(idx) {
        Ok(val) => val.map(|b| String::from_utf8_lossy(&b).into_owned()),
        Err(_) => None,
    }
}

fn int_at(row: &MySqlRow, idx: usize) -> Option<i64> {
    if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
        return Some(v);
    }
    if let Ok(Some(v)) = row.try_get::<Option<u64>, _>(idx) {
        return i64::try_from(v).ok();
    }
    if let Ok(Some(v)) = row.try_get::<Option<i32>, _>(idx) {
        return Some(v as i64);
    }
    text_at(row, idx).and_then(|s| s.trim().parse().ok())
}

// Index-first fallback when the type-specific decode failed
fn get_value_as_string_fallback_idx(row: &MySqlRow, idx: usize, column_name: &str, type_name: &str) -> String {
    if let Ok(Some(val)) = row.try_get::<Option<String>, _>(idx) {
        return val;
    }
    if let Ok(Some(val)) = row.try_get::<Option<Vec<u8>>, _>(idx) {
        return bytes_to_string_or_marker(val);
    }
    if let Ok(Some(val)) = row.try_get::<Option<i64>, _>(idx) { return val.to_string(); }
    if let Ok(Some(val)) = row.try_get::<Option<u64>, _>(idx) { return val.to_string(); }
    if let Ok(Some(val)) = row.try_get::<Option<f64>, _>(idx) { return val.to_string(); }
    if let Ok(Some(val)) = row.try_get::<Option<rust_decimal::Decimal>, _>(idx) { return val.to_string(); }
    if let Ok(Some(val)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) { return val.to_string(); }
    if let Ok(Some(val)) = row.try_get::<Option<chrono::NaiveDate>, _>(idx) { return val.to_string(); }
    if let Ok(Some(val)) = row.try_get::<Option<chrono::NaiveTime>, _>(idx) { return val.to_string(); }
    if let Ok(None) = row.try_get::<Option<String>, _>(idx) {
        return "NULL".to_string();
    }
    debug!("Column '{}' of type {} could not be rendered", column_name, type_name);
    format!("[CONVERSION_ERROR:{}]", type_name)
}

// Heuristic: treat bytes as text if they are mostly printable
fn looks_textual(bytes: &[u8]) -> bool {
    if bytes.is_empty() { return true; }
    let printable = bytes
        .iter()
        .filter(|&&b| (0x20..=0x7E).contains(&b) || b == b'\n' || b == b'\r' || b == b'\t')
        .count();
    (printable as f32) / (bytes.len() as f32) > 0.85
}

fn bytes_to_string_or_marker(bytes: Vec<u8>) -> String {
    // Trim trailing NULs often present in BINARY padding
    let mut b = bytes;
    while matches!(b.last(), Some(0)) { b.pop(); }
    if b.is_empty() { return String::new(); }

    if looks_textual(&b) {
        String::from_utf8_lossy(&b).into_owned()
    } else {
        format!("0x{}", hex::encode_upper(&b))
    }
}

// Convert MySQL rows to strings with per-type decoding
pub(crate) fn convert_mysql_rows_to_table_data(rows: &[MySqlRow]) -> Vec<Vec<String>> {
    use sqlx::TypeInfo;

    let mut table_data = Vec::with_capacity(rows.len());

    for row in rows {
        let mut row_data = Vec::new();

        for (idx, column) in row.columns().iter().enumerate() {
            let column_name = column.name();
            let t = column.type_info().name().to_ascii_uppercase();

            let value_str = match t.as_str() {
                "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "INTEGER" | "BIGINT" | "YEAR" => {
                    match row.try_get::<Option<i64>, _>(idx) {
                        Ok(Some(val)) => val.to_string(),
                        Ok(None) => "NULL".to_string(),
                        Err(_) => get_value_as_string_fallback_idx(row, idx, column_name, &t),
                    }
                }
                "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
                | "INTEGER UNSIGNED" | "BIGINT UNSIGNED" => match row.try_get::<Option<u64>, _>(idx) {
                    Ok(Some(val)) => val.to_string(),
                    Ok(None) => "NULL".to_string(),
                    Err(_) => get_value_as_string_fallback_idx(row, idx, column_name, &t),
                },
                "FLOAT" => match row.try_get::<Option<f32>, _>(idx) {
                    Ok(Some(val)) => val.to_string(),
                    Ok(None) => "NULL".to_string(),
                    Err(_) => get_value_as_string_fallback_idx(row, idx, column_name, &t),
                },
                "DOUBLE" | "REAL" => match row.try_get::<Option<f64>, _>(idx) {
                    Ok(Some(val)) => val.to_string(),
                    Ok(None) => "NULL".to_string(),
                    Err(_) => get_value_as_string_fallback_idx(row, idx, column_name, &t),
                },
                "DECIMAL" | "NUMERIC" | "NEWDECIMAL" => {
                    match row.try_get::<Option<rust_decimal::Decimal>, _>(idx) {
                        Ok(Some(val)) => val.to_string(),
                        Ok(None) => "NULL".to_string(),
                        Err(_) => get_value_as_string_fallback_idx(row, idx, column_name, &t),
                    }
                }
                "VARCHAR" | "CHAR" | "TEXT" | "TINYTEXT" | "MEDIUMTEXT" | "LONGTEXT" | "ENUM"
                | "SET" | "VAR_STRING" | "STRING" | "JSON" => match row.try_get::<Option<String>, _>(idx) {
                    Ok(Some(val)) => val,
                    Ok(None) => "NULL".to_string(),
                    Err(_) => get_value_as_string_fallback_idx(row, idx, column_name, &t),
                },
                "BINARY" | "VARBINARY" | "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
                    match row.try_get::<Option<Vec<u8>>, _>(idx) {
                        Ok(Some(val)) => bytes_to_string_or_marker(val),
                        Ok(None) => "NULL".to_string(),
                        Err(_) => get_value_as_string_fallback_idx(row, idx, column_name, &t),
                    }
                }
                "BIT" => match row.try_get::<Option<Vec<u8>>, _>(idx) {
                    Ok(Some(bytes)) => {
                        let bits: String = bytes.iter().map(|b| format!("{:08b}", b)).collect();
                        format!("0b{}", bits)
                    }
                    Ok(None) => "NULL".to_string(),
                    Err(_) => match row.try_get::<Option<u64>, _>(idx) {
                        Ok(Some(val)) => format!("0b{:b}", val),
                        _ => get_value_as_string_fallback_idx(row, idx, column_name, &t),
                    },
                },
                "DATE" => match row.try_get::<Option<chrono::NaiveDate>, _>(idx) {
                    Ok(Some(val)) => val.to_string(),
                    Ok(None) => "NULL".to_string(),
                    Err(_) => get_value_as_string_fallback_idx(row, idx, column_name, &t),
                },
                "TIME" => match row.try_get::<Option<chrono::NaiveTime>, _>(idx) {
                    Ok(Some(val)) => val.to_string(),
                    Ok(None) => "NULL".to_string(),
                    Err(_) => get_value_as_string_fallback_idx(row, idx, column_name, &t),
                },
                "DATETIME" => match row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
                    Ok(Some(val)) => val.to_string(),
                    Ok(None) => "NULL".to_string(),
                    Err(_) => get_value_as_string_fallback_idx(row, idx, column_name, &t),
                },
                "TIMESTAMP" => match row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx) {
                    Ok(Some(val)) => val.to_rfc3339(),
                    Ok(None) => "NULL".to_string(),
                    Err(_) => get_value_as_string_fallback_idx(row, idx, column_name, &t),
                },
                "BOOLEAN" | "BOOL" => match row.try_get::<Option<bool>, _>(idx) {
                    Ok(Some(val)) => val.to_string(),
                    Ok(None) => "NULL".to_string(),
                    Err(_) => get_value_as_string_fallback_idx(row, idx, column_name, &t),
                },
                _ => get_value_as_string_fallback_idx(row, idx, column_name, &t),
            };

            row_data.push(value_str);
        }
        table_data.push(row_data);
    }

    table_data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_values_render_as_text_or_hex() {
        assert_eq!(bytes_to_string_or_marker(b"hello\0\0".to_vec()), "hello");
        assert_eq!(bytes_to_string_or_marker(vec![0xde, 0xad, 0xbe, 0xef]), "0xDEADBEEF");
        assert_eq!(bytes_to_string_or_marker(vec![0, 0]), "");
    }

    #[test]
    fn empty_database_argument_uses_url_database() {
        let mut driver = MySqlDriver::new(DriverOptions::default());
        driver.database = "shop".to_string();
        assert_eq!(driver.db(""), "shop");
        assert_eq!(driver.db("other"), "other");
        assert_eq!(driver.table_ref("", "order"), "`shop`.`order`");
    }

    #[tokio::test]
    async fn calls_before_connect_are_rejected() {
        let driver = MySqlDriver::new(DriverOptions::default());
        assert!(matches!(driver.get_tables("").await, Err(DriverError::NotConnected)));
        assert!(matches!(
            driver.execute_query("SELECT 1").await,
            Err(DriverError::NotConnected)
        ));
    }
}
