use std::sync::Mutex;

use async_trait::async_trait;
use log::{debug, error, info};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Column, Connection, PgConnection, PgPool, Row};

use crate::dialect::{self, PostgresDialect, SqlDialect};
use crate::driver::{self, Driver, DriverOptions, TableData, TableMap};
use crate::errors::DriverError;
use crate::helpers;
use crate::models::enums::DatabaseType;
use crate::models::structs::{
    IndexInfo, PaginatedResult, Pagination, RelationInfo, TableColumn, TriggerInfo,
};
use crate::structure::{self, IndexColumnRow};

const DEFAULT_SCHEMA: &str = "public";

pub struct PostgresDriver {
    pool: Option<PgPool>,
    options: DriverOptions,
    /// Resolved schema every data and structure call targets
    schema: Mutex<String>,
}

fn is_system_schema(name: &str) -> bool {
    name == "information_schema" || name.starts_with("pg_")
}

/// `public` when it exists, else the alphabetically first user schema,
/// else `public` anyway.
pub fn resolve_schema(schemas: &[String]) -> String {
    let mut user: Vec<&String> = schemas.iter().filter(|s| !is_system_schema(s)).collect();
    if user.iter().any(|s| s.as_str() == DEFAULT_SCHEMA) {
        return DEFAULT_SCHEMA.to_string();
    }
    user.sort();
    user.first()
        .map(|s| s.to_string())
        .unwrap_or_else(|| DEFAULT_SCHEMA.to_string())
}

impl PostgresDriver {
    pub fn new(options: DriverOptions) -> Self {
        Self {
            pool: None,
            options,
            schema: Mutex::new(DEFAULT_SCHEMA.to_string()),
        }
    }

    fn pool(&self) -> Result<&PgPool, DriverError> {
        self.pool.as_ref().ok_or(DriverError::NotConnected)
    }

    fn active_schema(&self) -> String {
        match self.schema.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set_active_schema(&self, schema: String) {
        match self.schema.lock() {
            Ok(mut guard) => *guard = schema,
            Err(poisoned) => *poisoned.into_inner() = schema,
        }
    }

    /// Table in the active schema. The `database` argument of the data and
    /// structure calls is the URL's database and never picks a schema.
    fn table_ref(&self, table: &str) -> String {
        PostgresDialect.qualified_table(&self.active_schema(), table)
    }

    async fn schema_names(pool: &PgPool) -> Result<Vec<String>, DriverError> {
        Ok(
            sqlx::query_scalar("SELECT nspname::text FROM pg_namespace ORDER BY nspname")
                .fetch_all(pool)
                .await?,
        )
    }
}

#[async_trait]
impl Driver for PostgresDriver {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::PostgreSQL
    }

    async fn connect(&mut self, url: &str) -> Result<(), DriverError> {
        let pool = PgPoolOptions::new()
            .max_connections(self.options.max_connections)
            .acquire_timeout(self.options.acquire_timeout)
            .test_before_acquire(true)
            .connect(url)
            .await
            .map_err(|e| {
                error!("PostgreSQL connect to {} failed: {}", helpers::redact_url(url), e);
                DriverError::Connection(e.to_string())
            })?;

        let schemas = Self::schema_names(&pool)
            .await
            .map_err(|e| DriverError::Connection(e.to_string()))?;
        let schema = resolve_schema(&schemas);
        info!(
            "Connected to PostgreSQL {} (schema '{}')",
            helpers::redact_url(url),
            schema
        );
        self.set_active_schema(schema);
        self.pool = Some(pool);
        Ok(())
    }

    async fn test_connection(&self, url: &str) -> Result<(), DriverError> {
        let mut conn = PgConnection::connect(url)
            .await
            .map_err(|e| DriverError::Connection(e.to_string()))?;
        conn.ping()
            .await
            .map_err(|e| DriverError::Connection(e.to_string()))?;
        let _ = conn.close().await;
        Ok(())
    }

    async fn get_tables(&self, _database: &str) -> Result<TableMap, DriverError> {
        let pool = self.pool()?;
        let schemas = Self::schema_names(pool).await?;
        self.set_active_schema(resolve_schema(&schemas));

        let mut map = TableMap::new();
        for schema in schemas.into_iter().filter(|s| !is_system_schema(s)) {
            let tables: Vec<String> = sqlx::query_scalar(
                "SELECT table_name::text FROM information_schema.tables \
                 WHERE table_schema = $1 AND table_type = 'BASE TABLE' ORDER BY table_name",
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
        _database: &str,
        table: &str,
    ) -> Result<Vec<TableColumn>, DriverError> {
        let schema = self.active_schema();
        let rows = sqlx::query(
            "SELECT c.column_name::text, c.data_type::text, c.is_nullable::text, c.column_default::text, \
                COALESCE((SELECT CASE \
                        WHEN bool_or(tc.constraint_type = 'PRIMARY KEY') THEN 'PRI' \
                        WHEN bool_or(tc.constraint_type = 'UNIQUE') THEN 'UNI' \
                        WHEN bool_or(tc.constraint_type = 'FOREIGN KEY') THEN 'MUL' \
                        ELSE '' END \
                    FROM information_schema.key_column_usage k \
                    JOIN information_schema.table_constraints tc \
                      ON tc.constraint_name = k.constraint_name AND tc.constraint_schema = k.constraint_schema \
                    WHERE k.table_schema = c.table_schema AND k.table_name = c.table_name \
                      AND k.column_name = c.column_name), '') AS column_key, \
                c.is_identity::text \
             FROM information_schema.columns c \
             WHERE c.table_schema = $1 AND c.table_name = $2 ORDER BY c.ordinal_position",
        )
        .bind(&schema)
        .bind(table)
        .fetch_all(self.pool()?)
        .await?;
        if rows.is_empty() {
            return Err(DriverError::Query(format!(
                "relation \"{}.{}\" does not exist",
                schema, table
            )));
        }

        let mut columns = Vec::with_capacity(rows.len());
        for row in &rows {
            let default_value: Option<String> = row.try_get(3)?;
            let identity: Option<String> = row.try_get(5)?;
            let serial = default_value
                .as_deref()
                .is_some_and(|d| d.starts_with("nextval("));
            columns.push(TableColumn {
                name: row.try_get(0)?,
                data_type: row.try_get::<Option<String>, _>(1)?.unwrap_or_default(),
                nullable: row
                    .try_get::<Option<String>, _>(2)?
                    .is_some_and(|v| v.eq_ignore_ascii_case("YES")),
                key: row.try_get::<Option<String>, _>(4)?.unwrap_or_default(),
                default_value,
                extra: if serial || identity.as_deref() == Some("YES") {
                    "auto_increment".to_string()
                } else {
                    String::new()
                },
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
            &PostgresDialect,
            &self.table_ref(table),
            filter,
            driver::resolve_order(&window, &columns),
            Some(self.options.row_limit),
            0,
        );
        debug!("PostgreSQL: {}", sql);
        let rows = sqlx::query(&sql).fetch_all(self.pool()?).await?;
        let mut data = vec![driver::header_row(driver::result_headers(&rows), &columns)];
        data.extend(convert_postgres_rows_to_table_data(&rows));
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
        let table_ref = self.table_ref(table);

        let count_sql = dialect::count_sql(&table_ref, filter);
        debug!("PostgreSQL: {}", count_sql);
        let total: i64 = sqlx::query_scalar(&count_sql).fetch_one(pool).await?;

        let sql = dialect::select_sql(
            &PostgresDialect,
            &table_ref,
            filter,
            driver::resolve_order(pagination, &columns),
            Some(pagination.limit(self.options.row_limit)),
            pagination.offset(),
        );
        debug!("PostgreSQL: {}", sql);
        let rows = sqlx::query(&sql).fetch_all(pool).await?;
        let mut data = vec![driver::header_row(driver::result_headers(&rows), &columns)];
        data.extend(convert_postgres_rows_to_table_data(&rows));
        Ok(PaginatedResult::new(data, total, pagination))
    }

    async fn get_index_info(
        &self,
        _database: &str,
        table: &str,
    ) -> Result<Vec<IndexInfo>, DriverError> {
        let rows = sqlx::query(
            "SELECT i.relname::text, a.attname::text, ix.indisunique, ix.indisprimary, am.amname::text \
             FROM pg_index ix \
             JOIN pg_class t ON t.oid = ix.indrelid \
             JOIN pg_class i ON i.oid = ix.indexrelid \
             JOIN pg_namespace n ON n.oid = t.relnamespace \
             JOIN pg_am am ON am.oid = i.relam \
             JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(ix.indkey) \
             WHERE n.nspname = $1 AND t.relname = $2 \
             ORDER BY i.relname, array_position(ix.indkey::int2[], a.attnum)",
        )
        .bind(self.active_schema())
        .bind(table)
        .fetch_all(self.pool()?)
        .await?;

        let mut index_rows = Vec::with_capacity(rows.len());
        for row in &rows {
            index_rows.push(IndexColumnRow {
                index_name: row.try_get(0)?,
                column_name: row.try_get(1)?,
                unique: row.try_get(2)?,
                primary: row.try_get(3)?,
                method: row.try_get(4)?,
            });
        }
        Ok(structure::group_index_rows(index_rows))
    }

    async fn get_relation_info(
        &self,
        _database: &str,
        table: &str,
    ) -> Result<Vec<RelationInfo>, DriverError> {
        let rows = sqlx::query(
            "SELECT tc.constraint_name::text, kcu.column_name::text, ccu.table_name::text, \
                    ccu.column_name::text, rc.update_rule::text, rc.delete_rule::text \
             FROM information_schema.table_constraints tc \
             JOIN information_schema.key_column_usage kcu \
               ON kcu.constraint_name = tc.constraint_name AND kcu.constraint_schema = tc.constraint_schema \
             JOIN information_schema.constraint_column_usage ccu \
               ON ccu.constraint_name = tc.constraint_name AND ccu.constraint_schema = tc.constraint_schema \
             LEFT JOIN information_schema.referential_constraints rc \
               ON rc.constraint_name = tc.constraint_name AND rc.constraint_schema = tc.constraint_schema \
             WHERE tc.constraint_type = 'FOREIGN KEY' AND tc.table_schema = $1 AND tc.table_name = $2 \
             ORDER BY tc.constraint_name, kcu.ordinal_position",
        )
        .bind(self.active_schema())
        .bind(table)
        .fetch_all(self.pool()?)
        .await?;

        let mut relations = Vec::with_capacity(rows.len());
        for row in &rows {
            relations.push(RelationInfo {
                constraint_name: row.try_get(0)?,
                column: row.try_get(1)?,
                referenced_table: row.try_get(2)?,
                referenced_column: row.try_get(3)?,
                on_update: structure::normalize_rule(row.try_get(4)?),
                on_delete: structure::normalize_rule(row.try_get(5)?),
            });
        }
        Ok(structure::single_column_relations(relations))
    }

    async fn get_trigger_info(
        &self,
        _database: &str,
        table: &str,
    ) -> Result<Vec<TriggerInfo>, DriverError> {
        let rows = sqlx::query(
            "SELECT trigger_name::text, event_manipulation::text, action_timing::text, action_statement::text \
             FROM information_schema.triggers \
             WHERE event_object_schema = $1 AND event_object_table = $2 \
             ORDER BY trigger_name, event_manipulation",
        )
        .bind(self.active_schema())
        .bind(table)
        .fetch_all(self.pool()?)
        .await?;

        let mut triggers = Vec::with_capacity(rows.len());
        for row in &rows {
            triggers.push(TriggerInfo {
                name: row.try_get(0)?,
                event: row.try_get::<Option<String>, _>(1)?.unwrap_or_default(),
                timing: row.try_get::<Option<String>, _>(2)?.unwrap_or_default(),
                statement: row.try_get::<Option<String>, _>(3)?.unwrap_or_default(),
            });
        }
        Ok(triggers)
    }

    async fn execute_query(&self, query: &str) -> Result<TableData, DriverError> {
        let pool = self.pool()?;
        debug!("PostgreSQL raw: {}", query);
        if dialect::returns_rows(query) {
            let rows = sqlx::query(query).fetch_all(pool).await?;
            let mut data = vec![driver::result_headers(&rows).unwrap_or_default()];
            data.extend(convert_postgres_rows_to_table_data(&rows));
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

fn render<T, F>(row: &PgRow, idx: usize, type_name: &str, show: F) -> String
where
    T: for<'r> sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
    F: FnOnce(T) -> String,
{
    match row.try_get::<Option<T>, _>(idx) {
        Ok(Some(val)) => show(val),
        Ok(None) => "NULL".to_string(),
        Err(_) => fallback(row, idx, type_name),
    }
}

fn fallback(row: &PgRow, idx: usize, type_name: &str) -> String {
    match row.try_get::<Option<String>, _>(idx) {
        Ok(Some(val)) => val,
        Ok(None) => "NULL".to_string(),
        Err(_) => {
            debug!("Column {} of type {} could not be rendered", idx, type_name);
            format!("[CONVERSION_ERROR:{}]", type_name)
        }
    }
}

pub(crate) fn convert_postgres_rows_to_table_data(rows: &[PgRow]) -> Vec<Vec<String>> {
    use sqlx::TypeInfo;

    rows.iter()
        .map(|row| {
            row.columns()
                .iter()
                .enumerate()
                .map(|(idx, column)| {
                    let t = column.type_info().name().to_ascii_uppercase();
                    match t.as_str() {
                        "INT2" => render::<i16, _>(row, idx, &t, |v| v.to_string()),
                        "INT4" => render::<i32, _>(row, idx, &t, |v| v.to_string()),
                        "INT8" => render::<i64, _>(row, idx, &t, |v| v.to_string()),
                        "FLOAT4" => render::<f32, _>(row, idx, &t, |v| v.to_string()),
                        "FLOAT8" => render::<f64, _>(row, idx, &t, |v| v.to_string()),
                        "NUMERIC" => render::<rust_decimal::Decimal, _>(row, idx, &t, |v| v.to_string()),
                        "BOOL" => render::<bool, _>(row, idx, &t, |v| v.to_string()),
                        "UUID" => render::<sqlx::types::Uuid, _>(row, idx, &t, |v| v.to_string()),
                        "JSON" | "JSONB" => {
                            render::<serde_json::Value, _>(row, idx, &t, |v| v.to_string())
                        }
                        "DATE" => render::<chrono::NaiveDate, _>(row, idx, &t, |v| v.to_string()),
                        "TIME" => render::<chrono::NaiveTime, _>(row, idx, &t, |v| v.to_string()),
                        "TIMESTAMP" => {
                            render::<chrono::NaiveDateTime, _>(row, idx, &t, |v| v.to_string())
                        }
                        "TIMESTAMPTZ" => render::<chrono::DateTime<chrono::Utc>, _>(row, idx, &t, |v| {
                            v.to_rfc3339()
                        }),
                        "BYTEA" => render::<Vec<u8>, _>(row, idx, &t, |v| {
                            format!("\\x{}", hex::encode(v))
                        }),
                        _ => fallback(row, idx, &t),
                    }
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn public_schema_preferred() {
        let schemas = names(&["pg_catalog", "information_schema", "public", "sales"]);
        assert_eq!(resolve_schema(&schemas), "public");
    }

    #[test]
    fn first_user_schema_without_public() {
        let schemas = names(&["pg_catalog", "information_schema", "sales", "billing", "pg_toast"]);
        assert_eq!(resolve_schema(&schemas), "billing");
    }

    #[test]
    fn only_system_schemas_fall_back_to_public() {
        let schemas = names(&["pg_catalog", "information_schema", "pg_toast", "pg_temp_1"]);
        assert_eq!(resolve_schema(&schemas), "public");
        assert_eq!(resolve_schema(&[]), "public");
    }

    #[test]
    fn tables_resolve_in_active_schema() {
        let driver = PostgresDriver::new(DriverOptions::default());
        assert_eq!(driver.table_ref("users"), "\"public\".\"users\"");
        driver.set_active_schema("sales".to_string());
        assert_eq!(driver.table_ref("order"), "\"sales\".\"order\"");
    }
}
