//! Database-agnostic data-access contract
//!
//! One `Driver` per open connection. It owns the backend handle (a sqlx pool
//! or a MongoDB client) for its whole lifetime and answers every browsing
//! call the table views make: enumeration, introspection, paginated and
//! filtered fetches, and raw query execution.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::dialect;
use crate::errors::DriverError;
use crate::models::enums::DatabaseType;
use crate::models::structs::{
    ColumnInfo, IndexInfo, PaginatedResult, Pagination, RelationInfo, TableColumn, TableStructure,
    TriggerInfo,
};
use crate::structure;
use crate::{driver_mongodb, driver_mysql, driver_postgres, driver_sqlite};

/// Header-first matrix of rendered cell values
pub type TableData = Vec<Vec<String>>;

/// Tables grouped by schema (PostgreSQL), database (MySQL/MongoDB) or `main` (SQLite)
pub type TableMap = BTreeMap<String, Vec<String>>;

/// Knobs every driver is built with
#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// Row cap for unpaginated fetches and for non-positive page sizes
    pub row_limit: i64,
    /// Documents sampled to infer a MongoDB collection's fields
    pub sample_size: i64,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub mongo_connect_timeout: Duration,
    pub mongo_query_timeout: Duration,
    pub mongo_count_timeout: Duration,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            row_limit: 1000,
            sample_size: 100,
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
            mongo_connect_timeout: Duration::from_secs(10),
            mongo_query_timeout: Duration::from_secs(30),
            mongo_count_timeout: Duration::from_secs(5),
        }
    }
}

/// The data-access capability set implemented once per backend.
///
/// `database` arguments may be empty, meaning "the database named in the
/// connection URL". Filters are raw predicate text: a SQL boolean expression
/// for relational backends, a JSON document or `key=value[,key=value]` list
/// for MongoDB. They are never parameterized; see [`crate::dialect`].
#[async_trait]
pub trait Driver: Send + Sync {
    /// Get the database type this driver handles
    fn database_type(&self) -> DatabaseType;

    /// Open and ping the backend handle. Failure is final; nothing retries.
    async fn connect(&mut self, url: &str) -> Result<(), DriverError>;

    /// Probe `url` with a throwaway handle, leaving this driver untouched.
    async fn test_connection(&self, url: &str) -> Result<(), DriverError>;

    async fn get_tables(&self, database: &str) -> Result<TableMap, DriverError>;

    async fn get_table_columns(
        &self,
        database: &str,
        table: &str,
    ) -> Result<Vec<TableColumn>, DriverError>;

    /// Unpaginated fetch, capped at the configured row limit
    async fn get_table_data(&self, database: &str, table: &str) -> Result<TableData, DriverError> {
        self.get_table_data_with_filter(database, table, "").await
    }

    async fn get_table_data_with_filter(
        &self,
        database: &str,
        table: &str,
        filter: &str,
    ) -> Result<TableData, DriverError>;

    async fn get_table_data_paginated(
        &self,
        database: &str,
        table: &str,
        pagination: &Pagination,
    ) -> Result<PaginatedResult, DriverError> {
        self.get_table_data_with_filter_paginated(database, table, "", pagination)
            .await
    }

    async fn get_table_data_with_filter_paginated(
        &self,
        database: &str,
        table: &str,
        filter: &str,
        pagination: &Pagination,
    ) -> Result<PaginatedResult, DriverError>;

    /// Columns, indexes, relations and triggers in one shape. Only a column
    /// lookup failure is fatal; the other three degrade to empty lists.
    async fn get_table_structure(
        &self,
        database: &str,
        table: &str,
    ) -> Result<TableStructure, DriverError> {
        structure::collect_structure(self, database, table).await
    }

    async fn get_column_info(
        &self,
        database: &str,
        table: &str,
    ) -> Result<Vec<ColumnInfo>, DriverError> {
        let columns = self.get_table_columns(database, table).await?;
        Ok(columns.iter().map(ColumnInfo::from).collect())
    }

    async fn get_index_info(&self, database: &str, table: &str)
    -> Result<Vec<IndexInfo>, DriverError>;

    async fn get_relation_info(
        &self,
        database: &str,
        table: &str,
    ) -> Result<Vec<RelationInfo>, DriverError>;

    async fn get_trigger_info(
        &self,
        database: &str,
        table: &str,
    ) -> Result<Vec<TriggerInfo>, DriverError>;

    /// Run a raw statement. Relational only.
    async fn execute_query(&self, query: &str) -> Result<TableData, DriverError>;

    /// AND-combine the active filters of a view into one predicate.
    fn combine_filters(&self, terms: &[String]) -> Result<String, DriverError> {
        Ok(dialect::combine_predicates(terms))
    }

    /// Release the backend handle.
    async fn close(&self) {}
}

/// The one place a backend kind turns into a concrete driver.
pub fn open_driver(kind: DatabaseType, options: DriverOptions) -> Box<dyn Driver> {
    match kind {
        DatabaseType::MySQL => Box::new(driver_mysql::MySqlDriver::new(options)),
        DatabaseType::PostgreSQL => Box::new(driver_postgres::PostgresDriver::new(options)),
        DatabaseType::SQLite => Box::new(driver_sqlite::SqliteDriver::new(options)),
        DatabaseType::MongoDB => Box::new(driver_mongodb::MongoDriver::new(options)),
    }
}

/// Pick the ordering column for a page: the requested sort column, else the
/// table's primary key so consecutive pages neither repeat nor skip rows.
pub(crate) fn resolve_order<'a>(
    pagination: &'a Pagination,
    columns: &'a [TableColumn],
) -> Option<(&'a str, crate::models::enums::SortOrder)> {
    if let Some(column) = pagination.sort_column() {
        return Some((column, pagination.sort_order));
    }
    columns
        .iter()
        .find(|c| c.is_primary_key())
        .map(|c| (c.name.as_str(), crate::models::enums::SortOrder::Asc))
}

/// Column names of a result set, if it returned any rows.
pub(crate) fn result_headers<R: sqlx::Row>(rows: &[R]) -> Option<Vec<String>> {
    use sqlx::Column;
    rows.first()
        .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
}

/// Header row for a page: taken from the result set when rows came back,
/// otherwise from the column list so empty pages still carry headers.
pub(crate) fn header_row(result_headers: Option<Vec<String>>, columns: &[TableColumn]) -> Vec<String> {
    match result_headers {
        Some(headers) if !headers.is_empty() => headers,
        _ => columns.iter().map(|c| c.name.clone()).collect(),
    }
}
