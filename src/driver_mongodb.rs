use std::future::IntoFuture;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use log::{debug, error, info, warn};
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::ClientOptions;
use mongodb::{Client, IndexModel};

use crate::driver::{Driver, DriverOptions, TableData, TableMap};
use crate::errors::DriverError;
use crate::helpers;
use crate::models::enums::DatabaseType;
use crate::models::structs::{
    IndexInfo, PaginatedResult, Pagination, RelationInfo, TableColumn, TriggerInfo,
};
use crate::mongo_filter;

const ID_FIELD: &str = "_id";
const FALLBACK_DATABASE: &str = "admin";

pub struct MongoDriver {
    client: Option<Client>,
    /// Database named in the connection string, if any
    default_db: Option<String>,
    options: DriverOptions,
}

async fn timed<T, F>(limit: Duration, fut: F) -> Result<T, DriverError>
where
    F: IntoFuture<Output = Result<T, mongodb::error::Error>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(DriverError::from),
        Err(_) => Err(DriverError::Timeout(limit.as_secs())),
    }
}

impl MongoDriver {
    pub fn new(options: DriverOptions) -> Self {
        Self {
            client: None,
            default_db: None,
            options,
        }
    }

    fn client(&self) -> Result<&Client, DriverError> {
        self.client.as_ref().ok_or(DriverError::NotConnected)
    }

    fn db_name(&self, database: &str) -> Option<String> {
        if database.is_empty() {
            self.default_db.clone()
        } else {
            Some(database.to_string())
        }
    }

    fn collection(
        &self,
        database: &str,
        table: &str,
    ) -> Result<mongodb::Collection<Document>, DriverError> {
        let db = self
            .db_name(database)
            .ok_or_else(|| DriverError::Query("no database selected".to_string()))?;
        Ok(self.client()?.database(&db).collection::<Document>(table))
    }

    async fn build_client(&self, url: &str) -> Result<(Client, Option<String>), DriverError> {
        let mut opts = timed(self.options.mongo_connect_timeout, ClientOptions::parse(url))
            .await
            .map_err(|e| match e {
                DriverError::Timeout(_) => e,
                other => DriverError::InvalidUrl(other.to_string()),
            })?;
        opts.connect_timeout = Some(self.options.mongo_connect_timeout);
        opts.server_selection_timeout = Some(self.options.mongo_connect_timeout);
        let default_db = opts.default_database.clone();
        let client = Client::with_options(opts).map_err(|e| DriverError::Connection(e.to_string()))?;
        timed(
            self.options.mongo_connect_timeout,
            client.database(FALLBACK_DATABASE).run_command(doc! { "ping": 1 }),
        )
        .await
        .map_err(|e| DriverError::Connection(e.to_string()))?;
        Ok((client, default_db))
    }

    async fn collection_names(&self, db: &str) -> Result<Vec<String>, DriverError> {
        let mut names = timed(
            self.options.mongo_query_timeout,
            self.client()?.database(db).list_collection_names(),
        )
        .await?;
        names.sort();
        Ok(names)
    }

    async fn find_page(
        &self,
        database: &str,
        table: &str,
        filter: Document,
        sort: Document,
        skip: u64,
        limit: i64,
    ) -> Result<Vec<Document>, DriverError> {
        let coll = self.collection(database, table)?;
        debug!(
            "MongoDB find {}: filter={} sort={} skip={} limit={}",
            table, filter, sort, skip, limit
        );
        timed(self.options.mongo_query_timeout, async move {
            let cursor = coll.find(filter).sort(sort).skip(skip).limit(limit).await?;
            cursor.try_collect::<Vec<Document>>().await
        })
        .await
    }
}

/// Type label for a sampled value
pub fn bson_type_name(value: &Bson) -> &'static str {
    match value {
        Bson::String(_) => "string",
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => "number",
        Bson::Boolean(_) => "boolean",
        Bson::Array(_) => "array",
        Bson::Document(_) => "object",
        Bson::Null => "null",
        _ => "unknown",
    }
}

/// Union of sampled field names, typed by the first value seen.
pub fn infer_columns(docs: &[Document]) -> Vec<TableColumn> {
    let mut columns = vec![TableColumn {
        name: ID_FIELD.to_string(),
        data_type: "unknown".to_string(),
        nullable: false,
        key: "PRI".to_string(),
        ..TableColumn::default()
    }];
    let mut id_typed = false;
    for doc in docs {
        for (key, value) in doc {
            if key == ID_FIELD {
                if !id_typed {
                    columns[0].data_type = bson_type_name(value).to_string();
                    id_typed = true;
                }
                continue;
            }
            if columns.iter().any(|c| &c.name == key) {
                continue;
            }
            columns.push(TableColumn {
                name: key.clone(),
                data_type: bson_type_name(value).to_string(),
                nullable: true,
                ..TableColumn::default()
            });
        }
    }
    columns
}

pub fn render_bson(value: &Bson) -> String {
    match value {
        Bson::Null | Bson::Undefined => "NULL".to_string(),
        Bson::String(s) => s.clone(),
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::Int32(v) => v.to_string(),
        Bson::Int64(v) => v.to_string(),
        Bson::Double(v) => v.to_string(),
        Bson::Boolean(v) => v.to_string(),
        Bson::DateTime(dt) => dt
            .try_to_rfc3339_string()
            .unwrap_or_else(|_| dt.timestamp_millis().to_string()),
        other => other.clone().into_relaxed_extjson().to_string(),
    }
}

/// Header-first matrix for a page of documents. Headers are the union of
/// the page's keys with `_id` first; missing fields render as `NULL`.
pub fn documents_to_table(docs: &[Document], columns: &[TableColumn]) -> TableData {
    let mut headers: Vec<String> = vec![ID_FIELD.to_string()];
    for doc in docs {
        for key in doc.keys() {
            if !headers.contains(key) {
                headers.push(key.clone());
            }
        }
    }
    if docs.is_empty() {
        headers = columns.iter().map(|c| c.name.clone()).collect();
    }

    let mut data = Vec::with_capacity(docs.len() + 1);
    for doc in docs {
        data.push(
            headers
                .iter()
                .map(|h| doc.get(h).map(render_bson).unwrap_or_else(|| "NULL".to_string()))
                .collect(),
        );
    }
    data.insert(0, headers);
    data
}

fn sort_document(pagination: &Pagination) -> Document {
    let mut sort = Document::new();
    match pagination.sort_column() {
        Some(column) => sort.insert(column, pagination.sort_order.as_mongo()),
        None => sort.insert(ID_FIELD, 1),
    };
    sort
}

fn index_from_model(model: &IndexModel) -> IndexInfo {
    let name = model
        .options
        .as_ref()
        .and_then(|o| o.name.clone())
        .unwrap_or_else(|| {
            model
                .keys
                .iter()
                .map(|(k, v)| format!("{}_{}", k, v))
                .collect::<Vec<_>>()
                .join("_")
        });
    let primary = name == "_id_";
    let method = model.keys.values().find_map(|v| match v {
        Bson::String(kind) => Some(kind.clone()),
        _ => None,
    });
    IndexInfo {
        unique: primary
            || model
                .options
                .as_ref()
                .and_then(|o| o.unique)
                .unwrap_or(false),
        primary,
        method: Some(method.unwrap_or_else(|| "btree".to_string())),
        columns: model.keys.keys().cloned().collect(),
        name,
    }
}

#[async_trait]
impl Driver for MongoDriver {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::MongoDB
    }

    async fn connect(&mut self, url: &str) -> Result<(), DriverError> {
        let (client, default_db) = self.build_client(url).await.map_err(|e| {
            error!("MongoDB connect to {} failed: {}", helpers::redact_url(url), e);
            e
        })?;
        info!(
            "Connected to MongoDB {} (database {:?})",
            helpers::redact_url(url),
            default_db
        );
        self.client = Some(client);
        self.default_db = default_db;
        Ok(())
    }

    async fn test_connection(&self, url: &str) -> Result<(), DriverError> {
        let (client, _) = self.build_client(url).await?;
        client.shutdown().await;
        Ok(())
    }

    async fn get_tables(&self, database: &str) -> Result<TableMap, DriverError> {
        let client = self.client()?;
        let mut map = TableMap::new();
        match self.db_name(database) {
            Some(db) => match self.collection_names(&db).await {
                Ok(names) => {
                    map.insert(db, names);
                }
                Err(e) => {
                    warn!("Listing '{}' failed ({}), falling back to '{}'", db, e, FALLBACK_DATABASE);
                    map.insert(
                        FALLBACK_DATABASE.to_string(),
                        self.collection_names(FALLBACK_DATABASE).await?,
                    );
                }
            },
            None => {
                let databases =
                    timed(self.options.mongo_query_timeout, client.list_database_names()).await?;
                for db in databases {
                    match self.collection_names(&db).await {
                        Ok(names) => {
                            map.insert(db, names);
                        }
                        Err(e) => debug!("Skipping database '{}': {}", db, e),
                    }
                }
            }
        }
        Ok(map)
    }

    async fn get_table_columns(
        &self,
        database: &str,
        table: &str,
    ) -> Result<Vec<TableColumn>, DriverError> {
        let coll = self.collection(database, table)?;
        let sample = self.options.sample_size;
        let docs = timed(self.options.mongo_query_timeout, async move {
            let cursor = coll.find(doc! {}).limit(sample).await?;
            cursor.try_collect::<Vec<Document>>().await
        })
        .await?;
        debug!("MongoDB sampled {} documents from {}", docs.len(), table);
        Ok(infer_columns(&docs))
    }

    async fn get_table_data_with_filter(
        &self,
        database: &str,
        table: &str,
        filter: &str,
    ) -> Result<TableData, DriverError> {
        let filter = mongo_filter::parse_filter(filter)?;
        let docs = self
            .find_page(database, table, filter, doc! { "_id": 1 }, 0, self.options.row_limit)
            .await?;
        let columns = if docs.is_empty() {
            self.get_table_columns(database, table).await?
        } else {
            Vec::new()
        };
        Ok(documents_to_table(&docs, &columns))
    }

    async fn get_table_data_with_filter_paginated(
        &self,
        database: &str,
        table: &str,
        filter: &str,
        pagination: &Pagination,
    ) -> Result<PaginatedResult, DriverError> {
        let filter = mongo_filter::parse_filter(filter)?;
        let coll = self.collection(database, table)?;

        let total = if filter.is_empty() {
            timed(self.options.mongo_count_timeout, coll.estimated_document_count()).await?
        } else {
            timed(self.options.mongo_count_timeout, coll.count_documents(filter.clone())).await?
        };

        let skip = u64::try_from(pagination.offset()).unwrap_or(0);
        let docs = self
            .find_page(
                database,
                table,
                filter,
                sort_document(pagination),
                skip,
                pagination.limit(self.options.row_limit),
            )
            .await?;
        let columns = if docs.is_empty() {
            self.get_table_columns(database, table).await?
        } else {
            Vec::new()
        };
        let data = documents_to_table(&docs, &columns);
        Ok(PaginatedResult::new(
            data,
            i64::try_from(total).unwrap_or(i64::MAX),
            pagination,
        ))
    }

    async fn get_index_info(
        &self,
        database: &str,
        table: &str,
    ) -> Result<Vec<IndexInfo>, DriverError> {
        let coll = self.collection(database, table)?;
        let models = timed(self.options.mongo_query_timeout, async move {
            let cursor = coll.list_indexes().await?;
            cursor.try_collect::<Vec<IndexModel>>().await
        })
        .await?;
        Ok(models.iter().map(index_from_model).collect())
    }

    async fn get_relation_info(
        &self,
        _database: &str,
        _table: &str,
    ) -> Result<Vec<RelationInfo>, DriverError> {
        Ok(Vec::new())
    }

    async fn get_trigger_info(
        &self,
        _database: &str,
        _table: &str,
    ) -> Result<Vec<TriggerInfo>, DriverError> {
        Ok(Vec::new())
    }

    async fn execute_query(&self, _query: &str) -> Result<TableData, DriverError> {
        Err(DriverError::Unsupported("raw query execution on MongoDB"))
    }

    fn combine_filters(&self, terms: &[String]) -> Result<String, DriverError> {
        mongo_filter::combine_filters(terms)
    }

    async fn close(&self) {
        if let Some(client) = &self.client {
            client.clone().shutdown().await;
            info!("MongoDB client shut down");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::oid::ObjectId;

    #[test]
    fn sampled_fields_are_unioned_with_first_seen_type() {
        let docs = vec![
            doc! { "_id": ObjectId::new(), "name": "ada", "age": 36 },
            doc! { "_id": ObjectId::new(), "age": "unknown", "tags": ["a"], "meta": { "x": 1 } },
            doc! { "_id": ObjectId::new(), "active": true, "note": Bson::Null },
        ];
        let columns = infer_columns(&docs);
        let summary: Vec<(&str, &str)> = columns
            .iter()
            .map(|c| (c.name.as_str(), c.data_type.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("_id", "unknown"),
                ("name", "string"),
                ("age", "number"),
                ("tags", "array"),
                ("meta", "object"),
                ("active", "boolean"),
                ("note", "null"),
            ]
        );
        assert!(columns[0].is_primary_key());
    }

    #[test]
    fn empty_collection_still_has_id_column() {
        let columns = infer_columns(&[]);
        assert_eq!(columns.len(), 1);
        assert_eq!(columns[0].name, "_id");
    }

    #[test]
    fn page_headers_put_id_first_and_fill_gaps() {
        let oid = ObjectId::parse_str("507f1f77bcf86cd799439011").unwrap();
        let docs = vec![
            doc! { "name": "a", "_id": oid },
            doc! { "_id": 2, "extra": { "k": 1 } },
        ];
        let table = documents_to_table(&docs, &[]);
        assert_eq!(table[0], vec!["_id", "name", "extra"]);
        assert_eq!(table[1], vec!["507f1f77bcf86cd799439011", "a", "NULL"]);
        assert_eq!(table[2][0], "2");
        assert_eq!(table[2][1], "NULL");
        assert_eq!(table[2][2], r#"{"k":1}"#);
    }

    #[test]
    fn empty_page_uses_sampled_headers() {
        let columns = infer_columns(&[doc! { "_id": 1, "name": "x" }]);
        let table = documents_to_table(&[], &columns);
        assert_eq!(table, vec![vec!["_id".to_string(), "name".to_string()]]);
    }

    #[test]
    fn default_sort_is_id() {
        assert_eq!(sort_document(&Pagination::new(1, 10)), doc! { "_id": 1 });
        let p = Pagination::new(1, 10).with_sort("age", crate::models::enums::SortOrder::Desc);
        assert_eq!(sort_document(&p), doc! { "age": -1 });
    }

    #[tokio::test]
    async fn raw_queries_are_unsupported() {
        let driver = MongoDriver::new(DriverOptions::default());
        assert!(matches!(
            driver.execute_query("db.users.find()").await,
            Err(DriverError::Unsupported(_))
        ));
        assert!(driver.get_trigger_info("", "users").await.unwrap().is_empty());
        assert!(driver.get_relation_info("", "users").await.unwrap().is_empty());
    }
}
