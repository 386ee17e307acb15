use serde::{Deserialize, Serialize};

use crate::models::enums::{DatabaseType, SortOrder};

/// A saved connection record. Persistence belongs to the caller; this crate
/// only ever tests and opens it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub id: Option<i64>,
    pub name: String,
    pub connection_type: DatabaseType,
    pub url: String,
}

impl ConnectionConfig {
    pub fn new(name: impl Into<String>, connection_type: DatabaseType, url: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            connection_type,
            url: url.into(),
        }
    }
}

/// Page request. Pages are 1-indexed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: i64,
    pub page_size: i64,
    pub sort_column: Option<String>,
    pub sort_order: SortOrder,
}

impl Pagination {
    pub fn new(page: i64, page_size: i64) -> Self {
        Self {
            page,
            page_size,
            sort_column: None,
            sort_order: SortOrder::Asc,
        }
    }

    pub fn with_sort(mut self, column: impl Into<String>, order: SortOrder) -> Self {
        self.sort_column = Some(column.into());
        self.sort_order = order;
        self
    }

    /// Row offset of the first row on this page; never negative.
    pub fn offset(&self) -> i64 {
        if self.page_size <= 0 {
            return 0;
        }
        (self.page.max(1) - 1).saturating_mul(self.page_size)
    }

    /// Effective row limit. A non-positive page size degrades to a single
    /// best-effort page of `fallback` rows.
    pub fn limit(&self, fallback: i64) -> i64 {
        if self.page_size > 0 { self.page_size } else { fallback }
    }

    pub fn sort_column(&self) -> Option<&str> {
        self.sort_column.as_deref().filter(|c| !c.trim().is_empty())
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(1, 100)
    }
}

/// `max(1, ceil(total_rows / page_size))`
pub fn total_pages(total_rows: i64, page_size: i64) -> i64 {
    if page_size <= 0 || total_rows <= 0 {
        return 1;
    }
    let full = total_rows / page_size;
    let pages = if total_rows % page_size == 0 { full } else { full + 1 };
    pages.max(1)
}

/// One page of rows. `data[0]` is the header row; every following row has
/// the same width.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PaginatedResult {
    pub data: Vec<Vec<String>>,
    pub total_rows: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
}

impl PaginatedResult {
    pub fn new(data: Vec<Vec<String>>, total_rows: i64, pagination: &Pagination) -> Self {
        let total_rows = total_rows.max(0);
        Self {
            data,
            total_rows,
            page: pagination.page.max(1),
            page_size: pagination.page_size,
            total_pages: total_pages(total_rows, pagination.page_size),
        }
    }

    pub fn headers(&self) -> &[String] {
        self.data.first().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn rows(&self) -> &[Vec<String>] {
        self.data.get(1..).unwrap_or(&[])
    }

    pub fn row_count(&self) -> usize {
        self.rows().len()
    }
}

/// Lightweight column preview (`GetTableColumns`).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableColumn {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    /// `PRI`, `UNI`, `MUL` or empty, MySQL style.
    pub key: String,
    pub default_value: Option<String>,
    pub extra: String,
}

impl TableColumn {
    pub fn is_primary_key(&self) -> bool {
        self.key == "PRI"
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: Option<bool>,
    pub default_value: Option<String>,
    pub extra: Option<String>,
    pub is_primary_key: bool,
}

impl From<&TableColumn> for ColumnInfo {
    fn from(col: &TableColumn) -> Self {
        Self {
            name: col.name.clone(),
            data_type: col.data_type.clone(),
            nullable: Some(col.nullable),
            default_value: col.default_value.clone(),
            extra: Some(col.extra.clone()).filter(|e| !e.is_empty()),
            is_primary_key: col.is_primary_key(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    pub method: Option<String>, // btree, hash, ...
    pub unique: bool,
    pub primary: bool,
    pub columns: Vec<String>,
}

/// A single-column foreign key from `column` to `referenced_table.referenced_column`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationInfo {
    pub constraint_name: String,
    pub column: String,
    pub referenced_table: String,
    pub referenced_column: String,
    pub on_update: Option<String>,
    pub on_delete: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerInfo {
    pub name: String,
    pub event: String,  // INSERT / UPDATE / DELETE
    pub timing: String, // BEFORE / AFTER / INSTEAD OF
    pub statement: String,
}

/// Normalized table metadata. Each list may be empty when the backend has
/// no such concept or the table has none.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStructure {
    pub columns: Vec<ColumnInfo>,
    pub indexes: Vec<IndexInfo>,
    pub relations: Vec<RelationInfo>,
    pub triggers: Vec<TriggerInfo>,
}

impl TableStructure {
    pub fn relation_for(&self, column: &str) -> Option<&RelationInfo> {
        self.relations.iter().find(|r| r.column == column)
    }

    pub fn primary_key(&self) -> Option<&str> {
        self.columns
            .iter()
            .find(|c| c.is_primary_key)
            .map(|c| c.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_pages_is_ceiling_and_at_least_one() {
        assert_eq!(total_pages(0, 100), 1);
        assert_eq!(total_pages(1, 100), 1);
        assert_eq!(total_pages(100, 100), 1);
        assert_eq!(total_pages(101, 100), 2);
        assert_eq!(total_pages(250, 100), 3);
        assert_eq!(total_pages(250, 0), 1);
        assert_eq!(total_pages(250, -5), 1);
        for size in 1..20 {
            for rows in 0..200 {
                let expected = ((rows as f64) / (size as f64)).ceil().max(1.0) as i64;
                assert_eq!(total_pages(rows, size), expected, "rows={rows} size={size}");
            }
        }
    }

    #[test]
    fn offset_clamps_for_bad_input() {
        assert_eq!(Pagination::new(1, 100).offset(), 0);
        assert_eq!(Pagination::new(3, 100).offset(), 200);
        assert_eq!(Pagination::new(0, 100).offset(), 0);
        assert_eq!(Pagination::new(-4, 100).offset(), 0);
        assert_eq!(Pagination::new(5, 0).offset(), 0);
        assert_eq!(Pagination::new(5, -10).offset(), 0);
        assert_eq!(Pagination::new(5, 0).limit(1000), 1000);
        assert_eq!(Pagination::new(5, 25).limit(1000), 25);
    }

    #[test]
    fn blank_sort_column_is_ignored() {
        let p = Pagination::new(1, 10).with_sort("  ", SortOrder::Desc);
        assert_eq!(p.sort_column(), None);
        let p = Pagination::new(1, 10).with_sort("name", SortOrder::Desc);
        assert_eq!(p.sort_column(), Some("name"));
    }

    #[test]
    fn paginated_result_splits_header_from_rows() {
        let data = vec![
            vec!["id".to_string(), "name".to_string()],
            vec!["1".to_string(), "a".to_string()],
        ];
        let result = PaginatedResult::new(data, 1, &Pagination::new(1, 10));
        assert_eq!(result.headers(), ["id".to_string(), "name".to_string()]);
        assert_eq!(result.row_count(), 1);
        assert_eq!(result.total_pages, 1);

        let empty = PaginatedResult::default();
        assert!(empty.headers().is_empty());
        assert!(empty.rows().is_empty());
    }
}
