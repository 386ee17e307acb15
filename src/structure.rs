//! Structure introspection normalizer
//!
//! Every backend reports metadata differently (information_schema, pg
//! catalogs, SQLite pragmas, sampled documents). The drivers turn their
//! native rows into the flat records below, and this module folds them into
//! one [`TableStructure`], tolerating partial failures.

use log::warn;

use crate::driver::Driver;
use crate::errors::DriverError;
use crate::models::structs::{IndexInfo, RelationInfo, TableStructure};

/// One (index, column) pair as most catalogs report it.
#[derive(Debug, Clone)]
pub struct IndexColumnRow {
    pub index_name: String,
    pub column_name: String,
    pub unique: bool,
    pub primary: bool,
    pub method: Option<String>,
}

pub async fn collect_structure<D: Driver + ?Sized>(
    driver: &D,
    database: &str,
    table: &str,
) -> Result<TableStructure, DriverError> {
    let columns = driver
        .get_column_info(database, table)
        .await
        .map_err(|e| DriverError::Structure(format!("columns of '{}': {}", table, e)))?;

    let indexes = degrade("indexes", table, driver.get_index_info(database, table).await);
    let relations = degrade("relations", table, driver.get_relation_info(database, table).await);
    let triggers = degrade("triggers", table, driver.get_trigger_info(database, table).await);

    Ok(TableStructure {
        columns,
        indexes,
        relations,
        triggers,
    })
}

/// Items of an optional metadata lookup, or none with a warning.
pub(crate) fn degrade<T>(what: &str, table: &str, result: Result<Vec<T>, DriverError>) -> Vec<T> {
    match result {
        Ok(items) => items,
        Err(e) => {
            warn!("Skipping {} of '{}': {}", what, table, e);
            Vec::new()
        }
    }
}

/// Structure fetched only to decorate a data view with FK markers.
/// A failure is logged and the view simply goes undecorated.
pub async fn structure_for_decoration(
    driver: &dyn Driver,
    database: &str,
    table: &str,
) -> Option<TableStructure> {
    match driver.get_table_structure(database, table).await {
        Ok(structure) => Some(structure),
        Err(e) => {
            warn!("No FK decoration for '{}': {}", table, e);
            None
        }
    }
}

/// Fold per-column index rows into indexes, keeping first-seen order for
/// both indexes and their columns.
pub fn group_index_rows(rows: Vec<IndexColumnRow>) -> Vec<IndexInfo> {
    let mut out: Vec<IndexInfo> = Vec::new();
    for row in rows {
        match out.iter_mut().find(|i| i.name == row.index_name) {
            Some(index) => {
                if !index.columns.contains(&row.column_name) {
                    index.columns.push(row.column_name);
                }
            }
            None => out.push(IndexInfo {
                name: row.index_name,
                method: row.method.map(|m| m.to_ascii_lowercase()),
                unique: row.unique || row.primary,
                primary: row.primary,
                columns: vec![row.column_name],
            }),
        }
    }
    out
}

/// Keep only single-column relations; composite keys cannot be followed
/// by cell navigation.
pub fn single_column_relations(relations: Vec<RelationInfo>) -> Vec<RelationInfo> {
    let mut counts: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    for r in &relations {
        if !r.constraint_name.is_empty() {
            *counts.entry(r.constraint_name.clone()).or_default() += 1;
        }
    }
    relations
        .into_iter()
        .filter(|r| r.constraint_name.is_empty() || counts.get(&r.constraint_name) == Some(&1))
        .collect()
}

/// Referential action as shown to the user; absent means the default.
pub fn normalize_rule(rule: Option<String>) -> Option<String> {
    rule.map(|r| r.trim().to_ascii_uppercase())
        .filter(|r| !r.is_empty() && r != "NONE")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_lookup_degrades_to_nothing() {
        let failed: Result<Vec<String>, DriverError> =
            Err(DriverError::Query("no such function: pragma_foreign_key_list".to_string()));
        assert!(degrade("foreign-key markers", "orders", failed).is_empty());
        let found = degrade("foreign-key markers", "orders", Ok(vec!["customer_id".to_string()]));
        assert_eq!(found, vec!["customer_id".to_string()]);
    }

    fn row(index: &str, column: &str, unique: bool, primary: bool) -> IndexColumnRow {
        IndexColumnRow {
            index_name: index.to_string(),
            column_name: column.to_string(),
            unique,
            primary,
            method: Some("BTREE".to_string()),
        }
    }

    #[test]
    fn index_rows_are_grouped_in_order() {
        let grouped = group_index_rows(vec![
            row("PRIMARY", "id", false, true),
            row("idx_name_email", "name", false, false),
            row("idx_name_email", "email", false, false),
            row("uniq_code", "code", true, false),
        ]);
        assert_eq!(grouped.len(), 3);
        assert!(grouped[0].primary && grouped[0].unique);
        assert_eq!(grouped[1].columns, vec!["name", "email"]);
        assert_eq!(grouped[1].method.as_deref(), Some("btree"));
        assert!(grouped[2].unique && !grouped[2].primary);
    }

    #[test]
    fn composite_relations_are_dropped() {
        let rel = |constraint: &str, column: &str| RelationInfo {
            constraint_name: constraint.to_string(),
            column: column.to_string(),
            referenced_table: "t".to_string(),
            referenced_column: "id".to_string(),
            ..RelationInfo::default()
        };
        let kept = single_column_relations(vec![
            rel("fk_customer", "customer_id"),
            rel("fk_pair", "a"),
            rel("fk_pair", "b"),
            rel("", "loose"),
        ]);
        let names: Vec<&str> = kept.iter().map(|r| r.column.as_str()).collect();
        assert_eq!(names, vec!["customer_id", "loose"]);
    }

    #[test]
    fn rules_are_normalized() {
        assert_eq!(normalize_rule(Some("cascade".into())).as_deref(), Some("CASCADE"));
        assert_eq!(normalize_rule(Some("NONE".into())), None);
        assert_eq!(normalize_rule(Some(" ".into())), None);
        assert_eq!(normalize_rule(None), None);
    }
}
