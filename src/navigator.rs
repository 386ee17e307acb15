//! Foreign-key navigation: follow the focused cell of one view to the row
//! it references, opened as a new view on the referenced table.
//!
//! Single hop and single column only. Composite keys never show up as
//! relations (see [`crate::structure::single_column_relations`]).

use log::info;

use crate::dialect::{self, SqlDialect};
use crate::driver::Driver;
use crate::errors::{NavigationError, SessionError};
use crate::models::enums::SessionState;
use crate::models::structs::RelationInfo;
use crate::session::QuerySession;
use crate::structure;

/// Rendered value of a SQL `NULL` cell
const NULL_CELL: &str = "NULL";

pub async fn goto_foreign_key(
    driver: &dyn Driver,
    tab: &mut QuerySession,
    row: usize,
    col: usize,
) -> Result<QuerySession, NavigationError> {
    if tab.state() == SessionState::Closed {
        return Err(SessionError::Closed.into());
    }
    let relation = relation_at(driver, tab, col).await?;
    let value = tab
        .cell(row, col)
        .ok_or(NavigationError::CellOutOfRange { row, col })?;

    let sql = dialect::dialect_for(driver.database_type())
        .ok_or_else(|| NavigationError::NotForeignKey(relation.column.clone()))?;
    let predicate = dialect::equality_predicate(sql, &relation.referenced_column, value);
    let database = tab.database().to_string();
    if value == NULL_CELL && holds_null(driver, tab, sql, row, &relation.column).await {
        return Err(NavigationError::NullReference(relation.column));
    }
    let data = driver
        .get_table_data_with_filter(&database, &relation.referenced_table, &predicate)
        .await?;
    let target_structure =
        structure::structure_for_decoration(driver, &database, &relation.referenced_table).await;

    info!(
        "Following {}.{} -> {} where {}",
        tab.table(),
        relation.column,
        relation.referenced_table,
        predicate
    );
    Ok(QuerySession::from_rows(
        &database,
        &relation.referenced_table,
        tab.page_size(),
        predicate,
        data,
        target_structure,
    ))
}

/// Whether a cell rendered as `NULL` is a real SQL NULL rather than text
/// spelled `NULL`. Re-reads the row by primary key; without one the cell is
/// taken at face value.
async fn holds_null(
    driver: &dyn Driver,
    tab: &QuerySession,
    sql: &dyn SqlDialect,
    row: usize,
    column: &str,
) -> bool {
    let Some(pk) = tab.structure().and_then(|s| s.primary_key()) else {
        return true;
    };
    let Some(pk_value) = tab
        .headers()
        .iter()
        .position(|h| h == pk)
        .and_then(|idx| tab.cell(row, idx))
    else {
        return true;
    };
    let predicate = format!(
        "{} AND {} IS NULL",
        dialect::equality_predicate(sql, pk, pk_value),
        column
    );
    match driver
        .get_table_data_with_filter(tab.database(), tab.table(), &predicate)
        .await
    {
        Ok(data) => data.len() > 1,
        Err(_) => true,
    }
}

async fn relation_at(
    driver: &dyn Driver,
    tab: &mut QuerySession,
    col: usize,
) -> Result<RelationInfo, NavigationError> {
    let column = tab
        .headers()
        .get(col)
        .cloned()
        .ok_or(NavigationError::CellOutOfRange { row: 0, col })?;
    if tab.structure().is_none() {
        tab.load_structure(driver).await?;
    }
    tab.structure()
        .and_then(|s| s.relation_for(&column))
        .cloned()
        .ok_or(NavigationError::NotForeignKey(column))
}
