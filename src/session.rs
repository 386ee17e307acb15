//! Per-view query session.
//!
//! A `QuerySession` is one open table view: its baseline page, the filters
//! the user stacked on top of it and the pagination cursor. Sessions share
//! nothing with each other; two views of the same table are two independent
//! sets of fresh reads.
//!
//! Every fetch is read-then-swap: the new page is fetched into a local and
//! only replaces the visible rows once it arrived in full. A failed fetch
//! leaves the rows, filters and cursor exactly as they were.

use log::{debug, warn};

use crate::driver::{Driver, TableData};
use crate::errors::{DriverError, SessionError};
use crate::models::enums::{SessionState, SortOrder};
use crate::models::structs::{PaginatedResult, Pagination, TableStructure};
use crate::structure;

#[derive(Debug, Clone)]
pub struct QuerySession {
    database: String,
    table: String,
    state: SessionState,
    /// Unfiltered page 1 as first loaded
    baseline: Option<PaginatedResult>,
    current: PaginatedResult,
    active_filters: Vec<String>,
    pagination: Pagination,
    structure: Option<TableStructure>,
    last_error: Option<String>,
}

impl QuerySession {
    fn empty(database: &str, table: &str, page_size: i64) -> Self {
        Self {
            database: database.to_string(),
            table: table.to_string(),
            state: SessionState::Loading,
            baseline: None,
            current: PaginatedResult::default(),
            active_filters: Vec::new(),
            pagination: Pagination::new(1, page_size),
            structure: None,
            last_error: None,
        }
    }

    /// Load page 1 unfiltered and enter `Ready`. The table structure is
    /// fetched for FK decoration only; failing that is not an error.
    pub async fn open(
        driver: &dyn Driver,
        database: &str,
        table: &str,
        page_size: i64,
    ) -> Result<Self, SessionError> {
        let mut session = Self::empty(database, table, page_size);
        let first = driver
            .get_table_data_paginated(database, table, &session.pagination)
            .await?;
        debug!(
            "Opened '{}': {} rows, {} pages",
            table, first.total_rows, first.total_pages
        );
        session.baseline = Some(first.clone());
        session.current = first;
        session.structure = structure::structure_for_decoration(driver, database, table).await;
        session.state = SessionState::Ready;
        Ok(session)
    }

    /// A session whose first page is an already fetched, filtered row set
    /// (foreign-key targets). `filter` shows up as the active filter.
    pub fn from_rows(
        database: &str,
        table: &str,
        page_size: i64,
        filter: String,
        mut data: TableData,
        structure: Option<TableStructure>,
    ) -> Self {
        let mut session = Self::empty(database, table, page_size);
        let total = data.len().saturating_sub(1) as i64;
        if page_size > 0 {
            data.truncate(page_size as usize + 1);
        }
        session.current = PaginatedResult::new(data, total, &session.pagination);
        session.active_filters.push(filter);
        session.structure = structure;
        session.state = SessionState::Ready;
        session
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn active_filters(&self) -> &[String] {
        &self.active_filters
    }

    /// Unfiltered page 1 captured at open. `None` for sessions seeded by
    /// foreign-key navigation.
    pub fn baseline(&self) -> Option<&PaginatedResult> {
        self.baseline.as_ref()
    }

    pub fn result(&self) -> &PaginatedResult {
        &self.current
    }

    pub fn headers(&self) -> &[String] {
        self.current.headers()
    }

    pub fn rows(&self) -> &[Vec<String>] {
        self.current.rows()
    }

    pub fn page(&self) -> i64 {
        self.pagination.page
    }

    pub fn page_size(&self) -> i64 {
        self.pagination.page_size
    }

    pub fn total_rows(&self) -> i64 {
        self.current.total_rows
    }

    pub fn total_pages(&self) -> i64 {
        self.current.total_pages
    }

    pub fn sort(&self) -> Option<(&str, SortOrder)> {
        self.pagination
            .sort_column()
            .map(|c| (c, self.pagination.sort_order))
    }

    pub fn structure(&self) -> Option<&TableStructure> {
        self.structure.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Value of a visible cell; `row` is 0-based over data rows (header excluded).
    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows().get(row)?.get(col).map(String::as_str)
    }

    pub fn is_foreign_key(&self, column: &str) -> bool {
        self.structure
            .as_ref()
            .is_some_and(|s| s.relation_for(column).is_some())
    }

    fn ensure_ready(&self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Ready => Ok(()),
            SessionState::Closed => Err(SessionError::Closed),
            other => Err(SessionError::InvalidState(other)),
        }
    }

    async fn fetch(
        &self,
        driver: &dyn Driver,
        filters: &[String],
        pagination: &Pagination,
    ) -> Result<PaginatedResult, DriverError> {
        let predicate = driver.combine_filters(filters)?;
        driver
            .get_table_data_with_filter_paginated(&self.database, &self.table, &predicate, pagination)
            .await
    }

    /// Run one fetch in `transit` state and swap the result in on success.
    async fn swap_in(
        &mut self,
        driver: &dyn Driver,
        transit: SessionState,
        filters: Vec<String>,
        pagination: Pagination,
    ) -> Result<(), SessionError> {
        self.state = transit;
        let outcome = self.fetch(driver, &filters, &pagination).await;
        self.state = SessionState::Ready;
        match outcome {
            Ok(result) => {
                self.current = result;
                self.active_filters = filters;
                self.pagination = pagination;
                self.last_error = None;
                Ok(())
            }
            Err(e) => {
                warn!("Fetch for '{}' failed, keeping current rows: {}", self.table, e);
                self.last_error = Some(e.to_string());
                Err(e.into())
            }
        }
    }

    /// Stack `predicate` on the active filters and show page 1.
    pub async fn apply_filter(
        &mut self,
        driver: &dyn Driver,
        predicate: &str,
    ) -> Result<(), SessionError> {
        self.ensure_ready()?;
        let predicate = predicate.trim();
        if predicate.is_empty() {
            return Err(SessionError::EmptyFilter);
        }
        let mut filters = self.active_filters.clone();
        filters.push(predicate.to_string());
        let mut pagination = self.pagination.clone();
        pagination.page = 1;
        self.swap_in(driver, SessionState::Filtering, filters, pagination)
            .await
    }

    /// Drop every filter and re-fetch unfiltered page 1.
    pub async fn clear_filters(&mut self, driver: &dyn Driver) -> Result<(), SessionError> {
        self.ensure_ready()?;
        let mut pagination = self.pagination.clone();
        pagination.page = 1;
        self.swap_in(driver, SessionState::Filtering, Vec::new(), pagination)
            .await
    }

    /// Returns `Ok(false)` without fetching when already on the last page.
    pub async fn next_page(&mut self, driver: &dyn Driver) -> Result<bool, SessionError> {
        self.ensure_ready()?;
        if self.pagination.page >= self.current.total_pages {
            return Ok(false);
        }
        self.move_to(driver, self.pagination.page + 1).await
    }

    /// Returns `Ok(false)` without fetching when already on page 1.
    pub async fn prev_page(&mut self, driver: &dyn Driver) -> Result<bool, SessionError> {
        self.ensure_ready()?;
        if self.pagination.page <= 1 {
            return Ok(false);
        }
        self.move_to(driver, self.pagination.page - 1).await
    }

    /// Jump to `page`; out-of-range pages are ignored.
    pub async fn go_to_page(&mut self, driver: &dyn Driver, page: i64) -> Result<bool, SessionError> {
        self.ensure_ready()?;
        if page < 1 || page > self.current.total_pages || page == self.pagination.page {
            return Ok(false);
        }
        self.move_to(driver, page).await
    }

    async fn move_to(&mut self, driver: &dyn Driver, page: i64) -> Result<bool, SessionError> {
        let mut pagination = self.pagination.clone();
        pagination.page = page;
        let filters = self.active_filters.clone();
        self.swap_in(driver, SessionState::Paginating, filters, pagination)
            .await?;
        Ok(true)
    }

    /// Re-issue the current page with the current filters.
    pub async fn refresh(&mut self, driver: &dyn Driver) -> Result<(), SessionError> {
        self.ensure_ready()?;
        let filters = self.active_filters.clone();
        let pagination = self.pagination.clone();
        self.swap_in(driver, SessionState::Paginating, filters, pagination)
            .await
    }

    /// Order by `column` (or the default order when `None`) and reload the
    /// current page.
    pub async fn set_sort(
        &mut self,
        driver: &dyn Driver,
        column: Option<&str>,
        order: SortOrder,
    ) -> Result<(), SessionError> {
        self.ensure_ready()?;
        let mut pagination = self.pagination.clone();
        pagination.sort_column = column.map(str::to_string);
        pagination.sort_order = order;
        let filters = self.active_filters.clone();
        self.swap_in(driver, SessionState::Paginating, filters, pagination)
            .await
    }

    /// Full structure of the table, kept for FK decoration.
    pub async fn load_structure(
        &mut self,
        driver: &dyn Driver,
    ) -> Result<&TableStructure, SessionError> {
        if self.state == SessionState::Closed {
            return Err(SessionError::Closed);
        }
        let fetched = driver
            .get_table_structure(&self.database, &self.table)
            .await?;
        let stored = self.structure.insert(fetched);
        Ok(&*stored)
    }

    pub fn close(&mut self) {
        self.state = SessionState::Closed;
        self.baseline = None;
        self.current = PaginatedResult::default();
        self.active_filters.clear();
        self.structure = None;
        self.last_error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(n: usize) -> TableData {
        let mut data = vec![vec!["id".to_string()]];
        data.extend((1..=n).map(|i| vec![i.to_string()]));
        data
    }

    #[test]
    fn seeded_session_shows_filter_and_first_page() {
        let s = QuerySession::from_rows("", "customers", 2, "id = '42'".into(), rows(5), None);
        assert_eq!(s.state(), SessionState::Ready);
        assert_eq!(s.active_filters(), &["id = '42'".to_string()]);
        assert_eq!(s.rows().len(), 2);
        assert_eq!(s.total_rows(), 5);
        assert_eq!(s.total_pages(), 3);
        assert_eq!(s.cell(1, 0), Some("2"));
        assert_eq!(s.cell(9, 0), None);
    }

    #[test]
    fn closed_session_rejects_operations() {
        let mut s = QuerySession::from_rows("", "t", 10, "x = 1".into(), rows(1), None);
        s.close();
        assert_eq!(s.state(), SessionState::Closed);
        assert!(s.rows().is_empty());
        assert!(s.active_filters().is_empty());
        assert!(matches!(s.ensure_ready(), Err(SessionError::Closed)));
    }

    #[test]
    fn undecorated_session_has_no_foreign_keys() {
        let s = QuerySession::from_rows("", "t", 10, "x = 1".into(), rows(1), None);
        assert!(!s.is_foreign_key("customer_id"));
    }
}
