//! Open connections and the entry points a front end drives.

use log::{debug, info};

use crate::config::BrowserConfig;
use crate::driver::{self, Driver, TableData, TableMap};
use crate::errors::{DriverError, NavigationError, SessionError};
use crate::helpers;
use crate::models::enums::DatabaseType;
use crate::models::structs::TableStructure;
use crate::navigator;
use crate::session::QuerySession;

pub use crate::models::structs::ConnectionConfig;

/// A connected backend. One driver, one long-lived handle, reused by every
/// view opened on it until [`Connection::close`].
pub struct Connection {
    config: ConnectionConfig,
    driver: Box<dyn Driver>,
    page_size: i64,
}

fn check_kind(config: &ConnectionConfig) -> Result<(), DriverError> {
    match DatabaseType::from_url(&config.url) {
        Some(kind) if kind != config.connection_type => Err(DriverError::InvalidUrl(format!(
            "{} url given for a {} connection",
            kind.label(),
            config.connection_type.label()
        ))),
        _ => Ok(()),
    }
}

impl Connection {
    /// Probe `config` with a throwaway handle. Call before persisting it.
    pub async fn test(config: &ConnectionConfig, settings: &BrowserConfig) -> Result<(), DriverError> {
        check_kind(config)?;
        let probe = driver::open_driver(config.connection_type, settings.driver_options());
        probe.test_connection(&config.url).await?;
        debug!("Connection test passed for {}", helpers::redact_url(&config.url));
        Ok(())
    }

    /// Connect. Failure is final for this attempt.
    pub async fn open(config: ConnectionConfig, settings: &BrowserConfig) -> Result<Self, DriverError> {
        check_kind(&config)?;
        let mut driver = driver::open_driver(config.connection_type, settings.driver_options());
        driver.connect(&config.url).await?;
        info!(
            "Opened '{}' ({})",
            config.name,
            config.connection_type.label()
        );
        Ok(Self {
            config,
            driver,
            page_size: settings.page_size,
        })
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn database_type(&self) -> DatabaseType {
        self.driver.database_type()
    }

    pub fn driver(&self) -> &dyn Driver {
        self.driver.as_ref()
    }

    pub async fn list_tables(&self) -> Result<TableMap, DriverError> {
        self.driver.get_tables("").await
    }

    /// Open a view on `table` in the connection's default database (or
    /// `database`, when given), showing unfiltered page 1.
    pub async fn open_table(&self, database: &str, table: &str) -> Result<QuerySession, SessionError> {
        QuerySession::open(self.driver(), database, table, self.page_size).await
    }

    pub async fn apply_filter(&self, tab: &mut QuerySession, predicate: &str) -> Result<(), SessionError> {
        tab.apply_filter(self.driver(), predicate).await
    }

    pub async fn clear_filters(&self, tab: &mut QuerySession) -> Result<(), SessionError> {
        tab.clear_filters(self.driver()).await
    }

    pub async fn next_page(&self, tab: &mut QuerySession) -> Result<bool, SessionError> {
        tab.next_page(self.driver()).await
    }

    pub async fn prev_page(&self, tab: &mut QuerySession) -> Result<bool, SessionError> {
        tab.prev_page(self.driver()).await
    }

    pub async fn load_structure(&self, tab: &mut QuerySession) -> Result<TableStructure, SessionError> {
        tab.load_structure(self.driver()).await.cloned()
    }

    pub async fn goto_foreign_key(
        &self,
        tab: &mut QuerySession,
        row: usize,
        col: usize,
    ) -> Result<QuerySession, NavigationError> {
        navigator::goto_foreign_key(self.driver(), tab, row, col).await
    }

    /// Raw statement against the backend. MongoDB answers `Unsupported`.
    pub async fn execute_raw_query(&self, sql: &str) -> Result<TableData, DriverError> {
        self.driver.execute_query(sql).await
    }

    pub async fn close(self) {
        self.driver.close().await;
        info!("Closed '{}'", self.config.name);
    }
}
