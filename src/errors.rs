use crate::models::enums::SessionState;

#[derive(thiserror::Error, Debug)]
pub enum DriverError {
    #[error("invalid connection url: {0}")]
    InvalidUrl(String),
    #[error("connection error: {0}")]
    Connection(String),
    #[error("driver is not connected")]
    NotConnected,
    #[error("query error: {0}")]
    Query(String),
    #[error("structure error: {0}")]
    Structure(String),
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
    #[error("operation timed out after {0}s")]
    Timeout(u64),
}

impl From<sqlx::Error> for DriverError {
    fn from(e: sqlx::Error) -> Self {
        DriverError::Query(e.to_string())
    }
}

impl From<mongodb::error::Error> for DriverError {
    fn from(e: mongodb::error::Error) -> Self {
        DriverError::Query(e.to_string())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("table view is closed")]
    Closed,
    #[error("operation not allowed while view is {0:?}")]
    InvalidState(SessionState),
    #[error("filter is empty")]
    EmptyFilter,
    #[error(transparent)]
    Driver(#[from] DriverError),
}

#[derive(thiserror::Error, Debug)]
pub enum NavigationError {
    #[error("column '{0}' is not a foreign key")]
    NotForeignKey(String),
    #[error("cell ({row}, {col}) is outside the loaded rows")]
    CellOutOfRange { row: usize, col: usize },
    /// The cell renders as `NULL` and no referenced row matches it.
    #[error("column '{0}' is NULL in this row, nothing to follow")]
    NullReference(String),
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error(transparent)]
    Session(#[from] SessionError),
}
