pub mod config;
pub mod connection;
pub mod dialect;
pub mod driver;
pub mod driver_mongodb;
pub mod driver_mysql;
pub mod driver_postgres;
pub mod driver_sqlite;
pub mod errors;
pub mod helpers;
pub mod models;
pub mod mongo_filter;
pub mod navigator;
pub mod session;
pub mod structure;

pub use connection::{Connection, ConnectionConfig};
pub use driver::{open_driver, Driver, DriverOptions};
pub use session::QuerySession;

/// Set up `env_logger` once. `RUST_LOG` still wins; without it this crate
/// logs at debug level. Safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_module("tabscope", log::LevelFilter::Debug)
        .is_test(false)
        .try_init();
}
