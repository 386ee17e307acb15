use std::process::ExitCode;

use log::{error, info};
use tabscope::config::BrowserConfig;
use tabscope::driver::TableMap;
use tabscope::driver_postgres::resolve_schema;
use tabscope::models::enums::DatabaseType;
use tabscope::{Connection, ConnectionConfig};

const URL_ENV: &str = "TABSCOPE_URL";

#[tokio::main]
async fn main() -> ExitCode {
    tabscope::init_logging();
    let settings = BrowserConfig::load();

    let Some(url) = std::env::args()
        .nth(1)
        .or_else(|| std::env::var(URL_ENV).ok())
    else {
        eprintln!("usage: tabscope <connection-url>  (or set {})", URL_ENV);
        return ExitCode::from(2);
    };
    let Some(kind) = DatabaseType::from_url(&url) else {
        eprintln!("unrecognised connection url scheme");
        return ExitCode::from(2);
    };

    match run(ConnectionConfig::new("cli", kind, url), &settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: ConnectionConfig, settings: &BrowserConfig) -> Result<(), Box<dyn std::error::Error>> {
    let conn = Connection::open(config, settings).await?;
    let tables = conn.list_tables().await?;
    for (schema, names) in &tables {
        println!("{} ({} tables)", schema, names.len());
        for name in names {
            println!("  {}", name);
        }
    }

    if let Some((database, table)) = first_table(conn.database_type(), &tables) {
        let tab = conn.open_table(&database, &table).await?;
        info!("{}: page {}/{} of {} rows", table, tab.page(), tab.total_pages(), tab.total_rows());
        println!("\n{}", tab.headers().join(" | "));
        for row in tab.rows() {
            println!("{}", row.join(" | "));
        }
    }

    conn.close().await;
    Ok(())
}

/// `(database, table)` to preview. SQLite lists its tables under `main` and
/// PostgreSQL browses the resolved schema only; MySQL and MongoDB key the
/// listing by database.
fn first_table(kind: DatabaseType, tables: &TableMap) -> Option<(String, String)> {
    match kind {
        DatabaseType::PostgreSQL => {
            let schemas: Vec<String> = tables.keys().cloned().collect();
            let names = tables.get(&resolve_schema(&schemas))?;
            names.first().map(|t| (String::new(), t.clone()))
        }
        DatabaseType::SQLite => tables
            .values()
            .find_map(|names| names.first().map(|t| (String::new(), t.clone()))),
        DatabaseType::MySQL | DatabaseType::MongoDB => tables
            .iter()
            .find_map(|(db, names)| names.first().map(|t| (db.clone(), t.clone()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(entries: &[(&str, &[&str])]) -> TableMap {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.iter().map(|t| t.to_string()).collect()))
            .collect()
    }

    #[test]
    fn postgres_previews_the_resolved_schema() {
        let tables = listing(&[("billing", &["invoices"]), ("public", &["users"])]);
        assert_eq!(
            first_table(DatabaseType::PostgreSQL, &tables),
            Some((String::new(), "users".to_string()))
        );
    }

    #[test]
    fn mysql_passes_the_database_and_sqlite_passes_nothing() {
        let tables = listing(&[("main", &["audit"])]);
        assert_eq!(
            first_table(DatabaseType::SQLite, &tables),
            Some((String::new(), "audit".to_string()))
        );
        let tables = listing(&[("empty", &[]), ("shop", &["orders"])]);
        assert_eq!(
            first_table(DatabaseType::MySQL, &tables),
            Some(("shop".to_string(), "orders".to_string()))
        );
    }
}
