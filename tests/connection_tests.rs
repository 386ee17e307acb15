mod common;

use tabscope::config::BrowserConfig;
use tabscope::errors::DriverError;
use tabscope::models::enums::DatabaseType;
use tabscope::{Connection, ConnectionConfig};

fn sqlite_config(url: &str) -> ConnectionConfig {
    ConnectionConfig::new("shop", DatabaseType::SQLite, url)
}

#[tokio::test]
async fn test_then_open_then_browse() {
    let fx = common::fixture().await;
    let settings = BrowserConfig {
        page_size: 25,
        ..BrowserConfig::default()
    };
    let config = sqlite_config(&fx.url);

    Connection::test(&config, &settings).await.unwrap();
    let conn = Connection::open(config, &settings).await.unwrap();
    assert_eq!(conn.database_type(), DatabaseType::SQLite);

    let tables = conn.list_tables().await.unwrap();
    assert!(tables["main"].contains(&"customers".to_string()));

    let mut tab = conn.open_table("", "customers").await.unwrap();
    assert_eq!(tab.rows().len(), 25);
    assert_eq!(tab.total_pages(), 10);

    conn.apply_filter(&mut tab, "id <= 30").await.unwrap();
    assert_eq!(tab.total_pages(), 2);
    assert!(conn.next_page(&mut tab).await.unwrap());
    assert_eq!(tab.rows().len(), 5);
    assert!(!conn.next_page(&mut tab).await.unwrap());
    assert!(conn.prev_page(&mut tab).await.unwrap());
    conn.clear_filters(&mut tab).await.unwrap();
    assert_eq!(tab.total_rows(), 250);

    let structure = conn.load_structure(&mut tab).await.unwrap();
    assert_eq!(structure.columns.len(), 3);

    conn.close().await;
}

#[tokio::test]
async fn raw_query_and_fk_navigation_through_connection() {
    let fx = common::fixture().await;
    let conn = Connection::open(sqlite_config(&fx.url), &BrowserConfig::default())
        .await
        .unwrap();

    let result = conn
        .execute_raw_query("SELECT name FROM customers WHERE id = 7")
        .await
        .unwrap();
    assert_eq!(result, vec![vec!["name"], vec!["customer 7"]]);

    let mut orders = conn.open_table("", "orders").await.unwrap();
    let target = conn.goto_foreign_key(&mut orders, 2, 1).await.unwrap();
    assert_eq!(target.table(), "customers");
    assert_eq!(target.active_filters(), &["id = '7'".to_string()]);
    assert_eq!(target.cell(0, 0), Some("7"));
}

#[tokio::test]
async fn bad_targets_fail_to_open() {
    let fx = common::fixture().await;
    let missing = format!("sqlite://{}", fx.dir.path().join("absent.db").display());
    let settings = BrowserConfig::default();

    assert!(matches!(
        Connection::test(&sqlite_config(&missing), &settings).await,
        Err(DriverError::Connection(_))
    ));
    assert!(Connection::open(sqlite_config(&missing), &settings).await.is_err());

    let mismatched = ConnectionConfig::new("x", DatabaseType::SQLite, "mysql://u:p@tcp(h:3306)/db");
    assert!(matches!(
        Connection::open(mismatched, &settings).await,
        Err(DriverError::InvalidUrl(_))
    ));
}
