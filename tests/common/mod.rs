#![allow(dead_code)]

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tempfile::TempDir;

use tabscope::driver::{Driver, DriverOptions};
use tabscope::driver_sqlite::SqliteDriver;

const SCHEMA: &str = r#"
CREATE TABLE customers (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    status TEXT NOT NULL
);
WITH RECURSIVE seq(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM seq WHERE n < 250)
INSERT INTO customers (id, name, status)
SELECT n, 'customer ' || n, CASE WHEN n % 5 = 0 THEN 'inactive' ELSE 'active' END FROM seq;

CREATE TABLE orders (
    id INTEGER PRIMARY KEY,
    customer_id INTEGER REFERENCES customers(id) ON DELETE CASCADE,
    total REAL,
    note TEXT
);
CREATE INDEX idx_orders_customer ON orders(customer_id);

CREATE TABLE audit (id INTEGER PRIMARY KEY AUTOINCREMENT, msg TEXT);
CREATE TRIGGER trg_orders_audit AFTER INSERT ON orders
BEGIN
    INSERT INTO audit (msg) VALUES ('new order');
END;

INSERT INTO orders (id, customer_id, total, note) VALUES
    (1, 42, 10.5, 'first'),
    (2, NULL, 3.0, NULL),
    (3, 7, 1.25, 'it''s');

CREATE TABLE codes (code TEXT PRIMARY KEY, label TEXT NOT NULL);
INSERT INTO codes (code, label) VALUES ('NULL', 'spelled null'), ('A', 'alpha');
CREATE TABLE items (id INTEGER PRIMARY KEY, code TEXT REFERENCES codes(code));
INSERT INTO items (id, code) VALUES (1, 'NULL'), (2, NULL), (3, 'A');

CREATE TABLE "order" ("group" TEXT PRIMARY KEY, "select" INTEGER);
INSERT INTO "order" ("group", "select") VALUES ('a', 1), ('b', 2);
"#;

/// A seeded SQLite file that lives as long as the returned directory.
pub struct Fixture {
    pub dir: TempDir,
    pub url: String,
}

pub async fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shop.db");
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(
            SqliteConnectOptions::new()
                .filename(&path)
                .create_if_missing(true),
        )
        .await
        .unwrap();
    sqlx::raw_sql(SCHEMA).execute(&pool).await.unwrap();
    pool.close().await;

    Fixture {
        url: format!("sqlite://{}", path.display()),
        dir,
    }
}

/// Run `sql` against the fixture file behind the driver's back.
pub async fn execute(fixture: &Fixture, sql: &str) {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&fixture.url)
        .await
        .unwrap();
    sqlx::raw_sql(sql).execute(&pool).await.unwrap();
    pool.close().await;
}

pub async fn connected(fixture: &Fixture) -> SqliteDriver {
    let mut driver = SqliteDriver::new(DriverOptions::default());
    driver.connect(&fixture.url).await.unwrap();
    driver
}
