///
/// # Integration Tests for lsql-sqlite3
///
/// End-to-end workflows over the public API: opening in-memory and
/// file-backed databases, executing DDL/DML, fetching rows one at a time and
/// in bulk, value marshaling for every storage class, and the behaviour of
/// handles after they are closed.
///

use std::fs;

use tempfile::TempDir;

use lsql_sqlite3::{open, open_with, ConnectionConfig, Error, Row, Value, MEMORY_PATH};

fn seeded(rows: i64) -> lsql_sqlite3::Connection {
    let conn = open(MEMORY_PATH).expect("Failed to open in-memory database");
    conn.execute("CREATE TABLE items(id INTEGER PRIMARY KEY, name TEXT, price REAL)")
        .expect("Failed to create table");
    for i in 1..=rows {
        conn.execute(&format!(
            "INSERT INTO items(id, name, price) VALUES ({i}, 'item-{i}', {i}.25)"
        ))
        .expect("Failed to insert row");
    }
    conn
}

#[test]
fn test_fetch_all_scenario() {
    let conn = open(":memory:").expect("open");
    conn.execute("CREATE TABLE t(a INTEGER, b TEXT)").unwrap();
    conn.execute("INSERT INTO t VALUES (1,'x'),(2,'y')").unwrap();

    let mut stmt = conn.prepare("SELECT a,b FROM t ORDER BY a").unwrap();
    let rows = stmt.fetch_all().unwrap();

    assert_eq!(
        rows,
        vec![
            Row::new(vec![Value::Integer(1), Value::from("x")]),
            Row::new(vec![Value::Integer(2), Value::from("y")]),
        ]
    );
    assert_eq!(rows[0].get(1), Some(&Value::Integer(1)));
    assert_eq!(rows[1].get(2), Some(&Value::from("y")));
}

#[test]
fn test_fetch_all_matches_sequential_fetch_one() {
    let conn = seeded(25);
    let sql = "SELECT id, name, price FROM items ORDER BY id";

    let mut stmt = conn.prepare(sql).unwrap();
    let all = stmt.fetch_all().unwrap();

    let mut stmt = conn.prepare(sql).unwrap();
    let mut one_by_one = Vec::new();
    while let Some(row) = stmt.fetch_one().unwrap() {
        one_by_one.push(row);
    }

    assert_eq!(all.len(), 25);
    assert_eq!(all, one_by_one);
    for (i, row) in all.iter().enumerate() {
        assert_eq!(row.get(1), Some(&Value::Integer(i as i64 + 1)));
    }
}

#[test]
fn test_fetch_one_after_exhaustion_is_empty() {
    let conn = seeded(1);
    let mut stmt = conn.prepare("SELECT name FROM items").unwrap();
    assert!(stmt.fetch_one().unwrap().is_some());
    assert_eq!(stmt.fetch_one().unwrap(), None);
    assert_eq!(stmt.fetch_one().unwrap(), None);
}

#[test]
fn test_empty_result_set() {
    let conn = seeded(0);
    let mut stmt = conn.prepare("SELECT * FROM items").unwrap();
    assert!(stmt.fetch_all().unwrap().is_empty());
}

#[test]
fn test_value_marshaling() {
    let conn = open(MEMORY_PATH).unwrap();
    let text = "naïve – ünïcödé ✓";
    let mut stmt = conn
        .prepare(&format!(
            "SELECT 42, 3.5, '{text}', NULL, x'00ff10', 9007199254740993"
        ))
        .unwrap();
    let row = stmt.fetch_one().unwrap().expect("one row");

    assert_eq!(row.len(), 6);
    assert_eq!(row.get(1), Some(&Value::Integer(42)));
    assert_eq!(row.get(2), Some(&Value::Float(3.5)));
    assert_eq!(
        row.get(3).and_then(Value::as_text).map(str::as_bytes),
        Some(text.as_bytes())
    );
    assert_eq!(row.get(4), Some(&Value::Null));
    assert_eq!(row.get(5), Some(&Value::Blob(vec![0x00, 0xff, 0x10])));
    assert_eq!(row.get(6), Some(&Value::Integer(9_007_199_254_740_993)));
}

#[test]
fn test_non_utf8_text_round_trips_exactly() {
    let conn = open(MEMORY_PATH).unwrap();
    conn.execute(
        "CREATE TABLE t(a INTEGER, b TEXT);
         INSERT INTO t VALUES (1, 'x'), (2, CAST(x'ff' AS TEXT)), (3, 'z');",
    )
    .unwrap();

    let mut stmt = conn.prepare("SELECT a, b, typeof(b) FROM t ORDER BY a").unwrap();
    let rows = stmt.fetch_all().unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[1].get(2), Some(&Value::Text(vec![0xff])));
    assert_eq!(rows[1].get(2).and_then(Value::as_text), None);
    assert_eq!(rows[1].get(3), Some(&Value::from("text")));
    assert_eq!(rows[2].get(2), Some(&Value::from("z")));
}

#[test]
fn test_failure_mid_fetch_all_is_not_forgotten() {
    let conn = open(MEMORY_PATH).unwrap();
    conn.execute("CREATE TABLE n(a INTEGER); INSERT INTO n VALUES (1), (0), (3);")
        .unwrap();
    let sql = "SELECT CASE WHEN a = 0 THEN abs(-9223372036854775807 - 1) ELSE a END FROM n ORDER BY rowid";

    let mut stmt = conn.prepare(sql).unwrap();
    assert!(matches!(stmt.fetch_all(), Err(Error::Step { .. })));
    assert!(matches!(stmt.fetch_all(), Err(Error::Step { .. })));

    let mut stmt = conn.prepare(sql).unwrap();
    assert!(stmt.fetch_one().unwrap().is_some());
    assert!(matches!(stmt.fetch_one(), Err(Error::Step { .. })));
    assert!(matches!(stmt.fetch_one(), Err(Error::Step { .. })));

    assert!(matches!(conn.execute(sql), Err(Error::Execute { .. })));
}

#[test]
fn test_closed_connection_rejects_work() {
    let mut conn = seeded(2);
    conn.close().unwrap();
    assert!(matches!(conn.execute("SELECT 1"), Err(Error::ConnectionClosed)));
    assert!(matches!(conn.prepare("SELECT 1"), Err(Error::ConnectionClosed)));
}

#[test]
fn test_malformed_execute_default_keeps_connection() {
    let conn = seeded(1);
    assert!(matches!(conn.execute("SELEKT 1"), Err(Error::Execute { .. })));

    let mut stmt = conn.prepare("SELECT count(*) FROM items").unwrap();
    let row = stmt.fetch_one().unwrap().unwrap();
    assert_eq!(row.get(1), Some(&Value::Integer(1)));
}

#[test]
fn test_malformed_execute_destructive_close() {
    let config = ConnectionConfig {
        close_on_execute_error: true,
        ..ConnectionConfig::default()
    };
    let conn = open_with(MEMORY_PATH, &config).unwrap();
    conn.execute("CREATE TABLE t(a)").unwrap();

    assert!(matches!(conn.execute("SELEKT 1"), Err(Error::Execute { .. })));
    assert!(conn.is_closed());
    assert!(matches!(conn.execute("INSERT INTO t VALUES (1)"), Err(Error::ConnectionClosed)));
    assert!(matches!(conn.prepare("SELECT * FROM t"), Err(Error::ConnectionClosed)));
}

#[test]
fn test_prepare_fails_fast() {
    let conn = open(MEMORY_PATH).unwrap();
    assert!(matches!(conn.prepare("SELEKT 1"), Err(Error::Prepare { .. })));
    assert!(matches!(conn.prepare("SELECT * FROM nowhere"), Err(Error::Prepare { .. })));
}

#[test]
fn test_file_backed_persistence() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let db_path = temp_dir.path().join("data.sqlite");
    let db_path = db_path.to_str().expect("utf-8 temp path");

    {
        let mut conn = open(db_path).expect("create database file");
        conn.execute("CREATE TABLE kv(k TEXT PRIMARY KEY, v INTEGER); INSERT INTO kv VALUES ('a', 1);")
            .unwrap();
        conn.close().unwrap();
    }

    let conn = open(db_path).expect("reopen database file");
    let mut stmt = conn.prepare("SELECT k, v FROM kv").unwrap();
    assert_eq!(
        stmt.fetch_all().unwrap(),
        vec![Row::new(vec![Value::from("a"), Value::Integer(1)])]
    );
}

#[test]
fn test_read_only_and_no_create() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let missing = temp_dir.path().join("missing.sqlite");
    let missing = missing.to_str().unwrap();

    let no_create = ConnectionConfig {
        create: false,
        ..ConnectionConfig::default()
    };
    assert!(matches!(open_with(missing, &no_create), Err(Error::Open { .. })));

    let existing = temp_dir.path().join("existing.sqlite");
    let existing = existing.to_str().unwrap();
    open(existing).unwrap().execute("CREATE TABLE t(a)").unwrap();

    let read_only = ConnectionConfig {
        read_only: true,
        ..ConnectionConfig::default()
    };
    let conn = open_with(existing, &read_only).unwrap();
    assert!(matches!(conn.execute("INSERT INTO t VALUES (1)"), Err(Error::Execute { .. })));
}

#[test]
fn test_config_from_file() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("lsql.toml");
    fs::write(&config_path, "busy_timeout_ms = 100\nclose_on_execute_error = true\n").unwrap();

    let config = ConnectionConfig::from_path(&config_path).expect("parse config file");
    assert_eq!(config.busy_timeout_ms, Some(100));

    let conn = open_with(MEMORY_PATH, &config).unwrap();
    assert_eq!(conn.config(), &config);
    assert_eq!(conn.path(), MEMORY_PATH);
}

#[test]
fn test_open_failure() {
    let err = open("/nonexistent-dir/sub/db.sqlite").unwrap_err();
    match err {
        Error::Open { path, message, .. } => {
            assert_eq!(path, "/nonexistent-dir/sub/db.sqlite");
            assert!(!message.is_empty());
        }
        other => panic!("expected open error, got {other:?}"),
    }
}

#[test]
fn test_close_finalizes_open_statements() {
    let mut conn = seeded(3);
    let mut first = conn.prepare("SELECT id FROM items ORDER BY id").unwrap();
    let mut second = conn.prepare("SELECT name FROM items ORDER BY id").unwrap();

    assert_eq!(first.fetch_one().unwrap().unwrap().get(1), Some(&Value::Integer(1)));
    assert_eq!(
        second.fetch_one().unwrap().unwrap().get(1),
        Some(&Value::from("item-1"))
    );

    conn.close().expect("close finalizes both statements");
    assert!(matches!(first.fetch_one(), Err(Error::ConnectionClosed)));
    assert!(matches!(second.fetch_all(), Err(Error::ConnectionClosed)));
}
