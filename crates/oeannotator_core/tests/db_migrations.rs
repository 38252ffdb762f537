use oeannotator_core::db::migrations::latest_version;
use oeannotator_core::db::{open_db, open_db_in_memory, pending_migrations, DbError};
use rusqlite::Connection;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    assert_table_exists(&conn, "projects");
    assert_table_exists(&conn, "sentences");
    assert_table_exists(&conn, "tokens");
    assert_table_exists(&conn, "annotations");
    assert_table_exists(&conn, "notes");
    assert!(!pending_migrations(&conn).unwrap());
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("oeannotator.db");

    let conn_first = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_first), latest_version());
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    assert_table_exists(&conn_second, "projects");
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn version_one_store_is_upgraded_with_data_intact() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("legacy.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(include_str!("../src/db/migrations/0001_init.sql"))
        .unwrap();
    conn.execute_batch(
        "INSERT INTO projects (id, name, created_at, updated_at)
         VALUES ('6f1c1f1e-8a57-4a39-9b0b-4a5c8f2d9c11', 'Beowulf',
                 '2024-01-01T00:00:00+00:00', '2024-01-01T00:00:00+00:00');
         INSERT INTO sentences (project_id, display_order, text_oe, text_modern)
         VALUES ('6f1c1f1e-8a57-4a39-9b0b-4a5c8f2d9c11', 0, 'Hwæt we', 'Lo, we');
         INSERT INTO tokens (sentence_id, order_index, surface) VALUES (1, 0, 'Hwæt');
         INSERT INTO annotations (token_id, pos, modern_english_meaning)
         VALUES (1, 'interjection', 'lo');
         PRAGMA user_version = 1;",
    )
    .unwrap();
    drop(conn);

    let conn = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn), latest_version());
    let (text, translation): (String, String) = conn
        .query_row(
            "SELECT text, translation FROM sentences WHERE position = 0;",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(text, "Hwæt we");
    assert_eq!(translation, "Lo, we");
    let (gloss, todo): (String, i64) = conn
        .query_row("SELECT gloss, todo FROM annotations;", [], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .unwrap();
    assert_eq!(gloss, "lo");
    assert_eq!(todo, 0);
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
