use aspects_core::db::migrations::latest_version;
use aspects_core::db::{open_db, open_db_in_memory, DbError};
use aspects_core::{AspectData, AspectRepository, RepoError, SqliteAspectRepository};
use rusqlite::Connection;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    assert_table_exists(&conn, "aspects");
    assert_table_exists(&conn, "aspect_properties");
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("aspects.db");

    let conn_first = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_first), latest_version());
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    assert_table_exists(&conn_second, "aspects");
}

#[test]
fn created_aspects_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("aspects.db");

    let conn = open_db(&path).unwrap();
    let repo = SqliteAspectRepository::try_new(&conn).unwrap();
    let mut data = AspectData::initial("Height");
    data.base_type = Some("Decimal".to_string());
    let id = repo.create_aspect(&data).unwrap();
    drop(conn);

    let conn = open_db(&path).unwrap();
    let repo = SqliteAspectRepository::try_new(&conn).unwrap();
    let loaded = repo.get_aspect(id, false).unwrap().unwrap();
    assert_eq!(loaded.name, "Height");
    assert_eq!(loaded.version, 1);
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
fn repository_rejects_unmigrated_connection() {
    let conn = Connection::open_in_memory().unwrap();

    let err = SqliteAspectRepository::try_new(&conn).unwrap_err();
    assert!(matches!(
        err,
        RepoError::UninitializedConnection {
            actual_version: 0,
            ..
        }
    ));
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
