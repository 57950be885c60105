use super::*;

const TABLE_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS group_layout (
        group_id TEXT PRIMARY KEY,
        width REAL,
        height REAL,
        updated_at TEXT
    )",
    "CREATE TABLE IF NOT EXISTS group_layout_child (
        group_id TEXT NOT NULL,
        child_id TEXT NOT NULL,
        x REAL NOT NULL,
        y REAL NOT NULL,
        PRIMARY KEY(group_id, child_id),
        FOREIGN KEY(group_id) REFERENCES group_layout(group_id) ON DELETE CASCADE
    )",
];

const INDEX_STATEMENTS: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_group_layout_child_group ON group_layout_child(group_id)",
    "CREATE INDEX IF NOT EXISTS idx_group_layout_updated_at ON group_layout(updated_at)",
];

pub(super) fn create_tables(conn: &Connection) -> Result<(), StorageError> {
    for statement in TABLE_STATEMENTS {
        conn.execute(statement, [])?;
    }
    Ok(())
}

pub(super) fn create_indexes(conn: &Connection) -> Result<(), StorageError> {
    for statement in INDEX_STATEMENTS {
        conn.execute(statement, [])?;
    }
    Ok(())
}

/// Stamp a fresh database with the current version and refuse one written
/// by a newer build.
pub(super) fn check_schema_version(storage: &Storage) -> Result<(), StorageError> {
    let stored_version = storage.schema_version()?;
    if stored_version > SCHEMA_VERSION {
        return Err(StorageError::Other(format!(
            "Unsupported layout store schema version: {stored_version} \
             (max supported: {SCHEMA_VERSION})"
        )));
    }
    if stored_version < SCHEMA_VERSION {
        storage.set_schema_version(SCHEMA_VERSION)?;
    }
    Ok(())
}
