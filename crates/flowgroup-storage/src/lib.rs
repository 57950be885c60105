use chrono::{DateTime, Utc};
use flowgroup_core::{
    GroupLayoutSnapshot, LayoutCache, LayoutCacheError, NodeId, Size, Vec2,
};
use parking_lot::RwLock;
use rusqlite::{Connection, Row, params};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

mod row_mapping;
mod schema;

const SCHEMA_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Invalid timestamp: {0}")]
    Timestamp(#[from] chrono::ParseError),
    #[error("Other error: {0}")]
    Other(String),
}

impl From<StorageError> for LayoutCacheError {
    fn from(error: StorageError) -> Self {
        LayoutCacheError::Backend(error.to_string())
    }
}

/// SQLite-backed store for per-group child layouts captured on minimize.
pub struct Storage {
    conn: Connection,
    cache: StorageCache,
}

#[derive(Default)]
struct StorageCache {
    layouts: Arc<RwLock<HashMap<NodeId, GroupLayoutSnapshot>>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageStats {
    pub layout_count: i64,
    pub child_count: i64,
}

impl Storage {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        let _ = conn.busy_timeout(Duration::from_millis(2_500));
        let _ = conn.pragma_update(None, "foreign_keys", "ON");
        let _ = conn.pragma_update(None, "journal_mode", "WAL");
        let _ = conn.pragma_update(None, "synchronous", "NORMAL");
        let storage = Self {
            conn,
            cache: StorageCache::default(),
        };
        storage.init()?;
        Ok(storage)
    }

    pub fn new_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let _ = conn.pragma_update(None, "foreign_keys", "ON");
        let storage = Self {
            conn,
            cache: StorageCache::default(),
        };
        storage.init()?;
        Ok(storage)
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM group_layout_child", [])?;
        tx.execute("DELETE FROM group_layout", [])?;
        tx.commit()?;

        self.cache.layouts.write().clear();
        Ok(())
    }

    fn init(&self) -> Result<(), StorageError> {
        schema::create_tables(&self.conn)?;
        schema::create_indexes(&self.conn)?;
        schema::check_schema_version(self)
    }

    fn schema_version(&self) -> Result<u32, StorageError> {
        let version: i64 = self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?;
        Ok(version.max(0) as u32)
    }

    fn set_schema_version(&self, version: u32) -> Result<(), StorageError> {
        self.conn
            .pragma_update(None, "user_version", version.to_string())?;
        Ok(())
    }

    /// Replace the stored layout of `snapshot.group_id`.
    pub fn save_layout(&self, snapshot: &GroupLayoutSnapshot) -> Result<(), StorageError> {
        let group_id = snapshot.group_id.as_str();
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM group_layout_child WHERE group_id = ?1",
            params![group_id],
        )?;
        tx.execute(
            "INSERT INTO group_layout (group_id, width, height, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(group_id) DO UPDATE SET
                width = excluded.width,
                height = excluded.height,
                updated_at = excluded.updated_at",
            params![
                group_id,
                snapshot.group_size.map(|s| f64::from(s.width)),
                snapshot.group_size.map(|s| f64::from(s.height)),
                Utc::now().to_rfc3339(),
            ],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO group_layout_child (group_id, child_id, x, y)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (child_id, position) in &snapshot.positions {
                stmt.execute(params![
                    group_id,
                    child_id.as_str(),
                    f64::from(position.x),
                    f64::from(position.y),
                ])?;
            }
        }
        tx.commit()?;

        self.cache
            .layouts
            .write()
            .insert(snapshot.group_id.clone(), snapshot.clone());
        debug!(
            group_id = %snapshot.group_id,
            children = snapshot.positions.len(),
            "Saved group layout"
        );
        Ok(())
    }

    pub fn get_layout(
        &self,
        group_id: &NodeId,
    ) -> Result<Option<GroupLayoutSnapshot>, StorageError> {
        if let Some(snapshot) = self.cache.layouts.read().get(group_id) {
            return Ok(Some(snapshot.clone()));
        }

        let header = {
            let mut stmt = self
                .conn
                .prepare("SELECT width, height FROM group_layout WHERE group_id = ?1")?;
            let mut rows = stmt.query(params![group_id.as_str()])?;
            match rows.next()? {
                Some(row) => row_mapping::group_size_from_row(row)?,
                None => return Ok(None),
            }
        };

        let mut positions = BTreeMap::new();
        let mut stmt = self.conn.prepare(
            "SELECT child_id, x, y FROM group_layout_child WHERE group_id = ?1 ORDER BY child_id",
        )?;
        let mut rows = stmt.query(params![group_id.as_str()])?;
        while let Some(row) = rows.next()? {
            let (child_id, position) = row_mapping::child_position_from_row(row)?;
            positions.insert(child_id, position);
        }

        let snapshot = GroupLayoutSnapshot {
            group_id: group_id.clone(),
            group_size: header,
            positions,
        };
        self.cache
            .layouts
            .write()
            .insert(group_id.clone(), snapshot.clone());
        Ok(Some(snapshot))
    }

    /// Remove the stored layout of a group. Returns whether one existed.
    pub fn delete_layout(&self, group_id: &NodeId) -> Result<bool, StorageError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM group_layout_child WHERE group_id = ?1",
            params![group_id.as_str()],
        )?;
        let removed = tx.execute(
            "DELETE FROM group_layout WHERE group_id = ?1",
            params![group_id.as_str()],
        )?;
        tx.commit()?;
        self.cache.layouts.write().remove(group_id);
        Ok(removed > 0)
    }

    pub fn layout_group_ids(&self) -> Result<Vec<NodeId>, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT group_id FROM group_layout ORDER BY group_id")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .map(|id| id.map(NodeId::from))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    pub fn layout_updated_at(
        &self,
        group_id: &NodeId,
    ) -> Result<Option<DateTime<Utc>>, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT updated_at FROM group_layout WHERE group_id = ?1")?;
        let mut rows = stmt.query(params![group_id.as_str()])?;
        match rows.next()? {
            Some(row) => row_mapping::timestamp_from_row(row, 0),
            None => Ok(None),
        }
    }

    /// Drop stored layouts whose group is not in `live`. Returns how many
    /// were removed.
    pub fn prune_layouts(&self, live: &HashSet<NodeId>) -> Result<usize, StorageError> {
        let mut removed = 0;
        for group_id in self.layout_group_ids()? {
            if !live.contains(&group_id) && self.delete_layout(&group_id)? {
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(removed, "Pruned stale group layouts");
        }
        Ok(removed)
    }

    pub fn get_stats(&self) -> Result<StorageStats, StorageError> {
        let layout_count = self
            .conn
            .query_row("SELECT count(*) FROM group_layout", [], |row| row.get(0))?;
        let child_count = self
            .conn
            .query_row("SELECT count(*) FROM group_layout_child", [], |row| row.get(0))?;
        Ok(StorageStats {
            layout_count,
            child_count,
        })
    }
}

impl LayoutCache for Storage {
    fn store_layout(&mut self, snapshot: &GroupLayoutSnapshot) -> Result<(), LayoutCacheError> {
        Ok(self.save_layout(snapshot)?)
    }

    fn load_layout(
        &self,
        group_id: &NodeId,
    ) -> Result<Option<GroupLayoutSnapshot>, LayoutCacheError> {
        Ok(self.get_layout(group_id)?)
    }

    fn clear_layout(&mut self, group_id: &NodeId) -> Result<(), LayoutCacheError> {
        self.delete_layout(group_id)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests;
