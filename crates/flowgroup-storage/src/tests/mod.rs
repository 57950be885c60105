use super::*;
use flowgroup_core::InMemoryLayoutCache;
use tempfile::tempdir;

fn snapshot(group: &str, children: &[(&str, f32, f32)]) -> GroupLayoutSnapshot {
    let mut snapshot = GroupLayoutSnapshot::new(NodeId::from(group));
    snapshot.group_size = Some(Size::new(300.0, 200.0));
    for (id, x, y) in children {
        snapshot
            .positions
            .insert(NodeId::from(*id), Vec2::new(*x, *y));
    }
    snapshot
}

#[test]
fn test_save_and_load_layout() -> Result<(), StorageError> {
    let storage = Storage::new_in_memory()?;
    let stored = snapshot("g", &[("a", 10.0, 50.0), ("b", 10.0, 98.5)]);
    storage.save_layout(&stored)?;

    assert_eq!(storage.get_layout(&NodeId::from("g"))?, Some(stored));
    assert_eq!(storage.get_layout(&NodeId::from("missing"))?, None);

    let stats = storage.get_stats()?;
    assert_eq!(stats.layout_count, 1);
    assert_eq!(stats.child_count, 2);
    Ok(())
}

#[test]
fn test_save_replaces_previous_children() -> Result<(), StorageError> {
    let storage = Storage::new_in_memory()?;
    storage.save_layout(&snapshot("g", &[("a", 1.0, 2.0), ("b", 3.0, 4.0)]))?;
    storage.save_layout(&snapshot("g", &[("c", 5.0, 6.0)]))?;

    let loaded = storage.get_layout(&NodeId::from("g"))?.expect("layout stored");
    assert_eq!(loaded.positions.len(), 1);
    assert_eq!(loaded.positions[&NodeId::from("c")], Vec2::new(5.0, 6.0));
    assert_eq!(storage.get_stats()?.child_count, 1);
    Ok(())
}

#[test]
fn test_delete_and_prune() -> Result<(), StorageError> {
    let storage = Storage::new_in_memory()?;
    storage.save_layout(&snapshot("g1", &[("a", 1.0, 2.0)]))?;
    storage.save_layout(&snapshot("g2", &[("b", 1.0, 2.0)]))?;
    storage.save_layout(&snapshot("g3", &[]))?;

    assert!(storage.delete_layout(&NodeId::from("g1"))?);
    assert!(!storage.delete_layout(&NodeId::from("g1"))?);
    assert_eq!(storage.get_layout(&NodeId::from("g1"))?, None);

    let live = HashSet::from([NodeId::from("g2")]);
    assert_eq!(storage.prune_layouts(&live)?, 1);
    assert_eq!(storage.layout_group_ids()?, vec![NodeId::from("g2")]);

    storage.clear()?;
    assert_eq!(storage.get_stats()?.layout_count, 0);
    Ok(())
}

#[test]
fn test_schema_version_and_timestamp_column() -> Result<(), StorageError> {
    let storage = Storage::new_in_memory()?;
    assert_eq!(storage.schema_version()?, SCHEMA_VERSION);

    storage.save_layout(&snapshot("g", &[]))?;
    let updated_at = storage
        .layout_updated_at(&NodeId::from("g"))?
        .expect("timestamp written");
    assert!(updated_at <= Utc::now());
    Ok(())
}

#[test]
fn test_newer_schema_is_rejected() -> Result<(), StorageError> {
    let dir = tempdir().map_err(|e| StorageError::Other(e.to_string()))?;
    let path = dir.path().join("layout.db");
    {
        let storage = Storage::open(&path)?;
        storage.set_schema_version(SCHEMA_VERSION + 1)?;
    }
    assert!(matches!(Storage::open(&path), Err(StorageError::Other(_))));
    Ok(())
}

#[test]
fn test_layout_survives_reopen() -> Result<(), StorageError> {
    let dir = tempdir().map_err(|e| StorageError::Other(e.to_string()))?;
    let path = dir.path().join("layout.db");
    let stored = snapshot("g", &[("a", 10.0, 50.0)]);
    {
        let mut storage = Storage::open(&path)?;
        LayoutCache::store_layout(&mut storage, &stored)
            .map_err(|e| StorageError::Other(e.to_string()))?;
    }

    let mut storage = Storage::open(&path)?;
    let loaded = LayoutCache::load_layout(&storage, &NodeId::from("g"))
        .map_err(|e| StorageError::Other(e.to_string()))?;
    assert_eq!(loaded, Some(stored));

    LayoutCache::clear_layout(&mut storage, &NodeId::from("g"))
        .map_err(|e| StorageError::Other(e.to_string()))?;
    assert_eq!(storage.get_layout(&NodeId::from("g"))?, None);
    Ok(())
}

#[test]
fn test_matches_in_memory_cache_behaviour() -> Result<(), LayoutCacheError> {
    let mut sqlite = Storage::new_in_memory()?;
    let mut memory = InMemoryLayoutCache::new();
    let stored = snapshot("g", &[("a", 4.0, 8.0)]);

    let caches: [&mut dyn LayoutCache; 2] = [&mut sqlite, &mut memory];
    for cache in caches {
        cache.store_layout(&stored)?;
        assert_eq!(cache.load_layout(&NodeId::from("g"))?, Some(stored.clone()));
        cache.clear_layout(&NodeId::from("g"))?;
        assert_eq!(cache.load_layout(&NodeId::from("g"))?, None);
    }
    Ok(())
}
