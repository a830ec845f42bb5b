//! Bounded, ordered persistence of previously ingested study materials.
//!
//! The Rust rendition of the browser's single localStorage key: the whole list
//! lives under one JSON file, newest first, capped at a fixed capacity with the
//! oldest entry evicted on overflow. A missing or corrupt file is logged and
//! treated as empty; it never aborts startup. Concurrent writers race on the
//! full list (last write wins), which is acceptable for single-user usage.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::{MaterialKind, SavedMaterial};

pub struct MaterialStore {
  path: PathBuf,
  capacity: usize,
  items: RwLock<Vec<SavedMaterial>>,
}

impl MaterialStore {
  /// Open the store at `path`, loading whatever is persisted there.
  pub fn open(path: impl Into<PathBuf>, capacity: usize) -> Self {
    let path = path.into();
    let items = load_list(&path);
    info!(target: "materials", path = %path.display(), count = items.len(), "Material store opened");
    Self { path, capacity, items: RwLock::new(items) }
  }

  /// The persisted list verbatim, index 0 = most recent.
  pub async fn list(&self) -> Vec<SavedMaterial> {
    self.items.read().await.clone()
  }

  /// Prepend a new material, truncate to capacity, persist the full list.
  #[instrument(level = "info", skip(self, content), fields(content_len = content.len(), %name))]
  pub async fn save(&self, content: String, name: String, kind: MaterialKind) -> SavedMaterial {
    let material = SavedMaterial {
      id: Uuid::new_v4().to_string(),
      name,
      content,
      timestamp: Utc::now().timestamp_millis(),
      kind,
    };
    let mut items = self.items.write().await;
    items.insert(0, material.clone());
    items.truncate(self.capacity);
    self.persist(&items).await;
    material
  }

  /// Remove the matching entry and persist the remainder. No-op on unknown id.
  #[instrument(level = "info", skip(self), fields(%id))]
  pub async fn delete(&self, id: &str) -> bool {
    let mut items = self.items.write().await;
    let before = items.len();
    items.retain(|m| m.id != id);
    if items.len() == before {
      return false;
    }
    self.persist(&items).await;
    true
  }

  /// Writes go through `tokio::fs` so a slow disk never blocks a runtime
  /// worker thread.
  async fn persist(&self, items: &[SavedMaterial]) {
    if let Some(parent) = self.path.parent() {
      if let Err(e) = tokio::fs::create_dir_all(parent).await {
        error!(target: "materials", path = %self.path.display(), error = %e, "Failed to create store directory");
        return;
      }
    }
    match serde_json::to_string(items) {
      Ok(json) => {
        if let Err(e) = tokio::fs::write(&self.path, json).await {
          error!(target: "materials", path = %self.path.display(), error = %e, "Failed to persist materials");
        }
      }
      Err(e) => error!(target: "materials", error = %e, "Failed to serialize materials"),
    }
  }
}

fn load_list(path: &Path) -> Vec<SavedMaterial> {
  let raw = match std::fs::read_to_string(path) {
    Ok(s) => s,
    Err(_) => return Vec::new(),
  };
  match serde_json::from_str(&raw) {
    Ok(items) => items,
    Err(e) => {
      warn!(target: "materials", path = %path.display(), error = %e, "Corrupt material store; starting empty");
      Vec::new()
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn store(dir: &tempfile::TempDir) -> MaterialStore {
    MaterialStore::open(dir.path().join("materials.json"), 10)
  }

  #[tokio::test]
  async fn newest_material_is_always_first() {
    let dir = tempfile::tempdir().unwrap();
    let s = store(&dir);
    s.save("one".into(), "first".into(), MaterialKind::Text).await;
    s.save("two".into(), "second".into(), MaterialKind::File).await;
    let list = s.list().await;
    assert_eq!(list.len(), 2);
    assert_eq!(list[0].name, "second");
    assert_eq!(list[1].name, "first");
  }

  #[tokio::test]
  async fn eleventh_save_evicts_the_oldest() {
    let dir = tempfile::tempdir().unwrap();
    let s = store(&dir);
    for i in 0..11 {
      s.save(format!("content {i}"), format!("note {i}"), MaterialKind::Text).await;
    }
    let list = s.list().await;
    assert_eq!(list.len(), 10);
    assert_eq!(list[0].name, "note 10");
    // "note 0" was the oldest and must be gone.
    assert!(list.iter().all(|m| m.name != "note 0"));
  }

  #[tokio::test]
  async fn delete_removes_entry_and_is_noop_on_unknown_id() {
    let dir = tempfile::tempdir().unwrap();
    let s = store(&dir);
    let kept = s.save("a".into(), "keep".into(), MaterialKind::Text).await;
    let gone = s.save("b".into(), "drop".into(), MaterialKind::Text).await;
    assert!(s.delete(&gone.id).await);
    assert!(!s.delete("no-such-id").await);
    let list = s.list().await;
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].id, kept.id);
  }

  #[tokio::test]
  async fn list_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("materials.json");
    {
      let s = MaterialStore::open(&path, 10);
      s.save("persisted".into(), "note".into(), MaterialKind::Text).await;
    }
    let s = MaterialStore::open(&path, 10);
    let list = s.list().await;
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].content, "persisted");
  }

  #[tokio::test]
  async fn corrupt_store_is_treated_as_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("materials.json");
    std::fs::write(&path, "{ not json").unwrap();
    let s = MaterialStore::open(&path, 10);
    assert!(s.list().await.is_empty());
    // And the store stays usable.
    s.save("fresh".into(), "note".into(), MaterialKind::Text).await;
    assert_eq!(s.list().await.len(), 1);
  }
}
