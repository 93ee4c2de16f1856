//! The entity store: key-value tables keyed by a stable integer identity.
//!
//! Five tables hold the per-entity rows: naming, stat metadata,
//! permissions, content blobs (regular files only), and symlink targets.
//! All rows for one entity are created together and deleted together.
//!
//! The store is an explicit object injected into every component. Interior
//! mutability lets all operations take `&self`; a [`StoreTxn`] is an
//! exclusive guard over every table, so a multi-row mutation is
//! all-or-nothing as observed by other tasks.

use std::collections::HashMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::path;
use crate::types::{EntryKind, Mode};

/// Stable integer identity of one filesystem entity, independent of its
/// current path. Allocated monotonically and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EntityId(pub u64);

/// The immutable root directory `/` always has identity 0.
pub const ROOT_ID: EntityId = EntityId(0);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Naming record: gives an entity its place in the tree.
///
/// `parent` is the string path of the containing directory, not a parent
/// identity. At most one record exists per `(parent, name)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NameRecord {
    /// Base name within the parent directory (empty for the root).
    pub name: String,
    /// Path of the containing directory.
    pub parent: String,
}

impl NameRecord {
    /// Reconstruct the entity's full path by joining parent and name.
    pub fn full_path(&self) -> String {
        path::join(&self.parent, &self.name)
    }
}

/// Stat record: size, kind, and the four timestamps.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatRecord {
    /// Content size in bytes (0 for directories and symlinks).
    pub size: u64,
    /// Kind of the entity.
    pub kind: EntryKind,
    /// Last access time.
    pub accessed: DateTime<Utc>,
    /// Last content modification time.
    pub modified: DateTime<Utc>,
    /// Last metadata change time.
    pub changed: DateTime<Utc>,
    /// Creation time.
    pub created: DateTime<Utc>,
}

impl StatRecord {
    /// Fresh record for a newly created entity; all timestamps set to now.
    pub fn new(kind: EntryKind) -> Self {
        let now = Utc::now();
        Self {
            size: 0,
            kind,
            accessed: now,
            modified: now,
            changed: now,
            created: now,
        }
    }
}

/// Permission record: owner, group, and the octal mode.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PermRecord {
    /// Owner id.
    pub uid: u32,
    /// Group id.
    pub gid: u32,
    /// Permission mode (owner/group/other triplets).
    pub mode: Mode,
}

impl PermRecord {
    /// Record owned by uid 0 / gid 0 with the given mode.
    pub fn with_mode(mode: Mode) -> Self {
        Self { uid: 0, gid: 0, mode }
    }
}

/// The five key-value tables, all keyed by [`EntityId`].
#[derive(Debug, Default)]
pub(crate) struct Tables {
    names: HashMap<EntityId, NameRecord>,
    stats: HashMap<EntityId, StatRecord>,
    perms: HashMap<EntityId, PermRecord>,
    blobs: HashMap<EntityId, Vec<u8>>,
    links: HashMap<EntityId, EntityId>,
}

impl Tables {
    /// Map a path to the identity of the unique naming record matching its
    /// `(parent, name)` split, if any. The root resolves to [`ROOT_ID`].
    pub(crate) fn resolve(&self, p: &str) -> Option<EntityId> {
        let (parent, name) = path::split(p);
        if name.is_empty() && parent == "/" {
            return Some(ROOT_ID);
        }
        self.names
            .iter()
            .find(|(_, rec)| rec.parent == parent && rec.name == name)
            .map(|(&id, _)| id)
    }

    pub(crate) fn name(&self, id: EntityId) -> Option<&NameRecord> {
        self.names.get(&id)
    }

    pub(crate) fn stat(&self, id: EntityId) -> Option<&StatRecord> {
        self.stats.get(&id)
    }

    pub(crate) fn perm(&self, id: EntityId) -> Option<&PermRecord> {
        self.perms.get(&id)
    }

    pub(crate) fn blob(&self, id: EntityId) -> Option<&Vec<u8>> {
        self.blobs.get(&id)
    }

    pub(crate) fn link_target(&self, id: EntityId) -> Option<EntityId> {
        self.links.get(&id).copied()
    }

    pub(crate) fn contains(&self, id: EntityId) -> bool {
        self.names.contains_key(&id)
    }

    /// Immediate children of a directory, by exact parent-path equality.
    ///
    /// The root's own naming record lives under parent `/`, so identity 0
    /// is excluded from listings.
    pub(crate) fn children_of(&self, dir: &str) -> Vec<(EntityId, NameRecord)> {
        let mut out: Vec<(EntityId, NameRecord)> = self
            .names
            .iter()
            .filter(|&(&id, rec)| id != ROOT_ID && rec.parent == dir)
            .map(|(&id, rec)| (id, rec.clone()))
            .collect();
        out.sort_by(|a, b| a.1.name.cmp(&b.1.name));
        out
    }

    /// Every entity whose stored parent path equals `dir` or lies inside
    /// it (separator-boundary aware).
    pub(crate) fn descendants_of(&self, dir: &str) -> Vec<(EntityId, NameRecord)> {
        self.names
            .iter()
            .filter(|&(&id, rec)| {
                id != ROOT_ID && (rec.parent == dir || path::is_inside(&rec.parent, dir))
            })
            .map(|(&id, rec)| (id, rec.clone()))
            .collect()
    }

    /// Count of stored entities (live stat rows).
    pub(crate) fn entity_count(&self) -> u64 {
        self.stats.len() as u64
    }
}

/// The entity store holding every table behind one lock.
#[derive(Debug)]
pub struct EntityStore {
    tables: RwLock<Tables>,
    next_id: AtomicU64,
}

impl EntityStore {
    /// Create a store with the root directory's rows in place.
    ///
    /// The root (`/`, identity 0) is a directory with mode 0o777; its rows
    /// are never deleted or renamed.
    pub fn new() -> Self {
        let mut tables = Tables::default();
        tables.names.insert(
            ROOT_ID,
            NameRecord {
                name: String::new(),
                parent: "/".to_string(),
            },
        );
        tables.stats.insert(ROOT_ID, StatRecord::new(EntryKind::Directory));
        tables
            .perms
            .insert(ROOT_ID, PermRecord::with_mode(Mode::default_dir()));

        Self {
            tables: RwLock::new(tables),
            next_id: AtomicU64::new(1),
        }
    }

    /// Begin an exclusive transaction over every table.
    ///
    /// All validation and row writes of a multi-row mutation happen under
    /// this guard, so partial states are never observable.
    pub(crate) async fn begin(&self) -> StoreTxn<'_> {
        StoreTxn {
            guard: self.tables.write().await,
            next_id: &self.next_id,
        }
    }

    /// Shared read-only snapshot of the tables.
    pub(crate) async fn snapshot(&self) -> StoreView<'_> {
        StoreView {
            guard: self.tables.read().await,
        }
    }

    /// Live count of stored entities.
    pub async fn entity_count(&self) -> u64 {
        self.tables.read().await.entity_count()
    }
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared read guard over the tables.
pub(crate) struct StoreView<'a> {
    guard: RwLockReadGuard<'a, Tables>,
}

impl Deref for StoreView<'_> {
    type Target = Tables;

    fn deref(&self) -> &Tables {
        &self.guard
    }
}

/// Exclusive write guard over the tables; the unit of atomicity for every
/// multi-row mutation.
pub(crate) struct StoreTxn<'a> {
    guard: RwLockWriteGuard<'a, Tables>,
    next_id: &'a AtomicU64,
}

impl Deref for StoreTxn<'_> {
    type Target = Tables;

    fn deref(&self) -> &Tables {
        &self.guard
    }
}

impl DerefMut for StoreTxn<'_> {
    fn deref_mut(&mut self) -> &mut Tables {
        &mut self.guard
    }
}

impl StoreTxn<'_> {
    /// Create all rows for a new entity and return its fresh identity.
    ///
    /// Writes the naming, stat, and permission rows; regular files also
    /// get an empty content blob, and symlinks a target row when given.
    pub(crate) fn create_entity(
        &mut self,
        name: NameRecord,
        kind: EntryKind,
        mode: Mode,
        link_target: Option<EntityId>,
    ) -> EntityId {
        let id = EntityId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.guard.names.insert(id, name);
        self.guard.stats.insert(id, StatRecord::new(kind));
        self.guard.perms.insert(id, PermRecord::with_mode(mode));
        if kind == EntryKind::File {
            self.guard.blobs.insert(id, Vec::new());
        }
        if let Some(target) = link_target {
            self.guard.links.insert(id, target);
        }
        id
    }

    /// Delete every per-kind row of an entity.
    pub(crate) fn delete_entity(&mut self, id: EntityId) {
        self.guard.names.remove(&id);
        self.guard.stats.remove(&id);
        self.guard.perms.remove(&id);
        self.guard.blobs.remove(&id);
        self.guard.links.remove(&id);
    }

    /// Replace an entity's naming record.
    pub(crate) fn set_name(&mut self, id: EntityId, record: NameRecord) {
        self.guard.names.insert(id, record);
    }

    /// Mutate an entity's stat row in place, bumping the change time.
    pub(crate) fn update_stat(&mut self, id: EntityId, f: impl FnOnce(&mut StatRecord)) {
        if let Some(stat) = self.guard.stats.get_mut(&id) {
            f(stat);
            stat.changed = Utc::now();
        }
    }

    /// Mutate an entity's permission row in place.
    pub(crate) fn update_perm(&mut self, id: EntityId, f: impl FnOnce(&mut PermRecord)) {
        if let Some(perm) = self.guard.perms.get_mut(&id) {
            f(perm);
        }
    }

    /// Replace a regular file's content blob, maintaining size and
    /// modification time on the stat row.
    pub(crate) fn set_blob(&mut self, id: EntityId, data: Vec<u8>) {
        let size = data.len() as u64;
        self.guard.blobs.insert(id, data);
        self.update_stat(id, |stat| {
            stat.size = size;
            stat.modified = Utc::now();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn root_exists_after_init() {
        let store = EntityStore::new();
        let view = store.snapshot().await;
        assert_eq!(view.resolve("/"), Some(ROOT_ID));
        assert_eq!(view.stat(ROOT_ID).unwrap().kind, EntryKind::Directory);
        assert_eq!(view.perm(ROOT_ID).unwrap().mode.mode(), 0o777);
    }

    #[tokio::test]
    async fn ids_are_monotonic_and_never_reused() {
        let store = EntityStore::new();
        let mut txn = store.begin().await;
        let a = txn.create_entity(
            NameRecord { name: "a".into(), parent: "/".into() },
            EntryKind::File,
            Mode::default_file(),
            None,
        );
        txn.delete_entity(a);
        let b = txn.create_entity(
            NameRecord { name: "b".into(), parent: "/".into() },
            EntryKind::File,
            Mode::default_file(),
            None,
        );
        assert!(b.0 > a.0);
    }

    #[tokio::test]
    async fn create_entity_writes_all_rows() {
        let store = EntityStore::new();
        let mut txn = store.begin().await;
        let id = txn.create_entity(
            NameRecord { name: "f".into(), parent: "/".into() },
            EntryKind::File,
            Mode::default_file(),
            None,
        );
        assert!(txn.name(id).is_some());
        assert!(txn.stat(id).is_some());
        assert!(txn.perm(id).is_some());
        assert!(txn.blob(id).is_some());
    }

    #[tokio::test]
    async fn delete_entity_removes_all_rows() {
        let store = EntityStore::new();
        let mut txn = store.begin().await;
        let id = txn.create_entity(
            NameRecord { name: "f".into(), parent: "/".into() },
            EntryKind::File,
            Mode::default_file(),
            None,
        );
        txn.delete_entity(id);
        assert!(txn.name(id).is_none());
        assert!(txn.stat(id).is_none());
        assert!(txn.perm(id).is_none());
        assert!(txn.blob(id).is_none());
    }

    #[tokio::test]
    async fn resolve_requires_exact_parent_and_name() {
        let store = EntityStore::new();
        let mut txn = store.begin().await;
        txn.create_entity(
            NameRecord { name: "b".into(), parent: "/a".into() },
            EntryKind::File,
            Mode::default_file(),
            None,
        );
        assert!(txn.resolve("/a/b").is_some());
        assert!(txn.resolve("/b").is_none());
        assert!(txn.resolve("/a/b/c").is_none());
    }

    #[tokio::test]
    async fn root_not_listed_as_its_own_child() {
        let store = EntityStore::new();
        let view = store.snapshot().await;
        assert!(view.children_of("/").is_empty());
    }

    #[tokio::test]
    async fn set_blob_maintains_size() {
        let store = EntityStore::new();
        let mut txn = store.begin().await;
        let id = txn.create_entity(
            NameRecord { name: "f".into(), parent: "/".into() },
            EntryKind::File,
            Mode::default_file(),
            None,
        );
        txn.set_blob(id, b"hello".to_vec());
        assert_eq!(txn.stat(id).unwrap().size, 5);
    }

    #[tokio::test]
    async fn descendants_respect_separator_boundary() {
        let store = EntityStore::new();
        let mut txn = store.begin().await;
        txn.create_entity(
            NameRecord { name: "x".into(), parent: "/a".into() },
            EntryKind::File,
            Mode::default_file(),
            None,
        );
        txn.create_entity(
            NameRecord { name: "y".into(), parent: "/ab".into() },
            EntryKind::File,
            Mode::default_file(),
            None,
        );
        let descendants = txn.descendants_of("/a");
        assert_eq!(descendants.len(), 1);
        assert_eq!(descendants[0].1.name, "x");
    }
}
