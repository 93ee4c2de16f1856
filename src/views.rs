//! Read-only metadata views: stat snapshots, directory entries, and
//! directory streams.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::{FsError, Result};
use crate::store::{EntityId, EntityStore, NameRecord, PermRecord, StatRecord};
use crate::types::{EntryKind, Mode};
use crate::path;

/// A point-in-time snapshot of one entity's stat and permission rows.
///
/// Built by loading the current rows at construction; it does not update
/// when the entity changes afterwards. Millisecond accessors provide the
/// 64-bit-safe numeric surface for large values.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Stats {
    id: EntityId,
    size: u64,
    kind: EntryKind,
    accessed: DateTime<Utc>,
    modified: DateTime<Utc>,
    changed: DateTime<Utc>,
    created: DateTime<Utc>,
    uid: u32,
    gid: u32,
    mode: Mode,
}

impl Stats {
    pub(crate) fn from_rows(id: EntityId, stat: &StatRecord, perm: &PermRecord) -> Self {
        Self {
            id,
            size: stat.size,
            kind: stat.kind,
            accessed: stat.accessed,
            modified: stat.modified,
            changed: stat.changed,
            created: stat.created,
            uid: perm.uid,
            gid: perm.gid,
            mode: perm.mode,
        }
    }

    /// Identity of the entity this snapshot describes.
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Content size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Kind of the entity.
    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    /// True for regular files.
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    /// True for directories.
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// True for symbolic links.
    pub fn is_symlink(&self) -> bool {
        self.kind == EntryKind::Symlink
    }

    /// Last access time.
    pub fn accessed(&self) -> DateTime<Utc> {
        self.accessed
    }

    /// Last content modification time.
    pub fn modified(&self) -> DateTime<Utc> {
        self.modified
    }

    /// Last metadata change time.
    pub fn changed(&self) -> DateTime<Utc> {
        self.changed
    }

    /// Creation time.
    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    /// Last access time in milliseconds since the Unix epoch.
    pub fn accessed_ms(&self) -> i64 {
        self.accessed.timestamp_millis()
    }

    /// Last modification time in milliseconds since the Unix epoch.
    pub fn modified_ms(&self) -> i64 {
        self.modified.timestamp_millis()
    }

    /// Last metadata change time in milliseconds since the Unix epoch.
    pub fn changed_ms(&self) -> i64 {
        self.changed.timestamp_millis()
    }

    /// Creation time in milliseconds since the Unix epoch.
    pub fn created_ms(&self) -> i64 {
        self.created.timestamp_millis()
    }

    /// Owner id.
    pub fn uid(&self) -> u32 {
        self.uid
    }

    /// Group id.
    pub fn gid(&self) -> u32 {
        self.gid
    }

    /// Permission mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }
}

/// A single directory listing entry.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Dirent {
    id: EntityId,
    name: String,
    parent: String,
    kind: EntryKind,
}

impl Dirent {
    pub(crate) fn new(id: EntityId, record: &NameRecord, kind: EntryKind) -> Self {
        Self {
            id,
            name: record.name.clone(),
            parent: record.parent.clone(),
            kind,
        }
    }

    /// Identity of the entry.
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Base name within the parent directory.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the containing directory.
    pub fn parent_path(&self) -> &str {
        &self.parent
    }

    /// Full path of the entry.
    pub fn path(&self) -> String {
        path::join(&self.parent, &self.name)
    }

    /// Kind of the entry.
    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    /// True for regular files.
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    /// True for directories.
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// True for symbolic links.
    pub fn is_symlink(&self) -> bool {
        self.kind == EntryKind::Symlink
    }
}

/// A lazy stream over the immediate children of one directory.
///
/// The listing is taken on the first [`read`](DirStream::read) and served
/// one entry at a time. [`close`](DirStream::close) discards the cursor;
/// a later `read` re-lists from the start. The stream is finite and
/// restartable, never resumable mid-listing after a close.
pub struct DirStream {
    store: Arc<EntityStore>,
    dir: String,
    pending: Option<VecDeque<Dirent>>,
}

impl DirStream {
    pub(crate) fn new(store: Arc<EntityStore>, dir: String) -> Self {
        Self {
            store,
            dir,
            pending: None,
        }
    }

    /// Path of the directory this stream lists.
    pub fn path(&self) -> &str {
        &self.dir
    }

    /// Yield the next directory entry, or `None` when the listing is
    /// exhausted.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if the directory no longer exists
    /// - [`FsError::NotADirectory`] if the path no longer names a directory
    pub async fn read(&mut self) -> Result<Option<Dirent>> {
        if self.pending.is_none() {
            self.pending = Some(self.list().await?);
        }
        Ok(self.pending.as_mut().and_then(VecDeque::pop_front))
    }

    /// Drop the current cursor. The next [`read`](DirStream::read) starts
    /// a fresh listing.
    pub fn close(&mut self) {
        self.pending = None;
    }

    async fn list(&self) -> Result<VecDeque<Dirent>> {
        let view = self.store.snapshot().await;
        let id = view.resolve(&self.dir).ok_or_else(|| FsError::NotFound {
            path: self.dir.clone(),
        })?;
        let stat = view.stat(id).ok_or_else(|| FsError::NotFound {
            path: self.dir.clone(),
        })?;
        if stat.kind != EntryKind::Directory {
            return Err(FsError::NotADirectory {
                path: self.dir.clone(),
            });
        }

        Ok(view
            .children_of(&self.dir)
            .into_iter()
            .filter_map(|(id, rec)| {
                view.stat(id).map(|stat| Dirent::new(id, &rec, stat.kind))
            })
            .collect())
    }
}
