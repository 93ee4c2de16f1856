//! The asynchronous filesystem facade over the entity store.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::{FsError, Result};
use crate::handle::FileHandle;
use crate::path;
use crate::store::{EntityId, EntityStore, NameRecord, StoreTxn, ROOT_ID};
use crate::types::{access, AccessClass, EntryKind, FsStat, Mode};
use crate::views::{DirStream, Dirent, Stats};

/// Directory that [`TableFs::make_temp_dir`] roots its entries under.
const TEMP_ROOT: &str = "/tmp";

/// A hierarchical, permission-checked virtual filesystem backed by the
/// key-value tables of an [`EntityStore`].
///
/// Every operation takes `&self`; the store's interior locking provides
/// thread safety, and multi-row mutations are applied under one exclusive
/// guard so no partial state is ever observable. Cloning is cheap and all
/// clones share the same tree.
///
/// # Examples
///
/// ```rust
/// use tablefs::TableFs;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> tablefs::Result<()> {
/// let fs = TableFs::new();
/// fs.create_dir_all("/a/b").await?;
/// fs.write_file("/a/b/f.txt", b"hi").await?;
/// assert_eq!(fs.stat("/a/b/f.txt").await?.size(), 2);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TableFs {
    store: Arc<EntityStore>,
}

impl Default for TableFs {
    fn default() -> Self {
        Self::new()
    }
}

impl TableFs {
    /// Create an empty filesystem containing only the root directory.
    pub fn new() -> Self {
        Self {
            store: Arc::new(EntityStore::new()),
        }
    }

    /// Wrap an existing store.
    pub fn with_store(store: Arc<EntityStore>) -> Self {
        Self { store }
    }

    /// The backing entity store.
    pub fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Whether a path resolves to an entity.
    pub async fn exists(&self, p: &str) -> Result<bool> {
        let p = path::normalize(p);
        Ok(self.store.snapshot().await.resolve(&p).is_some())
    }

    /// Check an access mask (`F_OK`/`R_OK`/`W_OK`/`X_OK` combinations)
    /// against the owner permission triplet.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if the path does not resolve
    /// - [`FsError::PermissionDenied`] if a requested bit is missing
    pub async fn access(&self, p: &str, mask: u32) -> Result<()> {
        let p = path::normalize(p);
        let view = self.store.snapshot().await;
        let id = view
            .resolve(&p)
            .ok_or_else(|| FsError::NotFound { path: p.clone() })?;
        let perm = view
            .perm(id)
            .ok_or_else(|| FsError::NotFound { path: p.clone() })?;
        if perm.mode.allows(mask, AccessClass::Owner) {
            Ok(())
        } else {
            Err(FsError::PermissionDenied {
                path: p,
                operation: "access",
            })
        }
    }

    /// Snapshot an entity's stat and permission rows.
    pub async fn stat(&self, p: &str) -> Result<Stats> {
        let p = path::normalize(p);
        let view = self.store.snapshot().await;
        let id = view
            .resolve(&p)
            .ok_or_else(|| FsError::NotFound { path: p.clone() })?;
        let stat = view
            .stat(id)
            .ok_or_else(|| FsError::NotFound { path: p.clone() })?;
        let perm = view
            .perm(id)
            .ok_or_else(|| FsError::NotFound { path: p.clone() })?;
        Ok(Stats::from_rows(id, stat, perm))
    }

    /// Synthetic filesystem statistics for the root.
    ///
    /// Only `/` is a mount point; every other path is rejected.
    ///
    /// # Errors
    ///
    /// - [`FsError::Unsupported`] for any path other than `/`
    pub async fn statfs(&self, p: &str) -> Result<FsStat> {
        if path::normalize(p) != "/" {
            return Err(FsError::Unsupported {
                operation: "statfs on a non-root path",
            });
        }
        Ok(FsStat::with_entity_count(self.store.entity_count().await))
    }

    // ========================================================================
    // Files
    // ========================================================================

    /// Open a regular file, creating it when absent (create-or-get).
    ///
    /// A newly created file gets `mode` (default 0o666). Opening requires
    /// the owner read and write bits.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] when creating under a missing parent
    /// - [`FsError::NotADirectory`] when the parent is not a directory
    /// - [`FsError::NotAFile`] if the path names a directory or symlink
    /// - [`FsError::PermissionDenied`] without owner read+write
    pub async fn open(&self, p: &str, mode: Option<u32>) -> Result<FileHandle> {
        let p = path::normalize(p);
        let mut txn = self.store.begin().await;
        let id = self.file_at(&mut txn, &p, mode)?;
        let perm = txn
            .perm(id)
            .ok_or_else(|| FsError::NotFound { path: p.clone() })?;
        if !perm.mode.allows(access::R_OK | access::W_OK, AccessClass::Owner) {
            return Err(FsError::PermissionDenied {
                path: p,
                operation: "open",
            });
        }
        drop(txn);
        Ok(FileHandle::new(Arc::clone(&self.store), id))
    }

    /// Read a regular file's whole content.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if the path does not resolve
    /// - [`FsError::NotAFile`] if it is not a regular file
    /// - [`FsError::PermissionDenied`] without the owner read bit
    pub async fn read_file(&self, p: &str) -> Result<Vec<u8>> {
        let p = path::normalize(p);
        let view = self.store.snapshot().await;
        let id = view
            .resolve(&p)
            .ok_or_else(|| FsError::NotFound { path: p.clone() })?;
        let stat = view
            .stat(id)
            .ok_or_else(|| FsError::NotFound { path: p.clone() })?;
        if stat.kind != EntryKind::File {
            return Err(FsError::NotAFile { path: p });
        }
        let perm = view
            .perm(id)
            .ok_or_else(|| FsError::NotFound { path: p.clone() })?;
        if !perm.mode.allows(access::R_OK, AccessClass::Owner) {
            return Err(FsError::PermissionDenied {
                path: p,
                operation: "read",
            });
        }
        Ok(view.blob(id).cloned().unwrap_or_default())
    }

    /// Replace a regular file's whole content, creating the file when
    /// absent. Size and modification time follow the new content.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] when creating under a missing parent
    /// - [`FsError::NotAFile`] if the path names a directory or symlink
    /// - [`FsError::PermissionDenied`] without the owner write bit
    pub async fn write_file(&self, p: &str, data: &[u8]) -> Result<()> {
        let p = path::normalize(p);
        let mut txn = self.store.begin().await;
        let id = self.file_at(&mut txn, &p, None)?;
        self.require_owner_bit(&txn, id, &p, access::W_OK, "write")?;
        txn.set_blob(id, data.to_vec());
        tracing::debug!(path = %p, bytes = data.len(), "wrote file");
        Ok(())
    }

    /// Append to a regular file, creating it when absent.
    ///
    /// # Errors
    ///
    /// Same as [`TableFs::write_file`].
    pub async fn append_file(&self, p: &str, data: &[u8]) -> Result<()> {
        let p = path::normalize(p);
        let mut txn = self.store.begin().await;
        let id = self.file_at(&mut txn, &p, None)?;
        self.require_owner_bit(&txn, id, &p, access::W_OK, "append")?;
        let mut blob = txn.blob(id).cloned().unwrap_or_default();
        blob.extend_from_slice(data);
        txn.set_blob(id, blob);
        Ok(())
    }

    /// Shrink a regular file's content to at most `len` bytes. Never
    /// extends.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if the path does not resolve
    /// - [`FsError::NotAFile`] if it is not a regular file
    /// - [`FsError::PermissionDenied`] without the owner write bit
    pub async fn truncate(&self, p: &str, len: u64) -> Result<()> {
        let p = path::normalize(p);
        let mut txn = self.store.begin().await;
        let id = txn
            .resolve(&p)
            .ok_or_else(|| FsError::NotFound { path: p.clone() })?;
        let stat = txn
            .stat(id)
            .ok_or_else(|| FsError::NotFound { path: p.clone() })?;
        if stat.kind != EntryKind::File {
            return Err(FsError::NotAFile { path: p });
        }
        self.require_owner_bit(&txn, id, &p, access::W_OK, "truncate")?;
        let mut blob = txn.blob(id).cloned().unwrap_or_default();
        blob.truncate(len.min(blob.len() as u64) as usize);
        txn.set_blob(id, blob);
        Ok(())
    }

    /// Copy one regular file's content to a new or existing file.
    pub async fn copy_file(&self, src: &str, dst: &str) -> Result<()> {
        let data = self.read_file(src).await?;
        self.write_file(dst, &data).await
    }

    /// Recursively copy a subtree.
    ///
    /// Directories are recreated and descended into, regular files copied
    /// by content, and symlinks recreated pointing at the source link's
    /// resolved target.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if `src` does not resolve
    /// - [`FsError::NotADirectory`] if `dst`'s parent is not a directory
    pub async fn copy_tree(&self, src: &str, dst: &str) -> Result<()> {
        let src = path::normalize(src);
        let dst = path::normalize(dst);

        let (dst_parent, _) = path::split(&dst);
        let view = self.store.snapshot().await;
        match view.resolve(&dst_parent).and_then(|id| view.stat(id)) {
            Some(stat) if stat.kind == EntryKind::Directory => {}
            Some(_) => return Err(FsError::NotADirectory { path: dst_parent }),
            None => return Err(FsError::NotFound { path: dst_parent }),
        }
        drop(view);

        self.copy_tree_inner(src, dst).await
    }

    fn copy_tree_inner(
        &self,
        src: String,
        dst: String,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let stat = self.stat(&src).await?;
            match stat.kind() {
                EntryKind::Directory => {
                    self.create_dir_all(&dst).await?;
                    for entry in self.read_dir(&src).await? {
                        self.copy_tree_inner(entry.path(), path::join(&dst, entry.name()))
                            .await?;
                    }
                    Ok(())
                }
                EntryKind::Symlink => {
                    let target = self.realpath(&src).await?;
                    self.link(&target, &dst).await
                }
                EntryKind::File => {
                    let data = self.read_file(&src).await?;
                    self.write_file(&dst, &data).await
                }
            }
        })
    }

    // ========================================================================
    // Directories
    // ========================================================================

    /// Create a single directory. The parent must already exist.
    ///
    /// # Errors
    ///
    /// - [`FsError::AlreadyExists`] if the path resolves
    /// - [`FsError::NotFound`] if the parent does not resolve
    /// - [`FsError::NotADirectory`] if the parent is not a directory
    pub async fn create_dir(&self, p: &str, mode: Option<u32>) -> Result<()> {
        let p = path::normalize(p);
        let mut txn = self.store.begin().await;
        if txn.resolve(&p).is_some() {
            return Err(FsError::AlreadyExists {
                path: p,
                operation: "create_dir",
            });
        }
        let (parent, name) = path::split(&p);
        let parent_id = txn
            .resolve(&parent)
            .ok_or_else(|| FsError::NotFound { path: parent.clone() })?;
        let parent_stat = txn
            .stat(parent_id)
            .ok_or_else(|| FsError::NotFound { path: parent.clone() })?;
        if parent_stat.kind != EntryKind::Directory {
            return Err(FsError::NotADirectory { path: parent });
        }
        txn.create_entity(
            NameRecord { name, parent },
            EntryKind::Directory,
            mode.map_or_else(Mode::default_dir, Mode::from_mode),
            None,
        );
        tracing::debug!(path = %p, "created directory");
        Ok(())
    }

    /// Create a directory and every missing ancestor, idempotently.
    ///
    /// Succeeds when the target already exists as a directory.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotADirectory`] if a path component exists as a
    ///   non-directory
    pub async fn create_dir_all(&self, p: &str) -> Result<()> {
        let p = path::normalize(p);
        let mut txn = self.store.begin().await;
        ensure_dirs(&mut txn, &p)?;
        Ok(())
    }

    /// Create a uniquely named directory under `/tmp` and return its path.
    ///
    /// The name is a short hash of `prefix`; a numeric suffix is appended
    /// on collision, so repeated calls with the same prefix each get a
    /// fresh directory. `/tmp` is created on first use.
    pub async fn make_temp_dir(&self, prefix: &str) -> Result<String> {
        let base = path::join(TEMP_ROOT, &temp_hash(prefix));
        let mut txn = self.store.begin().await;
        ensure_dirs(&mut txn, TEMP_ROOT)?;

        let mut candidate = base.clone();
        let mut n = 0u32;
        while txn.resolve(&candidate).is_some() {
            n += 1;
            candidate = format!("{base}-{n}");
        }

        let (parent, name) = path::split(&candidate);
        txn.create_entity(
            NameRecord { name, parent },
            EntryKind::Directory,
            Mode::default_dir(),
            None,
        );
        tracing::debug!(path = %candidate, "created temp directory");
        Ok(candidate)
    }

    /// List a directory's immediate children, sorted by name.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if the path does not resolve
    /// - [`FsError::NotADirectory`] if it is not a directory
    pub async fn read_dir(&self, p: &str) -> Result<Vec<Dirent>> {
        let p = path::normalize(p);
        let view = self.store.snapshot().await;
        let id = view
            .resolve(&p)
            .ok_or_else(|| FsError::NotFound { path: p.clone() })?;
        let stat = view
            .stat(id)
            .ok_or_else(|| FsError::NotFound { path: p.clone() })?;
        if stat.kind != EntryKind::Directory {
            return Err(FsError::NotADirectory { path: p });
        }
        Ok(view
            .children_of(&p)
            .into_iter()
            .filter_map(|(id, rec)| view.stat(id).map(|stat| Dirent::new(id, &rec, stat.kind)))
            .collect())
    }

    /// Open a restartable stream over a directory's immediate children.
    ///
    /// The directory is validated now; the listing itself is taken lazily
    /// on the stream's first read.
    pub async fn open_dir(&self, p: &str) -> Result<DirStream> {
        let p = path::normalize(p);
        let view = self.store.snapshot().await;
        let id = view
            .resolve(&p)
            .ok_or_else(|| FsError::NotFound { path: p.clone() })?;
        let stat = view
            .stat(id)
            .ok_or_else(|| FsError::NotFound { path: p.clone() })?;
        if stat.kind != EntryKind::Directory {
            return Err(FsError::NotADirectory { path: p });
        }
        Ok(DirStream::new(Arc::clone(&self.store), p))
    }

    // ========================================================================
    // Tree mutation
    // ========================================================================

    /// Move an entity, rewriting the stored parent paths of a directory's
    /// whole subtree in the same atomic step.
    ///
    /// Renaming a path to itself is a no-op. Missing ancestors of the
    /// destination are created.
    ///
    /// # Errors
    ///
    /// - [`FsError::InvalidPath`] if either endpoint is the root, or a
    ///   directory would move into its own subtree
    /// - [`FsError::NotFound`] if `old` does not resolve
    /// - [`FsError::AlreadyExists`] if `new` resolves
    pub async fn rename(&self, old: &str, new: &str) -> Result<()> {
        let old = path::normalize(old);
        let new = path::normalize(new);
        if old == new {
            return Ok(());
        }
        if old == "/" || new == "/" {
            return Err(FsError::InvalidPath {
                path: "/".to_string(),
                reason: "the root cannot be a rename endpoint",
            });
        }

        let mut txn = self.store.begin().await;
        let id = txn
            .resolve(&old)
            .ok_or_else(|| FsError::NotFound { path: old.clone() })?;
        if txn.resolve(&new).is_some() {
            return Err(FsError::AlreadyExists {
                path: new,
                operation: "rename",
            });
        }
        let is_dir = txn
            .stat(id)
            .is_some_and(|stat| stat.kind == EntryKind::Directory);
        if is_dir && path::is_inside(&new, &old) {
            return Err(FsError::InvalidPath {
                path: new,
                reason: "destination lies inside the renamed directory",
            });
        }

        let (new_parent, new_name) = path::split(&new);
        ensure_dirs(&mut txn, &new_parent)?;
        txn.set_name(
            id,
            NameRecord {
                name: new_name,
                parent: new_parent,
            },
        );

        if is_dir {
            // Rewrite stored parent paths across the subtree. The boundary
            // check keeps /ab out of a rename of /a.
            for (child, rec) in txn.descendants_of(&old) {
                let parent = if rec.parent == old {
                    new.clone()
                } else {
                    format!("{new}{}", &rec.parent[old.len()..])
                };
                txn.set_name(
                    child,
                    NameRecord {
                        name: rec.name,
                        parent,
                    },
                );
            }
        }
        tracing::debug!(from = %old, to = %new, "renamed");
        Ok(())
    }

    /// Remove a single entity.
    ///
    /// Directories must be empty; any entity must carry the owner write
    /// bit. Fails on the root.
    ///
    /// # Errors
    ///
    /// - [`FsError::InvalidPath`] for the root
    /// - [`FsError::NotFound`] if the path does not resolve
    /// - [`FsError::PermissionDenied`] without the owner write bit
    /// - [`FsError::DirectoryNotEmpty`] for a non-empty directory
    pub async fn remove(&self, p: &str) -> Result<()> {
        let p = path::normalize(p);
        if p == "/" {
            return Err(FsError::InvalidPath {
                path: p,
                reason: "the root cannot be removed",
            });
        }
        let mut txn = self.store.begin().await;
        let id = txn
            .resolve(&p)
            .ok_or_else(|| FsError::NotFound { path: p.clone() })?;
        self.require_owner_bit(&txn, id, &p, access::W_OK, "remove")?;
        let is_dir = txn
            .stat(id)
            .is_some_and(|stat| stat.kind == EntryKind::Directory);
        if is_dir && !txn.children_of(&p).is_empty() {
            return Err(FsError::DirectoryNotEmpty { path: p });
        }
        txn.delete_entity(id);
        tracing::debug!(path = %p, "removed");
        Ok(())
    }

    /// Remove an entity and, for directories, every descendant.
    ///
    /// # Errors
    ///
    /// - [`FsError::InvalidPath`] for the root
    /// - [`FsError::NotFound`] if the path does not resolve
    pub async fn remove_recursive(&self, p: &str) -> Result<()> {
        let p = path::normalize(p);
        if p == "/" {
            return Err(FsError::InvalidPath {
                path: p,
                reason: "the root cannot be removed",
            });
        }
        let mut txn = self.store.begin().await;
        let id = txn
            .resolve(&p)
            .ok_or_else(|| FsError::NotFound { path: p.clone() })?;
        for (child, _) in txn.descendants_of(&p) {
            txn.delete_entity(child);
        }
        txn.delete_entity(id);
        tracing::debug!(path = %p, "removed recursively");
        Ok(())
    }

    // ========================================================================
    // Symbolic links
    // ========================================================================

    /// Create a symlink at `link_path` pointing at the entity `existing`
    /// currently resolves to.
    ///
    /// The link records the target's identity, so it keeps pointing at the
    /// same entity across renames.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if `existing` does not resolve
    /// - [`FsError::AlreadyExists`] if `link_path` resolves
    pub async fn link(&self, existing: &str, link_path: &str) -> Result<()> {
        let existing = path::normalize(existing);
        let link_path = path::normalize(link_path);
        let mut txn = self.store.begin().await;
        let target = txn
            .resolve(&existing)
            .ok_or_else(|| FsError::NotFound { path: existing.clone() })?;
        if txn.resolve(&link_path).is_some() {
            return Err(FsError::AlreadyExists {
                path: link_path,
                operation: "link",
            });
        }
        let (parent, name) = path::split(&link_path);
        txn.create_entity(
            NameRecord { name, parent },
            EntryKind::Symlink,
            Mode::default_dir(),
            Some(target),
        );
        tracing::debug!(link = %link_path, target = %existing, "created symlink");
        Ok(())
    }

    /// Read a symlink's target path.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if the path (or its target) does not resolve
    /// - [`FsError::NotASymlink`] if the path is not a symlink
    pub async fn read_link(&self, p: &str) -> Result<String> {
        let p = path::normalize(p);
        let view = self.store.snapshot().await;
        let id = view
            .resolve(&p)
            .ok_or_else(|| FsError::NotFound { path: p.clone() })?;
        let stat = view
            .stat(id)
            .ok_or_else(|| FsError::NotFound { path: p.clone() })?;
        if stat.kind != EntryKind::Symlink {
            return Err(FsError::NotASymlink { path: p });
        }
        view.link_target(id)
            .and_then(|target| view.name(target))
            .map(NameRecord::full_path)
            .ok_or(FsError::NotFound { path: p })
    }

    /// Resolve a path to its canonical form, following a symlink to its
    /// target's current path.
    pub async fn realpath(&self, p: &str) -> Result<String> {
        let p = path::normalize(p);
        let view = self.store.snapshot().await;
        let id = view
            .resolve(&p)
            .ok_or_else(|| FsError::NotFound { path: p.clone() })?;
        match view.link_target(id) {
            Some(target) => view
                .name(target)
                .map(NameRecord::full_path)
                .ok_or(FsError::NotFound { path: p }),
            None => Ok(p),
        }
    }

    /// Remove a symlink. Only symlinks; files and directories go through
    /// [`TableFs::remove`].
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if the path does not resolve
    /// - [`FsError::NotASymlink`] if the path is not a symlink
    pub async fn unlink(&self, p: &str) -> Result<()> {
        let p = path::normalize(p);
        let mut txn = self.store.begin().await;
        let id = txn
            .resolve(&p)
            .ok_or_else(|| FsError::NotFound { path: p.clone() })?;
        let stat = txn
            .stat(id)
            .ok_or_else(|| FsError::NotFound { path: p.clone() })?;
        if stat.kind != EntryKind::Symlink {
            return Err(FsError::NotASymlink { path: p });
        }
        txn.delete_entity(id);
        Ok(())
    }

    // ========================================================================
    // Metadata mutation
    // ========================================================================

    /// Set an entity's permission mode.
    pub async fn chmod(&self, p: &str, mode: u32) -> Result<()> {
        let p = path::normalize(p);
        let mut txn = self.store.begin().await;
        let id = txn
            .resolve(&p)
            .ok_or_else(|| FsError::NotFound { path: p.clone() })?;
        txn.update_perm(id, |perm| perm.mode = Mode::from_mode(mode));
        Ok(())
    }

    /// Set an entity's owner and group.
    pub async fn chown(&self, p: &str, uid: u32, gid: u32) -> Result<()> {
        let p = path::normalize(p);
        let mut txn = self.store.begin().await;
        let id = txn
            .resolve(&p)
            .ok_or_else(|| FsError::NotFound { path: p.clone() })?;
        txn.update_perm(id, |perm| {
            perm.uid = uid;
            perm.gid = gid;
        });
        Ok(())
    }

    /// Set an entity's access and modification times.
    pub async fn utimes(
        &self,
        p: &str,
        atime: DateTime<Utc>,
        mtime: DateTime<Utc>,
    ) -> Result<()> {
        let p = path::normalize(p);
        let mut txn = self.store.begin().await;
        let id = txn
            .resolve(&p)
            .ok_or_else(|| FsError::NotFound { path: p.clone() })?;
        txn.update_stat(id, |stat| {
            stat.accessed = atime;
            stat.modified = mtime;
        });
        Ok(())
    }

    // ========================================================================
    // Unsupported surface
    // ========================================================================

    /// Change notification is not supported.
    pub fn watch(&self, _p: &str) -> Result<()> {
        Err(FsError::Unsupported { operation: "watch" })
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Create-or-get a regular file at `p`. A new file gets `mode`
    /// (default 0o666); the parent must already exist as a directory.
    fn file_at(&self, txn: &mut StoreTxn<'_>, p: &str, mode: Option<u32>) -> Result<EntityId> {
        if let Some(id) = txn.resolve(p) {
            let stat = txn
                .stat(id)
                .ok_or_else(|| FsError::NotFound { path: p.to_string() })?;
            if stat.kind != EntryKind::File {
                return Err(FsError::NotAFile { path: p.to_string() });
            }
            return Ok(id);
        }
        let (parent, name) = path::split(p);
        let parent_id = txn
            .resolve(&parent)
            .ok_or_else(|| FsError::NotFound { path: parent.clone() })?;
        let parent_stat = txn
            .stat(parent_id)
            .ok_or_else(|| FsError::NotFound { path: parent.clone() })?;
        if parent_stat.kind != EntryKind::Directory {
            return Err(FsError::NotADirectory { path: parent });
        }
        Ok(txn.create_entity(
            NameRecord { name, parent },
            EntryKind::File,
            mode.map_or_else(Mode::default_file, Mode::from_mode),
            None,
        ))
    }

    fn require_owner_bit(
        &self,
        txn: &StoreTxn<'_>,
        id: EntityId,
        p: &str,
        mask: u32,
        operation: &'static str,
    ) -> Result<()> {
        let perm = txn
            .perm(id)
            .ok_or_else(|| FsError::NotFound { path: p.to_string() })?;
        if perm.mode.allows(mask, AccessClass::Owner) {
            Ok(())
        } else {
            Err(FsError::PermissionDenied {
                path: p.to_string(),
                operation,
            })
        }
    }
}

/// Walk `dir` component by component, creating missing directories with
/// the default mode. Idempotent; fails if a component exists as a
/// non-directory.
fn ensure_dirs(txn: &mut StoreTxn<'_>, dir: &str) -> Result<EntityId> {
    let normalized = path::normalize(dir);
    if normalized == "/" {
        return Ok(ROOT_ID);
    }
    let mut id = ROOT_ID;
    let mut parent = "/".to_string();
    for name in normalized[1..].split('/') {
        let full = path::join(&parent, name);
        match txn.resolve(&full) {
            Some(existing) => {
                let stat = txn
                    .stat(existing)
                    .ok_or_else(|| FsError::NotFound { path: full.clone() })?;
                if stat.kind != EntryKind::Directory {
                    return Err(FsError::NotADirectory { path: full });
                }
                id = existing;
            }
            None => {
                id = txn.create_entity(
                    NameRecord {
                        name: name.to_string(),
                        parent: parent.clone(),
                    },
                    EntryKind::Directory,
                    Mode::default_dir(),
                    None,
                );
            }
        }
        parent = full;
    }
    Ok(id)
}

/// Short hexadecimal hash of a temp-directory prefix.
///
/// The prefix is left-padded with `0` to six UTF-16 units, folded with the
/// classic `h*31 + unit` rolling hash in wrapping 32-bit arithmetic, and
/// rendered as at most six lowercase hex digits.
fn temp_hash(prefix: &str) -> String {
    let units: Vec<u16> = prefix.encode_utf16().collect();
    let mut h: i32 = 0;
    for _ in units.len()..6 {
        h = (h.wrapping_shl(5)).wrapping_sub(h).wrapping_add('0' as i32);
    }
    for &u in &units {
        h = (h.wrapping_shl(5)).wrapping_sub(h).wrapping_add(i32::from(u));
    }
    let hex = format!("{:x}", h as u32);
    hex[..hex.len().min(6)].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn root_always_exists() {
        let fs = TableFs::new();
        assert!(fs.exists("/").await.unwrap());
        assert!(fs.stat("/").await.unwrap().is_dir());
    }

    #[tokio::test]
    async fn create_dir_requires_parent() {
        let fs = TableFs::new();
        assert!(matches!(
            fs.create_dir("/a/b", None).await,
            Err(FsError::NotFound { .. })
        ));
        fs.create_dir("/a", None).await.unwrap();
        fs.create_dir("/a/b", None).await.unwrap();
        assert!(fs.exists("/a/b").await.unwrap());
    }

    #[tokio::test]
    async fn create_dir_rejects_existing() {
        let fs = TableFs::new();
        fs.create_dir("/a", None).await.unwrap();
        assert!(matches!(
            fs.create_dir("/a", None).await,
            Err(FsError::AlreadyExists { .. })
        ));
    }

    #[tokio::test]
    async fn create_dir_all_is_idempotent() {
        let fs = TableFs::new();
        fs.create_dir_all("/a/b/c").await.unwrap();
        fs.create_dir_all("/a/b/c").await.unwrap();
        assert!(fs.stat("/a/b").await.unwrap().is_dir());
    }

    #[tokio::test]
    async fn create_dir_all_rejects_file_component() {
        let fs = TableFs::new();
        fs.write_file("/a", b"").await.unwrap();
        assert!(matches!(
            fs.create_dir_all("/a/b").await,
            Err(FsError::NotADirectory { .. })
        ));
    }

    #[tokio::test]
    async fn write_then_read_round_trip() {
        let fs = TableFs::new();
        fs.write_file("/f.txt", b"hello").await.unwrap();
        assert_eq!(fs.read_file("/f.txt").await.unwrap(), b"hello");
        assert_eq!(fs.stat("/f.txt").await.unwrap().size(), 5);
    }

    #[tokio::test]
    async fn write_rejects_directory_target() {
        let fs = TableFs::new();
        fs.create_dir("/d", None).await.unwrap();
        assert!(matches!(
            fs.write_file("/d", b"x").await,
            Err(FsError::NotAFile { .. })
        ));
    }

    #[tokio::test]
    async fn append_creates_and_extends() {
        let fs = TableFs::new();
        fs.append_file("/log", b"a").await.unwrap();
        fs.append_file("/log", b"b").await.unwrap();
        assert_eq!(fs.read_file("/log").await.unwrap(), b"ab");
    }

    #[tokio::test]
    async fn truncate_shrinks_and_updates_size() {
        let fs = TableFs::new();
        fs.write_file("/f", b"hello world").await.unwrap();
        fs.truncate("/f", 5).await.unwrap();
        assert_eq!(fs.read_file("/f").await.unwrap(), b"hello");
        assert_eq!(fs.stat("/f").await.unwrap().size(), 5);
    }

    #[tokio::test]
    async fn rename_moves_whole_subtree() {
        let fs = TableFs::new();
        fs.create_dir_all("/a/b").await.unwrap();
        fs.write_file("/a/b/f.txt", b"hi").await.unwrap();
        fs.rename("/a", "/z").await.unwrap();
        assert_eq!(fs.read_file("/z/b/f.txt").await.unwrap(), b"hi");
        assert!(!fs.exists("/a").await.unwrap());
        assert!(matches!(
            fs.stat("/a/b/f.txt").await,
            Err(FsError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn rename_leaves_prefix_siblings_alone() {
        let fs = TableFs::new();
        fs.create_dir_all("/a").await.unwrap();
        fs.create_dir_all("/ab").await.unwrap();
        fs.write_file("/ab/f", b"x").await.unwrap();
        fs.rename("/a", "/z").await.unwrap();
        assert_eq!(fs.read_file("/ab/f").await.unwrap(), b"x");
    }

    #[tokio::test]
    async fn rename_rejects_root_endpoints() {
        let fs = TableFs::new();
        fs.create_dir("/a", None).await.unwrap();
        assert!(matches!(
            fs.rename("/", "/x").await,
            Err(FsError::InvalidPath { .. })
        ));
        assert!(matches!(
            fs.rename("/a", "/").await,
            Err(FsError::InvalidPath { .. })
        ));
    }

    #[tokio::test]
    async fn rename_rejects_move_into_own_subtree() {
        let fs = TableFs::new();
        fs.create_dir_all("/a/b").await.unwrap();
        assert!(matches!(
            fs.rename("/a", "/a/b/c").await,
            Err(FsError::InvalidPath { .. })
        ));
    }

    #[tokio::test]
    async fn rename_to_same_path_is_noop() {
        let fs = TableFs::new();
        fs.write_file("/f", b"x").await.unwrap();
        fs.rename("/f", "/f").await.unwrap();
        assert_eq!(fs.read_file("/f").await.unwrap(), b"x");
    }

    #[tokio::test]
    async fn rename_creates_destination_ancestors() {
        let fs = TableFs::new();
        fs.write_file("/f", b"x").await.unwrap();
        fs.rename("/f", "/deep/down/f").await.unwrap();
        assert_eq!(fs.read_file("/deep/down/f").await.unwrap(), b"x");
    }

    #[tokio::test]
    async fn remove_is_strict() {
        let fs = TableFs::new();
        fs.create_dir_all("/d").await.unwrap();
        fs.write_file("/d/f", b"x").await.unwrap();
        assert!(matches!(
            fs.remove("/d").await,
            Err(FsError::DirectoryNotEmpty { .. })
        ));
        fs.remove("/d/f").await.unwrap();
        fs.remove("/d").await.unwrap();
        assert!(!fs.exists("/d").await.unwrap());
    }

    #[tokio::test]
    async fn remove_checks_write_bit() {
        let fs = TableFs::new();
        fs.write_file("/f", b"x").await.unwrap();
        fs.chmod("/f", 0o444).await.unwrap();
        assert!(matches!(
            fs.remove("/f").await,
            Err(FsError::PermissionDenied { .. })
        ));
    }

    #[tokio::test]
    async fn remove_recursive_clears_subtree() {
        let fs = TableFs::new();
        fs.create_dir_all("/a/b/c").await.unwrap();
        fs.write_file("/a/b/f", b"x").await.unwrap();
        fs.remove_recursive("/a").await.unwrap();
        assert!(!fs.exists("/a").await.unwrap());
        assert!(!fs.exists("/a/b/f").await.unwrap());
    }

    #[tokio::test]
    async fn root_cannot_be_removed() {
        let fs = TableFs::new();
        assert!(matches!(
            fs.remove("/").await,
            Err(FsError::InvalidPath { .. })
        ));
        assert!(matches!(
            fs.remove_recursive("/").await,
            Err(FsError::InvalidPath { .. })
        ));
    }

    #[tokio::test]
    async fn access_owner_digit_only() {
        let fs = TableFs::new();
        fs.write_file("/f", b"x").await.unwrap();
        fs.chmod("/f", 0o007).await.unwrap();
        // Other-digit bits do not satisfy an owner check.
        assert!(matches!(
            fs.access("/f", access::R_OK).await,
            Err(FsError::PermissionDenied { .. })
        ));
        fs.chmod("/f", 0o700).await.unwrap();
        fs.access("/f", access::R_OK | access::X_OK).await.unwrap();
    }

    #[tokio::test]
    async fn access_zero_mask_checks_existence() {
        let fs = TableFs::new();
        fs.write_file("/f", b"").await.unwrap();
        fs.chmod("/f", 0o000).await.unwrap();
        fs.access("/f", access::F_OK).await.unwrap();
        assert!(matches!(
            fs.access("/missing", access::F_OK).await,
            Err(FsError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn statfs_root_only() {
        let fs = TableFs::new();
        fs.write_file("/f", b"x").await.unwrap();
        let st = fs.statfs("/").await.unwrap();
        // Root plus the file.
        assert_eq!(st.files, 2);
        assert_eq!(st.blocks, FsStat::SYNTHETIC_CAPACITY);
        assert!(matches!(
            fs.statfs("/f").await,
            Err(FsError::Unsupported { .. })
        ));
    }

    #[tokio::test]
    async fn link_tracks_target_across_rename() {
        let fs = TableFs::new();
        fs.write_file("/target", b"data").await.unwrap();
        fs.link("/target", "/alias").await.unwrap();
        assert_eq!(fs.read_link("/alias").await.unwrap(), "/target");
        fs.rename("/target", "/moved").await.unwrap();
        assert_eq!(fs.read_link("/alias").await.unwrap(), "/moved");
        assert_eq!(fs.realpath("/alias").await.unwrap(), "/moved");
    }

    #[tokio::test]
    async fn unlink_only_accepts_symlinks() {
        let fs = TableFs::new();
        fs.write_file("/f", b"x").await.unwrap();
        fs.link("/f", "/l").await.unwrap();
        assert!(matches!(
            fs.unlink("/f").await,
            Err(FsError::NotASymlink { .. })
        ));
        fs.unlink("/l").await.unwrap();
        assert!(!fs.exists("/l").await.unwrap());
        assert!(fs.exists("/f").await.unwrap());
    }

    #[tokio::test]
    async fn read_link_rejects_regular_files() {
        let fs = TableFs::new();
        fs.write_file("/f", b"x").await.unwrap();
        assert!(matches!(
            fs.read_link("/f").await,
            Err(FsError::NotASymlink { .. })
        ));
    }

    #[tokio::test]
    async fn realpath_identity_for_non_links() {
        let fs = TableFs::new();
        fs.create_dir_all("/a/b").await.unwrap();
        assert_eq!(fs.realpath("/a//b/").await.unwrap(), "/a/b");
    }

    #[tokio::test]
    async fn read_dir_sorted_by_name() {
        let fs = TableFs::new();
        fs.create_dir("/d", None).await.unwrap();
        fs.write_file("/d/b", b"").await.unwrap();
        fs.write_file("/d/a", b"").await.unwrap();
        fs.create_dir("/d/c", None).await.unwrap();
        let names: Vec<String> = fs
            .read_dir("/d")
            .await
            .unwrap()
            .iter()
            .map(|e| e.name().to_string())
            .collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn read_dir_lists_immediate_children_only() {
        let fs = TableFs::new();
        fs.create_dir_all("/d/sub").await.unwrap();
        fs.write_file("/d/sub/deep", b"").await.unwrap();
        let entries = fs.read_dir("/d").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name(), "sub");
        assert!(entries[0].is_dir());
    }

    #[tokio::test]
    async fn dir_stream_restarts_after_close() {
        let fs = TableFs::new();
        fs.create_dir("/d", None).await.unwrap();
        fs.write_file("/d/a", b"").await.unwrap();
        fs.write_file("/d/b", b"").await.unwrap();
        let mut stream = fs.open_dir("/d").await.unwrap();
        assert_eq!(stream.read().await.unwrap().unwrap().name(), "a");
        stream.close();
        assert_eq!(stream.read().await.unwrap().unwrap().name(), "a");
        assert_eq!(stream.read().await.unwrap().unwrap().name(), "b");
        assert!(stream.read().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn make_temp_dir_is_deterministic_with_collision_suffix() {
        let fs = TableFs::new();
        let first = fs.make_temp_dir("job").await.unwrap();
        let second = fs.make_temp_dir("job").await.unwrap();
        assert!(first.starts_with("/tmp/"));
        assert_eq!(second, format!("{first}-1"));
        assert!(fs.stat(&first).await.unwrap().is_dir());
        assert!(fs.stat(&second).await.unwrap().is_dir());
    }

    #[tokio::test]
    async fn copy_tree_copies_files_dirs_and_links() {
        let fs = TableFs::new();
        fs.create_dir_all("/src/sub").await.unwrap();
        fs.write_file("/src/f", b"data").await.unwrap();
        fs.write_file("/src/sub/g", b"deep").await.unwrap();
        fs.link("/src/f", "/src/l").await.unwrap();
        fs.copy_tree("/src", "/dst").await.unwrap();
        assert_eq!(fs.read_file("/dst/f").await.unwrap(), b"data");
        assert_eq!(fs.read_file("/dst/sub/g").await.unwrap(), b"deep");
        assert_eq!(fs.read_link("/dst/l").await.unwrap(), "/src/f");
        // Copies are independent of the source content.
        fs.write_file("/src/f", b"changed").await.unwrap();
        assert_eq!(fs.read_file("/dst/f").await.unwrap(), b"data");
    }

    #[tokio::test]
    async fn copy_tree_requires_destination_parent() {
        let fs = TableFs::new();
        fs.write_file("/f", b"x").await.unwrap();
        assert!(matches!(
            fs.copy_tree("/f", "/missing/f").await,
            Err(FsError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn open_creates_with_default_mode() {
        let fs = TableFs::new();
        let handle = fs.open("/f", None).await.unwrap();
        assert_eq!(handle.stat().await.unwrap().mode().mode(), 0o666);
        assert!(fs.exists("/f").await.unwrap());
    }

    #[tokio::test]
    async fn open_rejects_directories() {
        let fs = TableFs::new();
        fs.create_dir("/d", None).await.unwrap();
        assert!(matches!(
            fs.open("/d", None).await,
            Err(FsError::NotAFile { .. })
        ));
    }

    #[tokio::test]
    async fn open_gates_on_read_write_bits() {
        let fs = TableFs::new();
        fs.write_file("/f", b"x").await.unwrap();
        fs.chmod("/f", 0o400).await.unwrap();
        assert!(matches!(
            fs.open("/f", None).await,
            Err(FsError::PermissionDenied { .. })
        ));
    }

    #[tokio::test]
    async fn utimes_sets_times() {
        let fs = TableFs::new();
        fs.write_file("/f", b"x").await.unwrap();
        let t = DateTime::from_timestamp(1_000_000, 0).unwrap();
        fs.utimes("/f", t, t).await.unwrap();
        let st = fs.stat("/f").await.unwrap();
        assert_eq!(st.accessed(), t);
        assert_eq!(st.modified(), t);
    }

    #[tokio::test]
    async fn chown_sets_ownership() {
        let fs = TableFs::new();
        fs.write_file("/f", b"x").await.unwrap();
        fs.chown("/f", 1000, 1000).await.unwrap();
        let st = fs.stat("/f").await.unwrap();
        assert_eq!(st.uid(), 1000);
        assert_eq!(st.gid(), 1000);
    }

    #[tokio::test]
    async fn watch_is_unsupported() {
        let fs = TableFs::new();
        assert!(matches!(
            fs.watch("/"),
            Err(FsError::Unsupported { operation: "watch" })
        ));
    }

    #[test]
    fn temp_hash_is_stable_and_short() {
        let a = temp_hash("job");
        assert_eq!(a, temp_hash("job"));
        assert!(a.len() <= 6);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(temp_hash("job"), temp_hash("other"));
    }

    #[test]
    fn fs_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TableFs>();
    }
}
