//! File handles: identity-scoped operations on an open regular file.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::{FsError, Result};
use crate::store::{EntityId, EntityStore, StoreTxn, StoreView};
use crate::types::{access, AccessClass, Mode};
use crate::views::Stats;

/// An open regular file, addressed by entity identity rather than path.
///
/// The handle stays valid across renames of the file: operations go
/// through the identity, so a concurrent move does not invalidate it.
/// Once the entity is deleted every operation fails with
/// [`FsError::InvalidHandle`].
///
/// Permission gates follow the path-based operations: reads require the
/// owner read bit, writes and truncation the owner write bit.
#[derive(Debug, Clone)]
pub struct FileHandle {
    id: EntityId,
    store: Arc<EntityStore>,
}

impl FileHandle {
    pub(crate) fn new(store: Arc<EntityStore>, id: EntityId) -> Self {
        Self { id, store }
    }

    /// Raw file descriptor value (the entity identity).
    pub fn fd(&self) -> u64 {
        self.id.0
    }

    /// Identity of the underlying entity.
    pub fn id(&self) -> EntityId {
        self.id
    }

    fn path_of(&self, view: &StoreView<'_>) -> Result<String> {
        view.name(self.id)
            .map(|rec| rec.full_path())
            .ok_or(FsError::InvalidHandle { fd: self.id.0 })
    }

    fn path_in_txn(&self, txn: &StoreTxn<'_>) -> Result<String> {
        txn.name(self.id)
            .map(|rec| rec.full_path())
            .ok_or(FsError::InvalidHandle { fd: self.id.0 })
    }

    fn check(&self, mode: Mode, mask: u32, path: String, operation: &'static str) -> Result<()> {
        if mode.allows(mask, AccessClass::Owner) {
            Ok(())
        } else {
            Err(FsError::PermissionDenied { path, operation })
        }
    }

    /// Snapshot the file's stat and permission rows.
    ///
    /// # Errors
    ///
    /// - [`FsError::InvalidHandle`] if the entity has been deleted
    pub async fn stat(&self) -> Result<Stats> {
        let view = self.store.snapshot().await;
        let stat = view
            .stat(self.id)
            .ok_or(FsError::InvalidHandle { fd: self.id.0 })?;
        let perm = view
            .perm(self.id)
            .ok_or(FsError::InvalidHandle { fd: self.id.0 })?;
        Ok(Stats::from_rows(self.id, stat, perm))
    }

    /// Read the whole content blob.
    ///
    /// # Errors
    ///
    /// - [`FsError::InvalidHandle`] if the entity has been deleted
    /// - [`FsError::PermissionDenied`] without the owner read bit
    pub async fn read_all(&self) -> Result<Vec<u8>> {
        let view = self.store.snapshot().await;
        let path = self.path_of(&view)?;
        let perm = view
            .perm(self.id)
            .ok_or(FsError::InvalidHandle { fd: self.id.0 })?;
        self.check(perm.mode, access::R_OK, path, "read")?;
        Ok(view.blob(self.id).cloned().unwrap_or_default())
    }

    /// Replace the whole content blob.
    ///
    /// # Errors
    ///
    /// - [`FsError::InvalidHandle`] if the entity has been deleted
    /// - [`FsError::PermissionDenied`] without the owner write bit
    pub async fn write_all(&self, data: &[u8]) -> Result<()> {
        let mut txn = self.store.begin().await;
        let path = self.path_in_txn(&txn)?;
        let perm = txn
            .perm(self.id)
            .ok_or(FsError::InvalidHandle { fd: self.id.0 })?;
        self.check(perm.mode, access::W_OK, path, "write")?;
        txn.set_blob(self.id, data.to_vec());
        Ok(())
    }

    /// Append to the content blob.
    ///
    /// # Errors
    ///
    /// Same as [`FileHandle::write_all`].
    pub async fn append(&self, data: &[u8]) -> Result<()> {
        let mut txn = self.store.begin().await;
        let path = self.path_in_txn(&txn)?;
        let perm = txn
            .perm(self.id)
            .ok_or(FsError::InvalidHandle { fd: self.id.0 })?;
        self.check(perm.mode, access::W_OK, path, "append")?;
        let mut blob = txn.blob(self.id).cloned().unwrap_or_default();
        blob.extend_from_slice(data);
        txn.set_blob(self.id, blob);
        Ok(())
    }

    /// Shrink the content blob to at most `len` bytes. Never extends.
    ///
    /// # Errors
    ///
    /// - [`FsError::InvalidHandle`] if the entity has been deleted
    /// - [`FsError::PermissionDenied`] without the owner write bit
    pub async fn truncate(&self, len: u64) -> Result<()> {
        let mut txn = self.store.begin().await;
        let path = self.path_in_txn(&txn)?;
        let perm = txn
            .perm(self.id)
            .ok_or(FsError::InvalidHandle { fd: self.id.0 })?;
        self.check(perm.mode, access::W_OK, path, "truncate")?;
        let mut blob = txn.blob(self.id).cloned().unwrap_or_default();
        blob.truncate(len.min(blob.len() as u64) as usize);
        txn.set_blob(self.id, blob);
        Ok(())
    }

    /// Set the permission mode.
    pub async fn chmod(&self, mode: u32) -> Result<()> {
        let mut txn = self.store.begin().await;
        self.path_in_txn(&txn)?;
        txn.update_perm(self.id, |perm| perm.mode = Mode::from_mode(mode));
        Ok(())
    }

    /// Set the owner and group.
    pub async fn chown(&self, uid: u32, gid: u32) -> Result<()> {
        let mut txn = self.store.begin().await;
        self.path_in_txn(&txn)?;
        txn.update_perm(self.id, |perm| {
            perm.uid = uid;
            perm.gid = gid;
        });
        Ok(())
    }

    /// Set the access and modification times.
    pub async fn utimes(&self, atime: DateTime<Utc>, mtime: DateTime<Utc>) -> Result<()> {
        let mut txn = self.store.begin().await;
        self.path_in_txn(&txn)?;
        txn.update_stat(self.id, |stat| {
            stat.accessed = atime;
            stat.modified = mtime;
        });
        Ok(())
    }

    /// Flush buffered state. Everything is written through on mutation, so
    /// this only validates that the handle still refers to a live entity.
    pub async fn sync(&self) -> Result<()> {
        let view = self.store.snapshot().await;
        self.path_of(&view)?;
        Ok(())
    }

    /// Close the handle, validating it one last time.
    pub async fn close(self) -> Result<()> {
        let view = self.store.snapshot().await;
        self.path_of(&view)?;
        Ok(())
    }

    /// Offset-range reads are not supported; content is whole-blob only.
    pub fn read_at(&self, _offset: u64, _len: u64) -> Result<Vec<u8>> {
        Err(FsError::Unsupported { operation: "read_at" })
    }

    /// Offset-range writes are not supported; content is whole-blob only.
    pub fn write_at(&self, _offset: u64, _data: &[u8]) -> Result<u64> {
        Err(FsError::Unsupported { operation: "write_at" })
    }

    /// Vectored reads are not supported.
    pub fn read_vectored(&self) -> Result<Vec<Vec<u8>>> {
        Err(FsError::Unsupported {
            operation: "read_vectored",
        })
    }

    /// Vectored writes are not supported.
    pub fn write_vectored(&self, _bufs: &[&[u8]]) -> Result<u64> {
        Err(FsError::Unsupported {
            operation: "write_vectored",
        })
    }
}
