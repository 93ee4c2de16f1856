//! Blocking calling convention over the asynchronous filesystem.
//!
//! [`BlockingFs`] owns a dedicated multi-threaded tokio runtime and drives
//! each asynchronous operation to completion with `block_on`. Callers get
//! plain synchronous functions with the same semantics and error taxonomy
//! as [`TableFs`].

use std::io;

use chrono::{DateTime, Utc};
use tokio::runtime::Runtime;

use crate::error::Result;
use crate::fs::TableFs;
use crate::handle::FileHandle;
use crate::types::FsStat;
use crate::views::{DirStream, Dirent, Stats};

/// Synchronous facade over a [`TableFs`].
///
/// Every method parks the calling thread until the underlying operation
/// completes on the owned runtime. Must not be called from inside an
/// async runtime: tokio panics on nested `block_on` rather than
/// deadlocking, so misuse fails fast.
///
/// # Examples
///
/// ```rust
/// use tablefs::BlockingFs;
///
/// let fs = BlockingFs::new()?;
/// fs.create_dir_all("/a/b")?;
/// fs.write_file("/a/b/f.txt", b"hi")?;
/// assert_eq!(fs.stat("/a/b/f.txt")?.size(), 2);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct BlockingFs {
    fs: TableFs,
    rt: Runtime,
}

impl BlockingFs {
    /// Create an empty filesystem with its own runtime.
    ///
    /// # Errors
    ///
    /// Fails if the runtime cannot spawn its worker threads.
    pub fn new() -> io::Result<Self> {
        Self::with_fs(TableFs::new())
    }

    /// Wrap an existing filesystem, sharing its tree with any async
    /// callers holding clones of it.
    ///
    /// # Errors
    ///
    /// Fails if the runtime cannot spawn its worker threads.
    pub fn with_fs(fs: TableFs) -> io::Result<Self> {
        Ok(Self {
            fs,
            rt: Runtime::new()?,
        })
    }

    /// The wrapped asynchronous filesystem.
    pub fn fs(&self) -> &TableFs {
        &self.fs
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Blocking [`TableFs::exists`].
    pub fn exists(&self, p: &str) -> Result<bool> {
        self.rt.block_on(self.fs.exists(p))
    }

    /// Blocking [`TableFs::access`].
    pub fn access(&self, p: &str, mask: u32) -> Result<()> {
        self.rt.block_on(self.fs.access(p, mask))
    }

    /// Blocking [`TableFs::stat`].
    pub fn stat(&self, p: &str) -> Result<Stats> {
        self.rt.block_on(self.fs.stat(p))
    }

    /// Blocking [`TableFs::statfs`].
    pub fn statfs(&self, p: &str) -> Result<FsStat> {
        self.rt.block_on(self.fs.statfs(p))
    }

    // ------------------------------------------------------------------------
    // Files
    // ------------------------------------------------------------------------

    /// Blocking [`TableFs::open`].
    pub fn open(&self, p: &str, mode: Option<u32>) -> Result<FileHandle> {
        self.rt.block_on(self.fs.open(p, mode))
    }

    /// Blocking [`TableFs::read_file`].
    pub fn read_file(&self, p: &str) -> Result<Vec<u8>> {
        self.rt.block_on(self.fs.read_file(p))
    }

    /// Blocking [`TableFs::write_file`].
    pub fn write_file(&self, p: &str, data: &[u8]) -> Result<()> {
        self.rt.block_on(self.fs.write_file(p, data))
    }

    /// Blocking [`TableFs::append_file`].
    pub fn append_file(&self, p: &str, data: &[u8]) -> Result<()> {
        self.rt.block_on(self.fs.append_file(p, data))
    }

    /// Blocking [`TableFs::truncate`].
    pub fn truncate(&self, p: &str, len: u64) -> Result<()> {
        self.rt.block_on(self.fs.truncate(p, len))
    }

    /// Blocking [`TableFs::copy_file`].
    pub fn copy_file(&self, src: &str, dst: &str) -> Result<()> {
        self.rt.block_on(self.fs.copy_file(src, dst))
    }

    /// Blocking [`TableFs::copy_tree`].
    pub fn copy_tree(&self, src: &str, dst: &str) -> Result<()> {
        self.rt.block_on(self.fs.copy_tree(src, dst))
    }

    // ------------------------------------------------------------------------
    // Directories
    // ------------------------------------------------------------------------

    /// Blocking [`TableFs::create_dir`].
    pub fn create_dir(&self, p: &str, mode: Option<u32>) -> Result<()> {
        self.rt.block_on(self.fs.create_dir(p, mode))
    }

    /// Blocking [`TableFs::create_dir_all`].
    pub fn create_dir_all(&self, p: &str) -> Result<()> {
        self.rt.block_on(self.fs.create_dir_all(p))
    }

    /// Blocking [`TableFs::make_temp_dir`].
    pub fn make_temp_dir(&self, prefix: &str) -> Result<String> {
        self.rt.block_on(self.fs.make_temp_dir(prefix))
    }

    /// Blocking [`TableFs::read_dir`].
    pub fn read_dir(&self, p: &str) -> Result<Vec<Dirent>> {
        self.rt.block_on(self.fs.read_dir(p))
    }

    /// Blocking [`TableFs::open_dir`].
    pub fn open_dir(&self, p: &str) -> Result<DirStream> {
        self.rt.block_on(self.fs.open_dir(p))
    }

    /// Blocking [`DirStream::read`].
    pub fn read_dir_entry(&self, stream: &mut DirStream) -> Result<Option<Dirent>> {
        self.rt.block_on(stream.read())
    }

    // ------------------------------------------------------------------------
    // Tree mutation
    // ------------------------------------------------------------------------

    /// Blocking [`TableFs::rename`].
    pub fn rename(&self, old: &str, new: &str) -> Result<()> {
        self.rt.block_on(self.fs.rename(old, new))
    }

    /// Blocking [`TableFs::remove`].
    pub fn remove(&self, p: &str) -> Result<()> {
        self.rt.block_on(self.fs.remove(p))
    }

    /// Blocking [`TableFs::remove_recursive`].
    pub fn remove_recursive(&self, p: &str) -> Result<()> {
        self.rt.block_on(self.fs.remove_recursive(p))
    }

    // ------------------------------------------------------------------------
    // Symbolic links
    // ------------------------------------------------------------------------

    /// Blocking [`TableFs::link`].
    pub fn link(&self, existing: &str, link_path: &str) -> Result<()> {
        self.rt.block_on(self.fs.link(existing, link_path))
    }

    /// Blocking [`TableFs::read_link`].
    pub fn read_link(&self, p: &str) -> Result<String> {
        self.rt.block_on(self.fs.read_link(p))
    }

    /// Blocking [`TableFs::realpath`].
    pub fn realpath(&self, p: &str) -> Result<String> {
        self.rt.block_on(self.fs.realpath(p))
    }

    /// Blocking [`TableFs::unlink`].
    pub fn unlink(&self, p: &str) -> Result<()> {
        self.rt.block_on(self.fs.unlink(p))
    }

    // ------------------------------------------------------------------------
    // Metadata mutation
    // ------------------------------------------------------------------------

    /// Blocking [`TableFs::chmod`].
    pub fn chmod(&self, p: &str, mode: u32) -> Result<()> {
        self.rt.block_on(self.fs.chmod(p, mode))
    }

    /// Blocking [`TableFs::chown`].
    pub fn chown(&self, p: &str, uid: u32, gid: u32) -> Result<()> {
        self.rt.block_on(self.fs.chown(p, uid, gid))
    }

    /// Blocking [`TableFs::utimes`].
    pub fn utimes(&self, p: &str, atime: DateTime<Utc>, mtime: DateTime<Utc>) -> Result<()> {
        self.rt.block_on(self.fs.utimes(p, atime, mtime))
    }

    /// Change notification is not supported; see [`TableFs::watch`].
    pub fn watch(&self, p: &str) -> Result<()> {
        self.fs.watch(p)
    }

    // ------------------------------------------------------------------------
    // Handle operations
    // ------------------------------------------------------------------------

    /// Blocking [`FileHandle::stat`].
    pub fn fstat(&self, handle: &FileHandle) -> Result<Stats> {
        self.rt.block_on(handle.stat())
    }

    /// Blocking [`FileHandle::read_all`].
    pub fn fread(&self, handle: &FileHandle) -> Result<Vec<u8>> {
        self.rt.block_on(handle.read_all())
    }

    /// Blocking [`FileHandle::write_all`].
    pub fn fwrite(&self, handle: &FileHandle, data: &[u8]) -> Result<()> {
        self.rt.block_on(handle.write_all(data))
    }

    /// Blocking [`FileHandle::append`].
    pub fn fappend(&self, handle: &FileHandle, data: &[u8]) -> Result<()> {
        self.rt.block_on(handle.append(data))
    }

    /// Blocking [`FileHandle::truncate`].
    pub fn ftruncate(&self, handle: &FileHandle, len: u64) -> Result<()> {
        self.rt.block_on(handle.truncate(len))
    }

    /// Blocking [`FileHandle::chmod`].
    pub fn fchmod(&self, handle: &FileHandle, mode: u32) -> Result<()> {
        self.rt.block_on(handle.chmod(mode))
    }

    /// Blocking [`FileHandle::chown`].
    pub fn fchown(&self, handle: &FileHandle, uid: u32, gid: u32) -> Result<()> {
        self.rt.block_on(handle.chown(uid, gid))
    }

    /// Blocking [`FileHandle::utimes`].
    pub fn futimes(
        &self,
        handle: &FileHandle,
        atime: DateTime<Utc>,
        mtime: DateTime<Utc>,
    ) -> Result<()> {
        self.rt.block_on(handle.utimes(atime, mtime))
    }

    /// Blocking [`FileHandle::sync`].
    pub fn fsync(&self, handle: &FileHandle) -> Result<()> {
        self.rt.block_on(handle.sync())
    }

    /// Blocking [`FileHandle::close`].
    pub fn close(&self, handle: FileHandle) -> Result<()> {
        self.rt.block_on(handle.close())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FsError;

    #[test]
    fn blocking_round_trip() {
        let fs = BlockingFs::new().unwrap();
        fs.create_dir_all("/a/b").unwrap();
        fs.write_file("/a/b/f.txt", b"hi").unwrap();
        assert_eq!(fs.read_file("/a/b/f.txt").unwrap(), b"hi");
        assert_eq!(fs.stat("/a/b/f.txt").unwrap().size(), 2);
    }

    #[test]
    fn blocking_errors_match_async_taxonomy() {
        let fs = BlockingFs::new().unwrap();
        assert!(matches!(
            fs.read_file("/missing"),
            Err(FsError::NotFound { .. })
        ));
        assert!(matches!(
            fs.remove("/"),
            Err(FsError::InvalidPath { .. })
        ));
    }

    #[test]
    fn blocking_handle_operations() {
        let fs = BlockingFs::new().unwrap();
        let handle = fs.open("/f", None).unwrap();
        fs.fwrite(&handle, b"hello").unwrap();
        fs.fappend(&handle, b" world").unwrap();
        assert_eq!(fs.fread(&handle).unwrap(), b"hello world");
        fs.ftruncate(&handle, 5).unwrap();
        assert_eq!(fs.fstat(&handle).unwrap().size(), 5);
        fs.fsync(&handle).unwrap();
        fs.close(handle).unwrap();
    }

    #[test]
    fn blocking_dir_stream() {
        let fs = BlockingFs::new().unwrap();
        fs.create_dir("/d", None).unwrap();
        fs.write_file("/d/a", b"").unwrap();
        let mut stream = fs.open_dir("/d").unwrap();
        assert_eq!(fs.read_dir_entry(&mut stream).unwrap().unwrap().name(), "a");
        assert!(fs.read_dir_entry(&mut stream).unwrap().is_none());
    }

    #[test]
    fn shares_tree_with_async_clones() {
        let fs = BlockingFs::new().unwrap();
        let async_fs = fs.fs().clone();
        fs.write_file("/shared", b"x").unwrap();
        let rt = &fs.rt;
        assert!(rt.block_on(async_fs.exists("/shared")).unwrap());
    }
}
