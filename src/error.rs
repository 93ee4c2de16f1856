//! Error types for the tablefs virtual filesystem.

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, FsError>;

/// Filesystem error type with contextual variants.
///
/// All variants carry the path (or file descriptor) that triggered the
/// failure. Uses `#[non_exhaustive]` for forward compatibility.
///
/// # Examples
///
/// ```rust
/// use tablefs::FsError;
///
/// let err = FsError::NotFound { path: "/missing".into() };
/// assert!(err.to_string().contains("/missing"));
/// ```
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    /// Path does not exist.
    #[error("not found: {path}")]
    NotFound {
        /// The path that was not found.
        path: String,
    },

    /// Path already exists when it shouldn't.
    #[error("{operation}: already exists: {path}")]
    AlreadyExists {
        /// The path that already exists.
        path: String,
        /// The operation that failed.
        operation: &'static str,
    },

    /// Permission denied for operation.
    #[error("{operation}: permission denied: {path}")]
    PermissionDenied {
        /// The path where permission was denied.
        path: String,
        /// The operation that was denied.
        operation: &'static str,
    },

    /// Expected a regular file but found something else.
    #[error("not a file: {path}")]
    NotAFile {
        /// The path that is not a regular file.
        path: String,
    },

    /// Expected a directory but found something else.
    #[error("not a directory: {path}")]
    NotADirectory {
        /// The path that is not a directory.
        path: String,
    },

    /// Directory is not empty when it should be.
    #[error("directory not empty: {path}")]
    DirectoryNotEmpty {
        /// The path to the non-empty directory.
        path: String,
    },

    /// Expected a symbolic link but found something else.
    #[error("not a symbolic link: {path}")]
    NotASymlink {
        /// The path that is not a symlink.
        path: String,
    },

    /// Path is not valid for the operation (e.g. renaming the root).
    #[error("invalid path: {path} ({reason})")]
    InvalidPath {
        /// The offending path.
        path: String,
        /// Why the path was rejected.
        reason: &'static str,
    },

    /// Operation is declared but not supported by this filesystem.
    #[error("operation not supported: {operation}")]
    Unsupported {
        /// The unsupported operation.
        operation: &'static str,
    },

    /// Operation on a closed or unknown file descriptor.
    #[error("invalid handle: {fd}")]
    InvalidHandle {
        /// The invalid file descriptor.
        fd: u64,
    },
}
