//! Core types for the tablefs virtual filesystem.

/// Access mask constants for permission checks (POSIX `F_OK`/`R_OK`/`W_OK`/`X_OK`).
pub mod access {
    /// Existence only; no permission bits required.
    pub const F_OK: u32 = 0;
    /// Read permission.
    pub const R_OK: u32 = 4;
    /// Write permission.
    pub const W_OK: u32 = 2;
    /// Execute permission.
    pub const X_OK: u32 = 1;
}

/// Default mode for newly created regular files (rw-rw-rw-).
pub const DEFAULT_FILE_MODE: u32 = 0o666;

/// Default mode for newly created directories and symlinks (rwxrwxrwx).
pub const DEFAULT_DIR_MODE: u32 = 0o777;

/// Kind of a filesystem entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EntryKind {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
}

/// Which permission triplet to evaluate for an access check.
///
/// No caller identity is tracked, so every built-in check evaluates
/// [`AccessClass::Owner`]. A deliberate simplification, not an
/// oversight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AccessClass {
    /// The owner triplet (highest octal digit).
    Owner,
    /// The group triplet (middle octal digit).
    Group,
    /// The other triplet (lowest octal digit).
    Other,
}

/// Unix-style permissions stored as a three-digit octal mode.
///
/// Each digit is a 0-7 bitmask of read=4, write=2, execute=1.
///
/// # Examples
///
/// ```rust
/// use tablefs::{AccessClass, Mode};
///
/// let mode = Mode::from_mode(0o644);
/// assert!(mode.allows(6, AccessClass::Owner));
/// assert!(!mode.allows(2, AccessClass::Other));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Mode(u32);

impl Mode {
    /// Create a mode from a Unix octal value (e.g. `0o755`).
    #[inline]
    pub const fn from_mode(mode: u32) -> Self {
        Self(mode & 0o777)
    }

    /// Get the raw mode value.
    #[inline]
    pub const fn mode(&self) -> u32 {
        self.0
    }

    /// The octal digit for the given actor class.
    #[inline]
    pub const fn digit(&self, class: AccessClass) -> u32 {
        match class {
            AccessClass::Owner => (self.0 >> 6) & 0o7,
            AccessClass::Group => (self.0 >> 3) & 0o7,
            AccessClass::Other => self.0 & 0o7,
        }
    }

    /// Check a requested access mask against one permission triplet.
    ///
    /// Access is granted iff every bit set in `mask` is also set in the
    /// selected digit. There is no superuser bypass.
    #[inline]
    pub const fn allows(&self, mask: u32, class: AccessClass) -> bool {
        let digit = self.digit(class);
        digit & mask == mask
    }

    /// Default mode for a new regular file (0o666).
    #[inline]
    pub const fn default_file() -> Self {
        Self(DEFAULT_FILE_MODE)
    }

    /// Default mode for a new directory (0o777).
    #[inline]
    pub const fn default_dir() -> Self {
        Self(DEFAULT_DIR_MODE)
    }
}

impl Default for Mode {
    fn default() -> Self {
        Self::default_file()
    }
}

/// Synthetic filesystem statistics (like `statvfs`).
///
/// The backing store has no real capacity concept, so every field except
/// [`FsStat::files`] is a fixed constant; `files` is the live count of
/// stored entities.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FsStat {
    /// Transfer block size.
    pub block_size: u64,
    /// Total data blocks (synthetic).
    pub blocks: u64,
    /// Free blocks (synthetic).
    pub blocks_free: u64,
    /// Blocks available to unprivileged users (synthetic).
    pub blocks_available: u64,
    /// Live count of stored entities.
    pub files: u64,
    /// Free file nodes (synthetic).
    pub files_free: u64,
}

impl FsStat {
    /// Synthetic capacity constant (2^53 - 1, the largest integer exact
    /// in an IEEE double, for clients that parse stats as JSON numbers).
    pub const SYNTHETIC_CAPACITY: u64 = 9_007_199_254_740_991;

    /// Block size reported by [`crate::TableFs::statfs`].
    pub const BLOCK_SIZE: u64 = 1024;

    /// Build the synthetic report around a live entity count.
    pub fn with_entity_count(files: u64) -> Self {
        Self {
            block_size: Self::BLOCK_SIZE,
            blocks: Self::SYNTHETIC_CAPACITY,
            blocks_free: Self::SYNTHETIC_CAPACITY,
            blocks_available: Self::SYNTHETIC_CAPACITY,
            files,
            files_free: Self::SYNTHETIC_CAPACITY,
        }
    }
}
