//! # tablefs
//!
//! A hierarchical, permission-checked, POSIX-like virtual filesystem whose
//! state lives entirely in key-value tables keyed by stable integer
//! identities. Paths are resolved against naming records, permissions are
//! three-digit octal modes, and content is whole-blob per file.
//!
//! Both calling conventions are provided: [`TableFs`] is fully
//! asynchronous, and [`BlockingFs`] wraps it with a dedicated runtime for
//! synchronous callers.
//!
//! ## Quick start
//!
//! ```rust
//! use tablefs::TableFs;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> tablefs::Result<()> {
//! let fs = TableFs::new();
//!
//! fs.create_dir_all("/projects/demo").await?;
//! fs.write_file("/projects/demo/readme.md", b"hello").await?;
//!
//! let stats = fs.stat("/projects/demo/readme.md").await?;
//! assert!(stats.is_file());
//! assert_eq!(stats.size(), 5);
//!
//! fs.rename("/projects/demo", "/projects/renamed").await?;
//! assert!(fs.exists("/projects/renamed/readme.md").await?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Error handling
//!
//! Every fallible operation returns [`Result`] with the contextual
//! [`FsError`] taxonomy; errors carry the offending path or descriptor.
//!
//! ## Thread safety
//!
//! [`TableFs`] is `Send + Sync` and cheap to clone; all clones share one
//! tree. Multi-row mutations (rename, recursive removal, entity creation
//! and deletion) are applied under a single exclusive guard, so readers
//! never observe partial states.
//!
//! ## Feature flags
//!
//! - `serde`: `Serialize`/`Deserialize` for the metadata types and
//!   records.

mod blocking;
mod error;
mod fs;
mod handle;
pub mod path;
mod store;
mod types;
mod views;

pub use blocking::BlockingFs;
pub use error::{FsError, Result};
pub use fs::TableFs;
pub use handle::FileHandle;
pub use store::{EntityId, EntityStore, NameRecord, PermRecord, StatRecord, ROOT_ID};
pub use types::{
    access, AccessClass, EntryKind, FsStat, Mode, DEFAULT_DIR_MODE, DEFAULT_FILE_MODE,
};
pub use views::{DirStream, Dirent, Stats};
