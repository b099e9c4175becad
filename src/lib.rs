//! # pepysfs
//!
//! Block storage engine for a distributed file service:
//! - Versioned files (Vid) mapped to log locations by a resident index
//! - Append-only log split into fixed-size arenas
//! - Two alternating superblock copies for crash consistency
//! - Single-writer / multi-reader concurrency model
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              Protocol layer (external collaborator)         │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ lookup / read_range / allocate / commit
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                        Disk facade                          │
//! │              (Single Writer / Multi Reader)                 │
//! └──────┬──────────────────────┬───────────────────────┬───────┘
//!        │                      │                       │
//!        ▼                      ▼                       ▼
//!  ┌────────────┐        ┌─────────────┐         ┌─────────────┐
//!  │ Superblock │        │    Index    │         │   Arenas    │
//!  │  (A / B)   │        │  (RwLock)   │         │   (log)     │
//!  └─────┬──────┘        └──────┬──────┘         └──────┬──────┘
//!        └──────────────────────┼───────────────────────┘
//!                               ▼
//!                       ┌───────────────┐
//!                       │ Block Device  │
//!                       └───────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod format;
pub mod types;

pub mod device;
pub mod superblock;
pub mod arena;
pub mod index;
pub mod disk;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{DiskError, Result};
pub use config::Config;
pub use disk::Disk;
pub use types::{FileId, Indexelem, Metaaddr, ServerId, VersionId, Vid, Xid};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of pepysfs
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
