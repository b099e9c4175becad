//! Configuration for pepysfs
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{DiskError, Result};
use crate::format::{ARENA_SIZE, AVG_FILE_SIZE, BLOCK_SIZE, MIN_ARENA_BLOCKS};

/// Main configuration for a pepysfs disk
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Device Configuration
    // -------------------------------------------------------------------------
    /// Backing file or device node
    pub device_path: PathBuf,

    /// Bytes reserved at the start of the device for configuration text.
    /// Must be a multiple of the block size.
    pub config_size: u64,

    // -------------------------------------------------------------------------
    // Format Configuration
    // -------------------------------------------------------------------------
    /// Allocation granularity in bytes (power of two, >= 512)
    pub block_size: u32,

    /// Target arena size; the planner may scale it down (see `scale_arenas`)
    pub arena_size: u64,

    /// Halve the arena size until the minimum arena count fits, instead of
    /// rejecting the device
    pub scale_arenas: bool,

    /// Average file size used to size the index region
    pub avg_file_size: u64,

    // -------------------------------------------------------------------------
    // Durability Configuration
    // -------------------------------------------------------------------------
    /// When the in-memory index is rewritten to disk
    pub index_flush_strategy: IndexFlushStrategy,

    /// What to do when only one superblock copy is valid at mount
    pub superblock_policy: SuperblockPolicy,
}

/// Index flush strategy: how often the whole index is rewritten
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFlushStrategy {
    /// Only when an arena seals (and on explicit flush/snapshot/close)
    OnSeal,

    /// Also after N commits since the last flush
    EveryNCommits { count: usize },
}

/// Superblock selection policy at mount
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuperblockPolicy {
    /// Both copies must validate; any bad copy fails the mount
    RequireBoth,

    /// Accept a single valid copy; the bad slot is rewritten by the next persist
    AllowSingle,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_path: PathBuf::from("./pepys.img"),
            config_size: 0, // 8 MB once configuration text is stored there
            block_size: BLOCK_SIZE,
            arena_size: ARENA_SIZE,
            scale_arenas: true,
            avg_file_size: AVG_FILE_SIZE,
            index_flush_strategy: IndexFlushStrategy::OnSeal,
            superblock_policy: SuperblockPolicy::RequireBoth,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check the geometry settings for consistency
    pub fn validate(&self) -> Result<()> {
        if self.block_size < BLOCK_SIZE || !self.block_size.is_power_of_two() {
            return Err(DiskError::Config(format!(
                "block size {} must be a power of two >= {}",
                self.block_size, BLOCK_SIZE
            )));
        }
        let bsize = u64::from(self.block_size);
        if self.config_size % bsize != 0 {
            return Err(DiskError::Config(format!(
                "config size {} is not a multiple of the block size {}",
                self.config_size, bsize
            )));
        }
        if self.arena_size % bsize != 0 || self.arena_size < MIN_ARENA_BLOCKS * bsize {
            return Err(DiskError::Config(format!(
                "arena size {} must be a multiple of {} and at least {} blocks",
                self.arena_size, bsize, MIN_ARENA_BLOCKS
            )));
        }
        if self.avg_file_size == 0 {
            return Err(DiskError::Config("average file size must be non-zero".into()));
        }
        if let IndexFlushStrategy::EveryNCommits { count: 0 } = self.index_flush_strategy {
            return Err(DiskError::Config("index flush count must be non-zero".into()));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the backing device path
    pub fn device_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.device_path = path.into();
        self
    }

    /// Set the size of the reserved config region (in bytes)
    pub fn config_size(mut self, size: u64) -> Self {
        self.config.config_size = size;
        self
    }

    /// Set the block size (in bytes)
    pub fn block_size(mut self, size: u32) -> Self {
        self.config.block_size = size;
        self
    }

    /// Set the target arena size (in bytes)
    pub fn arena_size(mut self, size: u64) -> Self {
        self.config.arena_size = size;
        self
    }

    /// Allow or forbid scaling the arena size down on small devices
    pub fn scale_arenas(mut self, scale: bool) -> Self {
        self.config.scale_arenas = scale;
        self
    }

    /// Set the average file size used for index sizing (in bytes)
    pub fn avg_file_size(mut self, size: u64) -> Self {
        self.config.avg_file_size = size;
        self
    }

    /// Set the index flush strategy
    pub fn index_flush_strategy(mut self, strategy: IndexFlushStrategy) -> Self {
        self.config.index_flush_strategy = strategy;
        self
    }

    /// Set the superblock selection policy
    pub fn superblock_policy(mut self, policy: SuperblockPolicy) -> Self {
        self.config.superblock_policy = policy;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
