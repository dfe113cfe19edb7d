//! Page-level storage primitives.
//!
//! This module defines the core page abstractions:
//! - `PageId`: Unique identifier for a page
//! - `DiskManager`: Page I/O interface consumed by the buffer pool
//! - `FileDiskManager`: File-backed `DiskManager`

mod disk_manager;
mod page_id;

pub use disk_manager::{DiskManager, FileDiskManager};
pub use page_id::PageId;

/// Page size in bytes (4KB).
pub const PAGE_SIZE: usize = 4096;

/// A page-sized byte buffer.
pub type PageData = [u8; PAGE_SIZE];
