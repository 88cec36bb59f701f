//! Sparse, growable VDI disk image driver.
//!
//! Exposes a little-endian header codec, a block-map index, and a
//! crash-safe first-write allocator behind the same `StorageBackend` /
//! `VirtualDisk` seam used by the rest of this crate's disk formats.

pub mod backend;
pub mod error;
pub mod format;
pub mod options;
pub mod vdi;
pub mod virtual_disk;

pub use backend::{FileBackend, MemBackend, ReadOnlyBackend, StdFileBackend, StorageBackend};
pub use error::{DiskError, FormatError, RangeError, Result};
pub use format::{detect_format, DiskFormat, DiskImage, SECTOR_SIZE};
pub use options::CreateOptions;
pub use vdi::{AllocationStage, ImageUuids, VdiDisk, VdiHeader, BLOCK_SIZE};
pub use virtual_disk::{RawDisk, ReadOnlyDisk, VirtualDisk};
