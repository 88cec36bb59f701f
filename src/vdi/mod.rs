pub mod allocator;
pub mod blockmap;
pub mod disk;
pub mod header;

pub use allocator::AllocationStage;
pub use disk::VdiDisk;
pub use header::{ImageUuids, VdiHeader, BLOCK_SIZE, SECTOR_SIZE};
