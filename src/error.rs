use thiserror::Error;

/// Errors surfaced by format decoding inside the VDI header and block map.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatError {
    #[error("bad VDI signature")]
    BadSignature,
    #[error("unsupported VDI version")]
    BadVersion,
    #[error("block map offset is not sector-aligned")]
    UnalignedBlockmap,
    #[error("data region offset is not sector-aligned")]
    UnalignedData,
    #[error("sector size is not 512 bytes")]
    BadSectorSize,
    #[error("block size is not 1 MiB")]
    BadBlockSize,
    #[error("disk_size does not equal blocks_in_image * block_size")]
    SizeMismatch,
    #[error("block map entry indexes past blocks_in_image")]
    EntryOutOfRange,
}

/// Errors surfaced when a logical address falls outside a valid range.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeError {
    #[error("sector number is negative")]
    NegativeSector,
    #[error("block index {index} is out of range (blocks_in_image = {blocks_in_image})")]
    BlockIndexOutOfRange { index: u32, blocks_in_image: u32 },
}

/// Unified error type for the storage backends, virtual disk trait, and the VDI driver.
#[derive(Error, Debug)]
pub enum DiskError {
    #[error("io error: {0}")]
    Io(String),

    #[error("out of bounds: offset {offset} len {len} capacity {capacity}")]
    OutOfBounds { offset: u64, len: u64, capacity: u64 },

    #[error("offset overflow")]
    OffsetOverflow,

    #[error("not supported: {0}")]
    NotSupported(String),

    #[error("format error: {0}")]
    Format(#[from] FormatError),

    #[error("range error: {0}")]
    Range(#[from] RangeError),

    #[error("consistency error: {0}")]
    Consistency(String),

    #[error("internal state error: {0}")]
    State(&'static str),
}

impl From<std::io::Error> for DiskError {
    fn from(e: std::io::Error) -> Self {
        DiskError::Io(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DiskError>;
