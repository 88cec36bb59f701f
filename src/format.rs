use crate::backend::StorageBackend;
use crate::error::Result;
use crate::vdi::header::{VdiHeader, HEADER_BYTES};
use crate::vdi::VdiDisk;
use crate::virtual_disk::{RawDisk, VirtualDisk};

pub const SECTOR_SIZE: usize = 512;

/// Formats this crate can recognize from raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskFormat {
    Raw,
    Vdi,
}

/// Probes `buf` (at least the first [`HEADER_BYTES`] bytes of a candidate
/// image) and returns the best-matching format, or `None` if nothing
/// recognized it with high confidence.
pub fn detect_format(buf: &[u8]) -> Option<DiskFormat> {
    if VdiHeader::probe(buf) == 100 {
        Some(DiskFormat::Vdi)
    } else {
        None
    }
}

enum Inner<B> {
    Raw(RawDisk<B>),
    Vdi(VdiDisk<B>),
}

/// A format-detecting wrapper: opens the backend as whichever recognized
/// format its bytes probe as, falling back to a flat [`RawDisk`].
pub struct DiskImage<B> {
    inner: Inner<B>,
    format: DiskFormat,
}

impl<B: StorageBackend> DiskImage<B> {
    pub fn open_auto(mut backend: B) -> Result<Self> {
        let len = backend.len()?;
        let mut probe_buf = vec![0u8; HEADER_BYTES.min(len as usize)];
        if !probe_buf.is_empty() {
            backend.read_at(0, &mut probe_buf)?;
        }

        match detect_format(&probe_buf) {
            Some(DiskFormat::Vdi) => {
                let disk = VdiDisk::open(backend)?;
                Ok(Self { inner: Inner::Vdi(disk), format: DiskFormat::Vdi })
            }
            _ => {
                let disk = RawDisk::open(backend)?;
                Ok(Self { inner: Inner::Raw(disk), format: DiskFormat::Raw })
            }
        }
    }

    pub fn format(&self) -> DiskFormat {
        self.format
    }

    pub fn read_sectors(&mut self, sector_offset: u64, buf: &mut [u8]) -> Result<()> {
        match &mut self.inner {
            Inner::Raw(disk) => disk.read_at(sector_offset * SECTOR_SIZE as u64, buf),
            Inner::Vdi(disk) => disk.read_sectors(sector_offset, buf),
        }
    }

    pub fn write_sectors(&mut self, sector_offset: u64, buf: &[u8]) -> Result<()> {
        match &mut self.inner {
            Inner::Raw(disk) => disk.write_at(sector_offset * SECTOR_SIZE as u64, buf),
            Inner::Vdi(disk) => disk.write_sectors(sector_offset, buf),
        }
    }
}

impl<B: StorageBackend> VirtualDisk for DiskImage<B> {
    fn capacity_bytes(&self) -> u64 {
        match &self.inner {
            Inner::Raw(disk) => disk.capacity_bytes(),
            Inner::Vdi(disk) => disk.capacity_bytes(),
        }
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        match &mut self.inner {
            Inner::Raw(disk) => disk.read_at(offset, buf),
            Inner::Vdi(disk) => disk.read_at(offset, buf),
        }
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        match &mut self.inner {
            Inner::Raw(disk) => disk.write_at(offset, buf),
            Inner::Vdi(disk) => disk.write_at(offset, buf),
        }
    }

    fn flush(&mut self) -> Result<()> {
        match &mut self.inner {
            Inner::Raw(disk) => disk.flush(),
            Inner::Vdi(disk) => disk.flush(),
        }
    }
}
