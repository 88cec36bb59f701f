use crate::backend::StorageBackend;
use crate::error::{DiskError, Result};
use crate::options::CreateOptions;
use crate::vdi::blockmap::BlockMap;
use crate::vdi::header::{ImageUuids, VdiHeader, HEADER_BYTES, SECTOR_SIZE};
use crate::virtual_disk::VirtualDisk;
use tracing::{debug, info, instrument};

/// A sparse, growable VDI disk image over a [`StorageBackend`].
pub struct VdiDisk<B> {
    backend: B,
    header: VdiHeader,
    map: BlockMap,
}

impl<B: StorageBackend> VdiDisk<B> {
    /// Scores how confidently `buf` looks like a VDI image header.
    pub fn probe(buf: &[u8]) -> u32 {
        VdiHeader::probe(buf)
    }

    /// Creates a new image per `opts`: writes the header and block map, and
    /// for a static image the fully pre-allocated data region.
    #[instrument(skip(backend, opts))]
    pub fn create(mut backend: B, opts: &CreateOptions) -> Result<Self> {
        opts.validate()?;
        let uuids = ImageUuids::generate();
        let header = VdiHeader::new(opts.size, opts.is_static(), uuids);
        let map = if opts.is_static() {
            BlockMap::new_identity(header.blocks_in_image, SECTOR_SIZE)
        } else {
            BlockMap::new_unallocated(header.blocks_in_image, SECTOR_SIZE)
        };

        let data_len = if opts.is_static() {
            header.offset_data as u64 + header.blocks_in_image as u64 * header.block_size as u64
        } else {
            header.offset_data as u64
        };
        backend.set_len(data_len)?;

        backend.write_at(0, &header.encode())?;
        backend.write_at(header.offset_blockmap as u64, map.as_bytes())?;
        backend.flush()?;

        info!(
            disk_size = header.disk_size,
            blocks_in_image = header.blocks_in_image,
            static_image = opts.is_static(),
            "created VDI image"
        );

        Ok(Self { backend, header, map })
    }

    /// Opens an existing image, validating the header and loading the block map.
    #[instrument(skip(backend))]
    pub fn open(mut backend: B) -> Result<Self> {
        let mut hbuf = [0u8; HEADER_BYTES];
        backend.read_at(0, &mut hbuf)?;
        let header = VdiHeader::decode(&hbuf)?;

        let blockmap_bytes = header.blockmap_sectors() * SECTOR_SIZE;
        let mut mbuf = vec![0u8; blockmap_bytes as usize];
        backend.read_at(header.offset_blockmap as u64, &mut mbuf)?;
        let map = BlockMap::from_bytes(mbuf, header.blocks_in_image);

        debug!(blocks_allocated = header.blocks_allocated, "opened VDI image");
        Ok(Self { backend, header, map })
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    pub fn header(&self) -> &VdiHeader {
        &self.header
    }

    pub fn capacity_bytes(&self) -> u64 {
        self.header.disk_size
    }

    fn block_sectors(&self) -> u64 {
        self.header.block_sectors() as u64
    }

    fn total_sectors(&self) -> u64 {
        self.header.total_sectors()
    }

    /// Reads `buf.len() / 512` sectors starting at logical sector `sector_num`.
    /// Sectors past the end of the disk are left untouched in `buf` (fill
    /// nothing for sectors past end).
    pub fn read_sectors(&mut self, sector_num: u64, buf: &mut [u8]) -> Result<()> {
        if buf.len() as u64 % SECTOR_SIZE != 0 {
            return Err(DiskError::State("buffer not a multiple of sector size"));
        }
        let mut count = buf.len() as u64 / SECTOR_SIZE;
        let mut sector = sector_num;
        let mut pos = 0usize;
        let block_sectors = self.block_sectors();
        let total_sectors = self.total_sectors();

        while count > 0 && sector < total_sectors {
            let block_index: u32 = (sector / block_sectors).try_into().unwrap();
            let sector_in_block = sector % block_sectors;
            let n = count
                .min(block_sectors - sector_in_block)
                .min(total_sectors - sector);
            let chunk = &mut buf[pos..pos + (n * SECTOR_SIZE) as usize];

            match self.map.lookup(block_index)? {
                None => chunk.fill(0),
                Some(physical) => {
                    let physical_sector = self.header.offset_data as u64 / SECTOR_SIZE
                        + physical as u64 * block_sectors
                        + sector_in_block;
                    self.backend.read_at(physical_sector * SECTOR_SIZE, chunk)?;
                }
            }

            sector += n;
            count -= n;
            pos += (n * SECTOR_SIZE) as usize;
        }
        Ok(())
    }

    /// Writes `buf.len() / 512` sectors starting at logical sector
    /// `sector_num`, allocating any unallocated block touched along the way.
    pub fn write_sectors(&mut self, sector_num: u64, buf: &[u8]) -> Result<()> {
        if buf.len() as u64 % SECTOR_SIZE != 0 {
            return Err(DiskError::State("buffer not a multiple of sector size"));
        }
        let mut count = buf.len() as u64 / SECTOR_SIZE;
        let mut sector = sector_num;
        let mut pos = 0usize;
        let block_sectors = self.block_sectors();
        let total_sectors = self.total_sectors();

        while count > 0 && sector < total_sectors {
            let block_index: u32 = (sector / block_sectors).try_into().unwrap();
            let sector_in_block = sector % block_sectors;
            let n = count
                .min(block_sectors - sector_in_block)
                .min(total_sectors - sector);
            let chunk = &buf[pos..pos + (n * SECTOR_SIZE) as usize];

            match self.map.lookup(block_index)? {
                Some(physical) => {
                    let physical_sector = self.header.offset_data as u64 / SECTOR_SIZE
                        + physical as u64 * block_sectors
                        + sector_in_block;
                    self.backend.write_at(physical_sector * SECTOR_SIZE, chunk)?;
                }
                None => {
                    self.allocate_and_write(block_index, sector_in_block, chunk)?;
                }
            }

            sector += n;
            count -= n;
            pos += (n * SECTOR_SIZE) as usize;
        }
        Ok(())
    }

    /// Materializes `block_index`: Data Write, then Map Sector Write, then
    /// Header Write, in that order (see module docs for the crash-safety
    /// rationale). `data` covers sectors
    /// `[sector_in_block, sector_in_block + data.len()/512)` of the block.
    #[instrument(skip(self, data))]
    fn allocate_and_write(&mut self, block_index: u32, sector_in_block: u64, data: &[u8]) -> Result<()> {
        let physical = self.header.blocks_allocated;
        self.map.assign(block_index, physical)?;
        self.header.blocks_allocated += 1;

        let block_size = self.header.block_size as usize;
        let mut block_buf = vec![0u8; block_size];
        let start = (sector_in_block * SECTOR_SIZE) as usize;
        block_buf[start..start + data.len()].copy_from_slice(data);

        let data_offset = self.header.offset_data as u64 + physical as u64 * self.header.block_size as u64;
        if let Err(e) = self.backend.write_at(data_offset, &block_buf) {
            // Write 1 failed: nothing reached disk, revert in-memory state.
            self.header.blocks_allocated -= 1;
            self.map.assign(block_index, crate::vdi::blockmap::UNALLOCATED)?;
            return Err(e);
        }
        debug!(block_index, physical, "allocator: data write complete");

        let (sector_index, sector_bytes) = self.map.sector_for(block_index, SECTOR_SIZE)?;
        let sector_bytes = sector_bytes.to_vec();
        self.backend
            .write_at(self.header.offset_blockmap as u64 + sector_index * SECTOR_SIZE, &sector_bytes)?;
        debug!(block_index, "allocator: map sector write complete");

        self.backend.write_at(0, &self.header.encode())?;
        debug!(block_index, blocks_allocated = self.header.blocks_allocated, "allocator: header write complete");

        Ok(())
    }

    /// For the run of sectors starting at `sector_num`, reports whether its
    /// containing block is allocated and how many sectors of `count` remain
    /// within that block.
    pub fn is_allocated(&self, sector_num: u64, count: u64) -> Result<(bool, u64)> {
        let block_sectors = self.block_sectors();
        let total_sectors = self.total_sectors();
        if sector_num >= total_sectors {
            return Ok((false, 0));
        }
        let block_index: u32 = (sector_num / block_sectors).try_into().unwrap();
        let sector_in_block = sector_num % block_sectors;
        let n = count
            .min(block_sectors - sector_in_block)
            .min(total_sectors - sector_num);
        let allocated = self.map.lookup(block_index)?.is_some();
        Ok((allocated, n))
    }

    /// Cross-checks the block map against `blocks_allocated`, returning the
    /// number of detected inconsistencies (0 means sound).
    pub fn check(&self) -> u32 {
        let (allocated, out_of_range) = self.map.check();
        let mut errors = out_of_range.len() as u32;
        if allocated != self.header.blocks_allocated {
            errors += 1;
        }
        errors
    }

    fn byte_read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        if buf.is_empty() {
            return Ok(());
        }
        let end = offset.checked_add(buf.len() as u64).ok_or(DiskError::OffsetOverflow)?;
        if end > self.capacity_bytes() {
            return Err(DiskError::OutOfBounds { offset, len: buf.len() as u64, capacity: self.capacity_bytes() });
        }

        let first_sector = offset / SECTOR_SIZE;
        let last_sector = (end - 1) / SECTOR_SIZE;
        let sector_count = last_sector - first_sector + 1;
        let mut sector_buf = vec![0u8; (sector_count * SECTOR_SIZE) as usize];
        self.read_sectors(first_sector, &mut sector_buf)?;

        let skip = (offset - first_sector * SECTOR_SIZE) as usize;
        buf.copy_from_slice(&sector_buf[skip..skip + buf.len()]);
        Ok(())
    }

    fn byte_write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        if buf.is_empty() {
            return Ok(());
        }
        let end = offset.checked_add(buf.len() as u64).ok_or(DiskError::OffsetOverflow)?;
        if end > self.capacity_bytes() {
            return Err(DiskError::OutOfBounds { offset, len: buf.len() as u64, capacity: self.capacity_bytes() });
        }

        let first_sector = offset / SECTOR_SIZE;
        let last_sector = (end - 1) / SECTOR_SIZE;
        let sector_count = last_sector - first_sector + 1;
        let mut sector_buf = vec![0u8; (sector_count * SECTOR_SIZE) as usize];

        // Preserve bytes outside the caller's slice within partially
        // touched boundary sectors.
        self.read_sectors(first_sector, &mut sector_buf)?;

        let skip = (offset - first_sector * SECTOR_SIZE) as usize;
        sector_buf[skip..skip + buf.len()].copy_from_slice(buf);
        self.write_sectors(first_sector, &sector_buf)
    }
}

impl<B: StorageBackend> VirtualDisk for VdiDisk<B> {
    fn capacity_bytes(&self) -> u64 {
        self.header.disk_size
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.byte_read_at(offset, buf)
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        self.byte_write_at(offset, buf)
    }

    fn flush(&mut self) -> Result<()> {
        self.backend.flush()
    }
}
