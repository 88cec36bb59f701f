use crate::error::FormatError;
use uuid::Uuid;

pub const SIGNATURE: u32 = 0xBEDA_107F;
pub const VERSION_1_1: u32 = 0x0001_0001;
pub const SECTOR_SIZE: u64 = 512;
pub const BLOCK_SIZE: u32 = 1024 * 1024;
pub const HEADER_BYTES: usize = 512;

/// Recognized values of [`VdiHeader::image_type`].
pub const IMAGE_TYPE_DYNAMIC: u32 = 1;
pub const IMAGE_TYPE_STATIC: u32 = 2;

const TEXT_OFFSET: usize = 0;
const TEXT_LEN: usize = 0x40;
const SIGNATURE_OFFSET: usize = 0x40;
const VERSION_OFFSET: usize = 0x44;
const HEADER_SIZE_OFFSET: usize = 0x48;
const IMAGE_TYPE_OFFSET: usize = 0x4C;
const IMAGE_FLAGS_OFFSET: usize = 0x50;
const DESCRIPTION_OFFSET: usize = 0x54;
const DESCRIPTION_LEN: usize = 256;
const OFFSET_BLOCKMAP_OFFSET: usize = 0x154;
const OFFSET_DATA_OFFSET: usize = 0x158;
const CYLINDERS_OFFSET: usize = 0x15C;
const HEADS_OFFSET: usize = 0x160;
const SECTORS_OFFSET: usize = 0x164;
const SECTOR_SIZE_OFFSET: usize = 0x168;
const UNUSED1_OFFSET: usize = 0x16C;
const DISK_SIZE_OFFSET: usize = 0x170;
const BLOCK_SIZE_OFFSET: usize = 0x178;
const BLOCK_EXTRA_OFFSET: usize = 0x17C;
const BLOCKS_IN_IMAGE_OFFSET: usize = 0x180;
const BLOCKS_ALLOCATED_OFFSET: usize = 0x184;
const UUID_IMAGE_OFFSET: usize = 0x188;
const UUID_LAST_SNAP_OFFSET: usize = 0x198;
const UUID_LINK_OFFSET: usize = 0x1A8;
const UUID_PARENT_OFFSET: usize = 0x1B8;

const TEXT_DEFAULT: &[u8] = b"<<< disk image >>>\n";

/// Opaque identity carried by a header; generated once at image creation.
/// The codec accepts these as given input rather than generating them
/// itself, so header encode/decode stays pure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageUuids {
    pub image: [u8; 16],
    pub last_snap: [u8; 16],
    pub link: [u8; 16],
    pub parent: [u8; 16],
}

impl ImageUuids {
    /// Generates fresh image and last-snapshot UUIDs. Link and parent stay
    /// zero: this driver does not build snapshot chains.
    pub fn generate() -> Self {
        Self {
            image: *Uuid::new_v4().as_bytes(),
            last_snap: *Uuid::new_v4().as_bytes(),
            link: [0u8; 16],
            parent: [0u8; 16],
        }
    }

    fn zero() -> Self {
        Self { image: [0; 16], last_snap: [0; 16], link: [0; 16], parent: [0; 16] }
    }
}

/// In-memory representation of the 512-byte VDI header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VdiHeader {
    pub text: [u8; TEXT_LEN],
    pub signature: u32,
    pub version: u32,
    pub header_size: u32,
    pub image_type: u32,
    pub image_flags: u32,
    pub description: [u8; DESCRIPTION_LEN],
    pub offset_blockmap: u32,
    pub offset_data: u32,
    pub cylinders: u32,
    pub heads: u32,
    pub sectors: u32,
    pub sector_size: u32,
    pub disk_size: u64,
    pub block_size: u32,
    pub block_extra: u32,
    pub blocks_in_image: u32,
    pub blocks_allocated: u32,
    pub uuids: ImageUuids,
}

impl VdiHeader {
    /// Builds a fresh header for a dynamic (sparse) or static (pre-allocated)
    /// image of the given logical size. `disk_size` must be a multiple of
    /// [`BLOCK_SIZE`].
    pub fn new(disk_size: u64, static_image: bool, uuids: ImageUuids) -> Self {
        let blocks_in_image = (disk_size / BLOCK_SIZE as u64) as u32;
        let blockmap_bytes = blocks_in_image as u64 * 4;
        let blockmap_sectors = blockmap_bytes.div_ceil(SECTOR_SIZE);
        let offset_blockmap = SECTOR_SIZE as u32;
        let offset_data = (SECTOR_SIZE + blockmap_sectors * SECTOR_SIZE) as u32;

        let mut text = [0u8; TEXT_LEN];
        let n = TEXT_DEFAULT.len().min(TEXT_LEN);
        text[..n].copy_from_slice(&TEXT_DEFAULT[..n]);

        Self {
            text,
            signature: SIGNATURE,
            version: VERSION_1_1,
            header_size: 0x180,
            image_type: if static_image { IMAGE_TYPE_STATIC } else { IMAGE_TYPE_DYNAMIC },
            image_flags: 0,
            description: [0u8; DESCRIPTION_LEN],
            offset_blockmap,
            offset_data,
            cylinders: 0,
            heads: 0,
            sectors: 0,
            sector_size: SECTOR_SIZE as u32,
            disk_size,
            block_size: BLOCK_SIZE,
            block_extra: 0,
            blocks_in_image,
            blocks_allocated: if static_image { blocks_in_image } else { 0 },
            uuids,
        }
    }

    #[cfg(test)]
    pub(crate) fn new_for_test(disk_size: u64, static_image: bool) -> Self {
        Self::new(disk_size, static_image, ImageUuids::zero())
    }

    pub fn block_sectors(&self) -> u32 {
        self.block_size / SECTOR_SIZE as u32
    }

    pub fn total_sectors(&self) -> u64 {
        self.disk_size / SECTOR_SIZE
    }

    pub fn blockmap_sectors(&self) -> u64 {
        (self.blocks_in_image as u64 * 4).div_ceil(SECTOR_SIZE)
    }

    /// Validates the invariants every loaded header must satisfy.
    pub fn validate(&self) -> Result<(), FormatError> {
        if self.signature != SIGNATURE {
            return Err(FormatError::BadSignature);
        }
        if self.version != VERSION_1_1 {
            return Err(FormatError::BadVersion);
        }
        if self.sector_size != SECTOR_SIZE as u32 {
            return Err(FormatError::BadSectorSize);
        }
        if self.block_size != BLOCK_SIZE {
            return Err(FormatError::BadBlockSize);
        }
        if self.offset_blockmap == 0 || self.offset_blockmap as u64 % SECTOR_SIZE != 0 {
            return Err(FormatError::UnalignedBlockmap);
        }
        if self.offset_data == 0 || self.offset_data as u64 % SECTOR_SIZE != 0 {
            return Err(FormatError::UnalignedData);
        }
        if self.blocks_in_image as u64 * self.block_size as u64 != self.disk_size {
            return Err(FormatError::SizeMismatch);
        }
        Ok(())
    }

    pub fn decode(buf: &[u8; HEADER_BYTES]) -> Result<Self, FormatError> {
        let mut text = [0u8; TEXT_LEN];
        text.copy_from_slice(&buf[TEXT_OFFSET..TEXT_OFFSET + TEXT_LEN]);
        let mut description = [0u8; DESCRIPTION_LEN];
        description.copy_from_slice(&buf[DESCRIPTION_OFFSET..DESCRIPTION_OFFSET + DESCRIPTION_LEN]);

        let read_u32 = |off: usize| u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
        let read_u64 = |off: usize| u64::from_le_bytes(buf[off..off + 8].try_into().unwrap());
        let read_uuid = |off: usize| -> [u8; 16] { buf[off..off + 16].try_into().unwrap() };

        let header = Self {
            text,
            signature: read_u32(SIGNATURE_OFFSET),
            version: read_u32(VERSION_OFFSET),
            header_size: read_u32(HEADER_SIZE_OFFSET),
            image_type: read_u32(IMAGE_TYPE_OFFSET),
            image_flags: read_u32(IMAGE_FLAGS_OFFSET),
            description,
            offset_blockmap: read_u32(OFFSET_BLOCKMAP_OFFSET),
            offset_data: read_u32(OFFSET_DATA_OFFSET),
            cylinders: read_u32(CYLINDERS_OFFSET),
            heads: read_u32(HEADS_OFFSET),
            sectors: read_u32(SECTORS_OFFSET),
            sector_size: read_u32(SECTOR_SIZE_OFFSET),
            disk_size: read_u64(DISK_SIZE_OFFSET),
            block_size: read_u32(BLOCK_SIZE_OFFSET),
            block_extra: read_u32(BLOCK_EXTRA_OFFSET),
            blocks_in_image: read_u32(BLOCKS_IN_IMAGE_OFFSET),
            blocks_allocated: read_u32(BLOCKS_ALLOCATED_OFFSET),
            uuids: ImageUuids {
                image: read_uuid(UUID_IMAGE_OFFSET),
                last_snap: read_uuid(UUID_LAST_SNAP_OFFSET),
                link: read_uuid(UUID_LINK_OFFSET),
                parent: read_uuid(UUID_PARENT_OFFSET),
            },
        };
        header.validate()?;
        Ok(header)
    }

    pub fn encode(&self) -> [u8; HEADER_BYTES] {
        let mut buf = [0u8; HEADER_BYTES];
        buf[TEXT_OFFSET..TEXT_OFFSET + TEXT_LEN].copy_from_slice(&self.text);
        buf[SIGNATURE_OFFSET..SIGNATURE_OFFSET + 4].copy_from_slice(&self.signature.to_le_bytes());
        buf[VERSION_OFFSET..VERSION_OFFSET + 4].copy_from_slice(&self.version.to_le_bytes());
        buf[HEADER_SIZE_OFFSET..HEADER_SIZE_OFFSET + 4]
            .copy_from_slice(&self.header_size.to_le_bytes());
        buf[IMAGE_TYPE_OFFSET..IMAGE_TYPE_OFFSET + 4].copy_from_slice(&self.image_type.to_le_bytes());
        buf[IMAGE_FLAGS_OFFSET..IMAGE_FLAGS_OFFSET + 4]
            .copy_from_slice(&self.image_flags.to_le_bytes());
        buf[DESCRIPTION_OFFSET..DESCRIPTION_OFFSET + DESCRIPTION_LEN]
            .copy_from_slice(&self.description);
        buf[OFFSET_BLOCKMAP_OFFSET..OFFSET_BLOCKMAP_OFFSET + 4]
            .copy_from_slice(&self.offset_blockmap.to_le_bytes());
        buf[OFFSET_DATA_OFFSET..OFFSET_DATA_OFFSET + 4].copy_from_slice(&self.offset_data.to_le_bytes());
        buf[CYLINDERS_OFFSET..CYLINDERS_OFFSET + 4].copy_from_slice(&self.cylinders.to_le_bytes());
        buf[HEADS_OFFSET..HEADS_OFFSET + 4].copy_from_slice(&self.heads.to_le_bytes());
        buf[SECTORS_OFFSET..SECTORS_OFFSET + 4].copy_from_slice(&self.sectors.to_le_bytes());
        buf[SECTOR_SIZE_OFFSET..SECTOR_SIZE_OFFSET + 4].copy_from_slice(&self.sector_size.to_le_bytes());
        buf[UNUSED1_OFFSET..UNUSED1_OFFSET + 4].copy_from_slice(&0u32.to_le_bytes());
        buf[DISK_SIZE_OFFSET..DISK_SIZE_OFFSET + 8].copy_from_slice(&self.disk_size.to_le_bytes());
        buf[BLOCK_SIZE_OFFSET..BLOCK_SIZE_OFFSET + 4].copy_from_slice(&self.block_size.to_le_bytes());
        buf[BLOCK_EXTRA_OFFSET..BLOCK_EXTRA_OFFSET + 4].copy_from_slice(&self.block_extra.to_le_bytes());
        buf[BLOCKS_IN_IMAGE_OFFSET..BLOCKS_IN_IMAGE_OFFSET + 4]
            .copy_from_slice(&self.blocks_in_image.to_le_bytes());
        buf[BLOCKS_ALLOCATED_OFFSET..BLOCKS_ALLOCATED_OFFSET + 4]
            .copy_from_slice(&self.blocks_allocated.to_le_bytes());
        buf[UUID_IMAGE_OFFSET..UUID_IMAGE_OFFSET + 16].copy_from_slice(&self.uuids.image);
        buf[UUID_LAST_SNAP_OFFSET..UUID_LAST_SNAP_OFFSET + 16].copy_from_slice(&self.uuids.last_snap);
        buf[UUID_LINK_OFFSET..UUID_LINK_OFFSET + 16].copy_from_slice(&self.uuids.link);
        buf[UUID_PARENT_OFFSET..UUID_PARENT_OFFSET + 16].copy_from_slice(&self.uuids.parent);
        // Trailing reserved bytes (unused2[7]) stay zero.
        buf
    }

    /// Scores how confidently `buf` looks like a VDI header: 100 if the
    /// signature and version match, 0 otherwise.
    pub fn probe(buf: &[u8]) -> u32 {
        if buf.len() < HEADER_BYTES {
            return 0;
        }
        let signature = u32::from_le_bytes(buf[SIGNATURE_OFFSET..SIGNATURE_OFFSET + 4].try_into().unwrap());
        let version = u32::from_le_bytes(buf[VERSION_OFFSET..VERSION_OFFSET + 4].try_into().unwrap());
        if signature == SIGNATURE && version == VERSION_1_1 {
            100
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_encode_decode() {
        let header = VdiHeader::new(2 * 1024 * 1024, false, ImageUuids::generate());
        let encoded = header.encode();
        let decoded = VdiHeader::decode(&encoded).unwrap();
        assert_eq!(header, decoded);
    }

    #[test]
    fn new_dynamic_layout_matches_scenario_1() {
        let header = VdiHeader::new_for_test(2 * 1024 * 1024, false);
        assert_eq!(header.blocks_in_image, 2);
        assert_eq!(header.offset_blockmap, 0x200);
        assert_eq!(header.offset_data, 0x400);
        assert_eq!(header.blocks_allocated, 0);
    }

    #[test]
    fn static_image_preallocates() {
        let header = VdiHeader::new_for_test(2 * 1024 * 1024, true);
        assert_eq!(header.blocks_allocated, header.blocks_in_image);
        assert_eq!(header.image_type, IMAGE_TYPE_STATIC);
    }

    #[test]
    fn decode_rejects_bad_signature() {
        let mut buf = VdiHeader::new_for_test(1024 * 1024, false).encode();
        buf[SIGNATURE_OFFSET] ^= 0xFF;
        assert_eq!(VdiHeader::decode(&buf).unwrap_err(), FormatError::BadSignature);
    }

    #[test]
    fn probe_scores_signature_match() {
        let buf = VdiHeader::new_for_test(1024 * 1024, false).encode();
        assert_eq!(VdiHeader::probe(&buf), 100);
        assert_eq!(VdiHeader::probe(&[0u8; 64]), 0);
    }
}
