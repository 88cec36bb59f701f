use crate::backend::StorageBackend;
use crate::error::{DiskError, Result};

/// Byte-addressed virtual disk. Any disk-like object -- flat, sparse, or a
/// generic wrapper -- implements this so higher layers compose uniformly.
pub trait VirtualDisk {
    fn capacity_bytes(&self) -> u64;
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()>;
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
}

/// Flat, non-sparse disk directly over a backend's bytes. Used as a
/// baseline in tests and as the fallback format for bytes that do not
/// probe as any recognized sparse format.
pub struct RawDisk<B> {
    backend: B,
    capacity_bytes: u64,
}

impl<B: StorageBackend> RawDisk<B> {
    pub fn create(mut backend: B, capacity_bytes: u64) -> Result<Self> {
        backend.set_len(capacity_bytes)?;
        Ok(Self { backend, capacity_bytes })
    }

    pub fn open(backend: B) -> Result<Self> {
        let capacity_bytes = backend.len()?;
        Ok(Self { backend, capacity_bytes })
    }

    pub fn into_backend(self) -> B {
        self.backend
    }
}

impl<B: StorageBackend> VirtualDisk for RawDisk<B> {
    fn capacity_bytes(&self) -> u64 {
        self.capacity_bytes
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.backend.read_at(offset, buf)
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        self.backend.write_at(offset, buf)
    }

    fn flush(&mut self) -> Result<()> {
        self.backend.flush()
    }
}

/// Wraps any `VirtualDisk` and rejects mutation, the way `ReadOnlyBackend`
/// does for `StorageBackend`.
pub struct ReadOnlyDisk<D> {
    inner: D,
}

impl<D: VirtualDisk> ReadOnlyDisk<D> {
    pub fn new(inner: D) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> D {
        self.inner
    }
}

impl<D: VirtualDisk> VirtualDisk for ReadOnlyDisk<D> {
    fn capacity_bytes(&self) -> u64 {
        self.inner.capacity_bytes()
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.inner.read_at(offset, buf)
    }

    fn write_at(&mut self, _offset: u64, _buf: &[u8]) -> Result<()> {
        Err(DiskError::NotSupported("read-only".to_string()))
    }

    fn flush(&mut self) -> Result<()> {
        Err(DiskError::NotSupported("read-only".to_string()))
    }
}
