use crate::error::{DiskError, Result};
use std::fs::{File, OpenOptions};
use std::path::Path;

/// Byte-addressed storage collaborator. Positional: none of its methods
/// disturb a shared cursor, so the same handle can back multiple readers.
pub trait StorageBackend {
    fn len(&self) -> Result<u64>;
    fn set_len(&mut self, new_len: u64) -> Result<()>;
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()>;
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
}

fn checked_range(offset: u64, len: u64, capacity: u64) -> Result<()> {
    let end = offset.checked_add(len).ok_or(DiskError::OffsetOverflow)?;
    if end > capacity {
        return Err(DiskError::OutOfBounds { offset, len, capacity });
    }
    Ok(())
}

/// In-memory backend over a growable byte vector. Used for tests and for
/// building images before they are ever written to a filesystem.
#[derive(Debug, Default, Clone)]
pub struct MemBackend {
    data: Vec<u8>,
}

impl MemBackend {
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    pub fn with_len(len: u64) -> Result<Self> {
        let len_usize: usize = len.try_into().map_err(|_| DiskError::OffsetOverflow)?;
        Ok(Self { data: vec![0u8; len_usize] })
    }

    pub fn from_vec(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

impl StorageBackend for MemBackend {
    fn len(&self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }

    fn set_len(&mut self, new_len: u64) -> Result<()> {
        let new_len_usize: usize = new_len.try_into().map_err(|_| DiskError::OffsetOverflow)?;
        self.data.resize(new_len_usize, 0);
        Ok(())
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        checked_range(offset, buf.len() as u64, self.data.len() as u64)?;
        let start: usize = offset.try_into().map_err(|_| DiskError::OffsetOverflow)?;
        buf.copy_from_slice(&self.data[start..start + buf.len()]);
        Ok(())
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        let end = offset.checked_add(buf.len() as u64).ok_or(DiskError::OffsetOverflow)?;
        if end > self.data.len() as u64 {
            self.set_len(end)?;
        }
        let start: usize = offset.try_into().map_err(|_| DiskError::OffsetOverflow)?;
        self.data[start..start + buf.len()].copy_from_slice(buf);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(unix)]
fn pread(file: &File, offset: u64, buf: &mut [u8]) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(unix)]
fn pwrite(file: &File, offset: u64, buf: &[u8]) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buf, offset)
}

#[cfg(windows)]
fn pread(file: &File, offset: u64, buf: &mut [u8]) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    let mut pos = offset;
    let mut filled = 0usize;
    while filled < buf.len() {
        let n = file.seek_read(&mut buf[filled..], pos)?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "short read",
            ));
        }
        filled += n;
        pos += n as u64;
    }
    Ok(())
}

#[cfg(windows)]
fn pwrite(file: &File, offset: u64, buf: &[u8]) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    let mut pos = offset;
    let mut written = 0usize;
    while written < buf.len() {
        let n = file.seek_write(&buf[written..], pos)?;
        written += n;
        pos += n as u64;
    }
    Ok(())
}

/// Backend directly over a caller-owned `std::fs::File`, using positional I/O
/// so it never disturbs a cursor shared with other users of the same handle.
pub struct StdFileBackend {
    file: File,
    read_only: bool,
}

impl StdFileBackend {
    pub fn from_file(file: File) -> Self {
        Self { file, read_only: false }
    }

    pub fn into_file(self) -> File {
        self.file
    }

    fn require_writable(&self) -> Result<()> {
        if self.read_only {
            Err(DiskError::NotSupported("read-only backend".to_string()))
        } else {
            Ok(())
        }
    }
}

impl StorageBackend for StdFileBackend {
    fn len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn set_len(&mut self, new_len: u64) -> Result<()> {
        self.require_writable()?;
        self.file.set_len(new_len)?;
        Ok(())
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let capacity = self.len()?;
        checked_range(offset, buf.len() as u64, capacity)?;
        pread(&self.file, offset, buf)?;
        Ok(())
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        self.require_writable()?;
        let end = offset.checked_add(buf.len() as u64).ok_or(DiskError::OffsetOverflow)?;
        let capacity = self.len()?;
        if end > capacity {
            self.file.set_len(end)?;
        }
        pwrite(&self.file, offset, buf)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}

/// Backend over a file opened by path, tracking whether it was opened
/// read-only so mutation attempts fail fast with a descriptive error.
pub struct FileBackend {
    inner: StdFileBackend,
}

impl FileBackend {
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().read(true).open(path)?;
        Ok(Self { inner: StdFileBackend { file, read_only: true } })
    }

    pub fn open_rw<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self { inner: StdFileBackend { file, read_only: false } })
    }

    pub fn create<P: AsRef<Path>>(path: P, len: u64) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(len)?;
        Ok(Self { inner: StdFileBackend { file, read_only: false } })
    }
}

impl StorageBackend for FileBackend {
    fn len(&self) -> Result<u64> {
        self.inner.len()
    }

    fn set_len(&mut self, new_len: u64) -> Result<()> {
        self.inner.set_len(new_len)
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.inner.read_at(offset, buf)
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        self.inner.write_at(offset, buf)
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()
    }
}

/// Wraps any backend and rejects every mutating call.
pub struct ReadOnlyBackend<B> {
    inner: B,
}

impl<B: StorageBackend> ReadOnlyBackend<B> {
    pub fn new(inner: B) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> B {
        self.inner
    }
}

impl<B: StorageBackend> StorageBackend for ReadOnlyBackend<B> {
    fn len(&self) -> Result<u64> {
        self.inner.len()
    }

    fn set_len(&mut self, _new_len: u64) -> Result<()> {
        Err(DiskError::NotSupported("read-only".to_string()))
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_backend_write_extends_and_zero_fills() {
        let mut backend = MemBackend::new();
        backend.write_at(4, &[1, 2]).unwrap();
        assert_eq!(backend.len().unwrap(), 6);
        let mut buf = [0xFFu8; 4];
        backend.read_at(0, &mut buf).unwrap();
        assert_eq!(buf, [0, 0, 0, 0]);
    }

    #[test]
    fn mem_backend_offset_overflow() {
        let mut backend = MemBackend::with_len(4).unwrap();
        let mut buf = [0u8; 1];
        assert!(matches!(
            backend.read_at(u64::MAX, &mut buf),
            Err(DiskError::OffsetOverflow)
        ));
    }

    #[test]
    fn read_only_backend_rejects_mutation() {
        let mut backend = ReadOnlyBackend::new(MemBackend::from_vec(vec![1, 2, 3, 4]));
        assert_eq!(backend.len().unwrap(), 4);
        let err = backend.write_at(0, &[9]).unwrap_err();
        assert!(matches!(err, DiskError::NotSupported(s) if s == "read-only"));
    }
}
