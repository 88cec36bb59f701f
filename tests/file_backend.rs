use aero_vdi::{CreateOptions, DiskFormat, DiskImage, FileBackend, StorageBackend, VdiDisk, VirtualDisk};
use tempfile::tempdir;

#[test]
fn vdi_image_persists_across_reopen_on_disk() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("disk.vdi");

    {
        let backend = FileBackend::create(&path, 0).unwrap();
        let opts = CreateOptions::new(2 * 1024 * 1024);
        let mut disk = VdiDisk::create(backend, &opts).unwrap();
        disk.write_at(123, &[9, 8, 7, 6]).unwrap();
        disk.flush().unwrap();
    }

    let backend = FileBackend::open_rw(&path).unwrap();
    let mut disk = DiskImage::open_auto(backend).unwrap();
    assert_eq!(disk.format(), DiskFormat::Vdi);

    let mut back = [0u8; 4];
    disk.read_at(123, &mut back).unwrap();
    assert_eq!(back, [9, 8, 7, 6]);
}

#[test]
fn vdi_image_read_only_rejects_writes() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("disk.vdi");

    {
        let backend = FileBackend::create(&path, 0).unwrap();
        let opts = CreateOptions::new(1024 * 1024);
        VdiDisk::create(backend, &opts).unwrap();
    }

    let mut backend = FileBackend::open_read_only(&path).unwrap();
    let err = backend.write_at(0, &[1]).unwrap_err();
    assert!(matches!(err, aero_vdi::DiskError::NotSupported(msg) if msg == "read-only backend"));
}

#[test]
fn raw_bytes_fall_back_to_raw_format() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("plain.img");
    std::fs::write(&path, vec![0u8; 4096]).unwrap();

    let backend = FileBackend::open_rw(&path).unwrap();
    let disk = DiskImage::open_auto(backend).unwrap();
    assert_eq!(disk.format(), DiskFormat::Raw);
}
