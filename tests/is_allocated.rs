use aero_vdi::{CreateOptions, MemBackend, VdiDisk};

fn disk() -> VdiDisk<MemBackend> {
    let opts = CreateOptions::new(4 * 1024 * 1024); // 4 blocks
    VdiDisk::create(MemBackend::new(), &opts).unwrap()
}

#[test]
fn is_allocated_honest_before_and_after_write() {
    let mut disk = disk();
    let (allocated, n) = disk.is_allocated(0, 100).unwrap();
    assert_eq!((allocated, n), (false, 100));

    disk.write_sectors(0, &vec![1u8; 512]).unwrap();
    let (allocated, n) = disk.is_allocated(0, 100).unwrap();
    assert_eq!((allocated, n), (true, 100));
}

#[test]
fn is_allocated_clamps_run_length_to_block_boundary() {
    let disk = disk();
    // Sector 2047 is the last sector of block 0; request spans into block 1.
    let (_, n) = disk.is_allocated(2047, 10).unwrap();
    assert_eq!(n, 1);
}

#[test]
fn is_allocated_clamps_to_end_of_disk() {
    let disk = disk();
    let total_sectors = disk.header().total_sectors();
    let (allocated, n) = disk.is_allocated(total_sectors - 1, 10).unwrap();
    assert_eq!(allocated, false);
    assert_eq!(n, 1);
}

#[test]
fn is_allocated_past_end_reports_nothing() {
    let disk = disk();
    let total_sectors = disk.header().total_sectors();
    let (allocated, n) = disk.is_allocated(total_sectors + 5, 10).unwrap();
    assert_eq!((allocated, n), (false, 0));
}
