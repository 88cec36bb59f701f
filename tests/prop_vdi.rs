use aero_vdi::{CreateOptions, MemBackend, VdiDisk, VirtualDisk};
use proptest::prelude::*;
use proptest::test_runner::TestCaseResult;

const BLOCK_SIZE: u64 = 1024 * 1024;
const MAX_BLOCKS: u64 = 4;
const MAX_OPS_PER_CASE: usize = 40;
const MAX_RW_LEN: usize = 4096;

#[derive(Clone, Debug)]
enum Op {
    Read { offset: u64, len: usize },
    Write { offset: u64, data: Vec<u8> },
    Flush,
}

fn offset_len_strategy(capacity: u64) -> impl Strategy<Value = (u64, usize)> {
    let offset = prop_oneof![
        2 => 0u64..capacity,
        1 => Just(0u64),
        1 => Just(capacity - 1),
    ];
    offset.prop_flat_map(move |offset| {
        let remaining = capacity - offset;
        let max_len = (remaining.min(MAX_RW_LEN as u64)) as usize;
        prop_oneof![1 => Just(1usize), 1 => Just(max_len), 2 => 1usize..=max_len]
            .prop_map(move |len| (offset, len))
    })
}

fn op_strategy(capacity: u64) -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => offset_len_strategy(capacity).prop_map(|(offset, len)| Op::Read { offset, len }),
        4 => offset_len_strategy(capacity).prop_flat_map(|(offset, len)| {
            prop::collection::vec(any::<u8>(), len).prop_map(move |data| Op::Write { offset, data })
        }),
        1 => Just(Op::Flush),
    ]
}

fn case_strategy() -> impl Strategy<Value = (u64, Vec<Op>)> {
    (1u64..=MAX_BLOCKS).prop_flat_map(|blocks| {
        let capacity = blocks * BLOCK_SIZE;
        let ops = prop::collection::vec(op_strategy(capacity), 1..=MAX_OPS_PER_CASE);
        (Just(capacity), ops)
    })
}

fn apply_ops(disk: &mut VdiDisk<MemBackend>, model: &mut [u8], ops: &[Op]) -> TestCaseResult {
    for op in ops {
        match op {
            Op::Read { offset, len } => {
                let off = *offset as usize;
                let mut buf = vec![0u8; *len];
                disk.read_at(*offset, &mut buf)
                    .map_err(|e| TestCaseError::fail(format!("read_at failed: {e:?}")))?;
                prop_assert_eq!(buf.as_slice(), &model[off..off + len]);
            }
            Op::Write { offset, data } => {
                let off = *offset as usize;
                disk.write_at(*offset, data)
                    .map_err(|e| TestCaseError::fail(format!("write_at failed: {e:?}")))?;
                model[off..off + data.len()].copy_from_slice(data);
            }
            Op::Flush => {
                disk.flush().map_err(|e| TestCaseError::fail(format!("flush failed: {e:?}")))?;
            }
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 48, .. ProptestConfig::default() })]

    #[test]
    fn vdi_disk_matches_flat_reference_model((capacity, ops) in case_strategy()) {
        let capacity_usize = capacity as usize;
        let mut model = vec![0u8; capacity_usize];

        let opts = CreateOptions::new(capacity);
        let mut disk = VdiDisk::create(MemBackend::new(), &opts).unwrap();
        prop_assert_eq!(disk.capacity_bytes(), capacity);

        apply_ops(&mut disk, &mut model, &ops)?;

        disk.flush().unwrap();
        prop_assert_eq!(disk.check(), 0);

        let backend = disk.into_backend();
        let mut reopened = VdiDisk::open(backend).unwrap();
        let mut full = vec![0u8; capacity_usize];
        reopened.read_at(0, &mut full).unwrap();
        prop_assert_eq!(full, model);
    }
}
