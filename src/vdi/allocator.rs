/// Stages of the first-write growth protocol, named for documentation and
/// for fault-injection tests. A blocking implementation runs straight
/// through all four; an async executor built on [`crate::StorageBackend`]
/// could drive them one suspension point at a time without changing the
/// write ordering they encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationStage {
    /// No allocation in flight; ordinary read/write traffic.
    Normal,
    /// The data block has been written; the block-map sector still needs
    /// to be patched.
    MustWriteMap,
    /// The block-map sector has been written; the header still needs to be
    /// rewritten with the new `blocks_allocated`.
    MustWriteHeader,
    /// All three writes of the growth protocol are complete.
    HeaderWritten,
}
