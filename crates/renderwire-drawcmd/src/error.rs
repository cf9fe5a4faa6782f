use renderwire_parcel::ParcelError;
use renderwire_shmem::ShmemError;

/// Errors from draw command list encode/decode.
#[derive(Debug, thiserror::Error)]
pub enum DrawCmdError {
    #[error(transparent)]
    Parcel(#[from] ParcelError),

    #[error(transparent)]
    Shmem(#[from] ShmemError),

    /// Record Command nesting exceeded the protocol limit.
    #[error("record command nesting too deep (depth {depth}, max {max})")]
    DepthExceeded { depth: u32, max: u32 },

    /// Total Record Command count across the whole decode exceeded the limit.
    #[error("too many record commands (max {max})")]
    TooManyRecords { max: u32 },

    /// Accumulated opcode count across the whole decode exceeded the limit.
    #[error("too many draw ops ({count}, max {max})")]
    TooManyOps { count: u64, max: u32 },

    /// A side table declared more elements than the protocol allows.
    #[error("{table} table too large ({count} elements, max {max})")]
    TableTooLarge {
        table: &'static str,
        count: u32,
        max: u32,
    },

    /// A side table declared more elements than the remaining bytes could
    /// possibly hold.
    #[error(
        "{table} table count {count} implausible for {remaining} remaining bytes"
    )]
    ImplausibleCount {
        table: &'static str,
        count: u32,
        remaining: usize,
    },

    /// The opcode blob ended inside an op record.
    #[error("malformed op stream at offset {offset}")]
    MalformedOpStream { offset: usize },

    /// A drawing object carried a (type, subtype) no decoder is registered
    /// for.
    #[error("unknown drawing object kind ({obj_type}, {subtype})")]
    UnknownObjectKind { obj_type: i32, subtype: i32 },

    /// The leading payload-length field was neither −1, 0, nor positive.
    #[error("invalid draw command list length {0}")]
    InvalidListLength(i32),

    /// A Record Command decoded to a null inner list.
    #[error("record command carries a null draw command list")]
    NullRecordList,
}

pub type Result<T> = std::result::Result<T, DrawCmdError>;
