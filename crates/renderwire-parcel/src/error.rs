/// Errors that can occur while reading or writing a parcel.
#[derive(Debug, thiserror::Error)]
pub enum ParcelError {
    /// A read ran past the end of the buffer.
    #[error("unexpected end of parcel (needed {needed} bytes, {remaining} remaining)")]
    UnexpectedEof { needed: usize, remaining: usize },

    /// A write would exceed the parcel's configured capacity.
    #[error("parcel capacity exceeded ({size} bytes, max {max})")]
    CapacityExceeded { size: usize, max: usize },

    /// A declared element count exceeds the decoding bound.
    #[error("declared count too large ({count} elements, max {max})")]
    CountTooLarge { count: usize, max: usize },

    /// A boolean byte was neither 0 nor 1.
    #[error("invalid boolean byte 0x{0:02x}")]
    InvalidBool(u8),

    /// A nullable-value sentinel had an unknown value.
    #[error("invalid nullable sentinel {0}")]
    InvalidSentinel(i32),

    /// A decoded string was not valid UTF-8.
    #[error("string payload is not valid UTF-8")]
    InvalidUtf8,

    /// An attachment slot was empty or already taken.
    #[error("attachment slot {0} is missing or already taken")]
    AttachmentMissing(u32),

    /// A rewind target lies beyond the readable region.
    #[error("rewind target {target} beyond parcel length {len}")]
    InvalidRewind { target: usize, len: usize },
}

pub type Result<T> = std::result::Result<T, ParcelError>;
