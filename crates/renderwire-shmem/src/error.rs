use renderwire_parcel::ParcelError;

use crate::flow::SenderId;

/// Errors from shared-memory allocation, mapping, and blob transport.
#[derive(Debug, thiserror::Error)]
pub enum ShmemError {
    /// Underlying parcel read/write failed.
    #[error(transparent)]
    Parcel(#[from] ParcelError),

    /// The blob exceeds the protocol's single-blob limit.
    #[error("blob too large ({size} bytes, max {max})")]
    BlobTooLarge { size: usize, max: usize },

    /// The wire-declared blob length does not match the expected length.
    #[error("blob length mismatch (declared {declared}, expected {expected})")]
    LengthMismatch { declared: usize, expected: usize },

    /// The mapped region is smaller than the declared blob length.
    #[error("shared-memory region too small ({actual} bytes for declared {declared})")]
    RegionTooSmall { declared: usize, actual: usize },

    /// The sender's outstanding-bytes quota would be exceeded.
    #[error(
        "flow-control quota exceeded for sender {sender} \
         ({outstanding} outstanding + {requested} requested > {budget})"
    )]
    QuotaExceeded {
        sender: SenderId,
        requested: u64,
        outstanding: u64,
        budget: u64,
    },

    /// The attachment slot did not hold a shared-memory handle.
    #[error("attachment slot {0} does not carry a shared-memory handle")]
    InvalidAttachment(u32),

    /// A platform shared-memory operation failed.
    #[error("shared-memory operation failed: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ShmemError>;
