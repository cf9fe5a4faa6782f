use renderwire_drawcmd::DrawCmdError;
use renderwire_parcel::ParcelError;
use renderwire_shmem::ShmemError;

/// Errors from transaction marshalling and delivery.
#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
    #[error(transparent)]
    Parcel(#[from] ParcelError),

    #[error(transparent)]
    Shmem(#[from] ShmemError),

    #[error(transparent)]
    DrawCmd(#[from] DrawCmdError),

    /// A command consumed a different number of bytes than it wrote.
    #[error("command stream desynchronised (marker {expected}, cursor {actual})")]
    PositionMismatch { expected: u32, actual: u32 },

    /// No decoder is registered for this command kind.
    #[error("unknown command kind ({cmd_type}, {subtype})")]
    UnknownCommand { cmd_type: u16, subtype: u16 },

    /// The command count is negative or claims more entries than the parcel
    /// can hold.
    #[error("command count {count} implausible for {remaining} remaining bytes")]
    ImplausibleCommandCount { count: i64, remaining: usize },

    /// The follow-type byte is outside the known range.
    #[error("invalid follow type {0}")]
    InvalidFollowType(u8),

    /// The leading parcel-type flag is neither inline nor shared-memory.
    #[error("invalid parcel type flag {0}")]
    InvalidParcelType(i32),

    /// Delivery kept failing after the full retry schedule.
    #[error("transaction delivery failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, TransactionError>;
