//! Render transaction assembly and delivery.
//!
//! A [`TransactionData`] batches node mutations ([`RenderCommand`]s) from a
//! client process into parcels for the render service: oversized
//! transactions split across parcels, chunks that would crowd the IPC
//! buffer convert to shared-memory parcels, and delivery retries on a fixed
//! schedule before reporting failure. [`receive_transaction`] is the
//! matching service-side entry point.

pub mod command;
pub mod data;
pub mod error;
pub mod sender;

pub use command::{
    CommandRegistry, FollowType, RenderCommand, SetBounds, UpdateDrawCmdList, CMD_SET_BOUNDS,
    CMD_UPDATE_DRAW_CMD_LIST,
};
pub use data::{TransactionData, PARCEL_SPLIT_THRESHOLD};
pub use error::{Result, TransactionError};
pub use sender::{
    receive_transaction, seal_transaction_parcel, TransactionChannel, TransactionSender,
    MAX_RETRY_COUNT, PARCEL_TYPE_INLINE, PARCEL_TYPE_SHMEM, RETRY_DELAY,
    SHMEM_PARCEL_THRESHOLD,
};
