//! Shared-memory blob transport for render transactions.
//!
//! Parcels have a hard capacity, so bulky payloads (pixel maps, vertex
//! buffers, serialized command lists) move through shared-memory regions
//! referenced from the parcel instead of inline bytes. This crate provides:
//! - [`ShmemBackend`]: allocation of transferable regions (`memfd` on Unix,
//!   an in-process simulation elsewhere and in tests)
//! - [`FlowControlLedger`]: per-sender outstanding-bytes budgeting
//! - [`InlineOverride`]: a thread-scoped switch forcing inline marshalling
//! - [`write_blob`]/[`read_blob`]: the size-based transport itself

pub mod backend;
pub mod blob;
pub mod context;
pub mod error;
pub mod flow;

pub use backend::{default_backend, HeapBackend, ShmemBackend, ShmemHandle, ShmemView};
#[cfg(unix)]
pub use backend::MemfdBackend;
pub use blob::{read_blob, read_blob_exact, skip_blob, write_blob, INLINE_THRESHOLD, MAX_BLOB_SIZE};
pub use context::{CodecContext, InlineOverride, InlineScope};
pub use error::{Result, ShmemError};
pub use flow::{FlowControlLedger, QuotaGuard, SenderId, DEFAULT_FLOW_BUDGET};
