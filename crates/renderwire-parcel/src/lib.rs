//! Bounds-checked binary marshalling primitives for render transactions.
//!
//! This is the foundation layer of renderwire. It provides:
//! - [`Parcel`]: a message buffer with independent read/write cursors
//! - [`Marshal`]/[`Unmarshal`]: per-type codecs for primitives and containers
//! - an optional capability-bitmask version header for cross-release skew
//!
//! Everything here decodes attacker-influenced bytes: reads never run past
//! the buffer, and declared counts are bounded before allocation.

pub mod codec;
pub mod error;
pub mod parcel;
pub mod version;

pub use codec::{
    marshal_nullable, marshal_vec_bounded, unmarshal_nullable, unmarshal_vec_bounded, Marshal,
    Unmarshal, MAX_VECTOR_SIZE,
};
pub use error::{ParcelError, Result};
pub use parcel::{Attachment, Parcel, DEFAULT_MAX_CAPACITY};
pub use version::{
    compatible_marshal, compatible_skip_obsolete, compatible_unmarshal, read_version_header,
    write_version_header, Capability, CapabilitySet, CAP_ANIM_TOKEN, CAP_PROP_DIRTY,
    VERSION_SENTINEL,
};
