use std::any::Any;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{ParcelError, Result};
use crate::version::CapabilitySet;

/// Default upper bound of a single parcel: 4000 KiB.
pub const DEFAULT_MAX_CAPACITY: usize = 4000 * 1024;

/// Out-of-band payload travelling alongside a parcel, addressed by slot index.
///
/// Used for transferable descriptors (shared-memory handles) that cannot be
/// represented as wire bytes. The concrete type is established by the layer
/// that attaches it.
pub type Attachment = Box<dyn Any + Send>;

/// An in-memory message buffer with independent read and write cursors.
///
/// The write side appends little-endian fixed-width values and raw byte runs;
/// the read side consumes them with full bounds checking — a decode can never
/// read past the end of the buffer, whatever the wire claims. A parcel is
/// exclusively owned by its writer until sent, then by its reader until
/// consumed.
pub struct Parcel {
    buf: BytesMut,
    read_pos: usize,
    max_capacity: usize,
    attachments: Vec<Option<Attachment>>,
    /// Capability set announced by the peer, populated when a version header
    /// is consumed from this parcel.
    pub(crate) wire_caps: Option<CapabilitySet>,
}

impl Parcel {
    /// Create an empty parcel with the default capacity bound.
    pub fn new() -> Self {
        Self::with_max_capacity(DEFAULT_MAX_CAPACITY)
    }

    /// Create an empty parcel with an explicit capacity bound.
    pub fn with_max_capacity(max_capacity: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            read_pos: 0,
            max_capacity,
            attachments: Vec::new(),
            wire_caps: None,
        }
    }

    /// Build a readable parcel over received bytes.
    pub fn from_bytes(data: impl Into<BytesMut>) -> Self {
        Self {
            buf: data.into(),
            read_pos: 0,
            max_capacity: DEFAULT_MAX_CAPACITY,
            attachments: Vec::new(),
            wire_caps: None,
        }
    }

    /// Total number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// The entire written byte range.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Update the capacity bound for subsequent writes.
    pub fn set_max_capacity(&mut self, max_capacity: usize) {
        self.max_capacity = max_capacity;
    }

    /// Current write cursor (equals the number of bytes written).
    pub fn write_position(&self) -> usize {
        self.buf.len()
    }

    /// Current read cursor.
    pub fn read_position(&self) -> usize {
        self.read_pos
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.read_pos
    }

    /// Move the read cursor back to an earlier position.
    pub fn rewind_read(&mut self, pos: usize) -> Result<()> {
        if pos > self.buf.len() {
            return Err(ParcelError::InvalidRewind {
                target: pos,
                len: self.buf.len(),
            });
        }
        self.read_pos = pos;
        Ok(())
    }

    /// Advance the read cursor without materialising the bytes.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.check_readable(n)?;
        self.read_pos += n;
        Ok(())
    }

    /// The capability set consumed from this parcel's version header, if any.
    pub fn wire_caps(&self) -> Option<&CapabilitySet> {
        self.wire_caps.as_ref()
    }

    fn check_writable(&self, additional: usize) -> Result<()> {
        let size = self.buf.len() + additional;
        if size > self.max_capacity {
            return Err(ParcelError::CapacityExceeded {
                size,
                max: self.max_capacity,
            });
        }
        Ok(())
    }

    fn check_readable(&self, needed: usize) -> Result<()> {
        if self.remaining() < needed {
            return Err(ParcelError::UnexpectedEof {
                needed,
                remaining: self.remaining(),
            });
        }
        Ok(())
    }

    /// Append raw bytes.
    pub fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.check_writable(data.len())?;
        self.buf.put_slice(data);
        Ok(())
    }

    /// Read `n` bytes as an owned buffer.
    pub fn read_bytes(&mut self, n: usize) -> Result<Bytes> {
        self.check_readable(n)?;
        let out = Bytes::copy_from_slice(&self.buf[self.read_pos..self.read_pos + n]);
        self.read_pos += n;
        Ok(out)
    }

    /// Overwrite a previously written u32 at `pos`, used to correct counts
    /// and byte sizes that are only known after the fact.
    pub fn patch_u32(&mut self, pos: usize, val: u32) -> Result<()> {
        if pos + 4 > self.buf.len() {
            return Err(ParcelError::UnexpectedEof {
                needed: 4,
                remaining: self.buf.len().saturating_sub(pos),
            });
        }
        self.buf[pos..pos + 4].copy_from_slice(&val.to_le_bytes());
        Ok(())
    }

    /// Register an out-of-band attachment, returning its slot index.
    pub fn attach(&mut self, attachment: Attachment) -> u32 {
        self.attachments.push(Some(attachment));
        (self.attachments.len() - 1) as u32
    }

    /// Take an attachment out of its slot. Each slot yields its payload
    /// exactly once.
    pub fn take_attachment(&mut self, slot: u32) -> Result<Attachment> {
        self.attachments
            .get_mut(slot as usize)
            .and_then(Option::take)
            .ok_or(ParcelError::AttachmentMissing(slot))
    }

    /// Number of attachment slots (taken or not).
    pub fn attachment_count(&self) -> usize {
        self.attachments.len()
    }

    /// Whether any attachment is still present.
    pub fn has_attachments(&self) -> bool {
        self.attachments.iter().any(Option::is_some)
    }

    /// Drain all attachments in slot order.
    pub fn take_all_attachments(&mut self) -> Vec<Option<Attachment>> {
        std::mem::take(&mut self.attachments)
    }
}

impl Default for Parcel {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Parcel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parcel")
            .field("len", &self.buf.len())
            .field("read_pos", &self.read_pos)
            .field("attachments", &self.attachments.len())
            .finish()
    }
}

macro_rules! fixed_width_accessors {
    ($($write:ident, $read:ident, $ty:ty);* $(;)?) => {
        impl Parcel {
            $(
                pub fn $write(&mut self, val: $ty) -> Result<()> {
                    self.write_bytes(&val.to_le_bytes())
                }

                pub fn $read(&mut self) -> Result<$ty> {
                    const N: usize = std::mem::size_of::<$ty>();
                    self.check_readable(N)?;
                    let mut raw = [0u8; N];
                    raw.copy_from_slice(&self.buf[self.read_pos..self.read_pos + N]);
                    self.read_pos += N;
                    Ok(<$ty>::from_le_bytes(raw))
                }
            )*
        }
    };
}

fixed_width_accessors! {
    write_u8, read_u8, u8;
    write_u16, read_u16, u16;
    write_u32, read_u32, u32;
    write_u64, read_u64, u64;
    write_i8, read_i8, i8;
    write_i16, read_i16, i16;
    write_i32, read_i32, i32;
    write_i64, read_i64, i64;
    write_f32, read_f32, f32;
    write_f64, read_f64, f64;
}

impl Parcel {
    pub fn write_bool(&mut self, val: bool) -> Result<()> {
        self.write_u8(val as u8)
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(ParcelError::InvalidBool(other)),
        }
    }
}
