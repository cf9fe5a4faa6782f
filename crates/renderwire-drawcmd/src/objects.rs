//! Side-table element types referenced from the opcode blob.
//!
//! The wire keeps the original multi-table layout: one table per object
//! kind, each element encoded by its own codec. Pixel payloads go through
//! the blob transport so large images leave the parcel body.

use bytes::Bytes;
use renderwire_parcel::{Marshal, Parcel, Unmarshal};
use renderwire_shmem::{read_blob, write_blob, CodecContext};

use crate::error::Result;
use crate::geometry::{RectF, RectI};

/// An image draw source: pixel data plus source/destination placement.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImageObject {
    pub id: u64,
    pub src: RectF,
    pub dst: RectF,
    pub pixels: Bytes,
}

impl ImageObject {
    /// Smallest possible wire footprint, for table plausibility checks.
    pub(crate) const MIN_WIRE_SIZE: usize = 8 + 16 + 16 + 4;

    pub fn marshal(&self, parcel: &mut Parcel, ctx: &CodecContext) -> Result<()> {
        parcel.write_u64(self.id)?;
        self.src.marshal(parcel)?;
        self.dst.marshal(parcel)?;
        write_blob(parcel, ctx, &self.pixels)?;
        Ok(())
    }

    pub fn unmarshal(parcel: &mut Parcel, ctx: &CodecContext) -> Result<Self> {
        Ok(Self {
            id: parcel.read_u64()?,
            src: RectF::unmarshal(parcel)?,
            dst: RectF::unmarshal(parcel)?,
            pixels: read_blob(parcel, ctx)?,
        })
    }
}

/// An image drawn whole into one destination rect.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImageBaseObject {
    pub id: u64,
    pub dst: RectF,
    pub pixels: Bytes,
}

impl ImageBaseObject {
    pub(crate) const MIN_WIRE_SIZE: usize = 8 + 16 + 4;

    pub fn marshal(&self, parcel: &mut Parcel, ctx: &CodecContext) -> Result<()> {
        parcel.write_u64(self.id)?;
        self.dst.marshal(parcel)?;
        write_blob(parcel, ctx, &self.pixels)?;
        Ok(())
    }

    pub fn unmarshal(parcel: &mut Parcel, ctx: &CodecContext) -> Result<Self> {
        Ok(Self {
            id: parcel.read_u64()?,
            dst: RectF::unmarshal(parcel)?,
            pixels: read_blob(parcel, ctx)?,
        })
    }
}

/// Nine-patch image: stretchable center region in integer pixels.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImageNineObject {
    pub center: RectI,
    pub pixels: Bytes,
}

impl ImageNineObject {
    pub(crate) const MIN_WIRE_SIZE: usize = 16 + 4;

    pub fn marshal(&self, parcel: &mut Parcel, ctx: &CodecContext) -> Result<()> {
        self.center.marshal(parcel)?;
        write_blob(parcel, ctx, &self.pixels)?;
        Ok(())
    }

    pub fn unmarshal(parcel: &mut Parcel, ctx: &CodecContext) -> Result<Self> {
        Ok(Self {
            center: RectI::unmarshal(parcel)?,
            pixels: read_blob(parcel, ctx)?,
        })
    }
}

/// Lattice-scaled image: grid divisor lines in both axes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImageLatticeObject {
    pub x_divs: Vec<i32>,
    pub y_divs: Vec<i32>,
    pub pixels: Bytes,
}

impl ImageLatticeObject {
    pub(crate) const MIN_WIRE_SIZE: usize = 4 + 4 + 4;

    pub fn marshal(&self, parcel: &mut Parcel, ctx: &CodecContext) -> Result<()> {
        self.x_divs.marshal(parcel)?;
        self.y_divs.marshal(parcel)?;
        write_blob(parcel, ctx, &self.pixels)?;
        Ok(())
    }

    pub fn unmarshal(parcel: &mut Parcel, ctx: &CodecContext) -> Result<Self> {
        Ok(Self {
            x_divs: Vec::unmarshal(parcel)?,
            y_divs: Vec::unmarshal(parcel)?,
            pixels: read_blob(parcel, ctx)?,
        })
    }
}

/// An opaque extension payload the replayer interprets by convention.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExtendObject {
    pub payload: Bytes,
}

impl ExtendObject {
    pub(crate) const MIN_WIRE_SIZE: usize = 4;

    pub fn marshal(&self, parcel: &mut Parcel, ctx: &CodecContext) -> Result<()> {
        write_blob(parcel, ctx, &self.payload)?;
        Ok(())
    }

    pub fn unmarshal(parcel: &mut Parcel, ctx: &CodecContext) -> Result<Self> {
        Ok(Self {
            payload: read_blob(parcel, ctx)?,
        })
    }
}

/// A typed drawing object: payload meaning is selected by (type, subtype)
/// and gated through the [`ObjectRegistry`](crate::registry::ObjectRegistry).
#[derive(Debug, Clone, PartialEq)]
pub struct DrawingObject {
    pub obj_type: i32,
    pub subtype: i32,
    pub payload: Bytes,
}

impl DrawingObject {
    pub(crate) const MIN_WIRE_SIZE: usize = 4 + 4 + 4;
}

/// One entry of the platform attached-buffer table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AttachedBuffer {
    pub pixels: Option<Bytes>,
    pub fence: Option<Bytes>,
}

impl AttachedBuffer {
    pub(crate) const MIN_WIRE_SIZE: usize = 2;

    pub fn marshal(&self, parcel: &mut Parcel, ctx: &CodecContext) -> Result<()> {
        parcel.write_bool(self.pixels.is_some())?;
        if let Some(pixels) = &self.pixels {
            write_blob(parcel, ctx, pixels)?;
        }
        parcel.write_bool(self.fence.is_some())?;
        if let Some(fence) = &self.fence {
            write_blob(parcel, ctx, fence)?;
        }
        Ok(())
    }

    pub fn unmarshal(parcel: &mut Parcel, ctx: &CodecContext) -> Result<Self> {
        let pixels = if parcel.read_bool()? {
            Some(read_blob(parcel, ctx)?)
        } else {
            None
        };
        let fence = if parcel.read_bool()? {
            Some(read_blob(parcel, ctx)?)
        } else {
            None
        };
        Ok(Self { pixels, fence })
    }
}
