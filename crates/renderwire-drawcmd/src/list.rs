//! Draw command list model and its recursive wire codec.
//!
//! The wire keeps the original multi-table layout: opcode blob, per-kind
//! side tables, then a nested Record Command table. Decode treats every
//! count and length as hostile: tables are bounded and checked against the
//! remaining bytes before any element is decoded, nesting depth and the
//! accumulated op/record counts are budgeted across the whole recursion,
//! and any violation aborts the decode with an error.

use bytes::Bytes;
use renderwire_parcel::{Marshal, Parcel, Unmarshal, MAX_VECTOR_SIZE};
use renderwire_shmem::{read_blob_exact, write_blob, CodecContext};

use crate::error::{DrawCmdError, Result};
use crate::geometry::RectF;
use crate::objects::{
    AttachedBuffer, DrawingObject, ExtendObject, ImageBaseObject, ImageLatticeObject,
    ImageNineObject, ImageObject,
};
use crate::ops::count_ops;
use crate::registry::{marshal_drawing_object, unmarshal_drawing_object, ObjectRegistry};

/// Maximum Record Command nesting depth.
pub const MAX_RECORD_DEPTH: u32 = 12;
/// Maximum total Record Commands across one decode.
pub const MAX_RECORD_COUNT: u32 = 1024;
/// Maximum total framed ops across one decode.
pub const MAX_OP_COUNT: u32 = 100_000;
/// Maximum elements in any single side table.
pub const MAX_SIDE_TABLE: u32 = MAX_VECTOR_SIZE as u32;

/// Sentinel for a null list in the leading length field.
const NULL_LIST: i32 = -1;

/// A recorded sequence of draw ops plus the side tables they reference.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DrawCmdList {
    pub width: i32,
    pub height: i32,
    pub is_cache: bool,
    pub cached_high_contrast: bool,
    pub no_need_ui_captured: bool,
    /// Pairs of (original, replacement) op indices swapped during capture.
    pub replaced_ops: Vec<(u32, u32)>,
    /// Framed opcode bytes (see [`crate::ops`]).
    pub op_data: Bytes,
    pub image_data: Bytes,
    pub bitmap_data: Bytes,
    pub image_objects: Vec<ImageObject>,
    pub base_objects: Vec<ImageBaseObject>,
    pub nine_objects: Vec<ImageNineObject>,
    pub lattice_objects: Vec<ImageLatticeObject>,
    pub extend_objects: Vec<ExtendObject>,
    pub drawing_objects: Vec<DrawingObject>,
    pub attached_buffers: Vec<AttachedBuffer>,
    pub record_cmds: Vec<RecordCmd>,
}

/// A nested recording replayed into its own culling rectangle.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecordCmd {
    pub cull_rect: RectF,
    pub cmd_list: DrawCmdList,
}

impl RecordCmd {
    const MIN_WIRE_SIZE: usize = 16 + 4;
}

/// Cross-recursion decode accounting.
#[derive(Debug, Default)]
pub struct DecodeBudget {
    op_count: u64,
    record_count: u32,
}

impl DecodeBudget {
    fn add_ops(&mut self, n: u32) -> Result<()> {
        self.op_count += u64::from(n);
        if self.op_count > u64::from(MAX_OP_COUNT) {
            return Err(DrawCmdError::TooManyOps {
                count: self.op_count,
                max: MAX_OP_COUNT,
            });
        }
        Ok(())
    }

    fn add_record(&mut self) -> Result<()> {
        self.record_count += 1;
        if self.record_count > MAX_RECORD_COUNT {
            return Err(DrawCmdError::TooManyRecords {
                max: MAX_RECORD_COUNT,
            });
        }
        Ok(())
    }

    pub fn op_count(&self) -> u64 {
        self.op_count
    }

    pub fn record_count(&self) -> u32 {
        self.record_count
    }
}

/// Write a possibly-null list. `None` becomes the −1 length sentinel.
pub fn marshal_draw_cmd_list(
    parcel: &mut Parcel,
    ctx: &CodecContext,
    list: Option<&DrawCmdList>,
) -> Result<()> {
    match list {
        None => Ok(parcel.write_i32(NULL_LIST)?),
        Some(list) => list.marshal_at_depth(parcel, ctx, 0),
    }
}

/// Read a list written by [`marshal_draw_cmd_list`].
pub fn unmarshal_draw_cmd_list(
    parcel: &mut Parcel,
    ctx: &CodecContext,
    registry: &ObjectRegistry,
) -> Result<Option<DrawCmdList>> {
    let mut budget = DecodeBudget::default();
    let list = DrawCmdList::unmarshal_at_depth(parcel, ctx, registry, &mut budget, 0)?;
    if let Some(list) = &list {
        tracing::trace!(
            ops = budget.op_count(),
            records = budget.record_count(),
            width = list.width,
            height = list.height,
            "draw command list decoded"
        );
    }
    Ok(list)
}

impl DrawCmdList {
    pub fn marshal(&self, parcel: &mut Parcel, ctx: &CodecContext) -> Result<()> {
        self.marshal_at_depth(parcel, ctx, 0)
    }

    fn marshal_at_depth(&self, parcel: &mut Parcel, ctx: &CodecContext, depth: u32) -> Result<()> {
        if depth > MAX_RECORD_DEPTH {
            return Err(DrawCmdError::DepthExceeded {
                depth,
                max: MAX_RECORD_DEPTH,
            });
        }
        parcel.write_i32(self.op_data.len() as i32)?;
        parcel.write_i32(self.width)?;
        parcel.write_i32(self.height)?;
        parcel.write_bool(self.is_cache)?;
        parcel.write_bool(self.cached_high_contrast)?;
        parcel.write_bool(self.no_need_ui_captured)?;

        write_table_count(parcel, "replaced-op", self.replaced_ops.len())?;
        for (from, to) in &self.replaced_ops {
            parcel.write_u32(*from)?;
            parcel.write_u32(*to)?;
        }
        if self.op_data.is_empty() {
            // Empty recording: dimensions and flags only, no payload tables.
            return Ok(());
        }

        write_blob(parcel, ctx, &self.op_data)?;

        parcel.write_i32(self.image_data.len() as i32)?;
        if !self.image_data.is_empty() {
            write_blob(parcel, ctx, &self.image_data)?;
        }
        parcel.write_i32(self.bitmap_data.len() as i32)?;
        if !self.bitmap_data.is_empty() {
            write_blob(parcel, ctx, &self.bitmap_data)?;
        }

        write_table_count(parcel, "image-object", self.image_objects.len())?;
        for obj in &self.image_objects {
            obj.marshal(parcel, ctx)?;
        }
        write_table_count(parcel, "base-object", self.base_objects.len())?;
        for obj in &self.base_objects {
            obj.marshal(parcel, ctx)?;
        }
        write_table_count(parcel, "nine-patch", self.nine_objects.len())?;
        for obj in &self.nine_objects {
            obj.marshal(parcel, ctx)?;
        }
        write_table_count(parcel, "lattice", self.lattice_objects.len())?;
        for obj in &self.lattice_objects {
            obj.marshal(parcel, ctx)?;
        }
        write_table_count(parcel, "extend-object", self.extend_objects.len())?;
        for obj in &self.extend_objects {
            obj.marshal(parcel, ctx)?;
        }
        write_table_count(parcel, "drawing-object", self.drawing_objects.len())?;
        for obj in &self.drawing_objects {
            marshal_drawing_object(parcel, ctx, obj)?;
        }

        write_table_count(parcel, "attached-buffer", self.attached_buffers.len())?;
        // Byte size of the table body, patched once the elements are
        // written, so a receiver can skip the table wholesale.
        let size_pos = parcel.write_position();
        parcel.write_u32(0)?;
        for buffer in &self.attached_buffers {
            buffer.marshal(parcel, ctx)?;
        }
        let body = parcel.write_position() - size_pos - 4;
        parcel.patch_u32(size_pos, body as u32)?;

        write_table_count(parcel, "record", self.record_cmds.len())?;
        for record in &self.record_cmds {
            record.cull_rect.marshal(parcel)?;
            record.cmd_list.marshal_at_depth(parcel, ctx, depth + 1)?;
        }
        Ok(())
    }

    fn unmarshal_at_depth(
        parcel: &mut Parcel,
        ctx: &CodecContext,
        registry: &ObjectRegistry,
        budget: &mut DecodeBudget,
        depth: u32,
    ) -> Result<Option<Self>> {
        let op_len = parcel.read_i32()?;
        if op_len == NULL_LIST {
            return Ok(None);
        }
        if op_len < 0 {
            return Err(DrawCmdError::InvalidListLength(op_len));
        }
        let mut list = DrawCmdList {
            width: parcel.read_i32()?,
            height: parcel.read_i32()?,
            ..Default::default()
        };
        list.is_cache = parcel.read_bool()?;
        list.cached_high_contrast = parcel.read_bool()?;
        list.no_need_ui_captured = parcel.read_bool()?;

        let replaced = read_table_count(parcel, "replaced-op", 8)?;
        list.replaced_ops.reserve(replaced as usize);
        for _ in 0..replaced {
            list.replaced_ops
                .push((parcel.read_u32()?, parcel.read_u32()?));
        }
        if op_len == 0 {
            return Ok(Some(list));
        }

        list.op_data = read_blob_exact(parcel, ctx, op_len as usize)?;
        budget.add_ops(count_ops(&list.op_data)?)?;

        list.image_data = read_sized_blob(parcel, ctx)?;
        list.bitmap_data = read_sized_blob(parcel, ctx)?;

        let count = read_table_count(parcel, "image-object", ImageObject::MIN_WIRE_SIZE)?;
        for _ in 0..count {
            list.image_objects.push(ImageObject::unmarshal(parcel, ctx)?);
        }
        let count = read_table_count(parcel, "base-object", ImageBaseObject::MIN_WIRE_SIZE)?;
        for _ in 0..count {
            list.base_objects
                .push(ImageBaseObject::unmarshal(parcel, ctx)?);
        }
        let count = read_table_count(parcel, "nine-patch", ImageNineObject::MIN_WIRE_SIZE)?;
        for _ in 0..count {
            list.nine_objects
                .push(ImageNineObject::unmarshal(parcel, ctx)?);
        }
        let count = read_table_count(parcel, "lattice", ImageLatticeObject::MIN_WIRE_SIZE)?;
        for _ in 0..count {
            list.lattice_objects
                .push(ImageLatticeObject::unmarshal(parcel, ctx)?);
        }
        let count = read_table_count(parcel, "extend-object", ExtendObject::MIN_WIRE_SIZE)?;
        for _ in 0..count {
            list.extend_objects
                .push(ExtendObject::unmarshal(parcel, ctx)?);
        }
        let count = read_table_count(parcel, "drawing-object", DrawingObject::MIN_WIRE_SIZE)?;
        for _ in 0..count {
            list.drawing_objects
                .push(unmarshal_drawing_object(parcel, ctx, registry)?);
        }

        let count = read_table_count(parcel, "attached-buffer", AttachedBuffer::MIN_WIRE_SIZE)?;
        let body = parcel.read_u32()? as usize;
        if body > parcel.remaining() {
            return Err(DrawCmdError::ImplausibleCount {
                table: "attached-buffer",
                count,
                remaining: parcel.remaining(),
            });
        }
        for _ in 0..count {
            list.attached_buffers
                .push(AttachedBuffer::unmarshal(parcel, ctx)?);
        }

        let count = read_table_count(parcel, "record", RecordCmd::MIN_WIRE_SIZE)?;
        for _ in 0..count {
            budget.add_record()?;
            if depth + 1 > MAX_RECORD_DEPTH {
                return Err(DrawCmdError::DepthExceeded {
                    depth: depth + 1,
                    max: MAX_RECORD_DEPTH,
                });
            }
            let cull_rect = RectF::unmarshal(parcel)?;
            let cmd_list =
                Self::unmarshal_at_depth(parcel, ctx, registry, budget, depth + 1)?
                    .ok_or(DrawCmdError::NullRecordList)?;
            list.record_cmds.push(RecordCmd {
                cull_rect,
                cmd_list,
            });
        }
        Ok(Some(list))
    }
}

fn write_table_count(parcel: &mut Parcel, table: &'static str, len: usize) -> Result<()> {
    if len > MAX_SIDE_TABLE as usize {
        return Err(DrawCmdError::TableTooLarge {
            table,
            count: len as u32,
            max: MAX_SIDE_TABLE,
        });
    }
    parcel.write_u32(len as u32)?;
    Ok(())
}

/// Read a table count, rejecting it before any element decode when it is
/// over the protocol bound or cannot fit in the remaining bytes.
fn read_table_count(parcel: &mut Parcel, table: &'static str, min_wire: usize) -> Result<u32> {
    let count = parcel.read_u32()?;
    if count > MAX_SIDE_TABLE {
        return Err(DrawCmdError::TableTooLarge {
            table,
            count,
            max: MAX_SIDE_TABLE,
        });
    }
    let remaining = parcel.remaining();
    if (count as usize).saturating_mul(min_wire) > remaining {
        return Err(DrawCmdError::ImplausibleCount {
            table,
            count,
            remaining,
        });
    }
    Ok(count)
}

/// Read an `i32` length followed by a blob of exactly that size when
/// positive.
fn read_sized_blob(parcel: &mut Parcel, ctx: &CodecContext) -> Result<Bytes> {
    let len = parcel.read_i32()?;
    if len < 0 {
        return Err(DrawCmdError::InvalidListLength(len));
    }
    if len == 0 {
        return Ok(Bytes::new());
    }
    Ok(read_blob_exact(parcel, ctx, len as usize)?)
}
