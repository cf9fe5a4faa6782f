//! Draw command list data model and wire codec.
//!
//! A [`DrawCmdList`] is a captured sequence of framed draw ops plus the
//! side tables (images, nine-patch/lattice objects, typed drawing objects,
//! platform buffers) those ops reference, with nested recordings as
//! [`RecordCmd`]s. The codec preserves the original multi-table wire layout
//! and budgets depth, record count, and op count across the recursion so a
//! hostile peer cannot force unbounded work.

pub mod error;
pub mod geometry;
pub mod list;
pub mod objects;
pub mod ops;
pub mod registry;

pub use error::{DrawCmdError, Result};
pub use geometry::{RectF, RectI};
pub use list::{
    marshal_draw_cmd_list, unmarshal_draw_cmd_list, DecodeBudget, DrawCmdList, RecordCmd,
    MAX_OP_COUNT, MAX_RECORD_COUNT, MAX_RECORD_DEPTH, MAX_SIDE_TABLE,
};
pub use objects::{
    AttachedBuffer, DrawingObject, ExtendObject, ImageBaseObject, ImageLatticeObject,
    ImageNineObject, ImageObject,
};
pub use ops::{count_ops, push_op, OpIter, OpRecord, OP_HEADER_SIZE};
pub use registry::{
    marshal_drawing_object, unmarshal_drawing_object, ObjectRegistry, OBJ_TYPE_MASK,
    OBJ_TYPE_PATH, OBJ_TYPE_SHADER_EFFECT,
};
