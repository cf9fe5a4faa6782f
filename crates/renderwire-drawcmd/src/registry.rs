//! Decode dispatch for typed drawing objects.
//!
//! Drawing objects are written uniformly as `(i32 type, i32 subtype,
//! payload)`; decode is gated through a registry so only known kinds are
//! accepted and a replayer can plug in richer decoders for its own kinds.

use std::collections::HashMap;

use bytes::Bytes;
use renderwire_parcel::Parcel;
use renderwire_shmem::{read_blob, write_blob, CodecContext};

use crate::error::{DrawCmdError, Result};
use crate::objects::DrawingObject;

/// Drawing object type: shader effect payload.
pub const OBJ_TYPE_SHADER_EFFECT: i32 = 1;
/// Drawing object type: path payload.
pub const OBJ_TYPE_PATH: i32 = 2;
/// Drawing object type: clip mask payload.
pub const OBJ_TYPE_MASK: i32 = 3;

type DecodeFn = Box<dyn Fn(&mut Parcel, &CodecContext) -> Result<Bytes> + Send + Sync>;

/// Maps `(type, subtype)` to a payload decoder.
pub struct ObjectRegistry {
    decoders: HashMap<(i32, i32), DecodeFn>,
}

impl std::fmt::Debug for ObjectRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.decoders.keys().collect();
        kinds.sort();
        f.debug_struct("ObjectRegistry").field("kinds", &kinds).finish()
    }
}

impl Default for ObjectRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        for obj_type in [OBJ_TYPE_SHADER_EFFECT, OBJ_TYPE_PATH, OBJ_TYPE_MASK] {
            registry.register(obj_type, 0, |parcel, ctx| read_blob(parcel, ctx).map_err(Into::into));
        }
        registry
    }
}

impl ObjectRegistry {
    /// A registry with no kinds; every drawing object fails decode.
    pub fn empty() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Register (or replace) the decoder for one `(type, subtype)` kind.
    pub fn register<F>(&mut self, obj_type: i32, subtype: i32, decode: F)
    where
        F: Fn(&mut Parcel, &CodecContext) -> Result<Bytes> + Send + Sync + 'static,
    {
        self.decoders.insert((obj_type, subtype), Box::new(decode));
    }

    pub fn contains(&self, obj_type: i32, subtype: i32) -> bool {
        self.decoders.contains_key(&(obj_type, subtype))
    }

    /// Decode one drawing object whose tag has already been read.
    pub fn decode(
        &self,
        parcel: &mut Parcel,
        ctx: &CodecContext,
        obj_type: i32,
        subtype: i32,
    ) -> Result<DrawingObject> {
        let decoder = self
            .decoders
            .get(&(obj_type, subtype))
            .ok_or(DrawCmdError::UnknownObjectKind { obj_type, subtype })?;
        let payload = decoder(parcel, ctx)?;
        Ok(DrawingObject {
            obj_type,
            subtype,
            payload,
        })
    }
}

/// Write one drawing object: tag followed by the payload blob.
pub fn marshal_drawing_object(
    parcel: &mut Parcel,
    ctx: &CodecContext,
    obj: &DrawingObject,
) -> Result<()> {
    parcel.write_i32(obj.obj_type)?;
    parcel.write_i32(obj.subtype)?;
    write_blob(parcel, ctx, &obj.payload)?;
    Ok(())
}

/// Read one drawing object through the registry.
pub fn unmarshal_drawing_object(
    parcel: &mut Parcel,
    ctx: &CodecContext,
    registry: &ObjectRegistry,
) -> Result<DrawingObject> {
    let obj_type = parcel.read_i32()?;
    let subtype = parcel.read_i32()?;
    registry.decode(parcel, ctx, obj_type, subtype)
}
