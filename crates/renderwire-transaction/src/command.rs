//! Render commands: the open set of node mutations a transaction carries.
//!
//! Commands are identified by a `(type, subtype)` pair on the wire and
//! decoded through a [`CommandRegistry`], so higher layers can ship their
//! own command kinds without touching this crate.

use std::collections::HashMap;

use renderwire_drawcmd::{
    marshal_draw_cmd_list, unmarshal_draw_cmd_list, DrawCmdList, ObjectRegistry, RectF,
};
use renderwire_parcel::{Marshal, Parcel, Unmarshal};
use renderwire_shmem::CodecContext;

use crate::error::{Result, TransactionError};

/// How a command's target node tracks its parent during sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum FollowType {
    #[default]
    None = 0,
    FollowToParent = 1,
    FollowToRoot = 2,
}

impl FollowType {
    pub fn from_wire(raw: u8) -> Result<Self> {
        match raw {
            0 => Ok(Self::None),
            1 => Ok(Self::FollowToParent),
            2 => Ok(Self::FollowToRoot),
            other => Err(TransactionError::InvalidFollowType(other)),
        }
    }
}

/// Command kind: replace a node's draw command list.
pub const CMD_UPDATE_DRAW_CMD_LIST: (u16, u16) = (1, 0);
/// Command kind: set a node's bounds rectangle.
pub const CMD_SET_BOUNDS: (u16, u16) = (2, 0);

/// A single node mutation.
pub trait RenderCommand: std::fmt::Debug + Send {
    /// The `(type, subtype)` pair written before the payload.
    fn kind(&self) -> (u16, u16);

    fn marshal_payload(&self, parcel: &mut Parcel, ctx: &CodecContext) -> Result<()>;
}

type DecodeFn =
    Box<dyn Fn(&mut Parcel, &CodecContext, &ObjectRegistry) -> Result<Box<dyn RenderCommand>> + Send + Sync>;

/// Maps command kinds to payload decoders.
pub struct CommandRegistry {
    decoders: HashMap<(u16, u16), DecodeFn>,
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.decoders.keys().collect();
        kinds.sort();
        f.debug_struct("CommandRegistry").field("kinds", &kinds).finish()
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(CMD_UPDATE_DRAW_CMD_LIST, |parcel, ctx, objects| {
            Ok(Box::new(UpdateDrawCmdList {
                list: unmarshal_draw_cmd_list(parcel, ctx, objects)?,
            }) as Box<dyn RenderCommand>)
        });
        registry.register(CMD_SET_BOUNDS, |parcel, _ctx, _objects| {
            Ok(Box::new(SetBounds {
                bounds: RectF::unmarshal(parcel)?,
            }) as Box<dyn RenderCommand>)
        });
        registry
    }
}

impl CommandRegistry {
    pub fn empty() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    pub fn register<F>(&mut self, kind: (u16, u16), decode: F)
    where
        F: Fn(&mut Parcel, &CodecContext, &ObjectRegistry) -> Result<Box<dyn RenderCommand>>
            + Send
            + Sync
            + 'static,
    {
        self.decoders.insert(kind, Box::new(decode));
    }

    pub fn decode(
        &self,
        parcel: &mut Parcel,
        ctx: &CodecContext,
        objects: &ObjectRegistry,
        kind: (u16, u16),
    ) -> Result<Box<dyn RenderCommand>> {
        let decoder = self
            .decoders
            .get(&kind)
            .ok_or(TransactionError::UnknownCommand {
                cmd_type: kind.0,
                subtype: kind.1,
            })?;
        decoder(parcel, ctx, objects)
    }
}

/// Replace the target node's draw command list (`None` clears it).
#[derive(Debug, Default)]
pub struct UpdateDrawCmdList {
    pub list: Option<DrawCmdList>,
}

impl RenderCommand for UpdateDrawCmdList {
    fn kind(&self) -> (u16, u16) {
        CMD_UPDATE_DRAW_CMD_LIST
    }

    fn marshal_payload(&self, parcel: &mut Parcel, ctx: &CodecContext) -> Result<()> {
        marshal_draw_cmd_list(parcel, ctx, self.list.as_ref())?;
        Ok(())
    }
}

/// Set the target node's bounds rectangle.
#[derive(Debug, Default)]
pub struct SetBounds {
    pub bounds: RectF,
}

impl RenderCommand for SetBounds {
    fn kind(&self) -> (u16, u16) {
        CMD_SET_BOUNDS
    }

    fn marshal_payload(&self, parcel: &mut Parcel, _ctx: &CodecContext) -> Result<()> {
        self.bounds.marshal(parcel)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follow_type_wire_mapping() {
        for follow in [FollowType::None, FollowType::FollowToParent, FollowType::FollowToRoot] {
            assert_eq!(FollowType::from_wire(follow as u8).unwrap(), follow);
        }
        assert!(matches!(
            FollowType::from_wire(9),
            Err(TransactionError::InvalidFollowType(9))
        ));
    }

    #[test]
    fn set_bounds_roundtrip_through_registry() {
        let ctx = CodecContext::default();
        let objects = ObjectRegistry::default();
        let registry = CommandRegistry::default();
        let cmd = SetBounds {
            bounds: RectF::new(1.0, 2.0, 3.0, 4.0),
        };

        let mut parcel = Parcel::new();
        cmd.marshal_payload(&mut parcel, &ctx).unwrap();
        let back = registry
            .decode(&mut parcel, &ctx, &objects, CMD_SET_BOUNDS)
            .unwrap();
        assert_eq!(back.kind(), CMD_SET_BOUNDS);
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let ctx = CodecContext::default();
        let objects = ObjectRegistry::default();
        let registry = CommandRegistry::default();
        let mut parcel = Parcel::new();
        let err = registry
            .decode(&mut parcel, &ctx, &objects, (77, 1))
            .unwrap_err();
        assert!(matches!(
            err,
            TransactionError::UnknownCommand {
                cmd_type: 77,
                subtype: 1
            }
        ));
    }
}
