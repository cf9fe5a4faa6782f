//! One logical render update and its chunked wire form.
//!
//! A transaction is an ordered list of `(node, follow-type, command)`
//! entries plus a sync trailer. Large transactions are split across
//! parcels: encode stops adding commands once the parcel passes the split
//! threshold and resumes from where it left off on the next call, patching
//! the real per-chunk count over the placeholder. Each command is bracketed
//! by write-position markers so a mis-consuming decoder fails the whole
//! transaction instead of silently desynchronising the ones after it.

use renderwire_drawcmd::ObjectRegistry;
use renderwire_parcel::Parcel;
use renderwire_shmem::CodecContext;

use crate::command::{CommandRegistry, FollowType, RenderCommand};
use crate::error::{Result, TransactionError};

/// Encode stops adding commands to a chunk past this many bytes.
pub const PARCEL_SPLIT_THRESHOLD: usize = 1800 * 1024;

/// Smallest wire footprint of one command entry (id + follow + presence).
const MIN_COMMAND_WIRE_SIZE: usize = 10;

/// One logical update from a client process to the render service.
#[derive(Debug, Default)]
pub struct TransactionData {
    commands: Vec<(u64, FollowType, Option<Box<dyn RenderCommand>>)>,
    pub need_sync: bool,
    pub need_close_sync: bool,
    pub sync_count: i32,
    pub token: u64,
    pub timestamp: u64,
    pub sender_pid: i32,
    pub index: u64,
    marshalling_index: usize,
}

impl TransactionData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_command(
        &mut self,
        node_id: u64,
        follow: FollowType,
        command: Box<dyn RenderCommand>,
    ) {
        self.commands.push((node_id, follow, Some(command)));
    }

    /// Record an entry whose command was dropped before commit; the slot is
    /// kept so command indices stay stable.
    pub fn add_empty_command(&mut self, node_id: u64, follow: FollowType) {
        self.commands.push((node_id, follow, None));
    }

    pub fn commands(&self) -> &[(u64, FollowType, Option<Box<dyn RenderCommand>>)] {
        &self.commands
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Whether every command has been marshalled into some chunk.
    pub fn fully_marshalled(&self) -> bool {
        self.marshalling_index >= self.commands.len()
    }

    /// Rewind the chunking cursor so the transaction can be re-marshalled.
    pub fn reset_marshalling(&mut self) {
        self.marshalling_index = 0;
    }

    /// Append the next chunk of this transaction to `parcel`.
    ///
    /// Returns `true` when this chunk completed the transaction. The sync
    /// trailer rides on every chunk.
    pub fn marshal_chunk(&mut self, parcel: &mut Parcel, ctx: &CodecContext) -> Result<bool> {
        let count_pos = parcel.write_position();
        parcel.write_i32(0)?;

        let mut written = 0u32;
        while self.marshalling_index < self.commands.len() {
            let (node_id, follow, command) = &self.commands[self.marshalling_index];
            parcel.write_u64(*node_id)?;
            parcel.write_u8(*follow as u8)?;
            match command {
                None => parcel.write_bool(false)?,
                Some(command) => {
                    parcel.write_bool(true)?;
                    let begin = parcel.write_position() as u32;
                    parcel.write_u32(begin)?;
                    let (cmd_type, subtype) = command.kind();
                    parcel.write_u16(cmd_type)?;
                    parcel.write_u16(subtype)?;
                    command.marshal_payload(parcel, ctx)?;
                    let end = parcel.write_position() as u32;
                    parcel.write_u32(end)?;
                }
            }
            self.marshalling_index += 1;
            written += 1;
            if parcel.len() > PARCEL_SPLIT_THRESHOLD {
                break;
            }
        }
        parcel.patch_u32(count_pos, written)?;

        parcel.write_bool(self.need_sync)?;
        parcel.write_bool(self.need_close_sync)?;
        parcel.write_i32(self.sync_count)?;
        parcel.write_u64(self.token)?;
        parcel.write_u64(self.timestamp)?;
        parcel.write_i32(self.sender_pid)?;
        parcel.write_u64(self.index)?;

        let complete = self.fully_marshalled();
        if !complete {
            tracing::debug!(
                written,
                remaining = self.commands.len() - self.marshalling_index,
                "transaction split across parcels"
            );
        }
        Ok(complete)
    }

    /// Decode one chunk written by [`marshal_chunk`].
    pub fn unmarshal_chunk(
        parcel: &mut Parcel,
        ctx: &CodecContext,
        commands: &CommandRegistry,
        objects: &ObjectRegistry,
    ) -> Result<Self> {
        let count = parcel.read_i32()?;
        let remaining = parcel.remaining();
        if count < 0 || (count as usize).saturating_mul(MIN_COMMAND_WIRE_SIZE) > remaining {
            return Err(TransactionError::ImplausibleCommandCount {
                count: i64::from(count),
                remaining,
            });
        }

        let mut data = TransactionData::new();
        for _ in 0..count {
            let node_id = parcel.read_u64()?;
            let follow = FollowType::from_wire(parcel.read_u8()?)?;
            if !parcel.read_bool()? {
                data.commands.push((node_id, follow, None));
                continue;
            }
            check_position(parcel)?;
            let kind = (parcel.read_u16()?, parcel.read_u16()?);
            let command = commands.decode(parcel, ctx, objects, kind)?;
            check_position(parcel)?;
            data.commands.push((node_id, follow, Some(command)));
        }

        data.need_sync = parcel.read_bool()?;
        data.need_close_sync = parcel.read_bool()?;
        data.sync_count = parcel.read_i32()?;
        data.token = parcel.read_u64()?;
        data.timestamp = parcel.read_u64()?;
        data.sender_pid = parcel.read_i32()?;
        data.index = parcel.read_u64()?;
        Ok(data)
    }
}

fn check_position(parcel: &mut Parcel) -> Result<()> {
    let actual = parcel.read_position() as u32;
    let expected = parcel.read_u32()?;
    if expected != actual {
        return Err(TransactionError::PositionMismatch { expected, actual });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use renderwire_drawcmd::RectF;
    use renderwire_parcel::Parcel;

    use super::*;
    use crate::command::{RenderCommand, SetBounds, UpdateDrawCmdList};

    fn codecs() -> (CodecContext, CommandRegistry, ObjectRegistry) {
        (
            CodecContext::default(),
            CommandRegistry::default(),
            ObjectRegistry::default(),
        )
    }

    #[test]
    fn single_chunk_roundtrip() {
        let (ctx, commands, objects) = codecs();
        let mut data = TransactionData::new();
        data.add_command(
            10,
            FollowType::FollowToParent,
            Box::new(SetBounds {
                bounds: RectF::new(0.0, 0.0, 50.0, 50.0),
            }),
        );
        data.add_empty_command(11, FollowType::None);
        data.add_command(12, FollowType::None, Box::new(UpdateDrawCmdList::default()));
        data.need_sync = true;
        data.sync_count = 3;
        data.token = 0xFEED;
        data.sender_pid = 1234;
        data.index = 7;

        let mut parcel = Parcel::new();
        assert!(data.marshal_chunk(&mut parcel, &ctx).unwrap());

        let back = TransactionData::unmarshal_chunk(&mut parcel, &ctx, &commands, &objects).unwrap();
        assert_eq!(back.commands().len(), 3);
        assert_eq!(back.commands()[0].0, 10);
        assert_eq!(back.commands()[0].1, FollowType::FollowToParent);
        assert!(back.commands()[1].2.is_none());
        assert!(back.need_sync);
        assert_eq!(back.sync_count, 3);
        assert_eq!(back.token, 0xFEED);
        assert_eq!(back.sender_pid, 1234);
        assert_eq!(back.index, 7);
        assert_eq!(parcel.remaining(), 0);
    }

    #[test]
    fn empty_sync_transaction_is_one_complete_chunk() {
        let (ctx, commands, objects) = codecs();
        let mut data = TransactionData::new();
        data.need_sync = true;

        let mut parcel = Parcel::new();
        assert!(data.marshal_chunk(&mut parcel, &ctx).unwrap());
        let back = TransactionData::unmarshal_chunk(&mut parcel, &ctx, &commands, &objects).unwrap();
        assert!(back.is_empty());
        assert!(back.need_sync);
    }

    /// Test command with an adjustable inline payload, used to force chunk
    /// splits without going through shared memory.
    #[derive(Debug)]
    struct Fill(usize);

    impl RenderCommand for Fill {
        fn kind(&self) -> (u16, u16) {
            (900, 0)
        }

        fn marshal_payload(&self, parcel: &mut Parcel, _ctx: &CodecContext) -> Result<()> {
            parcel.write_u32(self.0 as u32)?;
            parcel.write_bytes(&vec![0xAA; self.0])?;
            Ok(())
        }
    }

    fn registry_with_fill() -> CommandRegistry {
        let mut registry = CommandRegistry::default();
        registry.register((900, 0), |parcel, _ctx, _objects| {
            let n = parcel.read_u32()? as usize;
            parcel.read_bytes(n)?;
            Ok(Box::new(Fill(n)) as Box<dyn RenderCommand>)
        });
        registry
    }

    #[test]
    fn oversized_transaction_splits_and_resumes() {
        let (ctx, _, objects) = codecs();
        let commands = registry_with_fill();

        let mut data = TransactionData::new();
        for _ in 0..5 {
            data.add_command(1, FollowType::None, Box::new(Fill(600 * 1024)));
        }

        let mut chunks = Vec::new();
        loop {
            let mut parcel = Parcel::new();
            let complete = data.marshal_chunk(&mut parcel, &ctx).unwrap();
            chunks.push(parcel);
            if complete {
                break;
            }
        }
        assert!(chunks.len() > 1, "expected a split");
        assert!(data.fully_marshalled());

        let mut total = 0;
        for mut chunk in chunks {
            let back =
                TransactionData::unmarshal_chunk(&mut chunk, &ctx, &commands, &objects).unwrap();
            total += back.commands().len();
            assert_eq!(chunk.remaining(), 0);
        }
        assert_eq!(total, 5);
    }

    /// Writes eight bytes but registers a decoder that reads four, so the
    /// end marker must catch the desync.
    #[derive(Debug)]
    struct Lying;

    impl RenderCommand for Lying {
        fn kind(&self) -> (u16, u16) {
            (901, 0)
        }

        fn marshal_payload(&self, parcel: &mut Parcel, _ctx: &CodecContext) -> Result<()> {
            parcel.write_u64(0)?;
            Ok(())
        }
    }

    #[test]
    fn mis_consuming_command_fails_position_check() {
        let (ctx, _, objects) = codecs();
        let mut commands = CommandRegistry::empty();
        commands.register((901, 0), |parcel, _ctx, _objects| {
            parcel.read_u32()?;
            Ok(Box::new(Lying) as Box<dyn RenderCommand>)
        });

        let mut data = TransactionData::new();
        data.add_command(1, FollowType::None, Box::new(Lying));
        let mut parcel = Parcel::new();
        data.marshal_chunk(&mut parcel, &ctx).unwrap();

        let err =
            TransactionData::unmarshal_chunk(&mut parcel, &ctx, &commands, &objects).unwrap_err();
        assert!(matches!(err, TransactionError::PositionMismatch { .. }));
    }

    #[test]
    fn negative_command_count_rejected() {
        let (ctx, commands, objects) = codecs();
        let mut parcel = Parcel::new();
        parcel.write_i32(-5).unwrap();
        let err =
            TransactionData::unmarshal_chunk(&mut parcel, &ctx, &commands, &objects).unwrap_err();
        assert!(matches!(
            err,
            TransactionError::ImplausibleCommandCount { count: -5, .. }
        ));
    }
}
