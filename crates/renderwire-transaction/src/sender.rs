//! Transaction delivery: parcel assembly, shared-memory conversion, and the
//! retry loop, plus the service-side receive path.
//!
//! Every outbound parcel opens with an `i32` type flag. Flag `0` means the
//! transaction chunk follows inline; flag `1` means the whole chunk
//! (version header included) rides as a single blob through the shared
//! memory transport, used when the encoded chunk would crowd the IPC
//! buffer.

use std::time::Duration;

use renderwire_drawcmd::ObjectRegistry;
use renderwire_parcel::{read_version_header, write_version_header, CapabilitySet, Parcel};
use renderwire_shmem::{read_blob, write_blob, CodecContext};

use crate::command::CommandRegistry;
use crate::data::TransactionData;
use crate::error::{Result, TransactionError};

/// Parcel type flag: chunk follows inline.
pub const PARCEL_TYPE_INLINE: i32 = 0;
/// Parcel type flag: chunk rides in shared memory.
pub const PARCEL_TYPE_SHMEM: i32 = 1;

/// Chunks larger than this are converted to shared-memory parcels.
pub const SHMEM_PARCEL_THRESHOLD: usize = 200 * 1024;

/// Delivery retries before a commit reports failure.
pub const MAX_RETRY_COUNT: u32 = 30;
/// Fixed delay between delivery retries.
pub const RETRY_DELAY: Duration = Duration::from_millis(5);

/// The underlying one-way message channel to the render service.
pub trait TransactionChannel {
    fn send(&mut self, parcel: &Parcel) -> std::io::Result<()>;
}

/// Wrap a fully marshalled chunk in its transport parcel.
///
/// Small chunks are copied inline behind flag `0` with their attachments
/// carried over slot-for-slot. Large chunks go behind flag `1` as one blob;
/// the chunk's own attachments are re-seated in the outer parcel and their
/// new slots recorded so the receiver can rebuild the original table.
pub fn seal_transaction_parcel(mut inner: Parcel, ctx: &CodecContext) -> Result<Parcel> {
    let mut outer = Parcel::new();
    if inner.len() > SHMEM_PARCEL_THRESHOLD {
        outer.write_i32(PARCEL_TYPE_SHMEM)?;
        write_blob(&mut outer, ctx, inner.as_bytes())?;
        let moved: Vec<_> = inner.take_all_attachments().into_iter().flatten().collect();
        outer.write_u32(moved.len() as u32)?;
        for attachment in moved {
            let slot = outer.attach(attachment);
            outer.write_u32(slot)?;
        }
        tracing::debug!(len = outer.len(), "chunk converted to shared-memory parcel");
    } else {
        outer.write_i32(PARCEL_TYPE_INLINE)?;
        outer.write_bytes(inner.as_bytes())?;
        for attachment in inner.take_all_attachments().into_iter().flatten() {
            outer.attach(attachment);
        }
    }
    Ok(outer)
}

/// Client-side transaction committer.
pub struct TransactionSender<C> {
    channel: C,
    ctx: CodecContext,
    caps: CapabilitySet,
    max_retries: u32,
    retry_delay: Duration,
}

impl<C: TransactionChannel> TransactionSender<C> {
    pub fn new(channel: C, ctx: CodecContext) -> Self {
        Self {
            channel,
            ctx,
            caps: CapabilitySet::supported(),
            max_retries: MAX_RETRY_COUNT,
            retry_delay: RETRY_DELAY,
        }
    }

    pub fn with_retry_policy(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    /// Marshal and deliver `data`, splitting across parcels as needed.
    ///
    /// A sync-only transaction with no commands still produces exactly one
    /// message. Parcels already delivered before a failure are not
    /// retracted.
    pub fn commit(&mut self, data: &mut TransactionData) -> Result<()> {
        loop {
            let mut inner = Parcel::new();
            write_version_header(&mut inner, &self.caps)?;
            let complete = data.marshal_chunk(&mut inner, &self.ctx)?;
            let parcel = seal_transaction_parcel(inner, &self.ctx)?;
            self.send_with_retry(&parcel)?;
            if complete {
                break;
            }
        }
        data.reset_marshalling();
        Ok(())
    }

    fn send_with_retry(&mut self, parcel: &Parcel) -> Result<()> {
        let mut last = None;
        for attempt in 0..=self.max_retries {
            match self.channel.send(parcel) {
                Ok(()) => return Ok(()),
                Err(err) => {
                    tracing::warn!(attempt, error = %err, "transaction delivery failed");
                    last = Some(err);
                    if attempt < self.max_retries {
                        std::thread::sleep(self.retry_delay);
                    }
                }
            }
        }
        Err(TransactionError::RetriesExhausted {
            attempts: self.max_retries + 1,
            last: last.unwrap_or_else(|| std::io::Error::other("delivery failed")),
        })
    }
}

/// Service-side entry point: unwrap one received parcel into a transaction
/// chunk.
pub fn receive_transaction(
    parcel: &mut Parcel,
    ctx: &CodecContext,
    commands: &CommandRegistry,
    objects: &ObjectRegistry,
) -> Result<TransactionData> {
    match parcel.read_i32()? {
        PARCEL_TYPE_INLINE => {
            // Re-base the chunk at offset 0: the position markers inside it
            // are absolute offsets within the chunk, not the transport
            // parcel.
            let payload = parcel.read_bytes(parcel.remaining())?;
            let mut inner = Parcel::from_bytes(&payload[..]);
            for attachment in parcel.take_all_attachments().into_iter().flatten() {
                inner.attach(attachment);
            }
            read_version_header(&mut inner)?;
            TransactionData::unmarshal_chunk(&mut inner, ctx, commands, objects)
        }
        PARCEL_TYPE_SHMEM => {
            let payload = read_blob(parcel, ctx)?;
            let mut inner = Parcel::from_bytes(&payload[..]);
            let count = parcel.read_u32()?;
            for _ in 0..count {
                let slot = parcel.read_u32()?;
                inner.attach(parcel.take_attachment(slot)?);
            }
            read_version_header(&mut inner)?;
            TransactionData::unmarshal_chunk(&mut inner, ctx, commands, objects)
        }
        other => Err(TransactionError::InvalidParcelType(other)),
    }
}
