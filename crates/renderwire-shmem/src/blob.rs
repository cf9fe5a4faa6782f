//! Size-based blob transport: small payloads inline, large ones through
//! shared memory.
//!
//! Wire layout is a `u32` length followed by either the raw bytes (inline)
//! or a `u32` attachment-slot index referencing a [`ShmemHandle`] in the
//! parcel's attachment table. Both sides derive the inline/external decision
//! from the declared length and the thread-local inline override, so no
//! discriminator byte is needed.

use bytes::Bytes;
use renderwire_parcel::Parcel;

use crate::backend::ShmemHandle;
use crate::context::CodecContext;
use crate::error::{Result, ShmemError};

/// Payloads below this many bytes are copied directly into the parcel.
pub const INLINE_THRESHOLD: usize = 8 * 1024;

/// Hard cap on a single blob, inline or external.
pub const MAX_BLOB_SIZE: usize = 128 * 1024 * 1024;

fn goes_inline(len: usize, ctx: &CodecContext) -> bool {
    len < INLINE_THRESHOLD || ctx.inline_override().is_active()
}

/// Write a blob, choosing inline or shared-memory transport by size.
pub fn write_blob(parcel: &mut Parcel, ctx: &CodecContext, data: &[u8]) -> Result<()> {
    if data.len() > MAX_BLOB_SIZE {
        return Err(ShmemError::BlobTooLarge {
            size: data.len(),
            max: MAX_BLOB_SIZE,
        });
    }
    parcel.write_u32(data.len() as u32)?;
    if data.is_empty() {
        return Ok(());
    }
    if goes_inline(data.len(), ctx) {
        parcel.write_bytes(data)?;
        return Ok(());
    }

    let mut handle = ctx.backend().allocate(data.len())?;
    handle.write_all(data)?;
    let slot = parcel.attach(Box::new(handle));
    parcel.write_u32(slot)?;
    tracing::trace!(len = data.len(), slot, "blob marshalled through shared memory");
    Ok(())
}

/// Read a blob written by [`write_blob`].
///
/// The declared length is validated against [`MAX_BLOB_SIZE`] before any
/// allocation. External blobs reserve flow-control quota for the duration of
/// the copy out of the mapped region.
pub fn read_blob(parcel: &mut Parcel, ctx: &CodecContext) -> Result<Bytes> {
    let declared = parcel.read_u32()? as usize;
    if declared == 0 {
        return Ok(Bytes::new());
    }
    if declared > MAX_BLOB_SIZE {
        return Err(ShmemError::BlobTooLarge {
            size: declared,
            max: MAX_BLOB_SIZE,
        });
    }
    if goes_inline(declared, ctx) {
        return Ok(parcel.read_bytes(declared)?);
    }

    // Quota covers the mapped region until the copy completes; the guard
    // releases it on every exit path below.
    let guard = ctx.ledger().try_acquire(ctx.sender(), declared as u64)?;
    let slot = parcel.read_u32()?;
    let attachment = parcel.take_attachment(slot)?;
    let handle = attachment
        .downcast::<ShmemHandle>()
        .map_err(|_| ShmemError::InvalidAttachment(slot))?;
    let view = handle.map_for_read()?;
    if view.len() < declared {
        return Err(ShmemError::RegionTooSmall {
            declared,
            actual: view.len(),
        });
    }
    let data = Bytes::copy_from_slice(&view.as_slice()[..declared]);
    drop(guard);
    Ok(data)
}

/// Read a blob whose length is already known from a sibling field, failing
/// on disagreement before any payload is touched.
pub fn read_blob_exact(parcel: &mut Parcel, ctx: &CodecContext, expected: usize) -> Result<Bytes> {
    let start = parcel.read_position();
    let declared = parcel.read_u32()? as usize;
    if declared != expected {
        return Err(ShmemError::LengthMismatch { declared, expected });
    }
    parcel.rewind_read(start)?;
    read_blob(parcel, ctx)
}

/// Advance past a blob without materializing it. External handles are taken
/// from the attachment table and dropped, releasing their regions.
pub fn skip_blob(parcel: &mut Parcel, ctx: &CodecContext) -> Result<()> {
    let declared = parcel.read_u32()? as usize;
    if declared == 0 {
        return Ok(());
    }
    if declared > MAX_BLOB_SIZE {
        return Err(ShmemError::BlobTooLarge {
            size: declared,
            max: MAX_BLOB_SIZE,
        });
    }
    if goes_inline(declared, ctx) {
        parcel.skip(declared)?;
        return Ok(());
    }
    let slot = parcel.read_u32()?;
    drop(parcel.take_attachment(slot)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::backend::HeapBackend;
    use crate::flow::FlowControlLedger;

    fn heap_ctx(budget: u64) -> CodecContext {
        CodecContext::new(
            Arc::new(HeapBackend),
            Arc::new(FlowControlLedger::new(budget)),
        )
    }

    #[test]
    fn small_blob_travels_inline() {
        let ctx = heap_ctx(u64::MAX);
        let mut parcel = Parcel::new();
        write_blob(&mut parcel, &ctx, b"hello").unwrap();
        assert!(!parcel.has_attachments());

        let back = read_blob(&mut parcel, &ctx).unwrap();
        assert_eq!(back.as_ref(), b"hello");
    }

    #[test]
    fn empty_blob_is_just_a_length() {
        let ctx = heap_ctx(u64::MAX);
        let mut parcel = Parcel::new();
        write_blob(&mut parcel, &ctx, &[]).unwrap();
        assert_eq!(parcel.len(), 4);
        assert!(read_blob(&mut parcel, &ctx).unwrap().is_empty());
    }

    #[test]
    fn large_blob_travels_through_shared_memory() {
        let ctx = heap_ctx(u64::MAX);
        let payload: Vec<u8> = (0..INLINE_THRESHOLD + 100).map(|i| (i % 255) as u8).collect();
        let mut parcel = Parcel::new();
        write_blob(&mut parcel, &ctx, &payload).unwrap();
        // Only length + slot index land in the parcel body.
        assert_eq!(parcel.len(), 8);
        assert!(parcel.has_attachments());

        let back = read_blob(&mut parcel, &ctx).unwrap();
        assert_eq!(back.as_ref(), payload.as_slice());
        assert_eq!(ctx.ledger().outstanding(ctx.sender()), 0);
    }

    #[test]
    fn write_rejects_oversize_payload() {
        let ctx = heap_ctx(u64::MAX);
        let payload = vec![0u8; MAX_BLOB_SIZE + 1];
        let mut parcel = Parcel::new();
        let err = write_blob(&mut parcel, &ctx, &payload).unwrap_err();
        assert!(matches!(err, ShmemError::BlobTooLarge { .. }));
        // Nothing was written.
        assert_eq!(parcel.len(), 0);
    }

    #[test]
    fn oversize_declared_length_fails_before_allocation() {
        let ctx = heap_ctx(u64::MAX);
        let mut parcel = Parcel::new();
        parcel.write_u32(u32::MAX).unwrap();
        let err = read_blob(&mut parcel, &ctx).unwrap_err();
        assert!(matches!(err, ShmemError::BlobTooLarge { .. }));
    }

    #[test]
    fn inline_override_keeps_large_blob_in_parcel() {
        let ctx = heap_ctx(u64::MAX);
        let payload = vec![3u8; INLINE_THRESHOLD * 2];
        let mut parcel = Parcel::new();
        let scope = ctx.inline_override().begin_no_shared_mem();
        write_blob(&mut parcel, &ctx, &payload).unwrap();
        assert!(!parcel.has_attachments());

        let back = read_blob(&mut parcel, &ctx).unwrap();
        drop(scope);
        assert_eq!(back.len(), payload.len());
    }

    #[test]
    fn quota_exhaustion_rejects_read() {
        let ctx = heap_ctx(16).with_sender(7);
        let payload = vec![0u8; INLINE_THRESHOLD + 1];
        let mut parcel = Parcel::new();
        write_blob(&mut parcel, &ctx, &payload).unwrap();

        let err = read_blob(&mut parcel, &ctx).unwrap_err();
        assert!(matches!(err, ShmemError::QuotaExceeded { sender: 7, .. }));
        assert_eq!(ctx.ledger().outstanding(7), 0);
    }

    #[test]
    fn undersized_region_fails_and_releases_quota() {
        let ctx = heap_ctx(u64::MAX);
        let mut parcel = Parcel::new();
        parcel.write_u32((INLINE_THRESHOLD + 500) as u32).unwrap();
        let small = ctx.backend().allocate(10).unwrap();
        let slot = parcel.attach(Box::new(small));
        parcel.write_u32(slot).unwrap();

        let err = read_blob(&mut parcel, &ctx).unwrap_err();
        assert!(matches!(err, ShmemError::RegionTooSmall { .. }));
        assert_eq!(ctx.ledger().outstanding(ctx.sender()), 0);
    }

    #[test]
    fn exact_length_mismatch_detected_up_front() {
        let ctx = heap_ctx(u64::MAX);
        let mut parcel = Parcel::new();
        write_blob(&mut parcel, &ctx, b"abcdef").unwrap();

        let err = read_blob_exact(&mut parcel, &ctx, 5).unwrap_err();
        assert!(matches!(
            err,
            ShmemError::LengthMismatch {
                declared: 6,
                expected: 5
            }
        ));
    }

    #[test]
    fn skip_blob_advances_past_both_transports() {
        let ctx = heap_ctx(u64::MAX);
        let mut parcel = Parcel::new();
        write_blob(&mut parcel, &ctx, b"inline").unwrap();
        write_blob(&mut parcel, &ctx, &vec![1u8; INLINE_THRESHOLD + 4]).unwrap();
        parcel.write_u32(0xCAFE).unwrap();

        skip_blob(&mut parcel, &ctx).unwrap();
        skip_blob(&mut parcel, &ctx).unwrap();
        assert_eq!(parcel.read_u32().unwrap(), 0xCAFE);
        // The external handle was consumed by the skip.
        assert!(!parcel.has_attachments());
    }
}
