//! Framing of the raw opcode blob.
//!
//! An opcode blob is a flat byte sequence of records:
//! `[u16 opcode][u16 flags][u32 payload_len][payload]`, all little-endian.
//! The blob travels opaquely through the blob transport; decode only walks
//! it to count ops against the protocol budget.

use bytes::BufMut;

use crate::error::{DrawCmdError, Result};

/// Bytes of header before each op payload.
pub const OP_HEADER_SIZE: usize = 8;

/// One framed op as seen by [`OpIter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpRecord<'a> {
    pub opcode: u16,
    pub flags: u16,
    pub payload: &'a [u8],
}

/// Append one framed op to a blob under construction.
pub fn push_op(blob: &mut Vec<u8>, opcode: u16, flags: u16, payload: &[u8]) {
    blob.put_u16_le(opcode);
    blob.put_u16_le(flags);
    blob.put_u32_le(payload.len() as u32);
    blob.put_slice(payload);
}

/// Bounds-checked iterator over the ops of a blob.
pub struct OpIter<'a> {
    blob: &'a [u8],
    offset: usize,
}

impl<'a> OpIter<'a> {
    pub fn new(blob: &'a [u8]) -> Self {
        Self { blob, offset: 0 }
    }
}

impl<'a> Iterator for OpIter<'a> {
    type Item = Result<OpRecord<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset == self.blob.len() {
            return None;
        }
        let start = self.offset;
        let rest = &self.blob[start..];
        if rest.len() < OP_HEADER_SIZE {
            self.offset = self.blob.len();
            return Some(Err(DrawCmdError::MalformedOpStream { offset: start }));
        }
        let opcode = u16::from_le_bytes([rest[0], rest[1]]);
        let flags = u16::from_le_bytes([rest[2], rest[3]]);
        let len = u32::from_le_bytes([rest[4], rest[5], rest[6], rest[7]]) as usize;
        if rest.len() - OP_HEADER_SIZE < len {
            self.offset = self.blob.len();
            return Some(Err(DrawCmdError::MalformedOpStream { offset: start }));
        }
        self.offset = start + OP_HEADER_SIZE + len;
        Some(Ok(OpRecord {
            opcode,
            flags,
            payload: &rest[OP_HEADER_SIZE..OP_HEADER_SIZE + len],
        }))
    }
}

/// Walk the blob and return how many ops it frames.
///
/// Fails if any record runs past the end of the blob.
pub fn count_ops(blob: &[u8]) -> Result<u32> {
    let mut count = 0u32;
    for record in OpIter::new(blob) {
        record?;
        count = count.saturating_add(1);
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_blob_has_no_ops() {
        assert_eq!(count_ops(&[]).unwrap(), 0);
    }

    #[test]
    fn counts_and_replays_framed_ops() {
        let mut blob = Vec::new();
        push_op(&mut blob, 1, 0, b"abc");
        push_op(&mut blob, 2, 0x10, &[]);
        push_op(&mut blob, 3, 0, &[9; 100]);

        assert_eq!(count_ops(&blob).unwrap(), 3);
        let ops: Vec<_> = OpIter::new(&blob).map(|r| r.unwrap()).collect();
        assert_eq!(ops[0].opcode, 1);
        assert_eq!(ops[0].payload, b"abc");
        assert_eq!(ops[1].flags, 0x10);
        assert_eq!(ops[2].payload.len(), 100);
    }

    #[test]
    fn truncated_header_fails() {
        let mut blob = Vec::new();
        push_op(&mut blob, 1, 0, b"xy");
        blob.extend_from_slice(&[0, 0, 0]);
        let err = count_ops(&blob).unwrap_err();
        assert!(matches!(err, DrawCmdError::MalformedOpStream { offset: 10 }));
    }

    #[test]
    fn payload_claiming_past_end_fails() {
        let mut blob = Vec::new();
        blob.put_u16_le(4);
        blob.put_u16_le(0);
        blob.put_u32_le(1_000);
        blob.put_slice(&[1, 2]);
        assert!(count_ops(&blob).is_err());
    }
}
