//! Optional capability-bitmask header for cross-release compatibility.
//!
//! A writer may prefix a transaction payload with a fixed sentinel and a
//! 256-bit capability mask. Readers peek for the sentinel: if present the
//! header is consumed and remembered on the parcel, otherwise the cursor is
//! rewound so header-less peers decode unchanged. Fields guarded by a
//! capability bit are always written by writers that support them; decode
//! consumes the wire bytes only when the writer announced the bit, keeping
//! the cursor aligned across version skew.

use crate::codec::{Marshal, Unmarshal};
use crate::error::Result;
use crate::parcel::Parcel;

/// Sentinel distinguishing a version header from ordinary payload bytes.
pub const VERSION_SENTINEL: i64 = -1;

/// Number of u64 words in the capability mask.
pub const CAPS_WORDS: usize = 4;

/// A field version marker: either a capability bit index, or always-present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// The field predates version negotiation and is on every wire.
    Always,
    /// The field is present only when this bit is announced by the writer.
    Bit(u16),
}

/// Capability bit: transactions carry an animation token.
pub const CAP_ANIM_TOKEN: Capability = Capability::Bit(0);
/// Capability bit: property updates carry a dirty flag.
pub const CAP_PROP_DIRTY: Capability = Capability::Bit(1);

/// Fixed-width capability bitmask (bit i = capability i supported).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CapabilitySet {
    words: [u64; CAPS_WORDS],
}

impl CapabilitySet {
    /// An empty set: only always-present fields decode.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The set this build of the library announces when writing headers.
    pub fn supported() -> Self {
        let mut set = Self::empty();
        set.insert(CAP_ANIM_TOKEN);
        set
    }

    /// Mark a capability bit as supported. `Always` is not a bit and is
    /// ignored.
    pub fn insert(&mut self, cap: Capability) {
        if let Capability::Bit(bit) = cap {
            if (bit as usize) < CAPS_WORDS * 64 {
                self.words[bit as usize / 64] |= 1u64 << (bit % 64);
            }
        }
    }

    /// Whether a field guarded by `cap` is populated on this wire.
    pub fn contains(&self, cap: Capability) -> bool {
        match cap {
            Capability::Always => true,
            Capability::Bit(bit) => {
                if bit as usize >= CAPS_WORDS * 64 {
                    return false;
                }
                self.words[bit as usize / 64] & (1u64 << (bit % 64)) != 0
            }
        }
    }
}

/// Emit the sentinel and the capability mask.
pub fn write_version_header(parcel: &mut Parcel, caps: &CapabilitySet) -> Result<()> {
    parcel.write_i64(VERSION_SENTINEL)?;
    for word in caps.words {
        parcel.write_u64(word)?;
    }
    Ok(())
}

/// Peek for a version header at the current read position.
///
/// Consumes the header and remembers its mask on the parcel when the
/// sentinel matches; otherwise rewinds so the peeked bytes stay available.
pub fn read_version_header(parcel: &mut Parcel) -> Result<Option<CapabilitySet>> {
    let start = parcel.read_position();
    if parcel.remaining() < 8 {
        return Ok(None);
    }
    if parcel.read_i64()? != VERSION_SENTINEL {
        parcel.rewind_read(start)?;
        return Ok(None);
    }
    let mut words = [0u64; CAPS_WORDS];
    for word in &mut words {
        *word = parcel.read_u64()?;
    }
    let caps = CapabilitySet { words };
    parcel.wire_caps = Some(caps);
    tracing::trace!(?caps, "version header consumed");
    Ok(Some(caps))
}

/// Encode a version-guarded field. Writers always emit the value.
pub fn compatible_marshal<T: Marshal>(parcel: &mut Parcel, val: &T) -> Result<()> {
    val.marshal(parcel)
}

/// Decode a version-guarded field.
///
/// Wire bytes are consumed only when the field is always present or the
/// writer announced `cap`; otherwise `default` is returned without moving
/// the cursor.
pub fn compatible_unmarshal<T: Unmarshal>(
    parcel: &mut Parcel,
    default: T,
    cap: Capability,
) -> Result<T> {
    let populated = match cap {
        Capability::Always => true,
        bit => parcel
            .wire_caps()
            .map(|caps| caps.contains(bit))
            .unwrap_or(false),
    };
    if populated {
        T::unmarshal(parcel)
    } else {
        Ok(default)
    }
}

/// Skip an obsolete field that old writers (without `cap`) still emit but
/// the current struct no longer models.
pub fn compatible_skip_obsolete(
    parcel: &mut Parcel,
    wire_size: usize,
    cap: Capability,
) -> Result<()> {
    let on_wire = match cap {
        Capability::Always => false,
        bit => !parcel
            .wire_caps()
            .map(|caps| caps.contains(bit))
            .unwrap_or(false),
    };
    if on_wire {
        parcel.skip(wire_size)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAP_TEST: Capability = Capability::Bit(7);

    #[test]
    fn header_roundtrip_remembers_caps() {
        let mut parcel = Parcel::new();
        let mut caps = CapabilitySet::empty();
        caps.insert(CAP_TEST);
        caps.insert(Capability::Bit(130));
        write_version_header(&mut parcel, &caps).unwrap();

        let read = read_version_header(&mut parcel).unwrap().unwrap();
        assert!(read.contains(CAP_TEST));
        assert!(read.contains(Capability::Bit(130)));
        assert!(!read.contains(Capability::Bit(8)));
        assert_eq!(parcel.wire_caps(), Some(&read));
    }

    #[test]
    fn headerless_message_rewinds() {
        let mut parcel = Parcel::new();
        parcel.write_i64(12345).unwrap();
        parcel.write_u32(6).unwrap();

        assert!(read_version_header(&mut parcel).unwrap().is_none());
        assert_eq!(parcel.read_i64().unwrap(), 12345);
        assert_eq!(parcel.read_u32().unwrap(), 6);
    }

    #[test]
    fn short_message_is_not_a_header() {
        let mut parcel = Parcel::new();
        parcel.write_u32(1).unwrap();
        assert!(read_version_header(&mut parcel).unwrap().is_none());
        assert_eq!(parcel.read_u32().unwrap(), 1);
    }

    #[test]
    fn always_present_field_decodes_without_header() {
        let mut parcel = Parcel::new();
        compatible_marshal(&mut parcel, &99u32).unwrap();

        let val = compatible_unmarshal(&mut parcel, 0u32, Capability::Always).unwrap();
        assert_eq!(val, 99);
    }

    #[test]
    fn announced_bit_consumes_field() {
        let mut parcel = Parcel::new();
        let mut caps = CapabilitySet::empty();
        caps.insert(CAP_TEST);
        write_version_header(&mut parcel, &caps).unwrap();
        compatible_marshal(&mut parcel, &7u64).unwrap();
        compatible_marshal(&mut parcel, &8u32).unwrap();

        read_version_header(&mut parcel).unwrap();
        assert_eq!(compatible_unmarshal(&mut parcel, 0u64, CAP_TEST).unwrap(), 7);
        assert_eq!(
            compatible_unmarshal(&mut parcel, 0u32, Capability::Always).unwrap(),
            8
        );
    }

    #[test]
    fn missing_bit_yields_default_with_aligned_cursor() {
        // Writer without the capability: guarded field never written, but
        // the trailing always-present field is.
        let mut parcel = Parcel::new();
        write_version_header(&mut parcel, &CapabilitySet::empty()).unwrap();
        compatible_marshal(&mut parcel, &8u32).unwrap();

        read_version_header(&mut parcel).unwrap();
        assert_eq!(
            compatible_unmarshal(&mut parcel, 42u64, CAP_TEST).unwrap(),
            42
        );
        assert_eq!(
            compatible_unmarshal(&mut parcel, 0u32, Capability::Always).unwrap(),
            8
        );
        assert_eq!(parcel.remaining(), 0);
    }

    #[test]
    fn obsolete_field_skipped_on_old_wire() {
        // Old writer: no capability bit, obsolete u64 still on the wire.
        let mut parcel = Parcel::new();
        write_version_header(&mut parcel, &CapabilitySet::empty()).unwrap();
        parcel.write_u64(0xDEAD).unwrap();
        parcel.write_u32(5).unwrap();

        read_version_header(&mut parcel).unwrap();
        compatible_skip_obsolete(&mut parcel, 8, CAP_TEST).unwrap();
        assert_eq!(parcel.read_u32().unwrap(), 5);

        // New writer: bit set, field no longer emitted, nothing skipped.
        let mut parcel = Parcel::new();
        let mut caps = CapabilitySet::empty();
        caps.insert(CAP_TEST);
        write_version_header(&mut parcel, &caps).unwrap();
        parcel.write_u32(5).unwrap();

        read_version_header(&mut parcel).unwrap();
        compatible_skip_obsolete(&mut parcel, 8, CAP_TEST).unwrap();
        assert_eq!(parcel.read_u32().unwrap(), 5);
    }
}
