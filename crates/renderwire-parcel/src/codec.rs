//! Per-type encode/decode for primitives and generic containers.
//!
//! All compound decoders short-circuit on the first component failure, and
//! every declared count is validated against its bound *before* any
//! proportional allocation — a small crafted message cannot claim an
//! unbounded element count.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{ParcelError, Result};
use crate::parcel::Parcel;

/// Maximum element count accepted for any vector or map decode.
pub const MAX_VECTOR_SIZE: usize = 65535;

/// Sentinel written for an absent nullable shared value.
pub const NULLABLE_ABSENT: i32 = -1;
/// Sentinel written before a present nullable shared value.
pub const NULLABLE_PRESENT: i32 = 1;

/// Encode a value into a parcel.
pub trait Marshal {
    fn marshal(&self, parcel: &mut Parcel) -> Result<()>;
}

/// Decode a value from a parcel.
///
/// On failure the parcel cursor is left mid-field; callers must discard the
/// whole decode rather than resume.
pub trait Unmarshal: Sized {
    fn unmarshal(parcel: &mut Parcel) -> Result<Self>;
}

macro_rules! primitive_codec {
    ($($ty:ty, $write:ident, $read:ident);* $(;)?) => {
        $(
            impl Marshal for $ty {
                fn marshal(&self, parcel: &mut Parcel) -> Result<()> {
                    parcel.$write(*self)
                }
            }

            impl Unmarshal for $ty {
                fn unmarshal(parcel: &mut Parcel) -> Result<Self> {
                    parcel.$read()
                }
            }
        )*
    };
}

primitive_codec! {
    u8, write_u8, read_u8;
    u16, write_u16, read_u16;
    u32, write_u32, read_u32;
    u64, write_u64, read_u64;
    i8, write_i8, read_i8;
    i16, write_i16, read_i16;
    i32, write_i32, read_i32;
    i64, write_i64, read_i64;
    f32, write_f32, read_f32;
    f64, write_f64, read_f64;
    bool, write_bool, read_bool;
}

impl<const N: usize> Marshal for [u8; N] {
    fn marshal(&self, parcel: &mut Parcel) -> Result<()> {
        parcel.write_bytes(self)
    }
}

impl<const N: usize> Unmarshal for [u8; N] {
    fn unmarshal(parcel: &mut Parcel) -> Result<Self> {
        let raw = parcel.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&raw);
        Ok(out)
    }
}

impl Marshal for String {
    fn marshal(&self, parcel: &mut Parcel) -> Result<()> {
        parcel.write_u32(self.len() as u32)?;
        parcel.write_bytes(self.as_bytes())
    }
}

impl Unmarshal for String {
    fn unmarshal(parcel: &mut Parcel) -> Result<Self> {
        let len = parcel.read_u32()? as usize;
        let raw = parcel.read_bytes(len)?;
        String::from_utf8(raw.to_vec()).map_err(|_| ParcelError::InvalidUtf8)
    }
}

/// `Option<T>`: a one-byte presence flag; an absent value consumes nothing
/// further.
impl<T: Marshal> Marshal for Option<T> {
    fn marshal(&self, parcel: &mut Parcel) -> Result<()> {
        match self {
            None => parcel.write_bool(false),
            Some(val) => {
                parcel.write_bool(true)?;
                val.marshal(parcel)
            }
        }
    }
}

impl<T: Unmarshal> Unmarshal for Option<T> {
    fn unmarshal(parcel: &mut Parcel) -> Result<Self> {
        if !parcel.read_bool()? {
            return Ok(None);
        }
        Ok(Some(T::unmarshal(parcel)?))
    }
}

/// Encode a vector with an explicit element-count bound.
pub fn marshal_vec_bounded<T: Marshal>(
    parcel: &mut Parcel,
    val: &[T],
    max_size: usize,
) -> Result<()> {
    if val.len() > max_size {
        return Err(ParcelError::CountTooLarge {
            count: val.len(),
            max: max_size,
        });
    }
    parcel.write_u32(val.len() as u32)?;
    for item in val {
        item.marshal(parcel)?;
    }
    Ok(())
}

/// Decode a vector with an explicit element-count bound.
///
/// The declared count is rejected before any element is decoded, and the
/// capacity reservation is additionally clamped by the bytes actually left
/// in the parcel.
pub fn unmarshal_vec_bounded<T: Unmarshal>(
    parcel: &mut Parcel,
    max_size: usize,
) -> Result<Vec<T>> {
    let count = parcel.read_u32()? as usize;
    if count > max_size {
        return Err(ParcelError::CountTooLarge {
            count,
            max: max_size,
        });
    }
    let mut out = Vec::with_capacity(count.min(parcel.remaining()));
    for _ in 0..count {
        out.push(T::unmarshal(parcel)?);
    }
    Ok(out)
}

impl<T: Marshal> Marshal for Vec<T> {
    fn marshal(&self, parcel: &mut Parcel) -> Result<()> {
        marshal_vec_bounded(parcel, self, MAX_VECTOR_SIZE)
    }
}

impl<T: Unmarshal> Unmarshal for Vec<T> {
    fn unmarshal(parcel: &mut Parcel) -> Result<Self> {
        unmarshal_vec_bounded(parcel, MAX_VECTOR_SIZE)
    }
}

impl<K: Marshal, V: Marshal> Marshal for BTreeMap<K, V> {
    fn marshal(&self, parcel: &mut Parcel) -> Result<()> {
        if self.len() > MAX_VECTOR_SIZE {
            return Err(ParcelError::CountTooLarge {
                count: self.len(),
                max: MAX_VECTOR_SIZE,
            });
        }
        parcel.write_u32(self.len() as u32)?;
        for (key, value) in self {
            key.marshal(parcel)?;
            value.marshal(parcel)?;
        }
        Ok(())
    }
}

impl<K: Unmarshal + Ord, V: Unmarshal> Unmarshal for BTreeMap<K, V> {
    fn unmarshal(parcel: &mut Parcel) -> Result<Self> {
        let count = parcel.read_u32()? as usize;
        if count > MAX_VECTOR_SIZE {
            return Err(ParcelError::CountTooLarge {
                count,
                max: MAX_VECTOR_SIZE,
            });
        }
        let mut out = BTreeMap::new();
        for _ in 0..count {
            let key = K::unmarshal(parcel)?;
            let value = V::unmarshal(parcel)?;
            out.insert(key, value);
        }
        Ok(out)
    }
}

macro_rules! tuple_codec {
    ($($name:ident),+) => {
        impl<$($name: Marshal),+> Marshal for ($($name,)+) {
            fn marshal(&self, parcel: &mut Parcel) -> Result<()> {
                #[allow(non_snake_case)]
                let ($($name,)+) = self;
                $($name.marshal(parcel)?;)+
                Ok(())
            }
        }

        impl<$($name: Unmarshal),+> Unmarshal for ($($name,)+) {
            fn unmarshal(parcel: &mut Parcel) -> Result<Self> {
                Ok(($($name::unmarshal(parcel)?,)+))
            }
        }
    };
}

tuple_codec!(A);
tuple_codec!(A, B);
tuple_codec!(A, B, C);
tuple_codec!(A, B, C, D);
tuple_codec!(A, B, C, D, E);

/// Encode a nullable shared value: the reserved sentinel precedes a present
/// payload, so decode can yield "absent" without any further reads.
pub fn marshal_nullable<T: Marshal>(parcel: &mut Parcel, val: Option<&Arc<T>>) -> Result<()> {
    match val {
        None => parcel.write_i32(NULLABLE_ABSENT),
        Some(inner) => {
            parcel.write_i32(NULLABLE_PRESENT)?;
            inner.marshal(parcel)
        }
    }
}

/// Decode a nullable shared value written by [`marshal_nullable`].
pub fn unmarshal_nullable<T: Unmarshal>(parcel: &mut Parcel) -> Result<Option<Arc<T>>> {
    match parcel.read_i32()? {
        NULLABLE_ABSENT => Ok(None),
        NULLABLE_PRESENT => Ok(Some(Arc::new(T::unmarshal(parcel)?))),
        other => Err(ParcelError::InvalidSentinel(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<T: Marshal + Unmarshal + PartialEq + std::fmt::Debug>(val: T) {
        let mut parcel = Parcel::new();
        val.marshal(&mut parcel).unwrap();
        assert_eq!(T::unmarshal(&mut parcel).unwrap(), val);
        assert_eq!(parcel.remaining(), 0);
    }

    #[test]
    fn primitives_roundtrip() {
        roundtrip(0u8);
        roundtrip(u16::MAX);
        roundtrip(0x1234_5678u32);
        roundtrip(u64::MAX);
        roundtrip(-1i8);
        roundtrip(i16::MIN);
        roundtrip(-7i32);
        roundtrip(i64::MIN);
        roundtrip(3.75f32);
        roundtrip(-2.5f64);
        roundtrip(true);
        roundtrip(false);
    }

    #[test]
    fn containers_roundtrip() {
        roundtrip(String::from("transaction"));
        roundtrip(String::new());
        roundtrip([1u8, 2, 3, 4]);
        roundtrip(Some(9u32));
        roundtrip(Option::<u32>::None);
        roundtrip(vec![1u16, 2, 3]);
        roundtrip(Vec::<u64>::new());
        roundtrip((1u8, 2u32, -3i64));
        roundtrip(BTreeMap::from([(1u32, 10u64), (2, 20)]));
    }

    #[test]
    fn absent_option_consumes_only_flag() {
        let mut parcel = Parcel::new();
        Option::<u64>::None.marshal(&mut parcel).unwrap();
        42u32.marshal(&mut parcel).unwrap();

        assert_eq!(Option::<u64>::unmarshal(&mut parcel).unwrap(), None);
        assert_eq!(u32::unmarshal(&mut parcel).unwrap(), 42);
    }

    #[test]
    fn vector_over_bound_fails_encode() {
        let mut parcel = Parcel::new();
        let big = vec![0u8; MAX_VECTOR_SIZE + 1];
        assert!(matches!(
            big.marshal(&mut parcel).unwrap_err(),
            ParcelError::CountTooLarge { .. }
        ));
    }

    #[test]
    fn claimed_count_over_bound_fails_before_decode() {
        // Four bytes claiming 2^31 elements.
        let mut parcel = Parcel::new();
        parcel.write_u32(1 << 31).unwrap();
        assert!(matches!(
            Vec::<u64>::unmarshal(&mut parcel).unwrap_err(),
            ParcelError::CountTooLarge { .. }
        ));
    }

    #[test]
    fn claimed_count_within_bound_but_truncated_fails() {
        // Claims 100 u32s, carries 4 bytes. Must fail on the missing bytes,
        // not allocate for the claim.
        let mut parcel = Parcel::new();
        parcel.write_u32(100).unwrap();
        parcel.write_u32(5).unwrap();
        assert!(matches!(
            Vec::<u32>::unmarshal(&mut parcel).unwrap_err(),
            ParcelError::UnexpectedEof { .. }
        ));
    }

    #[test]
    fn tuple_decode_short_circuits() {
        let mut parcel = Parcel::new();
        parcel.write_u32(1).unwrap();
        // Second component missing: the whole tuple decode fails.
        assert!(matches!(
            <(u32, u64)>::unmarshal(&mut parcel).unwrap_err(),
            ParcelError::UnexpectedEof { .. }
        ));
    }

    #[test]
    fn nullable_shared_roundtrip() {
        let mut parcel = Parcel::new();
        marshal_nullable::<u32>(&mut parcel, None).unwrap();
        marshal_nullable(&mut parcel, Some(&Arc::new(77u32))).unwrap();

        assert_eq!(unmarshal_nullable::<u32>(&mut parcel).unwrap(), None);
        assert_eq!(
            unmarshal_nullable::<u32>(&mut parcel).unwrap().as_deref(),
            Some(&77)
        );
    }

    #[test]
    fn nullable_rejects_unknown_sentinel() {
        let mut parcel = Parcel::new();
        parcel.write_i32(3).unwrap();
        assert!(matches!(
            unmarshal_nullable::<u32>(&mut parcel).unwrap_err(),
            ParcelError::InvalidSentinel(3)
        ));
    }

    #[test]
    fn string_rejects_invalid_utf8() {
        let mut parcel = Parcel::new();
        parcel.write_u32(2).unwrap();
        parcel.write_bytes(&[0xFF, 0xFE]).unwrap();
        assert!(matches!(
            String::unmarshal(&mut parcel).unwrap_err(),
            ParcelError::InvalidUtf8
        ));
    }
}
