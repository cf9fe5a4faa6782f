//! Rectangle types used by draw command payloads.

use renderwire_parcel::{Marshal, Parcel, Result, Unmarshal};

/// Axis-aligned rectangle in float device coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RectF {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl RectF {
    pub const fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }
}

/// Axis-aligned rectangle in integer pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RectI {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl RectI {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }
}

impl Marshal for RectF {
    fn marshal(&self, parcel: &mut Parcel) -> Result<()> {
        parcel.write_f32(self.left)?;
        parcel.write_f32(self.top)?;
        parcel.write_f32(self.right)?;
        parcel.write_f32(self.bottom)
    }
}

impl Unmarshal for RectF {
    fn unmarshal(parcel: &mut Parcel) -> Result<Self> {
        Ok(Self {
            left: parcel.read_f32()?,
            top: parcel.read_f32()?,
            right: parcel.read_f32()?,
            bottom: parcel.read_f32()?,
        })
    }
}

impl Marshal for RectI {
    fn marshal(&self, parcel: &mut Parcel) -> Result<()> {
        parcel.write_i32(self.left)?;
        parcel.write_i32(self.top)?;
        parcel.write_i32(self.right)?;
        parcel.write_i32(self.bottom)
    }
}

impl Unmarshal for RectI {
    fn unmarshal(parcel: &mut Parcel) -> Result<Self> {
        Ok(Self {
            left: parcel.read_i32()?,
            top: parcel.read_i32()?,
            right: parcel.read_i32()?,
            bottom: parcel.read_i32()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_roundtrips() {
        let mut parcel = Parcel::new();
        RectF::new(0.5, -1.0, 640.0, 480.0).marshal(&mut parcel).unwrap();
        RectI::new(0, 0, 128, 128).marshal(&mut parcel).unwrap();

        assert_eq!(
            RectF::unmarshal(&mut parcel).unwrap(),
            RectF::new(0.5, -1.0, 640.0, 480.0)
        );
        assert_eq!(
            RectI::unmarshal(&mut parcel).unwrap(),
            RectI::new(0, 0, 128, 128)
        );
    }
}
