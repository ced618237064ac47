use glam::Vec3;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bits {
    Eight,
    Sixteen,
}

impl Bits {
    pub const fn max_code(self) -> u32 {
        match self {
            Self::Eight => u8::MAX as u32,
            Self::Sixteen => u16::MAX as u32,
        }
    }

    pub const fn width(self) -> u32 {
        match self {
            Self::Eight => 8,
            Self::Sixteen => 16,
        }
    }
}

/// Size of one quantization step for the given bounds.
pub fn step(lo: f32, hi: f32, bits: Bits) -> f32 {
    (hi - lo) / bits.max_code() as f32
}

pub fn encode(value: f32, lo: f32, hi: f32, bits: Bits) -> u32 {
    if !lo.is_finite() || !hi.is_finite() || hi <= lo {
        return 0;
    }

    let max = bits.max_code() as f32;
    let t = (value.clamp(lo, hi) - lo) / (hi - lo);
    // NaN inputs saturate to code 0 through the float-to-int cast.
    ((t * max + 0.5) as u32).min(bits.max_code())
}

pub fn decode(code: u32, lo: f32, hi: f32, bits: Bits) -> f32 {
    let max = bits.max_code();
    let t = code.min(max) as f32 / max as f32;
    lo + t * (hi - lo)
}

/// Like [`decode`], but values within one step of zero come through as
/// exactly zero.
pub fn decode_zeroed(code: u32, lo: f32, hi: f32, bits: Bits) -> f32 {
    let value = decode(code, lo, hi, bits);
    if value.abs() < step(lo, hi, bits).abs() {
        0.0
    } else {
        value
    }
}

#[inline]
pub fn f32_to_u16(value: f32, lo: f32, hi: f32) -> u16 {
    encode(value, lo, hi, Bits::Sixteen) as u16
}

#[inline]
pub fn u16_to_f32(code: u16, lo: f32, hi: f32) -> f32 {
    decode_zeroed(code as u32, lo, hi, Bits::Sixteen)
}

#[inline]
pub fn f32_to_u8(value: f32, lo: f32, hi: f32) -> u8 {
    encode(value, lo, hi, Bits::Eight) as u8
}

#[inline]
pub fn u8_to_f32(code: u8, lo: f32, hi: f32) -> f32 {
    decode_zeroed(code as u32, lo, hi, Bits::Eight)
}

/// Per-axis bounds for a vector quantized onto the wire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisBounds {
    pub lo: Vec3,
    pub hi: Vec3,
}

impl AxisBounds {
    pub const fn new(lo: Vec3, hi: Vec3) -> Self {
        Self { lo, hi }
    }

    pub fn symmetric(extent: f32) -> Self {
        Self {
            lo: Vec3::splat(-extent),
            hi: Vec3::splat(extent),
        }
    }

    pub fn encode(&self, value: Vec3, bits: Bits) -> [u32; 3] {
        [
            encode(value.x, self.lo.x, self.hi.x, bits),
            encode(value.y, self.lo.y, self.hi.y, bits),
            encode(value.z, self.lo.z, self.hi.z, bits),
        ]
    }

    pub fn decode(&self, codes: [u32; 3], bits: Bits) -> Vec3 {
        Vec3::new(
            decode_zeroed(codes[0], self.lo.x, self.hi.x, bits),
            decode_zeroed(codes[1], self.lo.y, self.hi.y, bits),
            decode_zeroed(codes[2], self.lo.z, self.hi.z, bits),
        )
    }

    /// Snaps `value` onto the grid a peer quantizing at `bits` would see.
    pub fn quantize(&self, value: Vec3, bits: Bits) -> Vec3 {
        self.decode(self.encode(value, bits), bits)
    }
}
