use glam::{Quat, Vec3, Vec4};
use serde::{Deserialize, Serialize};

use super::{WireReader, WireWriter};
use crate::error::DecodeError;
use crate::quantize::{AxisBounds, Bits};

/// Precision a kinematic update was sent at. Ordered coarse to fine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PrecisionTier {
    Bits8,
    Bits16,
    Bits32,
}

impl PrecisionTier {
    /// Quantization grid for the tier, `None` when values are sent as floats.
    pub fn bits(self) -> Option<Bits> {
        match self {
            Self::Bits8 => Some(Bits::Eight),
            Self::Bits16 => Some(Bits::Sixteen),
            Self::Bits32 => None,
        }
    }
}

/// Quantization bounds derived from the receiving region's dimensions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionBounds {
    pub position: AxisBounds,
    pub motion: AxisBounds,
}

impl MotionBounds {
    pub fn for_region(width: f32, min_height: f32, max_height: f32) -> Self {
        Self {
            position: AxisBounds::new(
                Vec3::new(-0.5 * width, -0.5 * width, min_height),
                Vec3::new(1.5 * width, 1.5 * width, max_height),
            ),
            motion: AxisBounds::symmetric(width),
        }
    }
}

impl Default for MotionBounds {
    fn default() -> Self {
        Self::for_region(256.0, -256.0, 4096.0)
    }
}

const ROTATION_LO: f32 = -1.0;
const ROTATION_HI: f32 = 1.0;

/// Byte layout of a kinematic block, picked from its exact length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionLayout {
    Full32 { plane: bool },
    Quantized16 { plane: bool },
    Quantized8,
}

impl MotionLayout {
    pub fn from_len(len: usize) -> Option<Self> {
        match len {
            76 => Some(Self::Full32 { plane: true }),
            60 => Some(Self::Full32 { plane: false }),
            48 => Some(Self::Quantized16 { plane: true }),
            32 => Some(Self::Quantized16 { plane: false }),
            16 => Some(Self::Quantized8),
            _ => None,
        }
    }

    pub fn len(self) -> usize {
        match self {
            Self::Full32 { plane } => 60 + plane_len(plane),
            Self::Quantized16 { plane } => 32 + plane_len(plane),
            Self::Quantized8 => 16,
        }
    }

    pub fn tier(self) -> PrecisionTier {
        match self {
            Self::Full32 { .. } => PrecisionTier::Bits32,
            Self::Quantized16 { .. } => PrecisionTier::Bits16,
            Self::Quantized8 => PrecisionTier::Bits8,
        }
    }

    pub fn has_plane(self) -> bool {
        match self {
            Self::Full32 { plane } | Self::Quantized16 { plane } => plane,
            Self::Quantized8 => false,
        }
    }
}

fn plane_len(plane: bool) -> usize {
    if plane { 16 } else { 0 }
}

/// Kinematic fields of a terse block, already denormalized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TerseMotion {
    pub layout: MotionLayout,
    pub collision_plane: Option<Vec4>,
    pub position: Vec3,
    pub velocity: Vec3,
    pub acceleration: Vec3,
    pub rotation: Quat,
    pub angular_velocity: Vec3,
}

impl TerseMotion {
    pub fn at_rest(layout: MotionLayout, position: Vec3, rotation: Quat) -> Self {
        Self {
            layout,
            collision_plane: layout.has_plane().then_some(Vec4::Z),
            position,
            velocity: Vec3::ZERO,
            acceleration: Vec3::ZERO,
            rotation,
            angular_velocity: Vec3::ZERO,
        }
    }

    pub fn tier(&self) -> PrecisionTier {
        self.layout.tier()
    }

    /// Decodes a block whose layout has already been chosen; the reader must
    /// hold at least `layout.len()` bytes.
    pub fn read(
        reader: &mut WireReader<'_>,
        layout: MotionLayout,
        bounds: &MotionBounds,
    ) -> Result<Self, DecodeError> {
        let collision_plane = if layout.has_plane() {
            Some(reader.read_vec4()?)
        } else {
            None
        };

        match layout {
            MotionLayout::Full32 { .. } => Ok(Self {
                layout,
                collision_plane,
                position: reader.read_vec3()?,
                velocity: reader.read_vec3()?,
                acceleration: reader.read_vec3()?,
                rotation: reader.read_rotation_vector()?,
                angular_velocity: reader.read_vec3()?,
            }),
            MotionLayout::Quantized16 { .. } => Ok(Self {
                layout,
                collision_plane,
                position: bounds.position.decode(reader.read_u16x3()?, Bits::Sixteen),
                velocity: bounds.motion.decode(reader.read_u16x3()?, Bits::Sixteen),
                acceleration: bounds.motion.decode(reader.read_u16x3()?, Bits::Sixteen),
                rotation: decode_rotation(reader.read_u16x4()?, Bits::Sixteen),
                angular_velocity: bounds.motion.decode(reader.read_u16x3()?, Bits::Sixteen),
            }),
            MotionLayout::Quantized8 => Ok(Self {
                layout,
                collision_plane,
                position: bounds.position.decode(reader.read_u8x3()?, Bits::Eight),
                velocity: bounds.motion.decode(reader.read_u8x3()?, Bits::Eight),
                acceleration: bounds.motion.decode(reader.read_u8x3()?, Bits::Eight),
                rotation: decode_rotation(reader.read_u8x4()?, Bits::Eight),
                angular_velocity: bounds.motion.decode(reader.read_u8x3()?, Bits::Eight),
            }),
        }
    }

    /// Decodes a standalone block, choosing the layout by its length.
    pub fn parse(
        bytes: &[u8],
        bounds: &MotionBounds,
    ) -> Result<Self, DecodeError> {
        let layout = MotionLayout::from_len(bytes.len()).ok_or(DecodeError::UnsupportedLength {
            tag: super::EncodingTag::Terse,
            len: bytes.len(),
        })?;
        let mut reader = WireReader::new(bytes);
        Self::read(&mut reader, layout, bounds)
    }

    pub fn write(&self, writer: &mut WireWriter, bounds: &MotionBounds) {
        if self.layout.has_plane() {
            writer.write_vec4(self.collision_plane.unwrap_or(Vec4::Z));
        }

        match self.layout {
            MotionLayout::Full32 { .. } => {
                writer
                    .write_vec3(self.position)
                    .write_vec3(self.velocity)
                    .write_vec3(self.acceleration)
                    .write_rotation_vector(self.rotation)
                    .write_vec3(self.angular_velocity);
            }
            MotionLayout::Quantized16 { .. } => {
                writer
                    .write_codes_u16(&bounds.position.encode(self.position, Bits::Sixteen))
                    .write_codes_u16(&bounds.motion.encode(self.velocity, Bits::Sixteen))
                    .write_codes_u16(&bounds.motion.encode(self.acceleration, Bits::Sixteen))
                    .write_codes_u16(&encode_rotation(self.rotation, Bits::Sixteen))
                    .write_codes_u16(&bounds.motion.encode(self.angular_velocity, Bits::Sixteen));
            }
            MotionLayout::Quantized8 => {
                writer
                    .write_codes_u8(&bounds.position.encode(self.position, Bits::Eight))
                    .write_codes_u8(&bounds.motion.encode(self.velocity, Bits::Eight))
                    .write_codes_u8(&bounds.motion.encode(self.acceleration, Bits::Eight))
                    .write_codes_u8(&encode_rotation(self.rotation, Bits::Eight))
                    .write_codes_u8(&bounds.motion.encode(self.angular_velocity, Bits::Eight));
            }
        }
    }

    pub fn to_bytes(&self, bounds: &MotionBounds) -> Vec<u8> {
        let mut writer = WireWriter::with_capacity(self.layout.len());
        self.write(&mut writer, bounds);
        writer.into_bytes()
    }
}

pub(crate) fn decode_rotation(codes: [u32; 4], bits: Bits) -> Quat {
    let v = Vec4::new(
        crate::quantize::decode_zeroed(codes[0], ROTATION_LO, ROTATION_HI, bits),
        crate::quantize::decode_zeroed(codes[1], ROTATION_LO, ROTATION_HI, bits),
        crate::quantize::decode_zeroed(codes[2], ROTATION_LO, ROTATION_HI, bits),
        crate::quantize::decode_zeroed(codes[3], ROTATION_LO, ROTATION_HI, bits),
    );
    Quat::from_vec4(v.try_normalize().unwrap_or(Vec4::W))
}

pub(crate) fn encode_rotation(rotation: Quat, bits: Bits) -> [u32; 4] {
    let v = Vec4::from(rotation);
    [
        crate::quantize::encode(v.x, ROTATION_LO, ROTATION_HI, bits),
        crate::quantize::encode(v.y, ROTATION_LO, ROTATION_HI, bits),
        crate::quantize::encode(v.z, ROTATION_LO, ROTATION_HI, bits),
        crate::quantize::encode(v.w, ROTATION_LO, ROTATION_HI, bits),
    ]
}
