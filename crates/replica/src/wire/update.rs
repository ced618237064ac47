use glam::{Quat, Vec3, Vec4};
use serde::{Deserialize, Serialize};

use super::compressed::{CompressedFlags, CompressedUpdate};
use super::full::FullUpdate;
use super::motion::{self, MotionBounds, MotionLayout, PrecisionTier, TerseMotion};
use super::{WireReader, WireWriter};
use crate::error::DecodeError;
use crate::quantize::{AxisBounds, Bits};
use crate::store::{EntityKind, ObjectId, ObjectMetadata, RegionHandle};

/// Update type as announced by the message carrying the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EncodingTag {
    Full,
    Terse,
    CompressedTerse,
    CompressedFull,
    Cached,
}

impl EncodingTag {
    /// Whether the record carries linkage and metadata besides motion.
    pub fn is_full(self) -> bool {
        matches!(self, Self::Full | Self::CompressedFull | Self::Cached)
    }
}

const COMPRESSED_VELOCITY: f32 = 128.0;
const COMPRESSED_ACCELERATION: f32 = 64.0;
const COMPRESSED_ANGULAR: f32 = 64.0;

#[derive(Debug, Clone, PartialEq)]
pub enum UpdatePayload {
    Full(Box<FullUpdate>),
    Terse32(TerseMotion),
    Terse16(TerseMotion),
    Terse8(TerseMotion),
    CompressedTerse(TerseMotion),
    CompressedFull(Box<CompressedUpdate>),
    Cached(Box<CompressedUpdate>),
}

impl UpdatePayload {
    pub fn parse(tag: EncodingTag, bytes: &[u8], bounds: &MotionBounds) -> Result<Self, DecodeError> {
        match tag {
            EncodingTag::Full => Ok(Self::Full(Box::new(FullUpdate::parse(bytes, bounds)?))),
            EncodingTag::Terse => {
                let motion = TerseMotion::parse(bytes, bounds)?;
                Ok(match motion.layout {
                    MotionLayout::Full32 { .. } => Self::Terse32(motion),
                    MotionLayout::Quantized16 { .. } => Self::Terse16(motion),
                    MotionLayout::Quantized8 => Self::Terse8(motion),
                })
            }
            EncodingTag::CompressedTerse => Ok(Self::CompressedTerse(parse_compressed_terse(bytes)?)),
            EncodingTag::CompressedFull => {
                Ok(Self::CompressedFull(Box::new(CompressedUpdate::parse(bytes)?)))
            }
            EncodingTag::Cached => Ok(Self::Cached(Box::new(CompressedUpdate::parse(bytes)?))),
        }
    }

    pub fn tag(&self) -> EncodingTag {
        match self {
            Self::Full(_) => EncodingTag::Full,
            Self::Terse32(_) | Self::Terse16(_) | Self::Terse8(_) => EncodingTag::Terse,
            Self::CompressedTerse(_) => EncodingTag::CompressedTerse,
            Self::CompressedFull(_) => EncodingTag::CompressedFull,
            Self::Cached(_) => EncodingTag::Cached,
        }
    }

    pub fn tier(&self) -> PrecisionTier {
        match self {
            Self::Full(update) => update.motion.tier(),
            Self::Terse32(_) => PrecisionTier::Bits32,
            Self::Terse16(_) | Self::CompressedTerse(_) => PrecisionTier::Bits16,
            Self::Terse8(_) => PrecisionTier::Bits8,
            Self::CompressedFull(_) | Self::Cached(_) => PrecisionTier::Bits32,
        }
    }

    /// Flattens the payload into the canonical form the decoder applies.
    pub fn into_decoded(self) -> DecodedUpdate {
        let tier = self.tier();
        match self {
            Self::Terse32(m) | Self::Terse16(m) | Self::Terse8(m) | Self::CompressedTerse(m) => {
                DecodedUpdate::from_motion(tier, &m)
            }
            Self::Full(update) => {
                let update = *update;
                let mut decoded = DecodedUpdate::from_motion(tier, &update.motion);
                decoded.scale = Some(update.scale);
                decoded.parent_id = Some(update.parent_id);
                decoded.metadata = Some(ObjectMetadata {
                    crc: update.crc,
                    material: update.material,
                    click_action: update.click_action,
                    update_flags: update.update_flags,
                    state: update.state,
                    owner: update.owner,
                    sound: update.sound,
                    text: update.text,
                    media_url: update.media_url,
                    particle_system: update.particle_system,
                    tree_species: None,
                    scratch_pad: Vec::new(),
                    extra_params: update.extra_params,
                    name_values: update.name_values,
                    data: update.data,
                });
                decoded
            }
            Self::CompressedFull(update) | Self::Cached(update) => {
                let update = *update;
                DecodedUpdate {
                    tier,
                    position: update.position,
                    velocity: None,
                    acceleration: Vec3::ZERO,
                    rotation: update.rotation,
                    angular_velocity: update
                        .flags
                        .contains(CompressedFlags::ANGULAR_VELOCITY)
                        .then_some(update.angular_velocity),
                    collision_plane: None,
                    scale: Some(update.scale),
                    parent_id: Some(update.parent_id),
                    metadata: Some(ObjectMetadata {
                        crc: update.crc,
                        material: update.material,
                        click_action: update.click_action,
                        owner: update.owner,
                        sound: update.sound,
                        text: update.text,
                        media_url: update.media_url,
                        particle_system: update.particles.unwrap_or_default(),
                        tree_species: update.tree_species,
                        scratch_pad: update.scratch_pad.unwrap_or_default(),
                        extra_params: update.extra_params,
                        name_values: update.name_values,
                        ..ObjectMetadata::default()
                    }),
                    preserves_flags: true,
                }
            }
        }
    }
}

/// Canonical state extracted from any payload.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedUpdate {
    pub tier: PrecisionTier,
    pub position: Vec3,
    /// `None` when the record does not carry it; the entity keeps its own.
    pub velocity: Option<Vec3>,
    pub acceleration: Vec3,
    pub rotation: Quat,
    pub angular_velocity: Option<Vec3>,
    pub collision_plane: Option<Vec4>,
    pub scale: Option<Vec3>,
    /// `None` for kinematic-only records, which never touch linkage.
    pub parent_id: Option<u32>,
    pub metadata: Option<ObjectMetadata>,
    /// Compressed records omit update flags, state and the data blob; the
    /// previous values stay.
    pub preserves_flags: bool,
}

impl DecodedUpdate {
    fn from_motion(tier: PrecisionTier, m: &TerseMotion) -> Self {
        Self {
            tier,
            position: m.position,
            velocity: Some(m.velocity),
            acceleration: m.acceleration,
            rotation: m.rotation,
            angular_velocity: Some(m.angular_velocity),
            collision_plane: m.collision_plane,
            scale: None,
            parent_id: None,
            metadata: None,
            preserves_flags: false,
        }
    }
}

fn compressed_terse_bounds() -> [AxisBounds; 3] {
    [
        AxisBounds::symmetric(COMPRESSED_VELOCITY),
        AxisBounds::symmetric(COMPRESSED_ACCELERATION),
        AxisBounds::symmetric(COMPRESSED_ANGULAR),
    ]
}

pub fn parse_compressed_terse(bytes: &[u8]) -> Result<TerseMotion, DecodeError> {
    let [vel, accel, angular] = compressed_terse_bounds();
    let mut reader = WireReader::new(bytes);

    let avatar = reader.read_u8()? != 0;
    let collision_plane = if avatar { Some(reader.read_vec4()?) } else { None };
    let motion = TerseMotion {
        layout: MotionLayout::Quantized16 { plane: avatar },
        collision_plane,
        position: reader.read_vec3()?,
        velocity: vel.decode(reader.read_u16x3()?, Bits::Sixteen),
        acceleration: accel.decode(reader.read_u16x3()?, Bits::Sixteen),
        rotation: motion::decode_rotation(reader.read_u16x4()?, Bits::Sixteen),
        angular_velocity: angular.decode(reader.read_u16x3()?, Bits::Sixteen),
    };

    if !reader.is_empty() {
        return Err(DecodeError::TrailingBytes {
            tag: EncodingTag::CompressedTerse,
            remaining: reader.remaining(),
        });
    }
    Ok(motion)
}

pub fn write_compressed_terse(motion: &TerseMotion) -> Vec<u8> {
    let [vel, accel, angular] = compressed_terse_bounds();
    let mut w = WireWriter::with_capacity(56);
    match motion.collision_plane {
        Some(plane) => w.write_u8(1).write_vec4(plane),
        None => w.write_u8(0),
    };
    w.write_vec3(motion.position)
        .write_codes_u16(&vel.encode(motion.velocity, Bits::Sixteen))
        .write_codes_u16(&accel.encode(motion.acceleration, Bits::Sixteen))
        .write_codes_u16(&motion::encode_rotation(motion.rotation, Bits::Sixteen))
        .write_codes_u16(&angular.encode(motion.angular_velocity, Bits::Sixteen));
    w.into_bytes()
}

/// One update as delivered by the transport, before decoding.
#[derive(Debug, Clone, Copy)]
pub struct UpdateRecord<'a> {
    pub tag: EncodingTag,
    pub region: RegionHandle,
    pub local_id: u32,
    pub full_id: Option<ObjectId>,
    pub kind: EntityKind,
    pub sequence: u32,
    pub declared_len: usize,
    pub payload: &'a [u8],
}

impl<'a> UpdateRecord<'a> {
    pub fn new(
        tag: EncodingTag,
        region: RegionHandle,
        local_id: u32,
        sequence: u32,
        payload: &'a [u8],
    ) -> Self {
        Self {
            tag,
            region,
            local_id,
            full_id: None,
            kind: EntityKind::Object,
            sequence,
            declared_len: payload.len(),
            payload,
        }
    }

    pub fn with_full_id(mut self, id: ObjectId) -> Self {
        self.full_id = Some(id);
        self
    }

    pub fn with_kind(mut self, kind: EntityKind) -> Self {
        self.kind = kind;
        self
    }
}

/// Per-frame timing handed to the decoder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodeContext {
    pub now_secs: f64,
    pub frame_dt: f32,
    pub time_dilation: f32,
    pub ping_delay_secs: Option<f32>,
}

impl DecodeContext {
    pub fn at(now_secs: f64) -> Self {
        Self {
            now_secs,
            frame_dt: 0.0,
            time_dilation: 1.0,
            ping_delay_secs: None,
        }
    }
}
