use std::fmt;

use glam::{Quat, Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::wire::{ExtraParam, HoverText, NameValue, PrecisionTier, SoundAttachment};

/// Globally unique object id, stable for the whole session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct ObjectId([u8; 16]);

impl ObjectId {
    pub const NIL: Self = Self([0; 16]);

    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn is_nil(&self) -> bool {
        self.0 == [0; 16]
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let h = hex::encode(self.0);
        write!(f, "{}-{}-{}-{}-{}", &h[..8], &h[8..12], &h[12..16], &h[16..20], &h[20..])
    }
}

/// Identifies a simulator region; encodes the region's global origin in
/// meters as `x << 32 | y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegionHandle(pub u64);

impl RegionHandle {
    pub const fn from_origin(x: u32, y: u32) -> Self {
        Self(((x as u64) << 32) | y as u64)
    }

    pub const fn x(self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub const fn y(self) -> u32 {
        self.0 as u32
    }
}

impl fmt::Display for RegionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x(), self.y())
    }
}

/// Region-scoped numeric id. Local ids are reused, so one is only
/// meaningful together with the region that sent it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    pub region: RegionHandle,
    pub local_id: u32,
}

impl EntityKey {
    pub const fn new(region: RegionHandle, local_id: u32) -> Self {
        Self { region, local_id }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.local_id, self.region)
    }
}

/// Generation-checked index into the entity arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityHandle {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl EntityHandle {
    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum EntityKind {
    #[default]
    Object,
    Avatar,
}

/// Position is region-local for root entities and parent-relative for
/// children; rotation likewise.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KinematicState {
    pub position: Vec3,
    pub velocity: Vec3,
    pub acceleration: Vec3,
    pub rotation: Quat,
    pub angular_velocity: Vec3,
    pub scale: Vec3,
}

impl Default for KinematicState {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            acceleration: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            angular_velocity: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

impl KinematicState {
    pub fn is_moving(&self) -> bool {
        self.velocity != Vec3::ZERO || self.acceleration != Vec3::ZERO
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub crc: u32,
    pub material: u8,
    pub click_action: u8,
    pub update_flags: u32,
    pub state: u8,
    pub owner: Option<ObjectId>,
    pub sound: Option<SoundAttachment>,
    pub text: Option<HoverText>,
    pub media_url: Option<String>,
    pub particle_system: Vec<u8>,
    pub tree_species: Option<u8>,
    pub scratch_pad: Vec<u8>,
    pub extra_params: Vec<ExtraParam>,
    pub name_values: Vec<NameValue>,
    pub data: Vec<u8>,
}

impl ObjectMetadata {
    pub fn name_value(&self, name: &str) -> Option<&str> {
        self.name_values
            .iter()
            .find(|nv| nv.name == name)
            .map(|nv| nv.value.as_str())
    }

    pub fn extra_param(&self, kind: u16) -> Option<&[u8]> {
        self.extra_params
            .iter()
            .find(|p| p.kind == kind)
            .map(|p| p.data.as_slice())
    }
}

/// Per-entity record of what has been received and when.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateBookkeeping {
    pub best_tier: Option<PrecisionTier>,
    pub last_sequence: Option<u32>,
    pub last_update_secs: f64,
    pub last_interp_secs: f64,
    pub updated_frame: Option<u64>,
    pub region_cross_expire: Option<f64>,
}

impl UpdateBookkeeping {
    fn new(now_secs: f64) -> Self {
        Self {
            best_tier: None,
            last_sequence: None,
            last_update_secs: now_secs,
            last_interp_secs: now_secs,
            updated_frame: None,
            region_cross_expire: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Entity {
    pub id: ObjectId,
    pub key: EntityKey,
    pub kind: EntityKind,
    pub state: KinematicState,
    /// Rotation accumulated from angular velocity since the last
    /// authoritative rotation.
    pub accumulated_rotation: Quat,
    pub collision_plane: Option<Vec4>,
    pub metadata: ObjectMetadata,
    pub bookkeeping: UpdateBookkeeping,
    pub is_static: bool,
    pub needs_correction: bool,
    pub(crate) parent: Option<EntityHandle>,
    pub(crate) children: Vec<EntityHandle>,
}

impl Entity {
    pub fn new(id: ObjectId, key: EntityKey, kind: EntityKind, now_secs: f64) -> Self {
        Self {
            id,
            key,
            kind,
            state: KinematicState::default(),
            accumulated_rotation: Quat::IDENTITY,
            collision_plane: None,
            metadata: ObjectMetadata::default(),
            bookkeeping: UpdateBookkeeping::new(now_secs),
            is_static: true,
            needs_correction: false,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn parent(&self) -> Option<EntityHandle> {
        self.parent
    }

    pub fn children(&self) -> &[EntityHandle] {
        &self.children
    }

    pub fn is_avatar(&self) -> bool {
        self.kind == EntityKind::Avatar
    }

    /// Orientation including the rotation predicted from angular velocity.
    pub fn render_rotation(&self) -> Quat {
        (self.state.rotation * self.accumulated_rotation).normalize()
    }

    pub fn reset_rotation(&mut self) {
        self.accumulated_rotation = Quat::IDENTITY;
    }

    pub fn precision_tier(&self) -> Option<PrecisionTier> {
        self.bookkeeping.best_tier
    }

    pub fn last_sequence(&self) -> Option<u32> {
        self.bookkeeping.last_sequence
    }
}
