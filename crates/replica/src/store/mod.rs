pub mod arena;
pub mod entity;
pub mod region;

pub use arena::{EntityStore, RefetchReason, RefetchRequest};
pub use entity::{
    Entity, EntityHandle, EntityKey, EntityKind, KinematicState, ObjectId, ObjectMetadata,
    RegionHandle, UpdateBookkeeping,
};
pub use region::{Clip, Region, RegionMap};
