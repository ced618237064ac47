pub mod config;
pub mod decoder;
pub mod error;
pub mod link;
pub mod predict;
pub mod quantize;
pub mod session;
pub mod store;
pub mod wire;

pub use config::{DecoderConfig, PhaseOut, PredictorConfig, ReplicationConfig};
pub use decoder::{ApplyOutcome, ApplyReport, InvalidReason, WireUpdateDecoder};
pub use error::DecodeError;
pub use link::{LinkOutcome, ParentLinkResolver};
pub use predict::{MotionPredictor, PredictStats};
pub use quantize::{AxisBounds, Bits};
pub use session::{ReplicationStats, Replicator};
pub use store::{
    Clip, Entity, EntityHandle, EntityKey, EntityKind, EntityStore, KinematicState, ObjectId,
    ObjectMetadata, RefetchReason, RefetchRequest, Region, RegionHandle, RegionMap,
};
pub use wire::{
    CompressedFlags, CompressedUpdate, DecodeContext, EncodingTag, FullUpdate, MotionBounds,
    MotionLayout, PrecisionTier, TerseMotion, UpdatePayload, UpdateRecord,
};
