use glam::Vec3;

use crate::config::DecoderConfig;
use crate::error::DecodeError;
use crate::link::{LinkOutcome, ParentLinkResolver};
use crate::store::{
    Entity, EntityHandle, EntityKey, EntityStore, ObjectId, RefetchReason, Region, RegionMap,
};
use crate::wire::{
    DecodeContext, DecodedUpdate, EncodingTag, MotionBounds, UpdatePayload, UpdateRecord, is_stale,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    NonFinitePosition,
    ParentCycle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    StaleIgnored,
    Invalid(InvalidReason),
}

/// What a single record did to the store.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyReport {
    pub outcome: ApplyOutcome,
    pub handle: Option<EntityHandle>,
    pub created: bool,
    pub link: Option<LinkOutcome>,
    pub adopted: Vec<(EntityHandle, LinkOutcome)>,
}

impl ApplyReport {
    fn new(outcome: ApplyOutcome, handle: Option<EntityHandle>) -> Self {
        Self {
            outcome,
            handle,
            created: false,
            link: None,
            adopted: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct WireUpdateDecoder {
    config: DecoderConfig,
}

impl WireUpdateDecoder {
    pub fn new(config: DecoderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Decodes one record and applies it to the entity it names, creating
    /// the entity for full records. Nothing is applied when an error is
    /// returned.
    pub fn apply(
        &self,
        store: &mut EntityStore,
        resolver: &mut ParentLinkResolver,
        regions: &RegionMap,
        record: &UpdateRecord<'_>,
        ctx: &DecodeContext,
    ) -> Result<ApplyReport, DecodeError> {
        if record.declared_len != record.payload.len() {
            return Err(DecodeError::LengthMismatch {
                declared: record.declared_len,
                actual: record.payload.len(),
            });
        }
        let region = regions
            .get(record.region)
            .ok_or(DecodeError::UnknownRegion(record.region))?;
        let bounds = region.motion_bounds();
        let key = EntityKey::new(record.region, record.local_id);

        let payload = match UpdatePayload::parse(record.tag, record.payload, &bounds) {
            Ok(payload) => payload,
            Err(err) => {
                if matches!(record.tag, EncodingTag::CompressedFull | EncodingTag::Cached) {
                    log::warn!("failed to decode {:?} record for {key}: {err}", record.tag);
                    store.request_refetch(key.region, key.local_id, RefetchReason::DecodeFailed);
                }
                return Err(err);
            }
        };
        let decoded = payload.into_decoded();

        if !decoded.position.is_finite() {
            log::warn!("rejecting update for {key}: non-finite position {}", decoded.position);
            let handle = store.lookup(key);
            return Ok(ApplyReport::new(
                ApplyOutcome::Invalid(InvalidReason::NonFinitePosition),
                handle,
            ));
        }

        let (handle, created, rekeyed) = self.locate(store, resolver, record, key, ctx)?;

        if let Some(last) = store.get(handle).and_then(Entity::last_sequence)
            && is_stale(record.sequence, last, self.config.stale_window)
        {
            log::debug!("dropping stale update {} for {key} (last {last})", record.sequence);
            return Ok(ApplyReport::new(ApplyOutcome::StaleIgnored, Some(handle)));
        }

        let parent_changed = decoded
            .parent_id
            .is_some_and(|id| id != current_parent_id(store, resolver, handle));
        let frame = store.frame();
        if let Some(entity) = store.get_mut(handle) {
            self.apply_state(entity, &decoded, record, &bounds, region, ctx, created || parent_changed);
            entity.bookkeeping.updated_frame = Some(frame);
        }

        let mut report = ApplyReport::new(ApplyOutcome::Applied, Some(handle));
        report.created = created;

        if let Some(parent_id) = decoded.parent_id {
            let link = resolver.resolve_parent(store, handle, parent_id);
            report.link = Some(link);
            if link == LinkOutcome::CycleRejected {
                report.outcome = ApplyOutcome::Invalid(InvalidReason::ParentCycle);
                return Ok(report);
            }
        }

        if created || rekeyed {
            report.adopted = resolver.adopt_orphans(store, handle);
        }
        Ok(report)
    }

    /// Finds the entity a record names, following region hand-offs and
    /// creating it when a full record introduces it.
    fn locate(
        &self,
        store: &mut EntityStore,
        resolver: &mut ParentLinkResolver,
        record: &UpdateRecord<'_>,
        key: EntityKey,
        ctx: &DecodeContext,
    ) -> Result<(EntityHandle, bool, bool), DecodeError> {
        let full = record.tag.is_full();

        if let Some(handle) = store.lookup(key) {
            let reused = match (full, record.full_id, store.get(handle)) {
                (true, Some(id), Some(entity)) => entity.id != id,
                _ => false,
            };
            if !reused {
                return Ok((handle, false, false));
            }
            log::debug!("local id {key} now names a different object, replacing");
            resolver.forget(handle);
            store.remove(handle);
        }

        if let Some(handle) = record.full_id.and_then(|id| store.find(id)) {
            if let Some(entity) = store.get(handle) {
                log::debug!("entity {} handed off to {key}", entity.key);
            }
            resolver.forget(handle);
            store.rekey(handle, key);
            // sequence numbers are per region
            if let Some(entity) = store.get_mut(handle) {
                entity.bookkeeping.last_sequence = None;
            }
            return Ok((handle, false, true));
        }

        if !full {
            log::warn!("{:?} update for unknown entity {key}, requesting refetch", record.tag);
            store.request_refetch(key.region, key.local_id, RefetchReason::UnknownEntity);
            return Err(DecodeError::UnknownEntity {
                region: key.region,
                local_id: key.local_id,
            });
        }

        let id: ObjectId = record.full_id.ok_or(DecodeError::MissingIdentity)?;
        let handle = store.insert(Entity::new(id, key, record.kind, ctx.now_secs));
        Ok((handle, true, false))
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_state(
        &self,
        entity: &mut Entity,
        decoded: &DecodedUpdate,
        record: &UpdateRecord<'_>,
        bounds: &MotionBounds,
        region: &Region,
        ctx: &DecodeContext,
        force_position: bool,
    ) {
        let old = entity.state;
        let tier = decoded.tier;
        let velocity = decoded.velocity.unwrap_or(old.velocity);
        let angular_velocity = decoded.angular_velocity.unwrap_or(old.angular_velocity);
        let moving = velocity != Vec3::ZERO || decoded.acceleration != Vec3::ZERO;
        let finer = entity.bookkeeping.best_tier.is_none_or(|best| tier > best);
        let differs = match tier.bits() {
            Some(bits) => bounds.position.quantize(old.position, bits) != decoded.position,
            None => old.position != decoded.position,
        };

        let apply_position = force_position || differs || moving || finer;
        if apply_position {
            let mut position = decoded.position;
            if self.config.ping_interpolate
                && let Some(ping) = ctx.ping_delay_secs
            {
                let dilation = if ctx.time_dilation > 0.0 {
                    ctx.time_dilation
                } else {
                    region.time_dilation
                };
                position += velocity * 0.5 * dilation * (ctx.frame_dt + ping);
            }
            entity.state.position = position;
        }

        entity.bookkeeping.best_tier = if record.tag.is_full() {
            Some(tier)
        } else if moving {
            entity.bookkeeping.best_tier.max(Some(tier))
        } else if apply_position {
            Some(tier)
        } else {
            entity.bookkeeping.best_tier
        };

        if angular_velocity == Vec3::ZERO
            || angular_velocity != old.angular_velocity
            || decoded.rotation != old.rotation
        {
            entity.reset_rotation();
        }
        entity.state.rotation = decoded.rotation;
        entity.state.velocity = velocity;
        entity.state.acceleration = decoded.acceleration;
        entity.state.angular_velocity = angular_velocity;
        if let Some(scale) = decoded.scale {
            entity.state.scale = scale;
        }
        if decoded.collision_plane.is_some() {
            entity.collision_plane = decoded.collision_plane;
        }

        if let Some(metadata) = &decoded.metadata {
            let mut metadata = metadata.clone();
            if decoded.preserves_flags {
                metadata.update_flags = entity.metadata.update_flags;
                metadata.state = entity.metadata.state;
                metadata.data = std::mem::take(&mut entity.metadata.data);
            }
            entity.metadata = metadata;
        }

        let eps = self.config.static_epsilon;
        entity.is_static = entity.state.velocity.length() < eps
            && entity.state.acceleration.length() < eps
            && entity.state.angular_velocity.length() < eps;

        entity.bookkeeping.last_sequence = Some(record.sequence);
        entity.bookkeeping.last_update_secs = ctx.now_secs;
        entity.bookkeeping.last_interp_secs = ctx.now_secs;
        entity.bookkeeping.region_cross_expire = None;
        entity.needs_correction = false;
    }
}

/// Parent id the entity is currently linked to or waiting for; zero when
/// it has none.
fn current_parent_id(store: &EntityStore, resolver: &ParentLinkResolver, handle: EntityHandle) -> u32 {
    store
        .get(handle)
        .and_then(Entity::parent)
        .and_then(|parent| store.get(parent))
        .map(|parent| parent.key.local_id)
        .or_else(|| resolver.pending_parent(handle).map(|key| key.local_id))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{EntityKind, RegionHandle};
    use crate::wire::{CompressedUpdate, FullUpdate, MotionLayout, PrecisionTier, TerseMotion};
    use glam::Quat;

    const REGION: RegionHandle = RegionHandle::from_origin(1024, 1024);

    struct Harness {
        decoder: WireUpdateDecoder,
        store: EntityStore,
        resolver: ParentLinkResolver,
        regions: RegionMap,
    }

    impl Harness {
        fn new() -> Self {
            let mut regions = RegionMap::new();
            regions.insert(Region::new(REGION));
            Self {
                decoder: WireUpdateDecoder::default(),
                store: EntityStore::new(),
                resolver: ParentLinkResolver::new(),
                regions,
            }
        }

        fn apply(&mut self, record: UpdateRecord<'_>) -> Result<ApplyReport, DecodeError> {
            self.decoder.apply(
                &mut self.store,
                &mut self.resolver,
                &self.regions,
                &record,
                &DecodeContext::at(0.0),
            )
        }

        fn entity(&self, local_id: u32) -> &Entity {
            let handle = self.store.lookup(EntityKey::new(REGION, local_id)).unwrap();
            self.store.get(handle).unwrap()
        }
    }

    fn id(n: u8) -> ObjectId {
        ObjectId::from_bytes([n; 16])
    }

    fn full_bytes(position: Vec3, velocity: Vec3, parent_id: u32) -> Vec<u8> {
        let motion = TerseMotion {
            velocity,
            ..TerseMotion::at_rest(MotionLayout::Full32 { plane: false }, position, Quat::IDENTITY)
        };
        FullUpdate {
            parent_id,
            ..FullUpdate::new(motion)
        }
        .to_bytes(&MotionBounds::default())
    }

    fn terse_bytes(layout: MotionLayout, position: Vec3, velocity: Vec3) -> Vec<u8> {
        TerseMotion {
            velocity,
            ..TerseMotion::at_rest(layout, position, Quat::IDENTITY)
        }
        .to_bytes(&MotionBounds::default())
    }

    #[test]
    fn full_record_creates_entity() {
        let mut h = Harness::new();
        let bytes = full_bytes(Vec3::new(10.0, 20.0, 30.0), Vec3::X, 0);
        let report = h
            .apply(UpdateRecord::new(EncodingTag::Full, REGION, 5, 1, &bytes).with_full_id(id(5)))
            .unwrap();

        assert_eq!(report.outcome, ApplyOutcome::Applied);
        assert!(report.created);
        let entity = h.entity(5);
        assert_eq!(entity.state.position, Vec3::new(10.0, 20.0, 30.0));
        assert_eq!(entity.precision_tier(), Some(PrecisionTier::Bits32));
        assert!(!entity.is_static);
    }

    #[test]
    fn creating_record_needs_identity() {
        let mut h = Harness::new();
        let bytes = full_bytes(Vec3::ONE, Vec3::ZERO, 0);
        assert_eq!(
            h.apply(UpdateRecord::new(EncodingTag::Full, REGION, 5, 1, &bytes)),
            Err(DecodeError::MissingIdentity)
        );
        assert!(h.store.is_empty());
    }

    #[test]
    fn terse_for_unknown_entity_requests_refetch() {
        let mut h = Harness::new();
        let bytes = terse_bytes(MotionLayout::Quantized8, Vec3::ONE, Vec3::ZERO);
        assert_eq!(
            h.apply(UpdateRecord::new(EncodingTag::Terse, REGION, 9, 1, &bytes)),
            Err(DecodeError::UnknownEntity {
                region: REGION,
                local_id: 9
            })
        );
        assert_eq!(h.store.drain_refetch()[0].reason, RefetchReason::UnknownEntity);
    }

    #[test]
    fn non_finite_position_leaves_state_intact() {
        let mut h = Harness::new();
        let bytes = full_bytes(Vec3::new(1.0, 2.0, 3.0), Vec3::ZERO, 0);
        h.apply(UpdateRecord::new(EncodingTag::Full, REGION, 5, 1, &bytes).with_full_id(id(5)))
            .unwrap();

        let bad = terse_bytes(
            MotionLayout::Full32 { plane: false },
            Vec3::new(f32::NAN, 0.0, 0.0),
            Vec3::ZERO,
        );
        let report = h
            .apply(UpdateRecord::new(EncodingTag::Terse, REGION, 5, 2, &bad))
            .unwrap();
        assert_eq!(report.outcome, ApplyOutcome::Invalid(InvalidReason::NonFinitePosition));
        assert_eq!(h.entity(5).state.position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(h.entity(5).last_sequence(), Some(1));
    }

    #[test]
    fn declared_length_must_match() {
        let mut h = Harness::new();
        let bytes = terse_bytes(MotionLayout::Quantized8, Vec3::ONE, Vec3::ZERO);
        let mut record = UpdateRecord::new(EncodingTag::Terse, REGION, 1, 1, &bytes);
        record.declared_len = 32;
        assert_eq!(
            h.apply(record),
            Err(DecodeError::LengthMismatch {
                declared: 32,
                actual: 16
            })
        );
    }

    #[test]
    fn unknown_region_rejected() {
        let mut h = Harness::new();
        let other = RegionHandle::from_origin(0, 0);
        let bytes = full_bytes(Vec3::ONE, Vec3::ZERO, 0);
        assert_eq!(
            h.apply(UpdateRecord::new(EncodingTag::Full, other, 5, 1, &bytes).with_full_id(id(5))),
            Err(DecodeError::UnknownRegion(other))
        );
    }

    #[test]
    fn coarse_update_does_not_blur_resting_object() {
        let mut h = Harness::new();
        let precise = Vec3::new(100.123, 50.456, 22.789);
        let bytes = full_bytes(precise, Vec3::ZERO, 0);
        h.apply(UpdateRecord::new(EncodingTag::Full, REGION, 5, 1, &bytes).with_full_id(id(5)))
            .unwrap();

        let coarse = terse_bytes(MotionLayout::Quantized8, precise, Vec3::ZERO);
        let report = h
            .apply(UpdateRecord::new(EncodingTag::Terse, REGION, 5, 2, &coarse))
            .unwrap();
        assert_eq!(report.outcome, ApplyOutcome::Applied);
        assert_eq!(h.entity(5).state.position, precise);
        assert_eq!(h.entity(5).precision_tier(), Some(PrecisionTier::Bits32));
    }

    #[test]
    fn angular_accumulation_survives_identical_spin() {
        let mut h = Harness::new();
        let spin = TerseMotion {
            angular_velocity: Vec3::new(0.0, 0.0, 1.0),
            ..TerseMotion::at_rest(MotionLayout::Full32 { plane: false }, Vec3::ONE, Quat::IDENTITY)
        };
        let bytes = FullUpdate::new(spin).to_bytes(&MotionBounds::default());
        h.apply(UpdateRecord::new(EncodingTag::Full, REGION, 5, 1, &bytes).with_full_id(id(5)))
            .unwrap();

        let handle = h.store.lookup(EntityKey::new(REGION, 5)).unwrap();
        let turned = Quat::from_rotation_z(0.25);
        h.store.get_mut(handle).unwrap().accumulated_rotation = turned;

        let terse = spin.to_bytes(&MotionBounds::default());
        h.apply(UpdateRecord::new(EncodingTag::Terse, REGION, 5, 2, &terse))
            .unwrap();
        assert_eq!(h.entity(5).accumulated_rotation, turned);

        let stopped = TerseMotion {
            angular_velocity: Vec3::ZERO,
            ..spin
        }
        .to_bytes(&MotionBounds::default());
        h.apply(UpdateRecord::new(EncodingTag::Terse, REGION, 5, 3, &stopped))
            .unwrap();
        assert_eq!(h.entity(5).accumulated_rotation, Quat::IDENTITY);
    }

    #[test]
    fn changed_spin_resets_accumulation() {
        let mut h = Harness::new();
        let spin = TerseMotion {
            angular_velocity: Vec3::new(0.0, 0.0, 1.0),
            ..TerseMotion::at_rest(MotionLayout::Full32 { plane: false }, Vec3::ONE, Quat::IDENTITY)
        };
        let bytes = FullUpdate::new(spin).to_bytes(&MotionBounds::default());
        h.apply(UpdateRecord::new(EncodingTag::Full, REGION, 5, 1, &bytes).with_full_id(id(5)))
            .unwrap();

        let handle = h.store.lookup(EntityKey::new(REGION, 5)).unwrap();
        h.store.get_mut(handle).unwrap().accumulated_rotation = Quat::from_rotation_z(0.5);

        let faster = TerseMotion {
            angular_velocity: Vec3::new(0.0, 0.0, 5.0),
            ..spin
        }
        .to_bytes(&MotionBounds::default());
        h.apply(UpdateRecord::new(EncodingTag::Terse, REGION, 5, 2, &faster))
            .unwrap();
        let entity = h.entity(5);
        assert_eq!(entity.accumulated_rotation, Quat::IDENTITY);
        assert_eq!(entity.state.angular_velocity, Vec3::new(0.0, 0.0, 5.0));
    }

    #[test]
    fn compressed_failure_marks_refetch() {
        let mut h = Harness::new();
        let bytes = CompressedUpdate::new(Vec3::ONE, Quat::IDENTITY).to_bytes();
        let truncated = &bytes[..bytes.len() - 1];
        let result = h.apply(
            UpdateRecord::new(EncodingTag::CompressedFull, REGION, 5, 1, truncated).with_full_id(id(5)),
        );
        assert!(matches!(result, Err(DecodeError::Truncated { .. })));
        assert!(h.store.is_empty());
        assert_eq!(h.store.drain_refetch()[0].reason, RefetchReason::DecodeFailed);
    }

    #[test]
    fn compressed_record_keeps_update_flags() {
        let mut h = Harness::new();
        let motion = TerseMotion::at_rest(MotionLayout::Full32 { plane: false }, Vec3::ONE, Quat::IDENTITY);
        let bytes = FullUpdate {
            update_flags: 0x42,
            ..FullUpdate::new(motion)
        }
        .to_bytes(&MotionBounds::default());
        h.apply(UpdateRecord::new(EncodingTag::Full, REGION, 5, 1, &bytes).with_full_id(id(5)))
            .unwrap();

        let compressed = CompressedUpdate {
            material: 4,
            ..CompressedUpdate::new(Vec3::new(2.0, 2.0, 2.0), Quat::IDENTITY)
        }
        .to_bytes();
        h.apply(
            UpdateRecord::new(EncodingTag::Cached, REGION, 5, 2, &compressed).with_full_id(id(5)),
        )
        .unwrap();
        let entity = h.entity(5);
        assert_eq!(entity.metadata.update_flags, 0x42);
        assert_eq!(entity.metadata.material, 4);
        assert_eq!(entity.state.position, Vec3::new(2.0, 2.0, 2.0));
    }

    #[test]
    fn cached_refresh_keeps_motion() {
        let mut h = Harness::new();
        let motion = TerseMotion {
            velocity: Vec3::X,
            acceleration: Vec3::new(0.0, 0.0, -1.0),
            angular_velocity: Vec3::Z,
            ..TerseMotion::at_rest(MotionLayout::Full32 { plane: false }, Vec3::ONE, Quat::IDENTITY)
        };
        let bytes = FullUpdate::new(motion).to_bytes(&MotionBounds::default());
        h.apply(UpdateRecord::new(EncodingTag::Full, REGION, 5, 1, &bytes).with_full_id(id(5)))
            .unwrap();

        let cached = CompressedUpdate::new(Vec3::new(3.0, 1.0, 1.0), Quat::IDENTITY).to_bytes();
        h.apply(UpdateRecord::new(EncodingTag::Cached, REGION, 5, 2, &cached).with_full_id(id(5)))
            .unwrap();
        let entity = h.entity(5);
        assert_eq!(entity.state.velocity, Vec3::X);
        assert_eq!(entity.state.angular_velocity, Vec3::Z);
        assert_eq!(entity.state.acceleration, Vec3::ZERO);
        assert_eq!(entity.state.position, Vec3::new(3.0, 1.0, 1.0));
        assert!(!entity.is_static);
    }

    #[test]
    fn reused_local_id_replaces_entity() {
        let mut h = Harness::new();
        let bytes = full_bytes(Vec3::ONE, Vec3::ZERO, 0);
        h.apply(UpdateRecord::new(EncodingTag::Full, REGION, 5, 10, &bytes).with_full_id(id(5)))
            .unwrap();
        let report = h
            .apply(UpdateRecord::new(EncodingTag::Full, REGION, 5, 1, &bytes).with_full_id(id(6)))
            .unwrap();
        assert!(report.created);
        assert_eq!(h.entity(5).id, id(6));
        assert_eq!(h.store.len(), 1);
    }

    #[test]
    fn hand_off_rekeys_entity() {
        let mut h = Harness::new();
        let east = RegionHandle::from_origin(1280, 1024);
        h.regions.insert(Region::new(east));

        let bytes = full_bytes(Vec3::new(250.0, 10.0, 20.0), Vec3::X, 0);
        h.apply(UpdateRecord::new(EncodingTag::Full, REGION, 5, 1, &bytes).with_full_id(id(5)))
            .unwrap();
        let report = h
            .apply(UpdateRecord::new(EncodingTag::Full, east, 77, 1, &bytes).with_full_id(id(5)))
            .unwrap();

        assert_eq!(report.outcome, ApplyOutcome::Applied);
        assert!(!report.created);
        assert!(h.store.lookup(EntityKey::new(REGION, 5)).is_none());
        let handle = h.store.lookup(EntityKey::new(east, 77)).unwrap();
        assert_eq!(h.store.get(handle).map(|e| e.kind), Some(EntityKind::Object));
        assert_eq!(h.store.len(), 1);
    }

    #[test]
    fn ping_interpolation_leads_position() {
        let mut h = Harness::new();
        h.decoder = WireUpdateDecoder::new(DecoderConfig {
            ping_interpolate: true,
            ..DecoderConfig::default()
        });
        let bytes = full_bytes(Vec3::new(10.0, 10.0, 10.0), Vec3::new(4.0, 0.0, 0.0), 0);
        let record = UpdateRecord::new(EncodingTag::Full, REGION, 5, 1, &bytes).with_full_id(id(5));
        let ctx = DecodeContext {
            frame_dt: 0.1,
            ping_delay_secs: Some(0.4),
            ..DecodeContext::at(0.0)
        };
        h.decoder
            .apply(&mut h.store, &mut h.resolver, &h.regions, &record, &ctx)
            .unwrap();

        // half of (frame + ping) at 4 m/s
        assert!((h.entity(5).state.position.x - 11.0).abs() < 1e-5);
    }
}
