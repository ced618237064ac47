use glam::{Quat, Vec3};

use crate::config::ReplicationConfig;
use crate::decoder::{ApplyOutcome, InvalidReason, WireUpdateDecoder};
use crate::error::DecodeError;
use crate::link::{LinkOutcome, ParentLinkResolver};
use crate::predict::{MotionPredictor, PredictStats};
use crate::store::{
    Entity, EntityHandle, EntityKey, EntityStore, RefetchRequest, Region, RegionHandle, RegionMap,
};
use crate::wire::{DecodeContext, UpdateRecord};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicationStats {
    pub applied: u64,
    pub stale: u64,
    pub invalid: u64,
    pub rejected: u64,
    pub created: u64,
    /// Server kills and region unloads; cycle rejections count under
    /// `cycles`.
    pub killed: u64,
    pub orphaned: u64,
    pub reunited: u64,
    pub cycles: u64,
    pub frames: u64,
    pub last_frame: PredictStats,
}

/// Client-side replication state: entities, regions and the per-frame
/// decode/predict cycle. Records for a frame go through [`Self::apply`]
/// before [`Self::tick`] ends it.
#[derive(Debug, Default)]
pub struct Replicator {
    store: EntityStore,
    regions: RegionMap,
    resolver: ParentLinkResolver,
    decoder: WireUpdateDecoder,
    predictor: MotionPredictor,
    stats: ReplicationStats,
}

impl Replicator {
    pub fn new(config: ReplicationConfig) -> Self {
        let config = config.validated();
        Self {
            store: EntityStore::new(),
            regions: RegionMap::new(),
            resolver: ParentLinkResolver::new(),
            decoder: WireUpdateDecoder::new(config.decoder),
            predictor: MotionPredictor::new(config.predictor),
            stats: ReplicationStats::default(),
        }
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn regions(&self) -> &RegionMap {
        &self.regions
    }

    pub fn stats(&self) -> &ReplicationStats {
        &self.stats
    }

    pub fn orphan_count(&self) -> usize {
        self.resolver.orphan_count()
    }

    pub fn add_region(&mut self, region: Region) {
        log::info!("region {} added ({}m wide)", region.handle, region.width);
        self.regions.insert(region);
    }

    /// Unloads a region and destroys everything it owned. Returns the number
    /// of entities killed.
    pub fn remove_region(&mut self, handle: RegionHandle) -> usize {
        if self.regions.remove(handle).is_none() {
            return 0;
        }
        let doomed = self.store.handles_in_region(handle);
        let count = doomed.len();
        for entity in doomed {
            self.destroy(entity);
        }
        self.resolver.forget_region(handle);
        log::info!("region {handle} removed, {count} objects killed");
        count
    }

    pub fn set_time_dilation(&mut self, handle: RegionHandle, dilation: f32) {
        if let Some(region) = self.regions.get_mut(handle) {
            region.set_time_dilation(dilation);
        }
    }

    pub fn lookup(&self, region: RegionHandle, local_id: u32) -> Option<EntityHandle> {
        self.store.lookup(EntityKey::new(region, local_id))
    }

    pub fn entity(&self, region: RegionHandle, local_id: u32) -> Option<&Entity> {
        self.lookup(region, local_id).and_then(|h| self.store.get(h))
    }

    pub fn world_transform(&self, region: RegionHandle, local_id: u32) -> Option<(Vec3, Quat)> {
        self.lookup(region, local_id)
            .and_then(|h| self.store.world_transform(h))
    }

    pub fn apply(
        &mut self,
        record: &UpdateRecord<'_>,
        ctx: &DecodeContext,
    ) -> Result<ApplyOutcome, DecodeError> {
        let report = match self.decoder.apply(
            &mut self.store,
            &mut self.resolver,
            &self.regions,
            record,
            ctx,
        ) {
            Ok(report) => report,
            Err(err) => {
                self.stats.rejected += 1;
                return Err(err);
            }
        };

        match report.outcome {
            ApplyOutcome::Applied => self.stats.applied += 1,
            ApplyOutcome::StaleIgnored => self.stats.stale += 1,
            ApplyOutcome::Invalid(reason) => {
                self.stats.invalid += 1;
                if reason == InvalidReason::ParentCycle {
                    self.stats.cycles += 1;
                }
            }
        }
        if report.created {
            self.stats.created += 1;
        }
        if report.link == Some(LinkOutcome::Orphaned) {
            self.stats.orphaned += 1;
        }
        for (_, outcome) in &report.adopted {
            match outcome {
                LinkOutcome::Attached => self.stats.reunited += 1,
                LinkOutcome::CycleRejected => self.stats.cycles += 1,
                _ => {}
            }
        }
        Ok(report.outcome)
    }

    /// Server-initiated destruction.
    pub fn kill(&mut self, region: RegionHandle, local_id: u32) -> bool {
        match self.lookup(region, local_id) {
            Some(handle) => {
                log::debug!("killing {}", EntityKey::new(region, local_id));
                self.destroy(handle)
            }
            None => false,
        }
    }

    fn destroy(&mut self, handle: EntityHandle) -> bool {
        self.resolver.forget(handle);
        let removed = self.store.remove(handle).is_some();
        if removed {
            self.stats.killed += 1;
        }
        removed
    }

    /// Runs the prediction pass and closes the frame.
    pub fn tick(&mut self, now_secs: f64) -> PredictStats {
        let stats = self.predictor.predict(&mut self.store, &self.regions, now_secs);
        self.store.advance_frame();
        self.stats.frames += 1;
        self.stats.last_frame = stats;
        stats
    }

    pub fn pending_refetch(&self) -> &[RefetchRequest] {
        self.store.pending_refetch()
    }

    pub fn drain_refetch(&mut self) -> Vec<RefetchRequest> {
        self.store.drain_refetch()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PredictorConfig;
    use crate::store::ObjectId;
    use crate::wire::{EncodingTag, FullUpdate, MotionBounds, MotionLayout, TerseMotion};

    const REGION: RegionHandle = RegionHandle::from_origin(0, 0);

    fn replicator() -> Replicator {
        let mut replicator = Replicator::new(ReplicationConfig {
            predictor: PredictorConfig::unbounded(),
            ..ReplicationConfig::default()
        });
        replicator.add_region(Region::new(REGION));
        replicator
    }

    fn create(replicator: &mut Replicator, local_id: u32, parent_id: u32, velocity: Vec3) {
        let motion = TerseMotion {
            velocity,
            ..TerseMotion::at_rest(
                MotionLayout::Full32 { plane: false },
                Vec3::new(20.0, 20.0, 20.0),
                Quat::IDENTITY,
            )
        };
        let bytes = FullUpdate {
            parent_id,
            ..FullUpdate::new(motion)
        }
        .to_bytes(&MotionBounds::default());
        let record = UpdateRecord::new(EncodingTag::Full, REGION, local_id, 1, &bytes)
            .with_full_id(ObjectId::from_bytes([local_id as u8; 16]));
        replicator.apply(&record, &DecodeContext::at(0.0)).unwrap();
    }

    #[test]
    fn no_double_advance_in_update_frame() {
        let mut replicator = replicator();
        create(&mut replicator, 1, 0, Vec3::X);

        let stats = replicator.tick(0.0);
        assert_eq!(stats.predicted, 0);
        assert_eq!(replicator.entity(REGION, 1).unwrap().state.position.x, 20.0);

        let stats = replicator.tick(1.0);
        assert_eq!(stats.predicted, 1);
        assert!((replicator.entity(REGION, 1).unwrap().state.position.x - 21.0).abs() < 1e-5);
    }

    #[test]
    fn kill_detaches_children() {
        let mut replicator = replicator();
        create(&mut replicator, 1, 0, Vec3::ZERO);
        create(&mut replicator, 2, 1, Vec3::ZERO);

        assert!(replicator.kill(REGION, 1));
        assert!(!replicator.kill(REGION, 1));
        let child = replicator.entity(REGION, 2).unwrap();
        assert_eq!(child.parent(), None);
        assert_eq!(child.state.position, Vec3::new(40.0, 40.0, 40.0));
        assert_eq!(replicator.stats().killed, 1);
    }

    #[test]
    fn removing_region_kills_its_entities() {
        let mut replicator = replicator();
        create(&mut replicator, 1, 0, Vec3::ZERO);
        create(&mut replicator, 2, 0, Vec3::ZERO);
        create(&mut replicator, 3, 99, Vec3::ZERO);
        assert_eq!(replicator.orphan_count(), 1);

        assert_eq!(replicator.remove_region(REGION), 3);
        assert!(replicator.store().is_empty());
        assert_eq!(replicator.orphan_count(), 0);
        assert_eq!(replicator.remove_region(REGION), 0);
    }

    #[test]
    fn stats_track_outcomes() {
        let mut replicator = replicator();
        create(&mut replicator, 2, 1, Vec3::ZERO);
        create(&mut replicator, 1, 0, Vec3::ZERO);

        let stats = replicator.stats();
        assert_eq!(stats.created, 2);
        assert_eq!(stats.applied, 2);
        assert_eq!(stats.orphaned, 1);
        assert_eq!(stats.reunited, 1);
    }
}
