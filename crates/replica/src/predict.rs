use glam::{Quat, Vec3};

use crate::config::PredictorConfig;
use crate::store::{Clip, Entity, EntityStore, Region, RegionMap};

/// Counters from one prediction pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PredictStats {
    pub predicted: usize,
    pub frozen: usize,
    pub crossings_started: usize,
    pub crossings_expired: usize,
}

/// Dead-reckons entities that got no update this frame.
#[derive(Debug, Clone, Default)]
pub struct MotionPredictor {
    config: PredictorConfig,
}

impl MotionPredictor {
    pub fn new(config: PredictorConfig) -> Self {
        Self {
            config: config.validated(),
        }
    }

    pub fn config(&self) -> &PredictorConfig {
        &self.config
    }

    pub fn predict(&self, store: &mut EntityStore, regions: &RegionMap, now_secs: f64) -> PredictStats {
        let mut stats = PredictStats::default();
        let frame = store.frame();

        for handle in store.handles() {
            let Some(entity) = store.get_mut(handle) else {
                continue;
            };
            if entity.bookkeeping.updated_frame == Some(frame) {
                continue;
            }
            let Some(region) = regions.get(entity.key.region) else {
                continue;
            };

            let elapsed = now_secs - entity.bookkeeping.last_interp_secs;
            entity.bookkeeping.last_interp_secs = now_secs;
            if entity.is_static || elapsed <= 0.0 {
                continue;
            }
            let dt = elapsed as f32 * region.time_dilation;

            self.integrate_rotation(entity, dt);
            if self.config.velocity_interpolate && entity.parent().is_none() {
                self.integrate_position(entity, region, regions, dt, now_secs, &mut stats);
            }
            stats.predicted += 1;
        }
        stats
    }

    fn integrate_rotation(&self, entity: &mut Entity, dt: f32) {
        let omega = entity.state.angular_velocity;
        let rate = omega.length();
        if rate <= self.config.angular_epsilon {
            return;
        }
        let delta = Quat::from_axis_angle(omega / rate, rate * dt);
        entity.accumulated_rotation = (delta * entity.accumulated_rotation).normalize();
    }

    fn integrate_position(
        &self,
        entity: &mut Entity,
        region: &Region,
        regions: &RegionMap,
        dt: f32,
        now_secs: f64,
        stats: &mut PredictStats,
    ) {
        let since_update = now_secs - entity.bookkeeping.last_update_secs;
        let decay = self
            .config
            .phase_out
            .map_or(1.0, |phase_out| phase_out.decay(since_update));
        if decay <= 0.0 {
            return;
        }

        let state = entity.state;
        let displacement = state.velocity * dt
            + state.acceleration * (0.5 * dt * (dt - self.config.physics_timestep));
        let mut target = state.position + displacement * decay;
        let velocity = state.velocity + state.acceleration * (dt * decay);

        let floor = if entity.is_avatar() {
            region.ground_height + 0.5 * state.scale.z
        } else {
            region.min_height
        };
        target.z = target.z.max(floor).min(region.max_height);

        match regions.clip(region, state.position, target) {
            Clip::Inside => {
                entity.bookkeeping.region_cross_expire = None;
                entity.state.position = target;
                entity.state.velocity = velocity;
            }
            Clip::Crossing { region: next, at } => match entity.bookkeeping.region_cross_expire {
                Some(expire) if now_secs > expire => {
                    log::debug!(
                        "entity {} never confirmed crossing into {next}, freezing",
                        entity.key
                    );
                    freeze(entity);
                    stats.frozen += 1;
                    stats.crossings_expired += 1;
                }
                expire => {
                    if expire.is_none() {
                        log::debug!("entity {} predicted into {next}", entity.key);
                        entity.bookkeeping.region_cross_expire =
                            Some(now_secs + self.config.region_crossing_secs);
                        stats.crossings_started += 1;
                    }
                    entity.state.position = at;
                    entity.state.velocity = velocity;
                }
            },
            Clip::Clipped(edge) => {
                entity.state.position = edge;
                freeze(entity);
                stats.frozen += 1;
            }
        }
    }
}

/// Stops linear motion until the server sends a correction.
fn freeze(entity: &mut Entity) {
    entity.state.velocity = Vec3::ZERO;
    entity.state.acceleration = Vec3::ZERO;
    entity.needs_correction = true;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PhaseOut;
    use crate::store::{EntityHandle, EntityKey, EntityKind, ObjectId, RegionHandle};

    const HOME: RegionHandle = RegionHandle::from_origin(0, 0);

    fn world(regions: &[RegionHandle]) -> RegionMap {
        let mut map = RegionMap::new();
        for &handle in regions {
            map.insert(Region::new(handle));
        }
        map
    }

    fn moving(store: &mut EntityStore, position: Vec3, velocity: Vec3) -> EntityHandle {
        let mut entity = Entity::new(
            ObjectId::from_bytes([1; 16]),
            EntityKey::new(HOME, 1),
            EntityKind::Object,
            0.0,
        );
        entity.state.position = position;
        entity.state.velocity = velocity;
        entity.is_static = false;
        store.insert(entity)
    }

    #[test]
    fn fresh_entities_are_skipped() {
        let regions = world(&[HOME]);
        let mut store = EntityStore::new();
        let h = moving(&mut store, Vec3::new(10.0, 10.0, 10.0), Vec3::X);
        store.get_mut(h).unwrap().bookkeeping.updated_frame = Some(store.frame());

        let stats = MotionPredictor::default().predict(&mut store, &regions, 0.5);
        assert_eq!(stats.predicted, 0);
        assert_eq!(store.get(h).unwrap().state.position, Vec3::new(10.0, 10.0, 10.0));
    }

    #[test]
    fn static_entities_do_not_move() {
        let regions = world(&[HOME]);
        let mut store = EntityStore::new();
        let h = moving(&mut store, Vec3::new(10.0, 10.0, 10.0), Vec3::X);
        store.get_mut(h).unwrap().is_static = true;

        MotionPredictor::default().predict(&mut store, &regions, 0.5);
        assert_eq!(store.get(h).unwrap().state.position, Vec3::new(10.0, 10.0, 10.0));
    }

    #[test]
    fn phase_out_scales_displacement() {
        let regions = world(&[HOME]);
        let mut store = EntityStore::new();
        let h = moving(&mut store, Vec3::new(10.0, 10.0, 10.0), Vec3::X);
        store.get_mut(h).unwrap().bookkeeping.last_interp_secs = 1.9;

        let predictor = MotionPredictor::new(PredictorConfig {
            phase_out: Some(PhaseOut {
                start_secs: 1.0,
                horizon_secs: 3.0,
            }),
            ..PredictorConfig::default()
        });
        predictor.predict(&mut store, &regions, 2.0);
        let x = store.get(h).unwrap().state.position.x;
        assert!((x - 10.05).abs() < 1e-4, "{x}");
    }

    #[test]
    fn angular_motion_continues_past_horizon() {
        let regions = world(&[HOME]);
        let mut store = EntityStore::new();
        let h = moving(&mut store, Vec3::new(10.0, 10.0, 10.0), Vec3::X);
        store.get_mut(h).unwrap().state.angular_velocity = Vec3::new(0.0, 0.0, 1.0);
        store.get_mut(h).unwrap().bookkeeping.last_interp_secs = 9.5;

        MotionPredictor::default().predict(&mut store, &regions, 10.0);
        let entity = store.get(h).unwrap();
        assert_eq!(entity.state.position, Vec3::new(10.0, 10.0, 10.0));
        assert!(entity
            .accumulated_rotation
            .abs_diff_eq(Quat::from_rotation_z(0.5), 1e-5));
    }

    #[test]
    fn vertical_clamp_keeps_avatar_on_ground() {
        let regions = world(&[HOME]);
        let mut store = EntityStore::new();
        let h = moving(&mut store, Vec3::new(10.0, 10.0, 1.0), Vec3::new(0.0, 0.0, -5.0));
        {
            let entity = store.get_mut(h).unwrap();
            entity.kind = EntityKind::Avatar;
            entity.state.scale = Vec3::new(0.5, 0.5, 1.8);
        }

        MotionPredictor::new(PredictorConfig::unbounded()).predict(&mut store, &regions, 1.0);
        assert!((store.get(h).unwrap().state.position.z - 0.9).abs() < 1e-6);
    }

    #[test]
    fn dilation_slows_prediction() {
        let mut regions = world(&[HOME]);
        regions.get_mut(HOME).unwrap().set_time_dilation(0.5);
        let mut store = EntityStore::new();
        let h = moving(&mut store, Vec3::new(10.0, 10.0, 10.0), Vec3::X);

        MotionPredictor::new(PredictorConfig::unbounded()).predict(&mut store, &regions, 1.0);
        assert!((store.get(h).unwrap().state.position.x - 10.5).abs() < 1e-6);
    }

    #[test]
    fn leaving_known_world_freezes() {
        let regions = world(&[HOME]);
        let mut store = EntityStore::new();
        let h = moving(&mut store, Vec3::new(250.0, 100.0, 20.0), Vec3::new(20.0, 0.0, 0.0));

        let stats = MotionPredictor::new(PredictorConfig::unbounded()).predict(&mut store, &regions, 1.0);
        let entity = store.get(h).unwrap();
        assert_eq!(stats.frozen, 1);
        assert!(entity.needs_correction);
        assert_eq!(entity.state.velocity, Vec3::ZERO);
        assert!(entity.state.position.x < 256.0 && entity.state.position.x > 255.0);
    }

    #[test]
    fn crossing_window_expires() {
        let east = RegionHandle::from_origin(256, 0);
        let regions = world(&[HOME, east]);
        let mut store = EntityStore::new();
        let h = moving(&mut store, Vec3::new(250.0, 100.0, 20.0), Vec3::new(10.0, 0.0, 0.0));
        let predictor = MotionPredictor::new(PredictorConfig::unbounded());

        let stats = predictor.predict(&mut store, &regions, 1.0);
        assert_eq!(stats.crossings_started, 1);
        assert!((store.get(h).unwrap().state.position.x - 260.0).abs() < 1e-4);

        predictor.predict(&mut store, &regions, 1.5);
        assert!(!store.get(h).unwrap().needs_correction);

        let stats = predictor.predict(&mut store, &regions, 2.5);
        assert_eq!(stats.crossings_expired, 1);
        let entity = store.get(h).unwrap();
        assert!(entity.needs_correction);
        assert!((entity.state.position.x - 265.0).abs() < 1e-4);
    }

    #[test]
    fn large_step_stops_in_neighbour() {
        let east = RegionHandle::from_origin(256, 0);
        let regions = world(&[HOME, east]);
        let mut store = EntityStore::new();
        let h = moving(&mut store, Vec3::new(250.0, 100.0, 20.0), Vec3::new(350.0, 0.0, 0.0));

        let stats = MotionPredictor::new(PredictorConfig::unbounded()).predict(&mut store, &regions, 1.0);
        assert_eq!(stats.crossings_started, 1);
        assert_eq!(stats.frozen, 0);
        let entity = store.get(h).unwrap();
        assert!(!entity.needs_correction);
        let x = entity.state.position.x;
        assert!(x < 512.0 && x > 511.9, "{x}");
    }
}
