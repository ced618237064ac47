use std::collections::HashMap;

use glam::{DVec3, Vec3};

use super::RegionHandle;
use crate::wire::MotionBounds;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    pub handle: RegionHandle,
    pub width: f32,
    pub min_height: f32,
    pub max_height: f32,
    pub ground_height: f32,
    pub time_dilation: f32,
}

impl Region {
    pub fn new(handle: RegionHandle) -> Self {
        Self {
            handle,
            width: 256.0,
            min_height: -256.0,
            max_height: 4096.0,
            ground_height: 0.0,
            time_dilation: 1.0,
        }
    }

    pub fn with_width(mut self, width: f32) -> Self {
        self.width = width;
        self
    }

    pub fn with_heights(mut self, min_height: f32, max_height: f32) -> Self {
        self.min_height = min_height;
        self.max_height = max_height;
        self
    }

    pub fn origin(&self) -> DVec3 {
        DVec3::new(self.handle.x() as f64, self.handle.y() as f64, 0.0)
    }

    pub fn to_global(&self, local: Vec3) -> DVec3 {
        self.origin() + local.as_dvec3()
    }

    pub fn to_local(&self, global: DVec3) -> Vec3 {
        (global - self.origin()).as_vec3()
    }

    pub fn contains_local(&self, local: Vec3) -> bool {
        local.x >= 0.0 && local.x < self.width && local.y >= 0.0 && local.y < self.width
    }

    pub fn contains_global(&self, global: DVec3) -> bool {
        self.contains_local(self.to_local(global))
    }

    pub fn motion_bounds(&self) -> MotionBounds {
        MotionBounds::for_region(self.width, self.min_height, self.max_height)
    }

    /// Clamped into (0, 1]; anything else reads as full speed.
    pub fn set_time_dilation(&mut self, dilation: f32) {
        self.time_dilation = if dilation.is_finite() && dilation > 0.0 {
            dilation.min(1.0)
        } else {
            1.0
        };
    }
}

/// Where a predicted move ends up relative to the known regions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Clip {
    Inside,
    /// The move leaves for another region the client knows. `at` is the
    /// end point, or the last point inside the furthest known region the
    /// move reaches, local to the starting region.
    Crossing { region: RegionHandle, at: Vec3 },
    /// No known region holds the end point; carries the last local
    /// position still inside the current region.
    Clipped(Vec3),
}

#[derive(Debug, Default)]
pub struct RegionMap {
    regions: HashMap<RegionHandle, Region>,
}

impl RegionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, region: Region) -> Option<Region> {
        self.regions.insert(region.handle, region)
    }

    pub fn remove(&mut self, handle: RegionHandle) -> Option<Region> {
        self.regions.remove(&handle)
    }

    pub fn get(&self, handle: RegionHandle) -> Option<&Region> {
        self.regions.get(&handle)
    }

    pub fn get_mut(&mut self, handle: RegionHandle) -> Option<&mut Region> {
        self.regions.get_mut(&handle)
    }

    pub fn contains(&self, handle: RegionHandle) -> bool {
        self.regions.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Region> {
        self.regions.values()
    }

    pub fn region_at(&self, global: DVec3) -> Option<&Region> {
        self.regions.values().find(|r| r.contains_global(global))
    }

    /// Checks a move from `from` to `to`, both local to `region`. The move
    /// is followed through every known region it enters.
    pub fn clip(&self, region: &Region, from: Vec3, to: Vec3) -> Clip {
        if region.contains_local(to) {
            return Clip::Inside;
        }

        let mut current = if region.contains_local(from) {
            *region
        } else {
            match self.region_at(region.to_global(from)) {
                Some(r) => *r,
                None => return Clip::Clipped(from),
            }
        };

        let delta = to - from;
        let nudge = delta.normalize_or_zero() * EXIT_NUDGE;
        for _ in 0..MAX_HOPS {
            let lo = (current.origin() - region.origin()).as_vec3();
            let exit = exit_param(from, delta, lo, current.width);
            if exit > 1.0 {
                return Clip::Crossing {
                    region: current.handle,
                    at: to,
                };
            }

            let leaving = from + delta * exit;
            match self.region_at(region.to_global(leaving + nudge)) {
                Some(next) if next.handle != current.handle => current = *next,
                _ => {
                    let at = clamp_into(leaving, lo, current.width);
                    return if current.handle == region.handle {
                        Clip::Clipped(at)
                    } else {
                        Clip::Crossing {
                            region: current.handle,
                            at,
                        }
                    };
                }
            }
        }

        let lo = (current.origin() - region.origin()).as_vec3();
        Clip::Clipped(clamp_into(from, lo, current.width))
    }
}

const MAX_HOPS: usize = 16;
const EXIT_NUDGE: f32 = 1e-3;

/// Segment parameter at which `from + t * delta` leaves the horizontal
/// square `[lo, lo + width)`, by the slab method. Greater than one when
/// the whole segment stays inside.
fn exit_param(from: Vec3, delta: Vec3, lo: Vec3, width: f32) -> f32 {
    let mut t_max = f32::INFINITY;
    for (start, d, min) in [(from.x, delta.x, lo.x), (from.y, delta.y, lo.y)] {
        if d > 0.0 {
            t_max = t_max.min((min + width - start) / d);
        } else if d < 0.0 {
            t_max = t_max.min((min - start) / d);
        }
    }
    t_max.max(0.0)
}

/// Pulls `p` into `[lo, lo + width)` horizontally, keeping the far edge
/// exclusive.
fn clamp_into(p: Vec3, lo: Vec3, width: f32) -> Vec3 {
    let edge = |min: f32| {
        let hi = min + width;
        hi - hi.abs().max(1.0) * f32::EPSILON
    };
    Vec3::new(p.x.clamp(lo.x, edge(lo.x)), p.y.clamp(lo.y, edge(lo.y)), p.z)
}
