use std::collections::HashMap;

use glam::{Quat, Vec3};

use super::entity::{Entity, EntityHandle, EntityKey, ObjectId};
use super::RegionHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefetchReason {
    ParentCycle,
    DecodeFailed,
    UnknownEntity,
}

/// A cache miss the consumer should ask the region to resend in full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefetchRequest {
    pub region: RegionHandle,
    pub local_id: u32,
    pub reason: RefetchReason,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    entity: Option<Entity>,
}

/// Arena of live entities. Handles carry a generation, so a handle to a
/// destroyed entity never resolves again; freed slots are reused only
/// after the frame they were freed in.
#[derive(Debug, Default)]
pub struct EntityStore {
    slots: Vec<Slot>,
    free: Vec<u32>,
    pending_free: Vec<u32>,
    by_key: HashMap<EntityKey, EntityHandle>,
    by_id: HashMap<ObjectId, EntityHandle>,
    refetch: Vec<RefetchRequest>,
    frame: u64,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Ends the current frame; slots freed during it become reusable.
    pub fn advance_frame(&mut self) {
        self.frame = self.frame.wrapping_add(1);
        self.free.append(&mut self.pending_free);
    }

    pub fn insert(&mut self, entity: Entity) -> EntityHandle {
        let key = entity.key;
        let id = entity.id;

        let handle = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.entity = Some(entity);
                EntityHandle {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    entity: Some(entity),
                });
                EntityHandle {
                    index,
                    generation: 0,
                }
            }
        };

        self.by_key.insert(key, handle);
        self.by_id.insert(id, handle);
        handle
    }

    pub fn contains(&self, handle: EntityHandle) -> bool {
        self.get(handle).is_some()
    }

    pub fn get(&self, handle: EntityHandle) -> Option<&Entity> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.entity.as_ref())
    }

    pub fn get_mut(&mut self, handle: EntityHandle) -> Option<&mut Entity> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.entity.as_mut())
    }

    pub fn lookup(&self, key: EntityKey) -> Option<EntityHandle> {
        self.by_key.get(&key).copied()
    }

    pub fn find(&self, id: ObjectId) -> Option<EntityHandle> {
        self.by_id.get(&id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityHandle, &Entity)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.entity.as_ref().map(|entity| {
                (
                    EntityHandle {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    entity,
                )
            })
        })
    }

    pub fn handles(&self) -> Vec<EntityHandle> {
        self.iter().map(|(handle, _)| handle).collect()
    }

    pub fn handles_in_region(&self, region: RegionHandle) -> Vec<EntityHandle> {
        self.iter()
            .filter(|(_, entity)| entity.key.region == region)
            .map(|(handle, _)| handle)
            .collect()
    }

    /// Moves an entity to a new region-scoped key, e.g. after a region
    /// hand-off.
    pub fn rekey(&mut self, handle: EntityHandle, key: EntityKey) -> bool {
        let Some(entity) = self.get_mut(handle) else {
            return false;
        };
        let old = std::mem::replace(&mut entity.key, key);
        if self.by_key.get(&old) == Some(&handle) {
            self.by_key.remove(&old);
        }
        if let Some(displaced) = self.by_key.insert(key, handle)
            && displaced != handle
        {
            log::debug!("local id {key} reassigned, dropping stale index entry");
        }
        true
    }

    /// Destroys an entity. Children are detached and keep their last world
    /// transform; the handle stops resolving immediately.
    pub fn remove(&mut self, handle: EntityHandle) -> Option<Entity> {
        if !self.contains(handle) {
            return None;
        }

        self.detach(handle);
        let children = self
            .get(handle)
            .map(|e| e.children.clone())
            .unwrap_or_default();
        for child in children {
            self.detach(child);
        }

        let slot = &mut self.slots[handle.index as usize];
        let entity = slot.entity.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.pending_free.push(handle.index);

        if self.by_key.get(&entity.key) == Some(&handle) {
            self.by_key.remove(&entity.key);
        }
        if self.by_id.get(&entity.id) == Some(&handle) {
            self.by_id.remove(&entity.id);
        }
        Some(entity)
    }

    /// Links `child` under `parent`, replacing any previous parent. The
    /// caller is responsible for rejecting cycles first.
    pub fn attach(&mut self, child: EntityHandle, parent: EntityHandle) -> bool {
        if child == parent || !self.contains(child) || !self.contains(parent) {
            return false;
        }
        if self.get(child).and_then(Entity::parent) == Some(parent) {
            return true;
        }

        self.unlink(child);
        if let Some(p) = self.get_mut(parent) {
            p.children.push(child);
        }
        if let Some(c) = self.get_mut(child) {
            c.parent = Some(parent);
        }
        true
    }

    /// Unlinks `child` from its parent, re-basing its transform so it stays
    /// where it was in the world. Returns the former parent.
    pub fn detach(&mut self, child: EntityHandle) -> Option<EntityHandle> {
        let (position, rotation) = self.world_transform(child)?;
        let parent = self.unlink(child)?;
        if let Some(c) = self.get_mut(child) {
            c.state.position = position;
            c.state.rotation = rotation;
            c.accumulated_rotation = Quat::IDENTITY;
        }
        Some(parent)
    }

    /// Breaks the parent link without touching the transform.
    pub fn unlink(&mut self, child: EntityHandle) -> Option<EntityHandle> {
        let parent = self.get_mut(child)?.parent.take()?;
        if let Some(p) = self.get_mut(parent) {
            p.children.retain(|&c| c != child);
        }
        Some(parent)
    }

    /// True when `ancestor` appears on the parent chain of `handle`, or is
    /// `handle` itself.
    pub fn is_ancestor(&self, ancestor: EntityHandle, handle: EntityHandle) -> bool {
        let mut current = Some(handle);
        let mut steps = 0;
        while let Some(h) = current {
            if h == ancestor {
                return true;
            }
            steps += 1;
            if steps > self.slots.len() {
                log::warn!("parent chain longer than the store, assuming a cycle");
                return true;
            }
            current = self.get(h).and_then(Entity::parent);
        }
        false
    }

    /// Region-local position and orientation after composing the parent
    /// chain.
    pub fn world_transform(&self, handle: EntityHandle) -> Option<(Vec3, Quat)> {
        let entity = self.get(handle)?;
        let mut position = entity.state.position;
        let mut rotation = entity.render_rotation();

        let mut current = entity.parent;
        let mut steps = 0;
        while let Some(h) = current {
            let Some(parent) = self.get(h) else { break };
            let parent_rotation = parent.render_rotation();
            position = parent.state.position + parent_rotation * position;
            rotation = parent_rotation * rotation;
            current = parent.parent;

            steps += 1;
            if steps > self.slots.len() {
                break;
            }
        }
        Some((position, rotation.normalize()))
    }

    pub fn request_refetch(&mut self, region: RegionHandle, local_id: u32, reason: RefetchReason) {
        let request = RefetchRequest {
            region,
            local_id,
            reason,
        };
        if !self.refetch.contains(&request) {
            self.refetch.push(request);
        }
    }

    pub fn pending_refetch(&self) -> &[RefetchRequest] {
        &self.refetch
    }

    pub fn drain_refetch(&mut self) -> Vec<RefetchRequest> {
        std::mem::take(&mut self.refetch)
    }
}
