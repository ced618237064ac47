use crate::store::{Entity, EntityHandle, EntityKey, EntityStore, RefetchReason, RegionHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    Attached,
    Detached,
    Unchanged,
    Orphaned,
    CycleRejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Orphan {
    child: EntityHandle,
    parent: EntityKey,
}

/// Turns transmitted parent ids into store links. Children whose parent has
/// not arrived yet wait in the orphan queue until it does.
#[derive(Debug, Default)]
pub struct ParentLinkResolver {
    orphans: Vec<Orphan>,
}

impl ParentLinkResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn orphan_count(&self) -> usize {
        self.orphans.len()
    }

    /// Parent an orphaned entity is waiting for.
    pub fn pending_parent(&self, child: EntityHandle) -> Option<EntityKey> {
        self.orphans
            .iter()
            .find(|o| o.child == child)
            .map(|o| o.parent)
    }

    /// Drops queue entries for a destroyed entity.
    pub fn forget(&mut self, handle: EntityHandle) {
        self.orphans.retain(|o| o.child != handle);
    }

    /// Drops every entry waiting on a parent from `region`.
    pub fn forget_region(&mut self, region: RegionHandle) {
        self.orphans.retain(|o| o.parent.region != region);
    }

    /// Applies the parent id an update carried. Zero means no parent. Ids
    /// are looked up in the region the entity's update came from.
    pub fn resolve_parent(
        &mut self,
        store: &mut EntityStore,
        entity: EntityHandle,
        parent_local_id: u32,
    ) -> LinkOutcome {
        let Some(child) = store.get(entity) else {
            return LinkOutcome::Unchanged;
        };
        let region = child.key.region;
        let is_avatar = child.is_avatar();
        let current = child.parent();

        self.forget(entity);

        if parent_local_id == 0 {
            return match store.unlink(entity) {
                Some(_) => LinkOutcome::Detached,
                None => LinkOutcome::Unchanged,
            };
        }

        let parent_key = EntityKey::new(region, parent_local_id);
        match store.lookup(parent_key) {
            Some(parent) => self.link(store, entity, parent),
            None => {
                let keep_current = current.and_then(|p| store.get(p)).is_some_and(|p| {
                    // a seated avatar may arrive ahead of its seat; a parent
                    // in another region is mid hand-off
                    is_avatar || p.key.region != region
                });
                if !keep_current {
                    store.unlink(entity);
                }
                log::debug!(
                    "entity {} waiting for parent {parent_key}",
                    store.get(entity).map(|e| e.key.to_string()).unwrap_or_default()
                );
                self.orphans.push(Orphan {
                    child: entity,
                    parent: parent_key,
                });
                LinkOutcome::Orphaned
            }
        }
    }

    /// Reunites every orphan waiting on `parent`. Call once the parent's
    /// own link has been resolved.
    pub fn adopt_orphans(
        &mut self,
        store: &mut EntityStore,
        parent: EntityHandle,
    ) -> Vec<(EntityHandle, LinkOutcome)> {
        let Some(key) = store.get(parent).map(|p| p.key) else {
            return Vec::new();
        };

        let (waiting, rest): (Vec<_>, Vec<_>) =
            self.orphans.drain(..).partition(|o| o.parent == key);
        self.orphans = rest;

        let mut outcomes = Vec::with_capacity(waiting.len());
        for orphan in waiting {
            if !store.contains(parent) {
                break;
            }
            if !store.contains(orphan.child) {
                continue;
            }
            let outcome = self.link(store, orphan.child, parent);
            if outcome == LinkOutcome::Attached {
                log::debug!("reunited orphan with parent {key}");
            }
            outcomes.push((orphan.child, outcome));
        }
        outcomes
    }

    fn link(
        &mut self,
        store: &mut EntityStore,
        child: EntityHandle,
        parent: EntityHandle,
    ) -> LinkOutcome {
        if store.is_ancestor(child, parent) {
            self.reject_cycle(store, child, parent);
            return LinkOutcome::CycleRejected;
        }
        if store.get(child).and_then(Entity::parent) == Some(parent) {
            return LinkOutcome::Unchanged;
        }
        store.attach(child, parent);
        LinkOutcome::Attached
    }

    /// Destroys both ends of a would-be cycle and asks for both to be
    /// resent.
    fn reject_cycle(&mut self, store: &mut EntityStore, child: EntityHandle, parent: EntityHandle) {
        let keys: Vec<_> = [child, parent]
            .into_iter()
            .filter_map(|h| store.get(h).map(|e| e.key))
            .collect();
        log::warn!(
            "parent cycle between {}, destroying and refetching",
            keys.iter().map(ToString::to_string).collect::<Vec<_>>().join(" and ")
        );

        for handle in [child, parent] {
            self.forget(handle);
            store.remove(handle);
        }
        for key in keys {
            store.request_refetch(key.region, key.local_id, RefetchReason::ParentCycle);
        }
    }
}
