//! # Archetype Registry
//!
//! Owning arena of placed archetype instances. Doors, mirrors, parents and
//! tree nodes refer to instances through [`ArchetypeId`] and [`DoorId`]
//! handles resolved here.

use super::{ArchetypeId, ArchetypeInstance, ArchetypeTemplate, Door, DoorId, Pose};
use crate::{AllocationError, AllocationResult};
use std::collections::BTreeMap;

/// Arena of archetype instances keyed by identifier.
#[derive(Debug, Clone, Default)]
pub struct ArchetypeRegistry {
    instances: BTreeMap<ArchetypeId, ArchetypeInstance>,
    next_id: u64,
}

impl ArchetypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Places `template` at `pose` and returns the new instance's identifier.
    pub fn insert(&mut self, template: &ArchetypeTemplate, pose: Pose) -> ArchetypeId {
        let id = ArchetypeId(self.next_id);
        self.next_id += 1;
        self.instances
            .insert(id, ArchetypeInstance::place(id, template, pose));
        id
    }

    pub fn get(&self, id: ArchetypeId) -> Option<&ArchetypeInstance> {
        self.instances.get(&id)
    }

    pub fn get_mut(&mut self, id: ArchetypeId) -> Option<&mut ArchetypeInstance> {
        self.instances.get_mut(&id)
    }

    /// Like [`get`](Self::get), but unknown identifiers are an error.
    pub fn instance(&self, id: ArchetypeId) -> AllocationResult<&ArchetypeInstance> {
        self.get(id)
            .ok_or_else(|| AllocationError::UnknownArchetype(id.to_string()))
    }

    pub fn instance_mut(&mut self, id: ArchetypeId) -> AllocationResult<&mut ArchetypeInstance> {
        self.get_mut(id)
            .ok_or_else(|| AllocationError::UnknownArchetype(id.to_string()))
    }

    pub fn remove(&mut self, id: ArchetypeId) -> Option<ArchetypeInstance> {
        self.instances.remove(&id)
    }

    pub fn contains(&self, id: ArchetypeId) -> bool {
        self.instances.contains_key(&id)
    }

    pub fn door(&self, id: DoorId) -> AllocationResult<&Door> {
        self.instance(id.archetype)?
            .door(id.index)
            .ok_or_else(|| AllocationError::UnknownArchetype(format!("no door {}", id)))
    }

    pub fn door_mut(&mut self, id: DoorId) -> AllocationResult<&mut Door> {
        self.instance_mut(id.archetype)?
            .door_mut(id.index)
            .ok_or_else(|| AllocationError::UnknownArchetype(format!("no door {}", id)))
    }

    /// Pairs two doors as the two sides of one threshold.
    pub fn link_mirrors(&mut self, a: DoorId, b: DoorId) -> AllocationResult<()> {
        // Resolve both before mutating so a bad handle leaves no half link
        self.door(a)?;
        self.door(b)?;
        self.door_mut(a)?.mirror = Some(b);
        self.door_mut(b)?.mirror = Some(a);
        Ok(())
    }

    pub fn ids(&self) -> Vec<ArchetypeId> {
        self.instances.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ArchetypeInstance> {
        self.instances.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ArchetypeInstance> {
        self.instances.values_mut()
    }

    /// Identifiers of instances currently rendered, in creation order.
    pub fn rendered_ids(&self) -> Vec<ArchetypeId> {
        self.instances
            .values()
            .filter(|i| i.rendered)
            .map(|i| i.id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Removes every instance. Identifiers are never reused.
    pub fn clear(&mut self) {
        self.instances.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archetype::DoorSlot;
    use crate::geometry::Point;

    fn square() -> ArchetypeTemplate {
        ArchetypeTemplate::rectangle("Small Square Room", 2.0, 2.0, 1).with_doors(vec![
            DoorSlot::new(0.0, 1.0, 0.0),
            DoorSlot::new(0.0, -1.0, 180.0),
        ])
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut registry = ArchetypeRegistry::new();
        let a = registry.insert(&square(), Pose::default());
        let b = registry.insert(&square(), Pose::new(Point::flat(0.0, 2.0), 0.0));
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.door(DoorId::new(b, 1)).unwrap().owner, b);
        assert!(registry.door(DoorId::new(b, 7)).is_err());
    }

    #[test]
    fn test_link_mirrors_is_symmetric() {
        let mut registry = ArchetypeRegistry::new();
        let a = registry.insert(&square(), Pose::default());
        let b = registry.insert(&square(), Pose::new(Point::flat(0.0, 2.0), 0.0));
        let da = DoorId::new(a, 0);
        let db = DoorId::new(b, 1);
        registry.link_mirrors(da, db).unwrap();
        assert_eq!(registry.door(da).unwrap().mirror, Some(db));
        assert_eq!(registry.door(db).unwrap().mirror, Some(da));
    }

    #[test]
    fn test_bad_link_leaves_no_half_link() {
        let mut registry = ArchetypeRegistry::new();
        let a = registry.insert(&square(), Pose::default());
        let missing = DoorId::new(ArchetypeId(99), 0);
        assert!(registry.link_mirrors(DoorId::new(a, 0), missing).is_err());
        assert_eq!(registry.door(DoorId::new(a, 0)).unwrap().mirror, None);
    }

    #[test]
    fn test_ids_not_reused_after_clear() {
        let mut registry = ArchetypeRegistry::new();
        let first = registry.insert(&square(), Pose::default());
        registry.clear();
        let second = registry.insert(&square(), Pose::default());
        assert!(second > first);
        assert_eq!(registry.rendered_ids(), Vec::<ArchetypeId>::new());
    }
}
