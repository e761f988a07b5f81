//! Initial room selection.
//!
//! The first room must contain the observer and must leave enough doors
//! open to keep the walk going: the dead ends left after its first ring of
//! neighbours is generated may not exceed its door count minus two.
//! Templates that break either rule are excluded for the rest of the
//! allocation.

use super::{choose_weighted, AllocationEvent, FitSolver, RoomAllocator};
use crate::archetype::{ArchetypeId, TemplateId};
use crate::{AllocationError, AllocationResult};
use log::{debug, info, warn};
use std::collections::BTreeSet;

/// Templates excluded from initial placement.
#[derive(Debug, Clone, Default)]
pub struct InitialAllocator {
    excluded: BTreeSet<TemplateId>,
}

impl InitialAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exclude(&mut self, template: TemplateId) {
        self.excluded.insert(template);
    }

    pub fn is_excluded(&self, template: TemplateId) -> bool {
        self.excluded.contains(&template)
    }

    pub fn excluded(&self) -> &BTreeSet<TemplateId> {
        &self.excluded
    }

    pub fn clear(&mut self) {
        self.excluded.clear();
    }
}

impl RoomAllocator {
    /// Chooses the initial room and generates its first neighbours.
    ///
    /// Candidates that leave too many dead ends are destroyed together
    /// with their neighbours, excluded and the search is repeated. Fails
    /// with [`AllocationError::NoViableInitialPlacement`] once every
    /// template is excluded.
    pub(crate) fn do_initial_generation(&mut self) -> AllocationResult<ArchetypeId> {
        loop {
            if self.initial.excluded().len() >= self.catalog.len() {
                return Err(AllocationError::NoViableInitialPlacement(format!(
                    "all {} templates excluded at {:?}",
                    self.catalog.len(),
                    self.observer
                )));
            }

            let viable = self.viable_initial_archetypes()?;
            let Some(initial) = choose_weighted(&mut self.registry, &viable, &mut self.rng) else {
                return Err(AllocationError::NoViableInitialPlacement(format!(
                    "no template with a positive weighting fits at {:?}",
                    self.observer
                )));
            };

            let root = self.tree.initialise(initial, None);
            self.events.push(AllocationEvent::NodeAdded {
                node: root,
                parent: None,
                archetype: initial,
            });

            let (template, name, budget) = {
                let instance = self.registry.instance(initial)?;
                (
                    instance.template,
                    instance.name.clone(),
                    instance.doors.len() as isize - 2,
                )
            };

            match self.generate_initial_children(budget, initial)? {
                Some(children) => {
                    info!(
                        "Initial room '{}' ({}) placed with {} neighbours",
                        name,
                        initial,
                        children.len()
                    );
                    return Ok(initial);
                }
                None => {
                    warn!("Initial room '{}' leaves too many dead ends, excluding it", name);
                    self.initial.exclude(template);
                    self.discard_instance(initial);
                    self.tree.clear();
                    self.events.push(AllocationEvent::SubtreeRemoved {
                        node: root,
                        archetypes: vec![initial],
                    });
                }
            }
        }
    }

    /// Commits every template that can surround the observer.
    ///
    /// The observer's floor position is the anchor. Templates that cannot
    /// be packed there are excluded.
    fn viable_initial_archetypes(&mut self) -> AllocationResult<Vec<ArchetypeId>> {
        let geometry = self.geometry.as_ref().ok_or_else(|| {
            AllocationError::UndefinedGeometry("no bounding geometry has been set".to_string())
        })?;
        let solver = FitSolver::from_config(geometry, &self.config);
        let anchor = self.observer.with_y(self.config.effective_floor_level());

        let mut viable = Vec::new();
        for template in self.catalog.iter() {
            if self.initial.is_excluded(template.id) {
                continue;
            }
            match solver.try_place_initial(template, anchor, &mut self.rng) {
                Some(pose) => viable.push(self.registry.insert(template, pose)),
                None => {
                    debug!("'{}' cannot be packed around the observer", template.name);
                    self.initial.exclude(template.id);
                }
            }
        }
        Ok(viable)
    }

    /// Generates the first ring of neighbours for `parent`.
    ///
    /// Returns `None`, after destroying the neighbours, when more than
    /// `max_dead_ends` doors ended up dead. Each destroyed neighbour is
    /// reported with its own [`AllocationEvent::SubtreeRemoved`].
    pub fn generate_initial_children(
        &mut self,
        max_dead_ends: isize,
        parent: ArchetypeId,
    ) -> AllocationResult<Option<Vec<ArchetypeId>>> {
        let children = self.generate_for_doors(parent)?;
        let dead_ends = self.registry.instance(parent)?.dead_end_count() as isize;
        if dead_ends <= max_dead_ends {
            return Ok(Some(children));
        }

        debug!(
            "{} has {} dead ends, more than the {} allowed",
            parent, dead_ends, max_dead_ends
        );
        for child in children {
            let node = self.tree.find(child);
            if let Some(node) = node {
                self.tree.detach(node)?;
            }
            self.discard_instance(child);
            if let Some(node) = node {
                self.events.push(AllocationEvent::SubtreeRemoved {
                    node,
                    archetypes: vec![child],
                });
            }
        }
        Ok(None)
    }

    /// Drops an instance and the decorated room backing it.
    fn discard_instance(&mut self, id: ArchetypeId) {
        if let Some(room) = self.registry.remove(id).and_then(|instance| instance.room) {
            self.room_instances.remove(&room);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::AllocationConfig;
    use crate::archetype::{ArchetypeCatalog, ArchetypeTemplate, DoorSlot};
    use crate::geometry::AreaSpec;
    use crate::rooms::RoomCatalog;

    fn cross() -> ArchetypeTemplate {
        ArchetypeTemplate::rectangle("Cross Square Room", 2.0, 2.0, 5)
            .with_doors(vec![
                DoorSlot::new(0.0, 1.0, 0.0),
                DoorSlot::new(1.0, 0.0, 90.0),
                DoorSlot::new(0.0, -1.0, 180.0),
                DoorSlot::new(-1.0, 0.0, 270.0),
            ])
            .with_door_range(1, 1)
    }

    fn twin() -> ArchetypeTemplate {
        ArchetypeTemplate::rectangle("Twin Door Room", 2.0, 2.0, 1)
            .with_doors(vec![
                DoorSlot::new(1.0, 0.0, 90.0),
                DoorSlot::new(-1.0, 0.0, 270.0),
            ])
            .with_door_range(2, 2)
    }

    fn allocator(templates: Vec<ArchetypeTemplate>, width: f64, seed: u64) -> RoomAllocator {
        let mut config = AllocationConfig::for_testing(seed);
        config.area = AreaSpec::rect(width, 2.0);
        config.area.point_count = 4;
        config.force_archetype_rendering = true;
        let catalog = ArchetypeCatalog::new(templates).unwrap();
        RoomAllocator::new(config, catalog, RoomCatalog::new(Vec::new()))
    }

    #[test]
    fn test_exclusions_accumulate() {
        let mut initial = InitialAllocator::new();
        initial.exclude(TemplateId(2));
        initial.exclude(TemplateId(2));
        assert!(initial.is_excluded(TemplateId(2)));
        assert_eq!(initial.excluded().len(), 1);
        initial.clear();
        assert!(!initial.is_excluded(TemplateId(2)));
    }

    #[test]
    fn test_room_with_too_many_dead_ends_is_rejected() {
        for seed in 0..8 {
            let mut allocator = allocator(vec![cross(), twin()], 6.0, seed);
            let initial = allocator.setup_area().unwrap();

            let instance = allocator.registry().instance(initial).unwrap();
            assert_eq!(instance.name, "Twin Door Room");
            assert!(allocator
                .excluded_templates()
                .iter()
                .all(|t| *t == TemplateId(0)));
            assert_eq!(allocator.registry().len(), 3);
            assert_eq!(allocator.tree().node_count(), 3);
        }
    }

    #[test]
    fn test_all_templates_excluded_is_an_error() {
        let mut allocator = allocator(vec![cross()], 2.0, 4);
        match allocator.setup_area() {
            Err(AllocationError::NoViableInitialPlacement(_)) => {}
            other => panic!("expected no viable placement, got {:?}", other),
        }
        assert!(allocator.excluded_templates().contains(&TemplateId(0)));
        assert!(allocator.registry().is_empty());
    }

    #[test]
    fn test_template_that_cannot_surround_observer_is_excluded() {
        let corridor = ArchetypeTemplate::rectangle("Long Corridor Room", 1.0, 3.0, 2).with_doors(vec![
            DoorSlot::new(0.0, 1.5, 0.0),
            DoorSlot::new(0.0, -1.5, 180.0),
        ]);
        let mut allocator = allocator(vec![corridor, twin()], 6.0, 9);
        // Quarter turns would let the corridor lie along the strip
        allocator.config.rotation_step_degrees = 45.0;
        allocator.config.rotation_trials = 2;
        let initial = allocator.setup_area().unwrap();

        assert_eq!(allocator.registry().instance(initial).unwrap().name, "Twin Door Room");
        assert!(allocator.excluded_templates().contains(&TemplateId(0)));
    }
}
