//! # Fit Solver
//!
//! Decides whether an archetype can be docked inside the play area.
//!
//! Fit tests are pure: a candidate pose is computed from the reference
//! template and only committed to the registry once it is known to fit, so
//! catalog templates are never moved or mutated.

use super::AllocationConfig;
use crate::archetype::{
    ArchetypeCatalog, ArchetypeId, ArchetypeRegistry, ArchetypeTemplate, DoorId, Pose,
};
use crate::geometry::{BoundingGeometry, Point};
use crate::utils::opposite_angle;
use crate::AllocationResult;
use log::{debug, error};
use rand::seq::SliceRandom;
use rand::Rng;

/// Containment-driven placement of archetypes.
#[derive(Debug, Clone, Copy)]
pub struct FitSolver<'a> {
    geometry: &'a BoundingGeometry,
    rotation_step: f64,
    rotation_trials: usize,
}

impl<'a> FitSolver<'a> {
    pub fn new(geometry: &'a BoundingGeometry, rotation_step: f64, rotation_trials: usize) -> Self {
        Self {
            geometry,
            rotation_step,
            rotation_trials,
        }
    }

    pub fn from_config(geometry: &'a BoundingGeometry, config: &AllocationConfig) -> Self {
        Self::new(
            geometry,
            config.rotation_step_degrees,
            config.rotation_trials,
        )
    }

    /// Whether the template's whole footprint lies in the play area at `pose`.
    pub fn fits(&self, template: &ArchetypeTemplate, pose: &Pose) -> bool {
        self.geometry.contains_all(&template.footprint(pose))
    }

    /// Finds an initial pose with a random spawn point on `anchor`.
    ///
    /// The template is swept through `rotation_trials` headings in steps of
    /// `rotation_step` degrees, turning about the anchor so the spawn point
    /// stays under the observer. The first containing heading wins.
    pub fn try_place_initial<R: Rng + ?Sized>(
        &self,
        template: &ArchetypeTemplate,
        anchor: Point,
        rng: &mut R,
    ) -> Option<Pose> {
        let spawn = template
            .spawns
            .choose(rng)
            .copied()
            .unwrap_or_else(Point::origin);

        (0..self.rotation_trials)
            .map(|trial| {
                let yaw = trial as f64 * self.rotation_step;
                Pose::new(anchor - spawn.rotated_y(yaw), yaw)
            })
            .find(|pose| self.fits(template, pose))
    }

    /// Pose that puts door `slot` of `template` on `origin_position`, facing
    /// exactly away from `origin_yaw`.
    pub fn align_to_door(
        template: &ArchetypeTemplate,
        slot: usize,
        origin_position: Point,
        origin_yaw: f64,
    ) -> Option<Pose> {
        let door = template.doors.get(slot)?;
        let yaw = opposite_angle(origin_yaw) - door.yaw;
        let pose = Pose::new(Point::origin(), yaw);
        let offset = door.position.rotated_y(pose.yaw);
        Some(Pose::new(origin_position - offset, pose.yaw))
    }

    /// Tries every door of `template` against the door `origin`.
    ///
    /// If no door fits, the template is recorded as unviable for `origin`
    /// and later calls skip it. Otherwise a fitting door is picked at
    /// random, an instance is committed at that pose and its door closest to
    /// `origin` is linked as the mirror of `origin` and as the new
    /// instance's parent door. Templates with a weighting of zero or less are
    /// rejected without being recorded.
    pub fn find_viable_variation<R: Rng + ?Sized>(
        &self,
        registry: &mut ArchetypeRegistry,
        origin: DoorId,
        template: &ArchetypeTemplate,
        rng: &mut R,
    ) -> AllocationResult<Option<ArchetypeId>> {
        if template.weighting <= 0 {
            debug!("Skipping '{}' with weighting {}", template.name, template.weighting);
            return Ok(None);
        }

        let (origin_position, origin_yaw, owner) = {
            let door = registry.door(origin)?;
            (door.position, door.yaw, door.owner)
        };

        let passing: Vec<(usize, Pose)> = (0..template.doors.len())
            .filter_map(|slot| {
                Self::align_to_door(template, slot, origin_position, origin_yaw)
                    .filter(|pose| self.fits(template, pose))
                    .map(|pose| (slot, pose))
            })
            .collect();

        let Some(&(slot, pose)) = passing.choose(rng) else {
            debug!("'{}' cannot fit at door {}", template.name, origin);
            registry.door_mut(origin)?.unviable.insert(template.id);
            return Ok(None);
        };

        let id = registry.insert(template, pose);
        let closest = {
            let instance = registry.instance_mut(id)?;
            if let Some(door) = instance.door_mut(slot) {
                door.assigned_to = Some(owner);
                door.enabled = false;
            }
            instance.closest_door_to(origin_position)
        };

        match closest {
            Some(index) => {
                let parent_door = DoorId::new(id, index);
                registry.instance_mut(id)?.parent_door = Some(parent_door);
                registry.link_mirrors(origin, parent_door)?;
                Ok(Some(id))
            }
            None => {
                error!("Could not find closest door to origin in new '{}'", template.name);
                registry.remove(id);
                Ok(None)
            }
        }
    }

    /// Every catalog template that fits at `origin`, each committed as a
    /// transient instance. Templates already known not to fit are skipped.
    pub fn find_viable_archetypes<R: Rng + ?Sized>(
        &self,
        registry: &mut ArchetypeRegistry,
        origin: DoorId,
        catalog: &ArchetypeCatalog,
        rng: &mut R,
    ) -> AllocationResult<Vec<ArchetypeId>> {
        let mut viable = Vec::new();
        for template in catalog.iter() {
            if registry.door(origin)?.unviable.contains(&template.id) {
                continue;
            }
            if let Some(id) = self.find_viable_variation(registry, origin, template, rng)? {
                viable.push(id);
            }
        }
        Ok(viable)
    }
}

/// Picks one candidate with probability proportional to its weighting and
/// removes every other candidate from the registry.
///
/// Returns `None`, after removing all candidates, when no candidate has a
/// positive weighting.
pub fn choose_weighted<R: Rng + ?Sized>(
    registry: &mut ArchetypeRegistry,
    candidates: &[ArchetypeId],
    rng: &mut R,
) -> Option<ArchetypeId> {
    let weighted: Vec<(ArchetypeId, i32)> = candidates
        .iter()
        .map(|id| (*id, registry.get(*id).map_or(0, |i| i.weighting.max(0))))
        .collect();
    let chosen = match weighted.choose_weighted(rng, |(_, weight)| *weight) {
        Ok((id, _)) => Some(*id),
        Err(e) => {
            debug!("No weighted candidate: {}", e);
            None
        }
    };

    for id in candidates {
        if Some(*id) != chosen {
            registry.remove(*id);
        }
    }
    chosen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archetype::{DoorSlot, TemplateId};
    use crate::geometry::{AreaShape, AreaSpec};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn area(width: f64, depth: f64) -> BoundingGeometry {
        let mut spec = AreaSpec::rect(width, depth);
        spec.point_count = 4;
        BoundingGeometry::from_spec(&spec, 0.0).unwrap()
    }

    fn square(weighting: i32) -> ArchetypeTemplate {
        let mut template = ArchetypeTemplate::rectangle("Small Square Room", 2.0, 2.0, weighting)
            .with_doors(vec![
                DoorSlot::new(0.0, 1.0, 0.0),
                DoorSlot::new(1.0, 0.0, 90.0),
                DoorSlot::new(0.0, -1.0, 180.0),
                DoorSlot::new(-1.0, 0.0, 270.0),
            ]);
        template.id = TemplateId(0);
        template
    }

    fn corridor() -> ArchetypeTemplate {
        let mut template = ArchetypeTemplate::rectangle("Long Corridor Room", 1.0, 3.0, 1)
            .with_doors(vec![
                DoorSlot::new(0.0, 1.5, 0.0),
                DoorSlot::new(0.0, -1.5, 180.0),
            ]);
        template.id = TemplateId(1);
        template
    }

    fn approx(a: Point, b: Point) -> bool {
        a.planar_distance(b) < 1e-9
    }

    #[test]
    fn test_try_place_initial_first_heading() {
        let geometry = area(2.0, 2.0);
        let solver = FitSolver::new(&geometry, 60.0, 6);
        let mut rng = StdRng::seed_from_u64(1);
        let pose = solver
            .try_place_initial(&square(1), Point::flat(1.0, 1.0), &mut rng)
            .unwrap();
        assert_eq!(pose.yaw, 0.0);
        assert!(approx(pose.position, Point::flat(1.0, 1.0)));
    }

    #[test]
    fn test_try_place_initial_sweeps_rotation() {
        let geometry = area(3.0, 1.0);
        let mut rng = StdRng::seed_from_u64(1);

        let quarter_turns = FitSolver::new(&geometry, 90.0, 4);
        let pose = quarter_turns
            .try_place_initial(&corridor(), Point::flat(1.5, 0.5), &mut rng)
            .unwrap();
        assert_eq!(pose.yaw, 90.0);

        let sixths = FitSolver::new(&geometry, 60.0, 6);
        assert!(sixths
            .try_place_initial(&corridor(), Point::flat(1.5, 0.5), &mut rng)
            .is_none());
    }

    #[test]
    fn test_align_faces_opposite() {
        let template = square(1);
        let pose = FitSolver::align_to_door(&template, 3, Point::flat(2.0, 1.0), 90.0).unwrap();
        assert_eq!(pose.yaw, 0.0);
        assert!(approx(pose.position, Point::flat(3.0, 1.0)));
        assert!(FitSolver::align_to_door(&template, 9, Point::origin(), 0.0).is_none());
    }

    #[test]
    fn test_variation_links_mirrors_both_ways() -> AllocationResult<()> {
        let geometry = area(4.0, 2.0);
        let solver = FitSolver::new(&geometry, 60.0, 6);
        let mut registry = ArchetypeRegistry::new();
        let mut rng = StdRng::seed_from_u64(21);
        let owner = registry.insert(&square(1), Pose::new(Point::flat(1.0, 1.0), 0.0));
        let origin = DoorId::new(owner, 1);

        let placed = solver
            .find_viable_variation(&mut registry, origin, &square(1), &mut rng)?
            .unwrap();
        let instance = registry.instance(placed)?;
        let parent_door = instance.parent_door.unwrap();

        assert_eq!(registry.door(origin)?.mirror, Some(parent_door));
        assert_eq!(registry.door(parent_door)?.mirror, Some(origin));
        assert!(approx(registry.door(parent_door)?.position, Point::flat(2.0, 1.0)));
        assert_eq!(registry.door(parent_door)?.assigned_to, Some(owner));
        assert!(!registry.door(parent_door)?.enabled);
        assert!(geometry.contains_all(&instance.corners));
        Ok(())
    }

    #[test]
    fn test_unfit_template_is_memoized() -> AllocationResult<()> {
        let geometry = area(4.0, 2.0);
        let solver = FitSolver::new(&geometry, 60.0, 6);
        let mut registry = ArchetypeRegistry::new();
        let mut rng = StdRng::seed_from_u64(4);
        let owner = registry.insert(&square(1), Pose::new(Point::flat(1.0, 1.0), 0.0));
        let north = DoorId::new(owner, 0);

        let result = solver.find_viable_variation(&mut registry, north, &square(1), &mut rng)?;
        assert!(result.is_none());
        assert!(registry.door(north)?.unviable.contains(&TemplateId(0)));
        assert_eq!(registry.len(), 1);

        let catalog = ArchetypeCatalog::new(vec![square(1)])?;
        let viable = solver.find_viable_archetypes(&mut registry, north, &catalog, &mut rng)?;
        assert!(viable.is_empty());
        Ok(())
    }

    #[test]
    fn test_zero_weight_rejected_without_memo() -> AllocationResult<()> {
        let geometry = area(4.0, 2.0);
        let solver = FitSolver::new(&geometry, 60.0, 6);
        let mut registry = ArchetypeRegistry::new();
        let mut rng = StdRng::seed_from_u64(4);
        let owner = registry.insert(&square(1), Pose::new(Point::flat(1.0, 1.0), 0.0));
        let east = DoorId::new(owner, 1);

        assert!(solver
            .find_viable_variation(&mut registry, east, &square(0), &mut rng)?
            .is_none());
        assert!(registry.door(east)?.unviable.is_empty());
        Ok(())
    }

    #[test]
    fn test_non_convex_area_rejects_placement() {
        // U-shaped area: the notch between the arms is outside
        let points = vec![
            Point::flat(0.0, 0.0),
            Point::flat(6.0, 0.0),
            Point::flat(6.0, 4.0),
            Point::flat(4.0, 4.0),
            Point::flat(4.0, 2.0),
            Point::flat(2.0, 2.0),
            Point::flat(2.0, 4.0),
            Point::flat(0.0, 4.0),
        ];
        let geometry = BoundingGeometry::new(points, AreaShape::Polygon, 0.0).unwrap();
        let solver = FitSolver::new(&geometry, 60.0, 6);
        let small = ArchetypeTemplate::rectangle("Tiny Closet Room", 1.0, 1.0, 1);
        assert!(solver.fits(&small, &Pose::new(Point::flat(1.0, 3.0), 0.0)));
        assert!(!solver.fits(&small, &Pose::new(Point::flat(3.0, 3.0), 0.0)));
    }

    #[test]
    fn test_choose_weighted_discards_others() {
        let mut registry = ArchetypeRegistry::new();
        let mut rng = StdRng::seed_from_u64(9);
        let a = registry.insert(&square(2), Pose::default());
        let b = registry.insert(&square(0), Pose::default());
        let chosen = choose_weighted(&mut registry, &[a, b], &mut rng);
        assert_eq!(chosen, Some(a));
        assert_eq!(registry.ids(), vec![a]);

        let c = registry.insert(&square(0), Pose::default());
        assert_eq!(choose_weighted(&mut registry, &[c], &mut rng), None);
        assert!(!registry.contains(c));
    }

    #[test]
    fn test_choose_weighted_never_picks_non_positive() {
        let mut registry = ArchetypeRegistry::new();
        let mut rng = StdRng::seed_from_u64(99);
        assert_eq!(choose_weighted(&mut registry, &[], &mut rng), None);

        for _ in 0..200 {
            let negative = registry.insert(&square(-1), Pose::default());
            let zero = registry.insert(&square(0), Pose::default());
            let light = registry.insert(&square(2), Pose::default());
            let chosen = choose_weighted(&mut registry, &[negative, zero, light], &mut rng);
            assert_eq!(chosen, Some(light));
            assert!(!registry.contains(negative));
            assert!(!registry.contains(zero));
            registry.remove(light);
        }
    }

    #[test]
    fn test_choose_weighted_distribution() {
        let mut registry = ArchetypeRegistry::new();
        let mut rng = StdRng::seed_from_u64(1234);
        let trials = 10_000;
        let mut heavy = 0;
        for _ in 0..trials {
            let a = registry.insert(&square(3), Pose::default());
            let b = registry.insert(&square(1), Pose::default());
            let chosen = choose_weighted(&mut registry, &[a, b], &mut rng).unwrap();
            if chosen == a {
                heavy += 1;
            }
            registry.remove(chosen);
        }
        let ratio = heavy as f64 / trials as f64;
        assert!((ratio - 0.75).abs() < 0.03, "ratio was {}", ratio);
        assert!(registry.is_empty());
    }
}
