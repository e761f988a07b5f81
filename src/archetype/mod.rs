//! # Archetype Module
//!
//! Room-shape templates and their placed instances.
//!
//! A template is the canonical, un-positioned description of a room shape:
//! its footprint corners, door slots and spawn points in local coordinates.
//! An instance is a template committed to a [`Pose`] in the play area, with
//! per-door state that the scheduler mutates as generation proceeds.
//! Instances refer to each other only through identifiers.

pub mod catalog;
pub mod registry;

pub use catalog::*;
pub use registry::*;

use crate::geometry::Point;
use crate::rooms::RoomInstanceId;
use crate::utils::normalize_degrees;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Identifier of a template in an [`ArchetypeCatalog`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct TemplateId(pub u32);

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// Identifier of a placed archetype instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ArchetypeId(pub u64);

impl fmt::Display for ArchetypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "A{}", self.0)
    }
}

/// Identifier of a door slot on a placed instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DoorId {
    pub archetype: ArchetypeId,
    pub index: usize,
}

impl DoorId {
    pub fn new(archetype: ArchetypeId, index: usize) -> Self {
        Self { archetype, index }
    }
}

impl fmt::Display for DoorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.archetype, self.index)
    }
}

/// A door slot in template-local coordinates.
///
/// `yaw` is the outward facing of the doorway in degrees: 0° faces `+z`,
/// 90° faces `+x`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DoorSlot {
    pub position: Point,
    pub yaw: f64,
}

impl DoorSlot {
    pub fn new(x: f64, z: f64, yaw: f64) -> Self {
        Self {
            position: Point::flat(x, z),
            yaw,
        }
    }
}

/// Position and heading of a placed template.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub position: Point,
    pub yaw: f64,
}

impl Pose {
    pub fn new(position: Point, yaw: f64) -> Self {
        Self {
            position,
            yaw: normalize_degrees(yaw),
        }
    }

    /// Maps a template-local point into the play space.
    pub fn apply(&self, local: Point) -> Point {
        local.rotated_y(self.yaw) + self.position
    }

    /// Maps a template-local heading into the play space.
    pub fn apply_yaw(&self, local_yaw: f64) -> f64 {
        normalize_degrees(local_yaw + self.yaw)
    }
}

/// Canonical description of a room shape.
///
/// # Examples
///
/// ```
/// use room_allocation::{ArchetypeTemplate, DoorSlot, Point};
///
/// let template = ArchetypeTemplate::rectangle("Small Square Room", 2.0, 2.0, 1)
///     .with_doors(vec![DoorSlot::new(0.0, 1.0, 0.0)]);
/// assert_eq!(template.corners.len(), 4);
/// assert_eq!(template.dead_end_budget(), -1);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchetypeTemplate {
    /// Assigned by the catalog when the template is registered
    #[serde(default)]
    pub id: TemplateId,
    pub name: String,
    /// Selection weight; zero or less never gets selected
    pub weighting: i32,
    /// Lower bound of the random number of doors expanded
    pub min_doors: usize,
    /// Upper bound of the random number of doors expanded
    pub max_doors: usize,
    pub doors: Vec<DoorSlot>,
    /// Footprint polygon in order
    pub corners: Vec<Point>,
    #[serde(default)]
    pub spawns: Vec<Point>,
}

impl ArchetypeTemplate {
    /// A `width` by `depth` rectangle centred on its local origin, with a
    /// single spawn point in the middle and no doors.
    pub fn rectangle(name: &str, width: f64, depth: f64, weighting: i32) -> Self {
        let (hw, hd) = (width / 2.0, depth / 2.0);
        Self {
            id: TemplateId::default(),
            name: name.to_string(),
            weighting,
            min_doors: 1,
            max_doors: 1,
            doors: Vec::new(),
            corners: vec![
                Point::flat(-hw, -hd),
                Point::flat(hw, -hd),
                Point::flat(hw, hd),
                Point::flat(-hw, hd),
            ],
            spawns: vec![Point::origin()],
        }
    }

    pub fn with_doors(mut self, doors: Vec<DoorSlot>) -> Self {
        self.doors = doors;
        self
    }

    pub fn with_door_range(mut self, min_doors: usize, max_doors: usize) -> Self {
        self.min_doors = min_doors;
        self.max_doors = max_doors;
        self
    }

    pub fn with_spawns(mut self, spawns: Vec<Point>) -> Self {
        self.spawns = spawns;
        self
    }

    /// Footprint corners at `pose`.
    pub fn footprint(&self, pose: &Pose) -> Vec<Point> {
        self.corners.iter().map(|c| pose.apply(*c)).collect()
    }

    /// Number of dead ends tolerated when this template is the initial room.
    pub fn dead_end_budget(&self) -> isize {
        self.doors.len() as isize - 2
    }
}

/// Progress of the batch expansion of an instance's doors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExpansionState {
    /// Doors have not been expanded yet
    #[default]
    NotStarted,
    /// Expansion has been queued and will run before the tick ends
    Pending,
    /// Doors have been expanded
    Done,
}

/// A door slot on a placed instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Door {
    pub owner: ArchetypeId,
    pub position: Point,
    pub yaw: f64,
    pub open: bool,
    /// The door can never lead anywhere
    pub dead_end: bool,
    /// Hidden doors are neither drawn nor walked through
    pub enabled: bool,
    /// Neighbour the door leads to
    pub assigned_to: Option<ArchetypeId>,
    /// The same threshold seen from the neighbour
    pub mirror: Option<DoorId>,
    /// Index of the bound doorpoint in the owner's room
    pub door_point: Option<usize>,
    /// Templates known not to fit at this door
    pub unviable: BTreeSet<TemplateId>,
}

impl Door {
    fn new(owner: ArchetypeId, position: Point, yaw: f64) -> Self {
        Self {
            owner,
            position,
            yaw,
            open: false,
            dead_end: false,
            enabled: true,
            assigned_to: None,
            mirror: None,
            door_point: None,
            unviable: BTreeSet::new(),
        }
    }

    /// Whether the door may still be walked through or expanded.
    pub fn is_passable(&self) -> bool {
        !self.dead_end
    }
}

/// A template placed in the play area.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchetypeInstance {
    pub id: ArchetypeId,
    pub template: TemplateId,
    pub name: String,
    pub weighting: i32,
    pub min_doors: usize,
    pub max_doors: usize,
    pub pose: Pose,
    pub doors: Vec<Door>,
    pub corners: Vec<Point>,
    pub spawns: Vec<Point>,
    pub rendered: bool,
    pub room: Option<RoomInstanceId>,
    pub expansion: ExpansionState,
    /// The door on this instance that leads back to its parent
    pub parent_door: Option<DoorId>,
}

impl ArchetypeInstance {
    /// Commits `template` to `pose`.
    pub fn place(id: ArchetypeId, template: &ArchetypeTemplate, pose: Pose) -> Self {
        let doors = template
            .doors
            .iter()
            .map(|slot| Door::new(id, pose.apply(slot.position), pose.apply_yaw(slot.yaw)))
            .collect();
        Self {
            id,
            template: template.id,
            name: template.name.clone(),
            weighting: template.weighting,
            min_doors: template.min_doors,
            max_doors: template.max_doors,
            pose,
            doors,
            corners: template.footprint(&pose),
            spawns: template.spawns.iter().map(|s| pose.apply(*s)).collect(),
            rendered: false,
            room: None,
            expansion: ExpansionState::NotStarted,
            parent_door: None,
        }
    }

    pub fn door(&self, index: usize) -> Option<&Door> {
        self.doors.get(index)
    }

    pub fn door_mut(&mut self, index: usize) -> Option<&mut Door> {
        self.doors.get_mut(index)
    }

    pub fn door_ids(&self) -> Vec<DoorId> {
        (0..self.doors.len()).map(|i| DoorId::new(self.id, i)).collect()
    }

    /// Whether `point` lies inside the footprint (strict edge policy).
    pub fn contains(&self, point: Point) -> bool {
        crate::geometry::is_inside(point, &self.corners)
    }

    pub fn dead_end_count(&self) -> usize {
        self.doors.iter().filter(|d| d.dead_end).count()
    }

    /// Index of the door closest to `position`; the first wins ties.
    pub fn closest_door_to(&self, position: Point) -> Option<usize> {
        let mut closest = None;
        let mut closest_distance = f64::MAX;
        for (index, door) in self.doors.iter().enumerate() {
            let distance = door.position.distance(position);
            if distance < closest_distance {
                closest_distance = distance;
                closest = Some(index);
            }
        }
        closest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corridor() -> ArchetypeTemplate {
        ArchetypeTemplate::rectangle("Long Corridor Room", 1.0, 3.0, 2).with_doors(vec![
            DoorSlot::new(0.0, 1.5, 0.0),
            DoorSlot::new(0.0, -1.5, 180.0),
        ])
    }

    #[test]
    fn test_pose_application() {
        let pose = Pose::new(Point::flat(5.0, 5.0), 90.0);
        let world = pose.apply(Point::flat(0.0, 1.5));
        assert!((world.x - 6.5).abs() < 1e-9);
        assert!((world.z - 5.0).abs() < 1e-9);
        assert_eq!(pose.apply_yaw(180.0), 270.0);
    }

    #[test]
    fn test_place_instance() {
        let template = corridor();
        let instance = ArchetypeInstance::place(
            ArchetypeId(3),
            &template,
            Pose::new(Point::flat(1.0, 1.0), 0.0),
        );
        assert_eq!(instance.doors.len(), 2);
        assert_eq!(instance.doors[0].owner, ArchetypeId(3));
        assert_eq!(instance.doors[0].position, Point::flat(1.0, 2.5));
        assert!(instance.contains(Point::flat(1.0, 1.0)));
        assert!(!instance.contains(Point::flat(2.0, 1.0)));
        assert_eq!(instance.expansion, ExpansionState::NotStarted);
    }

    #[test]
    fn test_closest_door_first_wins_ties() {
        let template = ArchetypeTemplate::rectangle("Twin Door Room", 2.0, 2.0, 1)
            .with_doors(vec![DoorSlot::new(0.0, 1.0, 0.0), DoorSlot::new(0.0, 1.0, 0.0)]);
        let instance = ArchetypeInstance::place(ArchetypeId(0), &template, Pose::default());
        assert_eq!(instance.closest_door_to(Point::flat(0.0, 1.0)), Some(0));
    }

    #[test]
    fn test_dead_end_budget() {
        assert_eq!(corridor().dead_end_budget(), 0);
    }
}
