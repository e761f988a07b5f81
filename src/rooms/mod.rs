//! # Rooms Module
//!
//! Concrete decorated rooms backing abstract archetypes.
//!
//! Each archetype may have several decorated room templates. When the
//! scheduler materializes an archetype instance, one template is drawn at
//! random and its doorpoints are bound to the instance's door slots.

use crate::archetype::{normalized_name, ArchetypeCatalog, ArchetypeInstance, TemplateId};
use crate::geometry::Point;
use crate::{config, AllocationResult};
use log::{debug, info, warn};
use rand::seq::IteratorRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use uuid::Uuid;

/// Unique identifier for materialized rooms.
pub type RoomInstanceId = Uuid;

/// Creates a new unique room instance ID.
pub fn new_room_instance_id() -> RoomInstanceId {
    Uuid::new_v4()
}

/// A decorated room that can back an archetype.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomTemplate {
    pub name: String,
    /// Name of the archetype this room decorates; compared after
    /// normalization
    pub archetype: String,
    /// Consumed after its first use
    #[serde(default)]
    pub unique: bool,
    /// Non-viable rooms are only used when nothing else is left
    #[serde(default = "default_viable")]
    pub viable: bool,
    /// Doorpoint positions in archetype-local coordinates
    #[serde(default)]
    pub door_points: Vec<Point>,
}

fn default_viable() -> bool {
    true
}

impl RoomTemplate {
    pub fn new(name: &str, archetype: &str) -> Self {
        Self {
            name: name.to_string(),
            archetype: archetype.to_string(),
            unique: false,
            viable: true,
            door_points: Vec::new(),
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn unviable(mut self) -> Self {
        self.viable = false;
        self
    }

    pub fn with_door_points(mut self, door_points: Vec<Point>) -> Self {
        self.door_points = door_points;
        self
    }
}

/// How a doorpoint is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DoorPointVisual {
    /// A closed door is shown
    Closed,
    /// The doorway is clear
    Open,
    /// The doorway is walled over
    Masked,
}

/// A doorpoint of a materialized room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoorPoint {
    pub position: Point,
    /// Index of the bound door on the owning archetype
    pub door: Option<usize>,
    pub visual: DoorPointVisual,
}

/// A materialized room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomInstance {
    pub id: RoomInstanceId,
    pub template_name: String,
    pub viable: bool,
    pub door_points: Vec<DoorPoint>,
}

impl RoomInstance {
    /// Places `template` at the pose of `archetype`.
    pub fn from_template(template: &RoomTemplate, archetype: &ArchetypeInstance) -> Self {
        Self {
            id: new_room_instance_id(),
            template_name: template.name.clone(),
            viable: template.viable,
            door_points: template
                .door_points
                .iter()
                .map(|local| DoorPoint {
                    position: archetype.pose.apply(*local),
                    door: None,
                    visual: DoorPointVisual::Closed,
                })
                .collect(),
        }
    }

    /// Binds every doorpoint to the nearest door of `archetype`.
    ///
    /// Hidden doors that lead somewhere are shown open and hidden dead ends
    /// are masked; everything else starts closed.
    pub fn bind_doors(&mut self, archetype: &mut ArchetypeInstance) {
        for (point_index, point) in self.door_points.iter_mut().enumerate() {
            let Some(door_index) = archetype.closest_door_to(point.position) else {
                continue;
            };
            let door = &mut archetype.doors[door_index];
            point.door = Some(door_index);
            door.door_point = Some(point_index);

            if !door.enabled {
                if door.assigned_to.is_some() {
                    point.visual = DoorPointVisual::Open;
                } else if door.dead_end {
                    point.visual = DoorPointVisual::Masked;
                }
            }
        }
    }
}

/// Room templates together with their links to archetypes.
#[derive(Debug, Clone)]
pub struct RoomCatalog {
    templates: Vec<RoomTemplate>,
    links: BTreeMap<TemplateId, Vec<usize>>,
    attempt_limit: usize,
}

impl RoomCatalog {
    pub fn new(templates: Vec<RoomTemplate>) -> Self {
        if templates.is_empty() {
            warn!("Room catalog is empty, archetypes will not be materialized");
        }
        Self {
            templates,
            links: BTreeMap::new(),
            attempt_limit: config::DEFAULT_ROOM_ATTEMPT_LIMIT,
        }
    }

    pub fn with_attempt_limit(mut self, attempt_limit: usize) -> Self {
        self.attempt_limit = attempt_limit.max(1);
        self
    }

    pub fn set_attempt_limit(&mut self, attempt_limit: usize) {
        self.attempt_limit = attempt_limit.max(1);
    }

    /// Parses a JSON array of room templates.
    pub fn from_json(json: &str) -> AllocationResult<Self> {
        let templates: Vec<RoomTemplate> = serde_json::from_str(json)?;
        Ok(Self::new(templates))
    }

    pub fn to_json(&self) -> AllocationResult<String> {
        Ok(serde_json::to_string_pretty(&self.templates)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> AllocationResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn templates(&self) -> &[RoomTemplate] {
        &self.templates
    }

    /// Rebuilds the archetype to room links.
    ///
    /// Every archetype gets the rooms whose declared archetype name matches
    /// its own after normalization. Unique rooms consumed by earlier draws
    /// become available again.
    pub fn link_catalog(&mut self, archetypes: &ArchetypeCatalog) {
        self.links.clear();
        for archetype in archetypes.iter() {
            let name = normalized_name(&archetype.name);
            let linked: Vec<usize> = self
                .templates
                .iter()
                .enumerate()
                .filter(|(_, room)| normalized_name(&room.archetype) == name)
                .map(|(index, _)| index)
                .collect();
            self.links.insert(archetype.id, linked);
        }

        let room_count: usize = self.links.values().map(Vec::len).sum();
        info!(
            "Linked {} archetypes to {} rooms",
            self.links.len(),
            room_count
        );
    }

    /// Rooms still available for an archetype template.
    pub fn linked(&self, archetype: TemplateId) -> Vec<&RoomTemplate> {
        self.links
            .get(&archetype)
            .map(|indices| indices.iter().map(|i| &self.templates[*i]).collect())
            .unwrap_or_default()
    }

    /// Draws a decorated room for `archetype` and binds its doorpoints.
    ///
    /// Non-viable rooms are set aside while alternatives remain. Once the
    /// attempt limit is reached the last draw is accepted even if it is not
    /// viable. Returns `None` only when no rooms are linked.
    pub fn instantiate_room_for<R: Rng + ?Sized>(
        &mut self,
        archetype: &mut ArchetypeInstance,
        rng: &mut R,
    ) -> Option<RoomInstance> {
        let mut working = self.links.get(&archetype.template)?.clone();

        let mut attempts = 0;
        while let Some(draw) = (0..working.len()).choose(rng) {
            attempts += 1;
            let template_index = working[draw];
            let template = &self.templates[template_index];

            let alternatives_left = working.len() > 1;
            if !template.viable && alternatives_left && attempts < self.attempt_limit {
                debug!(
                    "Room '{}' is not viable for {}, drawing again",
                    template.name, archetype.id
                );
                working.remove(draw);
                continue;
            }
            if !template.viable {
                warn!(
                    "Accepting non-viable room '{}' for {} after {} attempts",
                    template.name, archetype.id, attempts
                );
            }

            let mut room = RoomInstance::from_template(template, archetype);
            room.bind_doors(archetype);

            if template.unique {
                if let Some(linked) = self.links.get_mut(&archetype.template) {
                    linked.retain(|i| *i != template_index);
                    info!(
                        "Removed unique room '{}', {} rooms left for {}",
                        template.name,
                        linked.len(),
                        archetype.name
                    );
                }
            }
            return Some(room);
        }

        warn!("No rooms linked to archetype '{}'", archetype.name);
        None
    }

    /// Decorated rooms for every built-in archetype.
    ///
    /// Each archetype gets a study, a one-off gallery and a storage room that
    /// is only used as a last resort.
    pub fn standard() -> Self {
        let mut templates = Vec::new();
        for archetype in ArchetypeCatalog::standard().iter() {
            let door_points: Vec<Point> = archetype.doors.iter().map(|d| d.position).collect();
            let owner = format!("{} (Clone)", archetype.name);
            templates.push(
                RoomTemplate::new(&format!("{} Study", archetype.name), &owner)
                    .with_door_points(door_points.clone()),
            );
            templates.push(
                RoomTemplate::new(&format!("{} Gallery", archetype.name), &owner)
                    .unique()
                    .with_door_points(door_points.clone()),
            );
            templates.push(
                RoomTemplate::new(&format!("{} Storage", archetype.name), &owner)
                    .unviable()
                    .with_door_points(door_points),
            );
        }
        Self::new(templates)
    }
}
