//! # Archetype Catalog
//!
//! The reference set of room-shape templates the engine draws from.

use super::{ArchetypeTemplate, DoorSlot, TemplateId};
use crate::geometry::Point;
use crate::{AllocationError, AllocationResult};
use log::{info, warn};
use std::path::Path;

/// Reduces a name to its first three whitespace-separated tokens.
///
/// Decorative suffixes such as `(Clone)` or variant numbers are dropped so
/// that room templates and archetypes can be matched by name.
///
/// # Examples
///
/// ```
/// use room_allocation::normalized_name;
///
/// assert_eq!(normalized_name("Small Square Room (Clone)"), "Small Square Room");
/// assert_eq!(normalized_name("  Tiny   Closet "), "Tiny Closet");
/// ```
pub fn normalized_name(name: &str) -> String {
    name.split_whitespace().take(3).collect::<Vec<_>>().join(" ")
}

/// Ordered collection of archetype templates.
#[derive(Debug, Clone, Default)]
pub struct ArchetypeCatalog {
    templates: Vec<ArchetypeTemplate>,
}

impl ArchetypeCatalog {
    /// Registers templates in order, assigning each a [`TemplateId`] and
    /// normalizing its name.
    ///
    /// Fails if a template has fewer than three footprint corners. Templates
    /// with `min_doors > max_doors` have their bounds swapped.
    pub fn new(templates: Vec<ArchetypeTemplate>) -> AllocationResult<Self> {
        let mut registered = Vec::with_capacity(templates.len());
        for (index, mut template) in templates.into_iter().enumerate() {
            if template.corners.len() < 3 {
                return Err(AllocationError::InvalidConfig(format!(
                    "archetype '{}' needs at least 3 corners, has {}",
                    template.name,
                    template.corners.len()
                )));
            }
            if template.min_doors > template.max_doors {
                warn!(
                    "Archetype '{}' has min doors {} above max doors {}, swapping",
                    template.name, template.min_doors, template.max_doors
                );
                std::mem::swap(&mut template.min_doors, &mut template.max_doors);
            }
            template.id = TemplateId(index as u32);
            template.name = normalized_name(&template.name);
            registered.push(template);
        }

        info!("{} reference archetypes registered", registered.len());
        Ok(Self {
            templates: registered,
        })
    }

    /// Parses a JSON array of templates.
    pub fn from_json(json: &str) -> AllocationResult<Self> {
        let templates: Vec<ArchetypeTemplate> = serde_json::from_str(json)?;
        Self::new(templates)
    }

    /// Serializes the templates as a JSON array.
    pub fn to_json(&self) -> AllocationResult<String> {
        Ok(serde_json::to_string_pretty(&self.templates)?)
    }

    /// Loads a catalog from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> AllocationResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn get(&self, id: TemplateId) -> Option<&ArchetypeTemplate> {
        self.templates.get(id.0 as usize)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&ArchetypeTemplate> {
        let name = normalized_name(name);
        self.templates.iter().find(|t| t.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ArchetypeTemplate> {
        self.templates.iter()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// The built-in set of room shapes.
    ///
    /// Doors sit in the middle of walls and face outward. Shapes range from a
    /// single-door closet to a non-convex L room.
    pub fn standard() -> Self {
        let templates = vec![
            ArchetypeTemplate::rectangle("Small Square Room", 2.0, 2.0, 3)
                .with_doors(vec![
                    DoorSlot::new(0.0, 1.0, 0.0),
                    DoorSlot::new(1.0, 0.0, 90.0),
                    DoorSlot::new(0.0, -1.0, 180.0),
                    DoorSlot::new(-1.0, 0.0, 270.0),
                ])
                .with_door_range(2, 4)
                .with_spawns(vec![
                    Point::origin(),
                    Point::flat(0.5, 0.5),
                    Point::flat(-0.5, -0.5),
                ]),
            ArchetypeTemplate::rectangle("Long Corridor Room", 1.0, 3.0, 2)
                .with_doors(vec![
                    DoorSlot::new(0.0, 1.5, 0.0),
                    DoorSlot::new(0.0, -1.5, 180.0),
                ])
                .with_door_range(1, 2)
                .with_spawns(vec![
                    Point::origin(),
                    Point::flat(0.0, 1.0),
                    Point::flat(0.0, -1.0),
                ]),
            ArchetypeTemplate::rectangle("Wide Hall Room", 3.0, 2.0, 2)
                .with_doors(vec![
                    DoorSlot::new(0.0, 1.0, 0.0),
                    DoorSlot::new(1.5, 0.0, 90.0),
                    DoorSlot::new(-1.5, 0.0, 270.0),
                ])
                .with_door_range(2, 3)
                .with_spawns(vec![
                    Point::origin(),
                    Point::flat(1.0, 0.0),
                    Point::flat(-1.0, 0.0),
                ]),
            ArchetypeTemplate {
                id: TemplateId::default(),
                name: "Corner L Room".to_string(),
                weighting: 1,
                min_doors: 1,
                max_doors: 1,
                doors: vec![
                    DoorSlot::new(1.0, -0.5, 90.0),
                    DoorSlot::new(-0.5, 1.0, 0.0),
                ],
                corners: vec![
                    Point::flat(-1.0, -1.0),
                    Point::flat(1.0, -1.0),
                    Point::flat(1.0, 0.0),
                    Point::flat(0.0, 0.0),
                    Point::flat(0.0, 1.0),
                    Point::flat(-1.0, 1.0),
                ],
                spawns: vec![Point::flat(-0.5, -0.5)],
            },
            ArchetypeTemplate::rectangle("Tiny Closet Room", 1.0, 1.0, 1)
                .with_doors(vec![DoorSlot::new(0.0, -0.5, 180.0)])
                .with_door_range(0, 0),
        ];

        // Every built-in template has a valid footprint
        let templates = templates
            .into_iter()
            .enumerate()
            .map(|(index, mut template)| {
                template.id = TemplateId(index as u32);
                template
            })
            .collect();
        Self { templates }
    }
}
