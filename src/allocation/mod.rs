//! # Allocation Module
//!
//! The room allocation engine: fit solver, allocation tree, initial
//! placement and the generation scheduler.
//!
//! This module also holds the engine configuration and the events the
//! scheduler emits for presentation and telemetry collaborators.

pub mod fit;
pub mod initial;
pub mod scheduler;
pub mod tree;

pub use fit::*;
pub use initial::*;
pub use scheduler::*;
pub use tree::*;

use crate::archetype::{ArchetypeId, DoorId};
use crate::geometry::AreaSpec;
use crate::rooms::RoomInstanceId;
use crate::{config, AllocationError, AllocationResult};
use log::warn;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Where the observer is placed before the initial room is packed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StartPosition {
    /// Centroid of the play area
    Centre,
    /// Minimum corner of the play area plus the corner offset
    Corner,
    /// Wherever the observer currently stands
    Observer,
}

/// Configuration for the allocation engine.
///
/// Replaces the scattered global constants of a scene with one immutable
/// value handed to the scheduler at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationConfig {
    /// Random seed for reproducible generation
    pub seed: u64,
    /// Height of the floor the play area sits on
    pub floor_level: f64,
    /// Observer eye height above the floor
    pub camera_height: f64,
    /// Maximum observer distance at which a door opens
    pub door_open_distance: f64,
    /// Offset of the corner start position from the minimum corner
    pub corner_offset: f64,
    /// Where the observer starts
    pub start_position: StartPosition,
    /// Interval between scheduler ticks in milliseconds
    pub generation_interval_ms: u64,
    /// Draws allowed when looking for a viable decorated room
    pub room_attempt_limit: usize,
    /// Rotation increment of the initial placement sweep
    pub rotation_step_degrees: f64,
    /// Orientations tried by the initial placement sweep
    pub rotation_trials: usize,
    /// Skip room materialization and work with bare archetypes
    pub force_archetype_rendering: bool,
    /// The play area
    pub area: AreaSpec,
}

impl AllocationConfig {
    /// Creates the default configuration for a 4 by 4 rectangular area.
    ///
    /// # Examples
    ///
    /// ```
    /// use room_allocation::AllocationConfig;
    ///
    /// let config = AllocationConfig::new(7);
    /// assert_eq!(config.seed, 7);
    /// assert_eq!(config.door_open_distance, 1.5);
    /// assert_eq!(config.rotation_trials, 6);
    /// ```
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            floor_level: config::DEFAULT_FLOOR_LEVEL,
            camera_height: config::DEFAULT_CAMERA_HEIGHT,
            door_open_distance: config::DEFAULT_DOOR_OPEN_DISTANCE,
            corner_offset: config::DEFAULT_CORNER_OFFSET,
            start_position: StartPosition::Corner,
            generation_interval_ms: config::DEFAULT_GENERATION_INTERVAL_MS,
            room_attempt_limit: config::DEFAULT_ROOM_ATTEMPT_LIMIT,
            rotation_step_degrees: config::DEFAULT_ROTATION_STEP_DEGREES,
            rotation_trials: config::DEFAULT_ROTATION_TRIALS,
            force_archetype_rendering: false,
            area: AreaSpec::rect(4.0, 4.0),
        }
    }

    /// Creates a configuration for tests: a 4 point rectangle, the observer
    /// at the centre and a 1 ms tick interval.
    pub fn for_testing(seed: u64) -> Self {
        let mut area = AreaSpec::rect(4.0, 4.0);
        area.point_count = 4;
        Self {
            start_position: StartPosition::Centre,
            generation_interval_ms: 1,
            area,
            ..Self::new(seed)
        }
    }

    pub fn from_json(json: &str) -> AllocationResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> AllocationResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Loads a configuration from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> AllocationResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Height of the floor, including the area's own origin height.
    pub fn effective_floor_level(&self) -> f64 {
        self.floor_level + self.area.origin.y
    }

    /// Height of the observer's eyes above the origin.
    pub fn observer_height(&self) -> f64 {
        self.effective_floor_level() + self.camera_height
    }

    /// Repairs values that would make generation impossible.
    ///
    /// Area sizes and point counts are corrected in place with a warning.
    /// Values with no sensible correction are reported as
    /// [`AllocationError::InvalidConfig`].
    pub fn validate(&mut self) -> AllocationResult<()> {
        self.area = self.area.validated();

        if self.start_position == StartPosition::Observer {
            warn!(
                "Starting at the observer position will almost certainly give no viable allocation \
                 unless the engine is being reset in place"
            );
        }
        if self.corner_offset < config::DEFAULT_CORNER_OFFSET {
            warn!(
                "A corner offset of {} is below {}, which will likely give no viable allocation",
                self.corner_offset,
                config::DEFAULT_CORNER_OFFSET
            );
        }
        if self.generation_interval_ms == 0 {
            warn!(
                "Generation interval cannot be 0, changing to {} ms",
                config::DEFAULT_GENERATION_INTERVAL_MS
            );
            self.generation_interval_ms = config::DEFAULT_GENERATION_INTERVAL_MS;
        }
        if self.room_attempt_limit == 0 {
            warn!("Room attempt limit cannot be 0, changing to 1");
            self.room_attempt_limit = 1;
        }

        if !(self.door_open_distance > 0.0) {
            return Err(AllocationError::InvalidConfig(format!(
                "door open distance must be positive, got {}",
                self.door_open_distance
            )));
        }
        if !(self.rotation_step_degrees > 0.0) || self.rotation_trials == 0 {
            return Err(AllocationError::InvalidConfig(format!(
                "rotation sweep of {} trials at {} degrees never tests an orientation",
                self.rotation_trials, self.rotation_step_degrees
            )));
        }
        Ok(())
    }
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self::new(42)
    }
}

/// Telemetry record of one generated archetype.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub archetype: ArchetypeId,
    pub archetype_name: String,
    pub weighting: i32,
    pub room_name: Option<String>,
    pub parent_name: Option<String>,
    /// Edges between the node and the tree root
    pub tree_layer: usize,
    /// Width and depth of the play area
    pub area_size: (f64, f64),
}

/// Signals emitted by the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AllocationEvent {
    NodeAdded {
        node: NodeId,
        parent: Option<NodeId>,
        archetype: ArchetypeId,
    },
    SubtreeRemoved {
        node: NodeId,
        archetypes: Vec<ArchetypeId>,
    },
    RootChanged {
        node: NodeId,
    },
    RenderingChanged {
        archetype: ArchetypeId,
        rendered: bool,
    },
    DoorOpened {
        door: DoorId,
    },
    DoorClosed {
        door: DoorId,
    },
    DoorDeadEnded {
        door: DoorId,
    },
    RoomMaterialized {
        archetype: ArchetypeId,
        room: RoomInstanceId,
    },
    Generated(GenerationRecord),
}
