//! # Room Allocation
//!
//! Just-in-time procedural room allocation inside a bounded play area.
//!
//! ## Architecture Overview
//!
//! The engine grows a tree of connected rooms around a moving observer. Rooms
//! are only generated when the observer approaches an unexplored doorway, so
//! the whole layout fits inside a small physical space while feeling much
//! larger than it is.
//!
//! - **Geometry**: play-area polygons, containment tests and area construction
//! - **Archetypes**: room-shape templates, their door slots and the arena of
//!   placed instances
//! - **Allocation**: the fit solver, the allocation tree, initial placement
//!   and the per-tick generation scheduler
//! - **Rooms**: concrete decorated rooms linked to archetypes
//! - **Simulation**: an automated walkthrough that drives the scheduler with a
//!   synthetic observer
//!
//! Presentation layers consume the [`AllocationEvent`] stream produced by the
//! scheduler; nothing in this crate renders anything itself.

pub mod allocation;
pub mod archetype;
pub mod geometry;
pub mod rooms;
pub mod simulation;
pub mod utils;

// Core module re-exports
pub use allocation::*;
pub use archetype::*;
pub use geometry::*;
pub use rooms::*;
pub use simulation::*;
pub use utils::*;

// Explicit re-exports for the types most callers need
pub use allocation::{
    AllocationConfig, AllocationEvent, AllocationTree, FitSolver, NodeId, RoomAllocator,
    StartPosition, TickOutcome,
};
pub use archetype::{
    ArchetypeCatalog, ArchetypeId, ArchetypeInstance, ArchetypeRegistry, ArchetypeTemplate, Door,
    DoorId, TemplateId,
};
pub use geometry::{AreaShape, AreaSpec, BoundingGeometry, Point};
pub use rooms::{RoomCatalog, RoomInstance, RoomInstanceId, RoomTemplate};

/// Core error type for the allocation engine.
#[derive(thiserror::Error, Debug)]
pub enum AllocationError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// The bounding polygon is missing or empty
    #[error("Undefined geometry: {0}")]
    UndefinedGeometry(String),

    /// Every catalog entry has been excluded from initial placement
    #[error("No viable initial placement: {0}")]
    NoViableInitialPlacement(String),

    /// A door could not be expanded with any archetype
    #[error("No viable archetype: {0}")]
    NoViableArchetype(String),

    /// The allocation tree broke one of its structural invariants
    #[error("Tree consistency violation: {0}")]
    TreeConsistencyViolation(String),

    /// An archetype or door identifier does not resolve
    #[error("Unknown archetype: {0}")]
    UnknownArchetype(String),

    /// A tree node identifier does not resolve
    #[error("Unknown node: {0}")]
    UnknownNode(String),

    /// Engine state does not allow the requested operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Configuration could not be repaired
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type used throughout the crate.
pub type AllocationResult<T> = Result<T, AllocationError>;

/// Version information for the crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine configuration constants.
pub mod config {
    /// Height of the floor the play area sits on
    pub const DEFAULT_FLOOR_LEVEL: f64 = 0.0;

    /// Observer eye height above the floor
    pub const DEFAULT_CAMERA_HEIGHT: f64 = 1.0;

    /// Maximum distance from the observer at which a door is opened
    pub const DEFAULT_DOOR_OPEN_DISTANCE: f64 = 1.5;

    /// Offset of the corner start position from the minimum corner
    pub const DEFAULT_CORNER_OFFSET: f64 = 0.5;

    /// Side length used when an area is given a non-positive size
    pub const DEFAULT_AREA_SIZE: f64 = 2.0;

    /// Number of boundary points generated for test areas
    pub const DEFAULT_GEOMETRY_POINTS: usize = 36;

    /// Interval between scheduler ticks in milliseconds
    pub const DEFAULT_GENERATION_INTERVAL_MS: u64 = 100;

    /// Draws allowed when looking for a viable decorated room
    pub const DEFAULT_ROOM_ATTEMPT_LIMIT: usize = 20;

    /// Rotation increment of the initial placement sweep
    pub const DEFAULT_ROTATION_STEP_DEGREES: f64 = 60.0;

    /// Orientations tried by the initial placement sweep
    pub const DEFAULT_ROTATION_TRIALS: usize = 6;

    /// Distance the walkthrough observer covers per step
    pub const WALK_STEP_DISTANCE: f64 = 0.5;
}
