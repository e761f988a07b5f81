//! # Generation Scheduler
//!
//! The per-tick control loop of the engine.
//!
//! Once the initial room is packed, [`RoomAllocator::tick`] is called at a
//! fixed interval. Each tick finds the room holding the observer, the open
//! door nearest to them, and then either opens the door onto an already
//! generated neighbour or generates a neighbour for it on the spot.
//!
//! Batch expansion of a neighbour's doors is queued when the neighbour is
//! first approached and runs before the tick returns. Ticks never overlap:
//! the allocator is the single writer of all engine state.

use super::{
    choose_weighted, AllocationConfig, AllocationEvent, AllocationTree, FitSolver,
    GenerationRecord, InitialAllocator, StartPosition,
};
use crate::archetype::{ArchetypeCatalog, ArchetypeId, ArchetypeRegistry, DoorId, ExpansionState};
use crate::geometry::{BoundingGeometry, Point};
use crate::rooms::{DoorPointVisual, RoomCatalog, RoomInstance, RoomInstanceId};
use crate::{AllocationError, AllocationResult};
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Where the observer is, was and is predicted to go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PathState {
    pub current: Option<ArchetypeId>,
    pub previous: Option<ArchetypeId>,
    pub next: Option<ArchetypeId>,
}

/// What a scheduler tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No rendered archetype contains the observer
    Outside,
    /// The observer is inside `current` with no door in reach
    Idle { current: ArchetypeId },
    /// A door onto an existing neighbour was opened
    Opened {
        door: DoorId,
        neighbour: ArchetypeId,
    },
    /// A neighbour was generated for a door, or the door became a dead end
    Generated {
        door: DoorId,
        archetype: Option<ArchetypeId>,
    },
}

/// Owns the engine state and runs the generation loop.
#[derive(Debug)]
pub struct RoomAllocator {
    pub(super) config: AllocationConfig,
    pub(super) catalog: ArchetypeCatalog,
    pub(super) rooms: RoomCatalog,
    pub(super) geometry: Option<BoundingGeometry>,
    pub(super) registry: ArchetypeRegistry,
    pub(super) tree: AllocationTree,
    pub(super) room_instances: BTreeMap<RoomInstanceId, RoomInstance>,
    pub(super) path: PathState,
    pub(super) observer: Point,
    pub(super) pending: VecDeque<ArchetypeId>,
    pub(super) initial: InitialAllocator,
    pub(super) events: Vec<AllocationEvent>,
    pub(super) rng: StdRng,
}

impl RoomAllocator {
    /// Creates an allocator with no play area yet.
    pub fn new(config: AllocationConfig, catalog: ArchetypeCatalog, mut rooms: RoomCatalog) -> Self {
        rooms.set_attempt_limit(config.room_attempt_limit);
        let rng = StdRng::seed_from_u64(config.seed);
        let observer = Point::new(0.0, config.observer_height(), 0.0);
        Self {
            config,
            catalog,
            rooms,
            geometry: None,
            registry: ArchetypeRegistry::new(),
            tree: AllocationTree::new(),
            room_instances: BTreeMap::new(),
            path: PathState::default(),
            observer,
            pending: VecDeque::new(),
            initial: InitialAllocator::new(),
            events: Vec::new(),
            rng,
        }
    }

    /// An allocator over the built-in archetype and room catalogs.
    pub fn with_standard_catalogs(config: AllocationConfig) -> Self {
        Self::new(config, ArchetypeCatalog::standard(), RoomCatalog::standard())
    }

    // --- Accessors ---

    pub fn config(&self) -> &AllocationConfig {
        &self.config
    }

    pub fn catalog(&self) -> &ArchetypeCatalog {
        &self.catalog
    }

    pub fn geometry(&self) -> Option<&BoundingGeometry> {
        self.geometry.as_ref()
    }

    pub fn registry(&self) -> &ArchetypeRegistry {
        &self.registry
    }

    pub fn tree(&self) -> &AllocationTree {
        &self.tree
    }

    pub fn path(&self) -> PathState {
        self.path
    }

    pub fn observer(&self) -> Point {
        self.observer
    }

    pub fn room_instance(&self, id: RoomInstanceId) -> Option<&RoomInstance> {
        self.room_instances.get(&id)
    }

    pub fn room_instances(&self) -> impl Iterator<Item = &RoomInstance> {
        self.room_instances.values()
    }

    /// Templates permanently excluded from initial placement.
    pub fn excluded_templates(&self) -> &BTreeSet<crate::archetype::TemplateId> {
        self.initial.excluded()
    }

    /// Archetypes whose batch expansion is queued.
    pub fn pending_expansions(&self) -> usize {
        self.pending.len()
    }

    pub fn events(&self) -> &[AllocationEvent] {
        &self.events
    }

    /// Takes every event emitted since the last call.
    pub fn drain_events(&mut self) -> Vec<AllocationEvent> {
        std::mem::take(&mut self.events)
    }

    // --- Area setup ---

    /// Builds the play area from the configuration, places the observer and
    /// packs the initial room.
    ///
    /// Configuration problems that can be repaired are corrected with a
    /// warning. An empty polygon is reported as
    /// [`AllocationError::UndefinedGeometry`] and not retried.
    pub fn setup_area(&mut self) -> AllocationResult<ArchetypeId> {
        self.config.validate()?;
        self.rooms.set_attempt_limit(self.config.room_attempt_limit);
        self.reset();

        let floor = self.config.effective_floor_level();
        let geometry = BoundingGeometry::from_spec(&self.config.area, floor).map_err(|e| {
            error!("Geometry not defined correctly: {}", e);
            e
        })?;
        info!(
            "Area {:?} built with {} points, size {:?}",
            geometry.shape(),
            geometry.points().len(),
            geometry.size()
        );
        self.geometry = Some(geometry);
        self.move_observer_to_start();

        self.pack_initial_room()
    }

    /// Packs the initial room inside an externally supplied boundary, such
    /// as one reported by a headset, with the observer where they stand.
    pub fn setup_with_geometry(&mut self, geometry: BoundingGeometry) -> AllocationResult<ArchetypeId> {
        self.reset();
        info!("External geometry obtained with {} points", geometry.points().len());
        self.geometry = Some(geometry);
        self.pack_initial_room()
    }

    /// Clears every instance, the tree, exclusions, queued work and path
    /// state. The play area, catalogs and observer are kept.
    pub fn reset(&mut self) {
        self.registry.clear();
        self.tree.clear();
        self.room_instances.clear();
        self.path = PathState::default();
        self.pending.clear();
        self.initial.clear();
        self.events.clear();
    }

    /// Selects the initial room and generates its first ring of neighbours.
    pub fn pack_initial_room(&mut self) -> AllocationResult<ArchetypeId> {
        if self.geometry.is_none() {
            error!("Geometry not defined correctly");
            return Err(AllocationError::UndefinedGeometry(
                "no bounding geometry has been set".to_string(),
            ));
        }

        self.rooms.link_catalog(&self.catalog);
        let initial = match self.do_initial_generation() {
            Ok(id) => id,
            Err(e) => {
                error!("No initial archetype could be found for the current observer location");
                return Err(e);
            }
        };

        let room = self.materialize(initial)?;
        self.registry.instance_mut(initial)?.expansion = ExpansionState::Done;
        self.set_rendering(initial, true)?;
        self.path.current = Some(initial);
        if room.is_none() {
            self.log_generation(initial)?;
        }
        Ok(initial)
    }

    // --- Generation loop ---

    /// Runs one step of the generation loop.
    pub fn tick(&mut self) -> AllocationResult<TickOutcome> {
        let Some(containing) = self.archetype_containing_observer() else {
            return Ok(TickOutcome::Outside);
        };
        let current = self.update_current(containing);

        let Some(door_id) = self.closest_door(current)? else {
            return Ok(TickOutcome::Idle { current });
        };

        let (assigned, open, owner) = {
            let door = self.registry.door(door_id)?;
            (door.assigned_to, door.open, door.owner)
        };

        let outcome = match assigned {
            Some(neighbour) => {
                self.materialize(neighbour)?;
                self.render_mirror_door(door_id)?;
                self.path.next = Some(neighbour);

                let instance = self.registry.instance_mut(neighbour)?;
                if instance.expansion == ExpansionState::NotStarted {
                    instance.expansion = ExpansionState::Pending;
                    self.pending.push_back(neighbour);
                }

                if !open {
                    self.open_door(door_id)?;
                }
                if current == owner {
                    self.disable_inactive()?;
                    self.set_rendering(neighbour, true)?;
                }
                TickOutcome::Opened { door: door_id, neighbour }
            }
            None => {
                debug!("Forcing generation for door {}", door_id);
                let archetype = self.generate_for_door(door_id)?;
                TickOutcome::Generated {
                    door: door_id,
                    archetype,
                }
            }
        };

        self.process_pending()?;
        Ok(outcome)
    }

    /// Runs every queued batch expansion.
    pub fn process_pending(&mut self) -> AllocationResult<()> {
        while let Some(archetype) = self.pending.pop_front() {
            if self.registry.contains(archetype) {
                self.generate_for_doors(archetype)?;
            }
        }
        Ok(())
    }

    /// Records `archetype` as current, shifting the old current to previous.
    pub fn update_current(&mut self, archetype: ArchetypeId) -> ArchetypeId {
        if self.path.current != Some(archetype) {
            debug!("Observer moved into {}", archetype);
            self.path.previous = self.path.current;
            self.path.current = Some(archetype);
        }
        archetype
    }

    /// The first rendered archetype whose footprint contains the observer.
    pub fn archetype_containing_observer(&self) -> Option<ArchetypeId> {
        self.registry
            .iter()
            .filter(|instance| instance.rendered)
            .find(|instance| instance.contains(self.observer))
            .map(|instance| instance.id)
    }

    /// The passable door of `archetype` nearest to the observer within the
    /// door open distance. Every other open door of the archetype is closed.
    pub fn closest_door(&mut self, archetype: ArchetypeId) -> AllocationResult<Option<DoorId>> {
        let instance = self.registry.instance(archetype)?;
        let mut closest = None;
        let mut closest_distance = f64::MAX;
        for (index, door) in instance.doors.iter().enumerate() {
            let distance = door.position.distance(self.observer);
            if distance <= self.config.door_open_distance
                && door.is_passable()
                && distance <= closest_distance
            {
                closest_distance = distance;
                closest = Some(DoorId::new(archetype, index));
            }
        }

        let to_close: Vec<DoorId> = instance
            .doors
            .iter()
            .enumerate()
            .map(|(index, _)| DoorId::new(archetype, index))
            .filter(|id| Some(*id) != closest)
            .filter(|id| self.registry.door(*id).is_ok_and(|d| d.open))
            .collect();
        for door in to_close {
            self.close_door(door)?;
        }

        Ok(closest)
    }

    /// Generates neighbours for a random subset of `parent`'s doors.
    ///
    /// Doors are tried in shuffled order until a target count drawn between
    /// the archetype's door bounds has been reached. Both bounds are
    /// inclusive, so a template with `min_doors == max_doors` always asks
    /// for exactly that many neighbours. Every door left untried and
    /// unassigned after that becomes a dead end.
    pub fn generate_for_doors(&mut self, parent: ArchetypeId) -> AllocationResult<Vec<ArchetypeId>> {
        let instance = self.registry.instance(parent)?;
        let mut order: Vec<usize> = (0..instance.doors.len()).collect();
        let min = instance.min_doors;
        let max = instance.max_doors.max(min);
        order.shuffle(&mut self.rng);
        let target = self.rng.gen_range(min..=max);

        let mut generated = Vec::new();
        for index in order {
            let door_id = DoorId::new(parent, index);
            let door = self.registry.door(door_id)?;
            if generated.len() < target {
                if !door.dead_end {
                    if let Some(child) = self.generate_for_door(door_id)? {
                        generated.push(child);
                    }
                }
            } else if door.assigned_to.is_none() {
                self.mark_dead_end(door_id)?;
            }
        }

        self.registry.instance_mut(parent)?.expansion = ExpansionState::Done;
        debug!(
            "Expanded {}: {} of target {} doors generated",
            parent,
            generated.len(),
            target
        );
        Ok(generated)
    }

    /// Generates a neighbour for a single unassigned door.
    ///
    /// Returns `None` if the door was already assigned, or if nothing fits,
    /// in which case the door is made a permanent dead end.
    pub fn generate_for_door(&mut self, door_id: DoorId) -> AllocationResult<Option<ArchetypeId>> {
        let (assigned, owner) = {
            let door = self.registry.door(door_id)?;
            (door.assigned_to, door.owner)
        };
        if assigned.is_some() {
            return Ok(None);
        }

        let geometry = self.geometry.as_ref().ok_or_else(|| {
            AllocationError::UndefinedGeometry("no bounding geometry has been set".to_string())
        })?;
        let solver = FitSolver::from_config(geometry, &self.config);
        let viable =
            solver.find_viable_archetypes(&mut self.registry, door_id, &self.catalog, &mut self.rng)?;
        let Some(chosen) = choose_weighted(&mut self.registry, &viable, &mut self.rng) else {
            debug!("No archetype fits at door {}, marking dead end", door_id);
            self.mark_dead_end(door_id)?;
            return Ok(None);
        };

        // The origin mirror may still point at a discarded candidate
        let parent_door = self.registry.instance(chosen)?.parent_door;
        self.registry.door_mut(door_id)?.assigned_to = Some(chosen);
        if let Some(parent_door) = parent_door {
            self.registry.link_mirrors(door_id, parent_door)?;
        }
        self.set_rendering(chosen, false)?;

        let node = self.tree.add_to_parent_archetype(owner, chosen, None)?;
        self.events.push(AllocationEvent::NodeAdded {
            node,
            parent: self.tree.parent(node),
            archetype: chosen,
        });
        info!(
            "Generated '{}' ({}) at door {}",
            self.registry.instance(chosen)?.name,
            chosen,
            door_id
        );

        if self.config.force_archetype_rendering {
            self.log_generation(chosen)?;
        }
        Ok(Some(chosen))
    }

    /// Expands a single door on request.
    ///
    /// Unlike the scheduler's own generation, failure is reported as
    /// [`AllocationError::NoViableArchetype`]. The door is still made a dead
    /// end.
    pub fn expand_door(&mut self, door_id: DoorId) -> AllocationResult<ArchetypeId> {
        let door = self.registry.door(door_id)?;
        if let Some(neighbour) = door.assigned_to {
            return Ok(neighbour);
        }
        if door.dead_end {
            return Err(AllocationError::NoViableArchetype(format!(
                "door {} is a dead end",
                door_id
            )));
        }
        self.generate_for_door(door_id)?.ok_or_else(|| {
            AllocationError::NoViableArchetype(format!("no archetype fits at door {}", door_id))
        })
    }

    // --- Backtracking ---

    /// Throws away the neighbour behind `door_id` and everything generated
    /// beyond it, so the door can be generated again.
    ///
    /// The door must belong to the room containing the observer, lead to a
    /// neighbour and be closed; otherwise nothing happens and `false` is
    /// returned. The tree is re-rooted at the observer's room first, so
    /// "beyond" means away from the observer.
    pub fn replace_archetype(&mut self, door_id: DoorId) -> AllocationResult<bool> {
        let (neighbour, open, owner) = {
            let door = self.registry.door(door_id)?;
            (door.assigned_to, door.open, door.owner)
        };
        let Some(neighbour) = neighbour else {
            return Ok(false);
        };
        if open {
            return Ok(false);
        }
        let Some(current) = self.archetype_containing_observer() else {
            return Ok(false);
        };
        if owner != current {
            return Err(AllocationError::InvalidState(format!(
                "door {} is not in the observer's room {}",
                door_id, current
            )));
        }

        let current_node = self.tree.find(current).ok_or_else(|| {
            AllocationError::TreeConsistencyViolation(format!("{} is not in the allocation tree", current))
        })?;
        self.tree.make_root(current_node)?;
        self.events.push(AllocationEvent::RootChanged { node: current_node });

        let delete_node = self.tree.find(neighbour).ok_or_else(|| {
            AllocationError::TreeConsistencyViolation(format!(
                "{} is not in the allocation tree",
                neighbour
            ))
        })?;
        self.tree.remove_subtree(delete_node)?;
        self.tree.detach(delete_node)?;

        let reachable: BTreeSet<ArchetypeId> = self.tree.archetypes().into_iter().collect();
        let destroyed: BTreeSet<ArchetypeId> = self
            .registry
            .ids()
            .into_iter()
            .filter(|id| !reachable.contains(id))
            .collect();
        for id in &destroyed {
            if let Some(instance) = self.registry.remove(*id) {
                if let Some(room) = instance.room {
                    self.room_instances.remove(&room);
                }
            }
        }
        self.clear_links_to(&destroyed);

        self.events.push(AllocationEvent::SubtreeRemoved {
            node: delete_node,
            archetypes: destroyed.iter().copied().collect(),
        });
        info!(
            "Replaced {} behind door {}, {} archetypes destroyed",
            neighbour,
            door_id,
            destroyed.len()
        );
        Ok(true)
    }

    fn clear_links_to(&mut self, destroyed: &BTreeSet<ArchetypeId>) {
        for instance in self.registry.iter_mut() {
            for door in instance.doors.iter_mut() {
                if door.assigned_to.is_some_and(|a| destroyed.contains(&a)) {
                    door.assigned_to = None;
                    door.mirror = None;
                    door.open = false;
                    door.enabled = true;
                } else if door.mirror.is_some_and(|m| destroyed.contains(&m.archetype)) {
                    door.mirror = None;
                }
            }
            let orphaned = instance
                .parent_door
                .and_then(|p| instance.doors.get(p.index))
                .is_some_and(|d| d.assigned_to.is_none());
            if orphaned {
                instance.parent_door = None;
            }
        }

        for slot in [
            &mut self.path.current,
            &mut self.path.previous,
            &mut self.path.next,
        ] {
            if slot.is_some_and(|a| destroyed.contains(&a)) {
                *slot = None;
            }
        }
        self.pending.retain(|a| !destroyed.contains(a));
    }

    // --- Doors and rendering ---

    /// Opens a door. The other side of the threshold is marked closed so
    /// only one side counts as open.
    pub fn open_door(&mut self, door_id: DoorId) -> AllocationResult<()> {
        let mirror = {
            let door = self.registry.door_mut(door_id)?;
            door.open = true;
            door.enabled = true;
            door.mirror
        };
        if let Some(mirror) = mirror {
            if let Ok(door) = self.registry.door_mut(mirror) {
                door.open = false;
            }
        }
        self.events.push(AllocationEvent::DoorOpened { door: door_id });
        Ok(())
    }

    /// Closes a door and its mirror and hides the neighbour behind it.
    pub fn close_door(&mut self, door_id: DoorId) -> AllocationResult<()> {
        let (mirror, neighbour) = {
            let door = self.registry.door_mut(door_id)?;
            door.open = false;
            door.enabled = true;
            (door.mirror, door.assigned_to)
        };
        if let Some(mirror) = mirror {
            if let Ok(door) = self.registry.door_mut(mirror) {
                door.open = false;
            }
        }
        if let Some(neighbour) = neighbour {
            if self.registry.contains(neighbour) {
                self.set_rendering(neighbour, false)?;
            }
        }
        self.events.push(AllocationEvent::DoorClosed { door: door_id });
        Ok(())
    }

    /// Makes a door a permanent dead end and hides it.
    pub fn mark_dead_end(&mut self, door_id: DoorId) -> AllocationResult<()> {
        let door = self.registry.door_mut(door_id)?;
        if door.dead_end && !door.enabled {
            return Ok(());
        }
        door.dead_end = true;
        door.enabled = false;
        self.set_door_point_visual(door_id, DoorPointVisual::Masked);
        self.events.push(AllocationEvent::DoorDeadEnded { door: door_id });
        Ok(())
    }

    /// Shows the chosen door closed and its mirror open.
    ///
    /// If no mirror is recorded, the neighbour's door nearest to this one is
    /// used and remembered as the mirror.
    pub fn render_mirror_door(&mut self, door_id: DoorId) -> AllocationResult<()> {
        let (mirror, neighbour, position) = {
            let door = self.registry.door(door_id)?;
            (door.mirror, door.assigned_to, door.position)
        };
        self.set_door_point_visual(door_id, DoorPointVisual::Closed);

        match mirror {
            Some(mirror) => {
                self.set_door_point_visual(mirror, DoorPointVisual::Open);
            }
            None => {
                let closest = neighbour
                    .and_then(|n| self.registry.get(n))
                    .and_then(|instance| {
                        instance
                            .closest_door_to(position)
                            .map(|index| DoorId::new(instance.id, index))
                    });
                if let Some(closest) = closest {
                    if self.set_door_point_visual(closest, DoorPointVisual::Open) {
                        self.registry.door_mut(door_id)?.mirror = Some(closest);
                    }
                }
            }
        }
        Ok(())
    }

    /// Sets the visual of the doorpoint bound to a door. Returns `false` if
    /// the door has no bound doorpoint.
    fn set_door_point_visual(&mut self, door_id: DoorId, visual: DoorPointVisual) -> bool {
        let Some(instance) = self.registry.get(door_id.archetype) else {
            return false;
        };
        let Some(point_index) = instance.door(door_id.index).and_then(|d| d.door_point) else {
            return false;
        };
        let Some(room) = instance.room.and_then(|r| self.room_instances.get_mut(&r)) else {
            return false;
        };
        match room.door_points.get_mut(point_index) {
            Some(point) => {
                point.visual = visual;
                true
            }
            None => false,
        }
    }

    /// Hides every archetype except the current and next ones.
    pub fn disable_inactive(&mut self) -> AllocationResult<()> {
        let (Some(current), Some(next)) = (self.path.current, self.path.next) else {
            return Ok(());
        };
        for id in self.registry.ids() {
            if id != current && id != next {
                self.set_rendering(id, false)?;
            }
        }
        Ok(())
    }

    /// Shows or hides an archetype, emitting an event on change.
    pub fn set_rendering(&mut self, archetype: ArchetypeId, rendered: bool) -> AllocationResult<()> {
        let instance = self.registry.instance_mut(archetype)?;
        if instance.rendered != rendered {
            instance.rendered = rendered;
            self.events.push(AllocationEvent::RenderingChanged {
                archetype,
                rendered,
            });
        }
        Ok(())
    }

    /// Backs an archetype with a decorated room, if it has none yet.
    ///
    /// Does nothing when archetype-only rendering is forced.
    pub fn materialize(&mut self, archetype: ArchetypeId) -> AllocationResult<Option<RoomInstanceId>> {
        if self.config.force_archetype_rendering {
            return Ok(None);
        }

        let instance = self.registry.instance_mut(archetype)?;
        if let Some(room) = instance.room {
            return Ok(Some(room));
        }
        let Some(room) = self.rooms.instantiate_room_for(instance, &mut self.rng) else {
            return Ok(None);
        };
        let room_id = room.id;
        instance.room = Some(room_id);
        self.room_instances.insert(room_id, room);

        self.tree.update_room(archetype, Some(room_id))?;
        self.events.push(AllocationEvent::RoomMaterialized {
            archetype,
            room: room_id,
        });
        self.log_generation(archetype)?;
        Ok(Some(room_id))
    }

    /// Emits the telemetry record of a generated archetype.
    pub fn log_generation(&mut self, archetype: ArchetypeId) -> AllocationResult<()> {
        let instance = self.registry.instance(archetype)?;
        let node = self.tree.find(archetype);
        let parent_name = node
            .and_then(|n| self.tree.parent(n))
            .and_then(|p| self.tree.archetype(p))
            .and_then(|a| self.registry.get(a))
            .map(|i| i.name.clone());
        let tree_layer = match node {
            Some(n) => self.tree.depth(n)?,
            None => 0,
        };
        let room_name = instance
            .room
            .and_then(|r| self.room_instances.get(&r))
            .map(|r| r.template_name.clone());

        let record = GenerationRecord {
            archetype,
            archetype_name: instance.name.clone(),
            weighting: instance.weighting,
            room_name,
            parent_name,
            tree_layer,
            area_size: self.geometry.as_ref().map_or((0.0, 0.0), |g| g.size()),
        };
        info!(
            "Generation: {} '{}' weighting {} room {:?} parent {:?} layer {}",
            record.archetype,
            record.archetype_name,
            record.weighting,
            record.room_name,
            record.parent_name,
            record.tree_layer
        );
        self.events.push(AllocationEvent::Generated(record));
        Ok(())
    }

    // --- Observer ---

    /// Moves the observer, keeping them at eye height.
    pub fn set_observer(&mut self, position: Point) {
        self.observer = position.with_y(self.config.observer_height());
    }

    pub fn move_observer_to_centre(&mut self) {
        if let Some(centre) = self.geometry.as_ref().map(|g| g.centre()) {
            self.set_observer(centre);
        }
    }

    pub fn move_observer_to_corner(&mut self) {
        let offset = self.config.corner_offset;
        if let Some(extents) = self.geometry.as_ref().map(|g| g.extents()) {
            self.set_observer(Point::flat(extents.min_x + offset, extents.min_z + offset));
        }
    }

    pub fn move_observer_to_random_position(&mut self) {
        if let Some(extents) = self.geometry.as_ref().map(|g| g.extents()) {
            let x = self.rng.gen_range(extents.min_x..=extents.max_x);
            let z = self.rng.gen_range(extents.min_z..=extents.max_z);
            self.set_observer(Point::flat(x, z));
        }
    }

    /// Moves the observer onto a random spawn point of `archetype`.
    pub fn move_observer_to_random_spawn(&mut self, archetype: ArchetypeId) -> AllocationResult<bool> {
        let instance = self.registry.instance(archetype)?;
        let spawn = instance.spawns.choose(&mut self.rng).copied();
        match spawn {
            Some(spawn) => {
                self.set_observer(spawn);
                Ok(true)
            }
            None => {
                warn!("{} has no spawn points", archetype);
                Ok(false)
            }
        }
    }

    fn move_observer_to_start(&mut self) {
        match self.config.start_position {
            StartPosition::Centre => self.move_observer_to_centre(),
            StartPosition::Corner => self.move_observer_to_corner(),
            StartPosition::Observer => self.set_observer(self.observer),
        }
        debug!("Observer starts at {:?}", self.observer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archetype::{ArchetypeTemplate, DoorSlot};
    use crate::geometry::AreaSpec;
    use crate::rooms::RoomTemplate;

    fn square(name: &str, weighting: i32) -> ArchetypeTemplate {
        ArchetypeTemplate::rectangle(name, 2.0, 2.0, weighting)
            .with_doors(vec![
                DoorSlot::new(0.0, 1.0, 0.0),
                DoorSlot::new(1.0, 0.0, 90.0),
                DoorSlot::new(0.0, -1.0, 180.0),
                DoorSlot::new(-1.0, 0.0, 270.0),
            ])
            .with_door_range(1, 2)
    }

    fn twin(name: &str) -> ArchetypeTemplate {
        ArchetypeTemplate::rectangle(name, 2.0, 2.0, 1)
            .with_doors(vec![
                DoorSlot::new(1.0, 0.0, 90.0),
                DoorSlot::new(-1.0, 0.0, 270.0),
            ])
            .with_door_range(2, 2)
    }

    /// A 6 by 2 strip with the observer in the middle.
    fn strip_allocator(seed: u64) -> RoomAllocator {
        let mut config = AllocationConfig::for_testing(seed);
        config.area = AreaSpec::rect(6.0, 2.0);
        config.area.point_count = 4;
        let catalog = ArchetypeCatalog::new(vec![twin("Twin Door Room")]).unwrap();
        let rooms = RoomCatalog::new(vec![RoomTemplate::new("Twin Door Room Study", "Twin Door Room")
            .with_door_points(vec![Point::flat(1.0, 0.0), Point::flat(-1.0, 0.0)])]);
        RoomAllocator::new(config, catalog, rooms)
    }

    #[test]
    fn test_pack_without_geometry_is_undefined() {
        let mut allocator = RoomAllocator::with_standard_catalogs(AllocationConfig::for_testing(1));
        assert!(matches!(
            allocator.pack_initial_room(),
            Err(AllocationError::UndefinedGeometry(_))
        ));
    }

    #[test]
    fn test_setup_packs_initial_with_both_neighbours() -> AllocationResult<()> {
        let mut allocator = strip_allocator(3);
        let initial = allocator.setup_area()?;

        let instance = allocator.registry().instance(initial)?;
        assert!(instance.rendered);
        assert!(instance.room.is_some());
        assert_eq!(instance.expansion, ExpansionState::Done);
        assert_eq!(instance.dead_end_count(), 0);
        assert_eq!(allocator.tree().node_count(), 3);
        assert_eq!(allocator.path().current, Some(initial));
        for (index, door) in instance.doors.iter().enumerate() {
            let neighbour = door.assigned_to.unwrap();
            assert!(!allocator.registry().instance(neighbour)?.rendered);
            let mirror = door.mirror.unwrap();
            assert_eq!(mirror.archetype, neighbour);
            assert_eq!(
                allocator.registry().door(mirror)?.mirror,
                Some(DoorId::new(initial, index))
            );
        }
        Ok(())
    }

    #[test]
    fn test_tick_outside_and_idle() -> AllocationResult<()> {
        let mut allocator = strip_allocator(5);
        let initial = allocator.setup_area()?;
        // Both doors are just out of reach from here
        allocator.set_observer(Point::flat(3.0, 0.3));
        assert_eq!(allocator.tick()?, TickOutcome::Idle { current: initial });

        allocator.set_observer(Point::flat(10.0, 10.0));
        assert_eq!(allocator.tick()?, TickOutcome::Outside);
        Ok(())
    }

    #[test]
    fn test_tick_opens_door_and_renders_neighbour() -> AllocationResult<()> {
        let mut allocator = strip_allocator(8);
        let initial = allocator.setup_area()?;
        let east = DoorId::new(initial, 0);
        let neighbour = allocator.registry().door(east)?.assigned_to.unwrap();

        allocator.set_observer(Point::flat(3.9, 1.0));
        let outcome = allocator.tick()?;
        assert_eq!(outcome, TickOutcome::Opened { door: east, neighbour });

        let door = allocator.registry().door(east)?;
        assert!(door.open);
        let mirror = door.mirror.unwrap();
        assert!(!allocator.registry().door(mirror)?.open);
        assert!(allocator.registry().instance(neighbour)?.rendered);
        assert!(allocator.registry().instance(neighbour)?.room.is_some());
        assert_eq!(
            allocator.registry().instance(neighbour)?.expansion,
            ExpansionState::Done
        );
        assert_eq!(allocator.pending_expansions(), 0);
        assert_eq!(allocator.path().next, Some(neighbour));
        Ok(())
    }

    #[test]
    fn test_only_one_door_stays_open() -> AllocationResult<()> {
        let mut allocator = strip_allocator(13);
        let initial = allocator.setup_area()?;
        let east = DoorId::new(initial, 0);
        let west = DoorId::new(initial, 1);

        allocator.set_observer(Point::flat(3.9, 1.0));
        allocator.tick()?;
        assert!(allocator.registry().door(east)?.open);

        allocator.set_observer(Point::flat(2.1, 1.0));
        allocator.tick()?;
        assert!(allocator.registry().door(west)?.open);
        assert!(!allocator.registry().door(east)?.open);
        let east_neighbour = allocator.registry().door(east)?.assigned_to.unwrap();
        assert!(!allocator.registry().instance(east_neighbour)?.rendered);
        Ok(())
    }

    #[test]
    fn test_unfit_door_becomes_dead_end() -> AllocationResult<()> {
        let mut config = AllocationConfig::for_testing(2);
        config.area = AreaSpec::rect(2.0, 2.0);
        config.area.point_count = 4;
        let catalog = ArchetypeCatalog::new(vec![square("Small Square Room", 1)])?;
        let mut allocator = RoomAllocator::new(config, catalog, RoomCatalog::new(Vec::new()));

        // Pack by hand: the room fills the whole area so no door can expand
        allocator.geometry = Some(BoundingGeometry::from_spec(&allocator.config.area, 0.0)?);
        let template = allocator.catalog.get(crate::archetype::TemplateId(0)).unwrap().clone();
        let id = allocator
            .registry
            .insert(&template, crate::archetype::Pose::new(Point::flat(1.0, 1.0), 0.0));
        allocator.tree.initialise(id, None);

        let door = DoorId::new(id, 0);
        assert_eq!(allocator.generate_for_door(door)?, None);
        let state = allocator.registry().door(door)?;
        assert!(state.dead_end);
        assert!(!state.enabled);
        assert!(state.unviable.contains(&crate::archetype::TemplateId(0)));
        assert!(allocator
            .events()
            .contains(&AllocationEvent::DoorDeadEnded { door }));
        Ok(())
    }

    #[test]
    fn test_expand_door_reports_no_viable_archetype() -> AllocationResult<()> {
        let mut allocator = strip_allocator(19);
        let initial = allocator.setup_area()?;
        let east = DoorId::new(initial, 0);
        let neighbour = allocator.registry().door(east)?.assigned_to.unwrap();
        assert_eq!(allocator.expand_door(east)?, neighbour);

        // The far door of the neighbour faces the wall of the strip
        let outer = allocator
            .registry()
            .instance(neighbour)?
            .door_ids()
            .into_iter()
            .find(|id| allocator.registry().door(*id).is_ok_and(|d| d.assigned_to.is_none()))
            .unwrap();
        assert!(matches!(
            allocator.expand_door(outer),
            Err(AllocationError::NoViableArchetype(_))
        ));
        assert!(allocator.registry().door(outer)?.dead_end);
        assert!(matches!(
            allocator.expand_door(outer),
            Err(AllocationError::NoViableArchetype(_))
        ));
        Ok(())
    }

    #[test]
    fn test_generate_for_doors_forces_remaining_dead_ends() -> AllocationResult<()> {
        let mut allocator = strip_allocator(17);
        allocator.catalog = ArchetypeCatalog::new(vec![twin("Twin Door Room").with_door_range(1, 1)])?;
        allocator.geometry = Some(BoundingGeometry::from_spec(&allocator.config.area, 0.0)?);
        let template = allocator.catalog.get(crate::archetype::TemplateId(0)).unwrap().clone();
        let id = allocator
            .registry
            .insert(&template, crate::archetype::Pose::new(Point::flat(3.0, 1.0), 0.0));
        allocator.tree.initialise(id, None);

        let generated = allocator.generate_for_doors(id)?;
        assert_eq!(generated.len(), 1);
        let instance = allocator.registry().instance(id)?;
        assert_eq!(instance.dead_end_count(), 1);
        assert_eq!(instance.expansion, ExpansionState::Done);
        Ok(())
    }

    #[test]
    fn test_door_target_reaches_upper_bound() -> AllocationResult<()> {
        let mut counts = BTreeSet::new();
        for seed in 0..16 {
            let mut allocator = strip_allocator(seed);
            allocator.catalog = ArchetypeCatalog::new(vec![twin("Twin Door Room").with_door_range(1, 2)])?;
            allocator.geometry = Some(BoundingGeometry::from_spec(&allocator.config.area, 0.0)?);
            let template = allocator.catalog.get(crate::archetype::TemplateId(0)).unwrap().clone();
            let id = allocator
                .registry
                .insert(&template, crate::archetype::Pose::new(Point::flat(3.0, 1.0), 0.0));
            allocator.tree.initialise(id, None);
            counts.insert(allocator.generate_for_doors(id)?.len());
        }
        assert_eq!(counts, BTreeSet::from([1, 2]));
        Ok(())
    }

    #[test]
    fn test_replace_archetype_prunes_beyond_door() -> AllocationResult<()> {
        let mut allocator = strip_allocator(21);
        let initial = allocator.setup_area()?;
        let east = DoorId::new(initial, 0);
        let neighbour = allocator.registry().door(east)?.assigned_to.unwrap();
        let before = allocator.registry().len();

        assert!(allocator.replace_archetype(east)?);
        assert!(!allocator.registry().contains(neighbour));
        assert_eq!(allocator.registry().len(), before - 1);
        let door = allocator.registry().door(east)?;
        assert_eq!(door.assigned_to, None);
        assert_eq!(door.mirror, None);
        assert!(!door.dead_end);
        assert_eq!(allocator.tree().node_count(), 2);
        assert_eq!(allocator.tree().root(), allocator.tree().find(initial));

        // The door regenerates on the next approach
        allocator.set_observer(Point::flat(3.9, 1.0));
        match allocator.tick()? {
            TickOutcome::Generated { door, archetype } => {
                assert_eq!(door, east);
                assert!(archetype.is_some());
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_replace_ignores_open_or_unassigned_doors() -> AllocationResult<()> {
        let mut allocator = strip_allocator(34);
        let initial = allocator.setup_area()?;
        let east = DoorId::new(initial, 0);
        allocator.open_door(east)?;
        assert!(!allocator.replace_archetype(east)?);
        Ok(())
    }

    #[test]
    fn test_reset_clears_state() -> AllocationResult<()> {
        let mut allocator = strip_allocator(55);
        allocator.setup_area()?;
        allocator.reset();
        assert!(allocator.registry().is_empty());
        assert_eq!(allocator.tree().node_count(), 0);
        assert_eq!(allocator.path(), PathState::default());
        assert!(allocator.events().is_empty());
        assert!(allocator.geometry().is_some());
        Ok(())
    }

    #[test]
    fn test_generation_records_carry_parent_and_layer() -> AllocationResult<()> {
        let mut allocator = strip_allocator(89);
        let initial = allocator.setup_area()?;
        allocator.set_observer(Point::flat(3.9, 1.0));
        allocator.tick()?;

        let records: Vec<GenerationRecord> = allocator
            .drain_events()
            .into_iter()
            .filter_map(|e| match e {
                AllocationEvent::Generated(record) => Some(record),
                _ => None,
            })
            .collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].archetype, initial);
        assert_eq!(records[0].tree_layer, 0);
        assert_eq!(records[0].parent_name, None);
        assert_eq!(records[1].tree_layer, 1);
        assert_eq!(records[1].parent_name.as_deref(), Some("Twin Door Room"));
        assert_eq!(records[1].room_name.as_deref(), Some("Twin Door Room Study"));
        assert_eq!(records[1].area_size, (6.0, 2.0));
        Ok(())
    }
}
