//! # Simulation Module
//!
//! An automated walkthrough that drives the scheduler with a synthetic
//! observer, used to exercise generation without a headset.
//!
//! Each step ticks the scheduler and then moves the observer towards a
//! randomly chosen door of the room they stand in. Once the door opens onto
//! a rendered neighbour the observer steps through to one of its spawn
//! points and the way back is sealed. A room with nowhere left to go is
//! abandoned for its parent; the walk ends when the initial room runs out
//! of doors.

use crate::allocation::RoomAllocator;
use crate::archetype::{ArchetypeId, DoorId};
use crate::{config, AllocationResult};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeSet;
use std::time::Duration;

/// What a single walkthrough step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkStep {
    /// Moved towards the target door
    Moved { target: DoorId },
    /// Stepped through an open door into a neighbour
    Transitioned { from: ArchetypeId, to: ArchetypeId },
    /// Gave up on an exhausted room and returned to its parent
    Backtracked { from: ArchetypeId, to: ArchetypeId },
    /// The observer is not inside any rendered room
    Lost,
    /// The initial room has no doors left to try
    Finished,
}

/// Totals of a walkthrough run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkSummary {
    pub steps: usize,
    pub transitions: usize,
    pub backtracks: usize,
    pub rooms_visited: usize,
    pub finished: bool,
}

/// Walkthrough state.
#[derive(Debug, Clone)]
pub struct Walkthrough {
    /// Door currently walked towards
    pub target: Option<DoorId>,
    /// Distance covered per step
    pub step_distance: f64,
    finished: bool,
    steps: usize,
    transitions: usize,
    backtracks: usize,
    visited: BTreeSet<ArchetypeId>,
    rng: StdRng,
}

impl Walkthrough {
    pub fn new(seed: u64) -> Self {
        Self {
            target: None,
            step_distance: config::WALK_STEP_DISTANCE,
            finished: false,
            steps: 0,
            transitions: 0,
            backtracks: 0,
            visited: BTreeSet::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn summary(&self) -> WalkSummary {
        WalkSummary {
            steps: self.steps,
            transitions: self.transitions,
            backtracks: self.backtracks,
            rooms_visited: self.visited.len(),
            finished: self.finished,
        }
    }

    /// Ticks the scheduler once and advances the observer.
    pub fn step(&mut self, allocator: &mut RoomAllocator) -> AllocationResult<WalkStep> {
        if self.finished {
            return Ok(WalkStep::Finished);
        }
        self.steps += 1;

        allocator.tick()?;
        let Some(current) = allocator.archetype_containing_observer() else {
            warn!("Walkthrough observer is outside every rendered room");
            return Ok(WalkStep::Lost);
        };
        self.visited.insert(current);

        let target = match self.valid_target(allocator, current) {
            Some(target) => target,
            None => match self.choose_target(allocator, current)? {
                Some(target) => target,
                None => return self.backtrack(allocator, current),
            },
        };
        self.target = Some(target);

        let (position, open, neighbour) = {
            let door = allocator.registry().door(target)?;
            (door.position, door.open, door.assigned_to)
        };

        if let Some(neighbour) = neighbour.filter(|_| open) {
            if allocator.registry().instance(neighbour)?.rendered {
                return self.transition(allocator, current, neighbour);
            }
        }

        let observer = allocator.observer();
        if observer.planar_distance(position) <= self.step_distance {
            // Close enough yet the door did not open; try another one
            debug!("Door {} did not open, choosing a new target", target);
            self.target = None;
        } else {
            let height = observer.y;
            allocator.set_observer(observer.move_towards(position.with_y(height), self.step_distance));
        }
        Ok(WalkStep::Moved { target })
    }

    /// Steps until the walk finishes or `max_steps` have been taken.
    pub fn run(&mut self, allocator: &mut RoomAllocator, max_steps: usize) -> AllocationResult<WalkSummary> {
        for _ in 0..max_steps {
            match self.step(allocator)? {
                WalkStep::Finished | WalkStep::Lost => break,
                _ => {}
            }
        }
        Ok(self.summary())
    }

    fn valid_target(&self, allocator: &RoomAllocator, current: ArchetypeId) -> Option<DoorId> {
        let target = self.target?;
        let door = allocator.registry().door(target).ok()?;
        (target.archetype == current && door.is_passable()).then_some(target)
    }

    fn choose_target(&mut self, allocator: &RoomAllocator, current: ArchetypeId) -> AllocationResult<Option<DoorId>> {
        let instance = allocator.registry().instance(current)?;
        let candidates: Vec<DoorId> = instance
            .door_ids()
            .into_iter()
            .filter(|id| Some(*id) != instance.parent_door)
            .filter(|id| instance.door(id.index).is_some_and(|d| d.is_passable()))
            .collect();
        Ok(candidates.choose(&mut self.rng).copied())
    }

    fn transition(
        &mut self,
        allocator: &mut RoomAllocator,
        from: ArchetypeId,
        to: ArchetypeId,
    ) -> AllocationResult<WalkStep> {
        allocator.move_observer_to_random_spawn(to)?;
        allocator.update_current(to);
        if let Some(parent_door) = allocator.registry().instance(to)?.parent_door {
            allocator.mark_dead_end(parent_door)?;
        }
        self.target = None;
        self.transitions += 1;
        debug!("Walked from {} into {}", from, to);
        Ok(WalkStep::Transitioned { from, to })
    }

    fn backtrack(&mut self, allocator: &mut RoomAllocator, current: ArchetypeId) -> AllocationResult<WalkStep> {
        self.target = None;
        let parent_door = allocator.registry().instance(current)?.parent_door;
        let parent = match parent_door {
            Some(door) => allocator.registry().door(door)?.assigned_to,
            None => None,
        };

        let (Some(parent_door), Some(parent)) = (parent_door, parent) else {
            info!("Walkthrough finished in {} after {} steps", current, self.steps);
            self.finished = true;
            return Ok(WalkStep::Finished);
        };

        allocator.mark_dead_end(parent_door)?;
        if let Some(mirror) = allocator.registry().door(parent_door)?.mirror {
            allocator.mark_dead_end(mirror)?;
        }
        allocator.set_rendering(parent, true)?;
        allocator.set_rendering(current, false)?;
        allocator.move_observer_to_random_spawn(parent)?;
        allocator.update_current(parent);

        self.backtracks += 1;
        debug!("Backtracked from {} to {}", current, parent);
        Ok(WalkStep::Backtracked { from: current, to: parent })
    }
}

/// Runs a walkthrough with one step per generation interval.
pub async fn run_timed(
    allocator: &mut RoomAllocator,
    walkthrough: &mut Walkthrough,
    max_steps: usize,
) -> AllocationResult<WalkSummary> {
    let period = Duration::from_millis(allocator.config().generation_interval_ms.max(1));
    let mut interval = tokio::time::interval(period);
    for _ in 0..max_steps {
        interval.tick().await;
        match walkthrough.step(allocator)? {
            WalkStep::Finished | WalkStep::Lost => break,
            _ => {}
        }
    }
    Ok(walkthrough.summary())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::AllocationConfig;
    use crate::archetype::{ArchetypeCatalog, ArchetypeTemplate, DoorSlot};
    use crate::geometry::AreaSpec;
    use crate::rooms::RoomCatalog;

    fn twin_strip(seed: u64) -> RoomAllocator {
        let mut config = AllocationConfig::for_testing(seed);
        config.area = AreaSpec::rect(6.0, 2.0);
        config.area.point_count = 4;
        config.force_archetype_rendering = true;
        let twin = ArchetypeTemplate::rectangle("Twin Door Room", 2.0, 2.0, 1)
            .with_doors(vec![
                DoorSlot::new(1.0, 0.0, 90.0),
                DoorSlot::new(-1.0, 0.0, 270.0),
            ])
            .with_door_range(2, 2);
        let catalog = ArchetypeCatalog::new(vec![twin]).unwrap();
        RoomAllocator::new(config, catalog, RoomCatalog::new(Vec::new()))
    }

    #[test]
    fn test_walkthrough_finishes_in_strip() -> AllocationResult<()> {
        let mut allocator = twin_strip(6);
        allocator.setup_area()?;
        let mut walk = Walkthrough::new(6);
        let summary = walk.run(&mut allocator, 200)?;

        assert!(summary.finished);
        assert!(walk.is_finished());
        assert_eq!(summary.transitions, 2);
        assert_eq!(summary.backtracks, 2);
        assert_eq!(summary.rooms_visited, 3);
        assert_eq!(walk.step(&mut allocator)?, WalkStep::Finished);
        Ok(())
    }

    #[test]
    fn test_transition_seals_way_back() -> AllocationResult<()> {
        let mut allocator = twin_strip(11);
        let initial = allocator.setup_area()?;
        let mut walk = Walkthrough::new(11);

        let to = loop {
            if let WalkStep::Transitioned { from, to } = walk.step(&mut allocator)? {
                assert_eq!(from, initial);
                break to;
            }
        };
        let parent_door = allocator.registry().instance(to)?.parent_door.unwrap();
        assert!(allocator.registry().door(parent_door)?.dead_end);
        assert_eq!(allocator.archetype_containing_observer(), Some(to));
        Ok(())
    }

    #[test]
    fn test_lost_observer_stops_run() -> AllocationResult<()> {
        let mut allocator = twin_strip(2);
        allocator.setup_area()?;
        allocator.set_observer(crate::geometry::Point::flat(20.0, 20.0));
        let mut walk = Walkthrough::new(2);
        assert_eq!(walk.step(&mut allocator)?, WalkStep::Lost);
        let summary = walk.run(&mut allocator, 10)?;
        assert!(!summary.finished);
        Ok(())
    }

    #[test]
    fn test_run_timed_matches_run() -> AllocationResult<()> {
        let mut timed_allocator = twin_strip(8);
        timed_allocator.setup_area()?;
        let mut timed_walk = Walkthrough::new(8);
        let timed = tokio_test::block_on(run_timed(&mut timed_allocator, &mut timed_walk, 200))?;

        let mut allocator = twin_strip(8);
        allocator.setup_area()?;
        let summary = Walkthrough::new(8).run(&mut allocator, 200)?;
        assert_eq!(timed, summary);
        Ok(())
    }
}
