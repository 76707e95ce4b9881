use std::collections::{BTreeMap, HashMap};

use thiserror::Error;
use tracing::{debug, warn};

use super::action::ActionQueue;
use super::actor::{Actor, ActorDesc, ActorId, ActorIdAllocator};
use super::grid::{Grid, GridCoord, PlaceResult};
use super::presentation::PresentationEvent;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorldError {
    #[error("actor name `{0}` is already taken")]
    DuplicateName(String),
    #[error("unknown actor {0}")]
    UnknownActor(ActorId),
    #[error("actor {0} has no coordinate holder")]
    NotCoordinateHolder(ActorId),
    #[error("actor `{name}` cannot spawn at {coordinates}: {reason}")]
    SpawnRejected {
        name: String,
        coordinates: GridCoord,
        reason: &'static str,
    },
}

/// Actor arena plus the grid they live on.
///
/// Deletion is soft: deleted actors disappear from every lookup immediately
/// and are dropped by [`World::purge_deleted`].
#[derive(Debug)]
pub struct World {
    allocator: ActorIdAllocator,
    actors: BTreeMap<ActorId, Actor>,
    names: HashMap<String, ActorId>,
    grid: Grid,
    events: Vec<PresentationEvent>,
}

impl World {
    pub fn new(grid: Grid) -> Self {
        Self {
            allocator: ActorIdAllocator::default(),
            actors: BTreeMap::new(),
            names: HashMap::new(),
            grid,
            events: Vec::new(),
        }
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Spawns and, unless the description says otherwise, activates an actor.
    pub fn spawn(&mut self, desc: ActorDesc) -> Result<ActorId, WorldError> {
        let id = self.allocator.allocate();
        let name = match desc.name.clone() {
            Some(name) => {
                if self.names.contains_key(&name) {
                    return Err(WorldError::DuplicateName(name));
                }
                name
            }
            None => self.generated_name(id),
        };
        let spawn_at = desc.spawn_at;
        let start_active = !desc.inactive;
        let mut actor = Actor::from_desc(id, name.clone(), desc);

        if let Some(coordinates) = spawn_at {
            let Some(holder) = actor.coordinate_holder_mut() else {
                return Err(WorldError::NotCoordinateHolder(id));
            };
            let result = self.grid.place(id, holder, coordinates);
            if !result.placed {
                let reason = if result.is_out_of_bounds() {
                    "out of bounds"
                } else {
                    "cell is blocked"
                };
                return Err(WorldError::SpawnRejected {
                    name,
                    coordinates,
                    reason,
                });
            }
        }

        debug!(actor = %id, name = name.as_str(), "actor_spawned");
        self.names.insert(name, id);
        self.actors.insert(id, actor);
        if start_active {
            self.activate(id)?;
        }
        Ok(id)
    }

    fn generated_name(&self, id: ActorId) -> String {
        let mut suffix = 0u32;
        loop {
            let candidate = if suffix == 0 {
                format!("actor-{}", id.0)
            } else {
                format!("actor-{}-{suffix}", id.0)
            };
            if !self.names.contains_key(&candidate) {
                return candidate;
            }
            suffix = suffix.saturating_add(1);
        }
    }

    pub fn actor(&self, id: ActorId) -> Option<&Actor> {
        self.actors.get(&id).filter(|actor| !actor.deleted)
    }

    pub fn actor_mut(&mut self, id: ActorId) -> Option<&mut Actor> {
        self.actors.get_mut(&id).filter(|actor| !actor.deleted)
    }

    fn existing_mut(&mut self, id: ActorId) -> Result<&mut Actor, WorldError> {
        self.actor_mut(id).ok_or(WorldError::UnknownActor(id))
    }

    pub fn find_by_name(&self, name: &str) -> Option<ActorId> {
        self.names
            .get(name)
            .copied()
            .filter(|id| self.actor(*id).is_some())
    }

    pub fn actors(&self) -> impl Iterator<Item = &Actor> + '_ {
        self.actors.values().filter(|actor| !actor.deleted)
    }

    pub fn live_actor_ids(&self) -> Vec<ActorId> {
        self.actors()
            .filter(|actor| actor.is_live())
            .map(Actor::id)
            .collect()
    }

    pub fn actor_count(&self) -> usize {
        self.actors().count()
    }

    pub fn activate(&mut self, id: ActorId) -> Result<(), WorldError> {
        let actor = self.existing_mut(id)?;
        if actor.active {
            return Ok(());
        }
        actor.active = true;
        let event = PresentationEvent::Activated {
            actor: id,
            name: actor.name().to_string(),
            shape: actor.coordinate_holder().map(|holder| holder.shape.clone()),
            coordinates: actor.coordinates(),
        };
        self.events.push(event);
        Ok(())
    }

    pub fn deactivate(&mut self, id: ActorId) -> Result<(), WorldError> {
        let actor = self.existing_mut(id)?;
        if !actor.active {
            return Ok(());
        }
        actor.active = false;
        self.events.push(PresentationEvent::Deactivated { actor: id });
        Ok(())
    }

    /// Marks the actor deleted and takes it off the grid.
    pub fn delete(&mut self, id: ActorId) -> Result<(), WorldError> {
        let actor = self.actor(id).ok_or(WorldError::UnknownActor(id))?;
        if actor.coordinate_holder().is_some() {
            self.remove_from_grid(id)?;
        }
        self.deactivate(id)?;
        self.existing_mut(id)?.deleted = true;
        Ok(())
    }

    pub fn purge_deleted(&mut self) -> usize {
        let doomed: Vec<ActorId> = self
            .actors
            .values()
            .filter(|actor| actor.deleted)
            .map(Actor::id)
            .collect();
        for id in &doomed {
            if let Some(actor) = self.actors.remove(id) {
                self.names.remove(actor.name());
            }
        }
        if !doomed.is_empty() {
            debug!(count = doomed.len(), "deleted_actors_purged");
        }
        doomed.len()
    }

    /// Places an actor, relocating it atomically if it already sits on the grid.
    pub fn place_actor(
        &mut self,
        id: ActorId,
        target: GridCoord,
    ) -> Result<PlaceResult, WorldError> {
        let actor = self
            .actors
            .get_mut(&id)
            .filter(|actor| !actor.deleted)
            .ok_or(WorldError::UnknownActor(id))?;
        let holder = actor
            .coordinate_holder_mut()
            .ok_or(WorldError::NotCoordinateHolder(id))?;
        let previous = holder.coordinates;
        let result = match previous {
            Some(_) => self.grid.move_to(id, holder, target),
            None => self.grid.place(id, holder, target),
        };
        if result.placed && previous != Some(target) {
            let shape = holder.shape.clone();
            let event = match previous {
                Some(from) => PresentationEvent::Moved {
                    actor: id,
                    from: Some(from),
                    to: target,
                    shape,
                },
                None => PresentationEvent::Placed {
                    actor: id,
                    coordinates: target,
                    shape,
                },
            };
            self.events.push(event);
        }
        Ok(result)
    }

    pub fn move_actor(
        &mut self,
        id: ActorId,
        target: GridCoord,
    ) -> Result<PlaceResult, WorldError> {
        self.place_actor(id, target)
    }

    pub fn remove_from_grid(&mut self, id: ActorId) -> Result<bool, WorldError> {
        let actor = self
            .actors
            .get_mut(&id)
            .filter(|actor| !actor.deleted)
            .ok_or(WorldError::UnknownActor(id))?;
        let holder = actor
            .coordinate_holder_mut()
            .ok_or(WorldError::NotCoordinateHolder(id))?;
        let Some(from) = holder.coordinates.take() else {
            return Ok(false);
        };
        let removed = self.grid.remove(id, from);
        if removed {
            self.events.push(PresentationEvent::Removed { actor: id, from });
        }
        Ok(removed)
    }

    pub fn has_pending(&self, id: ActorId) -> bool {
        self.actor(id).is_some_and(Actor::has_pending_actions)
    }

    /// Live actors whose pending queue is non-empty, in id order.
    pub fn actors_with_pending(&self) -> Vec<ActorId> {
        self.actors()
            .filter(|actor| actor.is_live() && actor.has_pending_actions())
            .map(Actor::id)
            .collect()
    }

    pub fn take_pending(&mut self, id: ActorId) -> ActionQueue {
        self.actor_mut(id)
            .map(Actor::take_pending_actions)
            .unwrap_or_default()
    }

    /// Moves every action in `actions` onto `id`'s pending queue.
    pub fn append_pending(&mut self, id: ActorId, actions: &mut ActionQueue) -> bool {
        match self.actor_mut(id) {
            Some(actor) => {
                actor.pending_actions_mut().append(actions);
                true
            }
            None => {
                warn!(actor = %id, dropped = actions.len(), "pending_owner_missing");
                false
            }
        }
    }

    pub fn push_event(&mut self, event: PresentationEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[PresentationEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<PresentationEvent> {
        std::mem::take(&mut self.events)
    }
}
