use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::action::ActionQueue;
use super::behavior::BehaviorId;
use super::behavior_state::BehaviorStateStore;
use super::collision::Body;
use super::grid::{GridCoord, Vec2};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ActorId(pub u64);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Default)]
pub(crate) struct ActorIdAllocator {
    next: u64,
}

impl ActorIdAllocator {
    pub(crate) fn allocate(&mut self) -> ActorId {
        let id = ActorId(self.next);
        self.next = self.next.saturating_add(1);
        id
    }
}

/// Receiver protocols a behavior route can require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Satisfied by every actor.
    Actor,
    CoordinateHolder,
    Unit,
    Puppeteer,
    Orchestrator,
}

/// Opaque presentation handle (sprite or texture key). The core never reads it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShapeRef(pub String);

impl ShapeRef {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoordinateHolder {
    pub coordinates: Option<GridCoord>,
    pub velocity: Vec2,
    pub intent_velocity: Vec2,
    pub body: Body,
    pub shape: ShapeRef,
}

impl CoordinateHolder {
    pub fn new(body: Body) -> Self {
        Self {
            body,
            ..Self::default()
        }
    }

    pub fn with_shape(mut self, shape: ShapeRef) -> Self {
        self.shape = shape;
        self
    }

    pub fn with_intent_velocity(mut self, intent_velocity: Vec2) -> Self {
        self.intent_velocity = intent_velocity;
        self
    }
}

/// Everything needed to spawn an actor into a [`super::world::World`].
#[derive(Debug, Clone, Default)]
pub struct ActorDesc {
    pub name: Option<String>,
    pub behaviors: Vec<BehaviorId>,
    pub capabilities: Vec<Capability>,
    pub coordinate_holder: Option<CoordinateHolder>,
    pub spawn_at: Option<GridCoord>,
    pub inactive: bool,
}

impl ActorDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_behavior(mut self, behavior: BehaviorId) -> Self {
        self.behaviors.push(behavior);
        self
    }

    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.push(capability);
        self
    }

    pub fn with_coordinate_holder(mut self, holder: CoordinateHolder) -> Self {
        self.coordinate_holder = Some(holder);
        self
    }

    pub fn at(mut self, coordinates: GridCoord) -> Self {
        self.spawn_at = Some(coordinates);
        self
    }

    pub fn inactive(mut self) -> Self {
        self.inactive = true;
        self
    }
}

#[derive(Debug)]
pub struct Actor {
    id: ActorId,
    name: String,
    pub(crate) active: bool,
    pub(crate) deleted: bool,
    behaviors: Vec<BehaviorId>,
    capabilities: BTreeSet<Capability>,
    behavior_state: BehaviorStateStore,
    pending_actions: ActionQueue,
    coordinate_holder: Option<CoordinateHolder>,
}

impl Actor {
    pub(crate) fn from_desc(id: ActorId, name: String, desc: ActorDesc) -> Self {
        let mut behaviors = Vec::with_capacity(desc.behaviors.len());
        for behavior in desc.behaviors {
            if !behaviors.contains(&behavior) {
                behaviors.push(behavior);
            }
        }
        Self {
            id,
            name,
            active: false,
            deleted: false,
            behaviors,
            capabilities: desc.capabilities.into_iter().collect(),
            behavior_state: BehaviorStateStore::default(),
            pending_actions: ActionQueue::default(),
            coordinate_holder: desc.coordinate_holder,
        }
    }

    pub fn id(&self) -> ActorId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Live actors take part in ticks and receive messages.
    pub fn is_live(&self) -> bool {
        self.active && !self.deleted
    }

    pub fn behaviors(&self) -> &[BehaviorId] {
        &self.behaviors
    }

    pub fn has_behavior(&self, behavior: BehaviorId) -> bool {
        self.behaviors.contains(&behavior)
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        match capability {
            Capability::Actor => true,
            Capability::CoordinateHolder => self.coordinate_holder.is_some(),
            marker => self.capabilities.contains(&marker),
        }
    }

    pub fn coordinate_holder(&self) -> Option<&CoordinateHolder> {
        self.coordinate_holder.as_ref()
    }

    pub fn coordinate_holder_mut(&mut self) -> Option<&mut CoordinateHolder> {
        self.coordinate_holder.as_mut()
    }

    pub fn coordinates(&self) -> Option<GridCoord> {
        self.coordinate_holder
            .as_ref()
            .and_then(|holder| holder.coordinates)
    }

    pub fn state<T: Any>(&self, behavior: BehaviorId) -> Option<&T> {
        self.behavior_state.get(behavior)
    }

    pub fn state_mut<T: Any + Default>(&mut self, behavior: BehaviorId) -> &mut T {
        self.behavior_state.get_mut(behavior)
    }

    pub fn set_state<T: Any>(&mut self, behavior: BehaviorId, value: T) {
        self.behavior_state.insert(behavior, value);
    }

    pub fn pending_actions(&self) -> &ActionQueue {
        &self.pending_actions
    }

    pub fn pending_actions_mut(&mut self) -> &mut ActionQueue {
        &mut self.pending_actions
    }

    pub fn has_pending_actions(&self) -> bool {
        !self.pending_actions.is_empty()
    }

    /// Swaps the pending queue for an empty one and returns the previous contents.
    pub fn take_pending_actions(&mut self) -> ActionQueue {
        std::mem::take(&mut self.pending_actions)
    }
}
