mod action;
mod actor;
pub mod behavior;
mod behavior_state;
mod broker;
mod collision;
mod context;
mod grid;
mod input;
mod message;
mod orchestrator;
mod pipeline;
mod presentation;
mod simulation;
mod world;

pub use action::{requeue_position, Action, ActionQueue, RequeuePosition};
pub use actor::{Actor, ActorDesc, ActorId, Capability, CoordinateHolder, ShapeRef};
pub use behavior::{
    can_respond_to, on_message, resolve_action, Behavior, BehaviorFactory, BehaviorId,
    BehaviorMethod, BehaviorRegistry, HandlerEntry, RegistryError, ResolveOutcome, Route,
};
pub use broker::{MessageBroker, MessageId};
pub use collision::{Body, CollisionCategory};
pub use context::SimContext;
pub use grid::{Cell, Direction, Grid, GridCoord, GridError, PlaceResult, Vec2};
pub use input::{InputBuffer, Key, KeyRecord, TickInput};
pub use message::{DispatchError, Message, MessageBody, MessageType, Payload};
pub use orchestrator::{EmissionReport, Orchestrator, ORCHESTRATOR_NAME};
pub use pipeline::{
    CommandPipeline, DroppedAction, PipelineConfig, PipelineReport, MAX_ACTION_ATTEMPTS,
    MAX_RECURSION_DEPTH,
};
pub use presentation::{PresentationEvent, PresentationSink, RecordingSink};
pub use simulation::{Simulation, TickReport};
pub use world::{World, WorldError};
