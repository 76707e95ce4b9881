use std::collections::BTreeSet;

use tracing::debug;

use super::actor::ActorId;
use super::behavior::BehaviorRegistry;
use super::broker::{MessageBroker, MessageId};
use super::context::SimContext;
use super::input::TickInput;
use super::message::{DispatchError, Message, MessageType, Payload};
use super::orchestrator::{EmissionReport, Orchestrator};
use super::pipeline::{CommandPipeline, PipelineConfig, PipelineReport};
use super::presentation::PresentationEvent;
use super::world::{World, WorldError};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    pub emission: EmissionReport,
    pub pipeline: PipelineReport,
    pub unclaimed_responses: usize,
    pub purged: usize,
}

impl TickReport {
    pub fn state_changed(&self) -> bool {
        self.pipeline.state_changed
    }
}

/// Owns the world, the behavior registry and the broker, and runs one tick at
/// a time: orchestrator emission, pipeline resolution, then end-of-tick
/// cleanup.
#[derive(Debug)]
pub struct Simulation {
    world: World,
    registry: BehaviorRegistry,
    broker: MessageBroker,
    pipeline: CommandPipeline,
    orchestrator: Orchestrator,
    tick: u64,
}

impl Simulation {
    pub fn new(
        mut world: World,
        registry: BehaviorRegistry,
        config: PipelineConfig,
    ) -> Result<Self, WorldError> {
        let orchestrator = Orchestrator::spawn(&mut world)?;
        Ok(Self {
            world,
            registry,
            broker: MessageBroker::default(),
            pipeline: CommandPipeline::new(config),
            orchestrator,
            tick: 0,
        })
    }

    pub fn with_builtins(world: World) -> Result<Self, WorldError> {
        Self::new(world, BehaviorRegistry::with_builtins(), PipelineConfig::default())
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn registry(&self) -> &BehaviorRegistry {
        &self.registry
    }

    pub fn orchestrator_actor(&self) -> ActorId {
        self.orchestrator.actor()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn context(&mut self) -> SimContext<'_> {
        SimContext::new(&mut self.world, &self.registry, &mut self.broker)
    }

    /// Sends on behalf of the orchestrator. The responder's actions are queued
    /// on its own pending queue and resolve on the next tick.
    pub fn send_message(
        &mut self,
        responder: ActorId,
        message_type: MessageType,
        payload: Payload,
    ) -> Result<Option<MessageId>, DispatchError> {
        let message = Message::new(self.orchestrator.actor(), message_type, payload);
        self.broker
            .send_message(&mut self.world, &self.registry, &message, responder, true)
    }

    pub fn process_tick(&mut self, delta_seconds: f32, input: TickInput) -> TickReport {
        self.tick = self.tick.saturating_add(1);
        let pipeline = self.pipeline;
        let orchestrator = self.orchestrator;
        let mut ctx = self.context();

        let emission = orchestrator.emit(&mut ctx, delta_seconds, &input);
        let initiators: BTreeSet<ActorId> = ctx
            .world
            .actors_with_pending()
            .into_iter()
            .chain(emission.messaged.iter().copied())
            .collect();
        let initiators: Vec<ActorId> = initiators.into_iter().collect();
        let report = pipeline.process(&mut ctx, &initiators);

        let unclaimed_responses = self.broker.discard_unclaimed();
        let purged = self.world.purge_deleted();

        debug!(
            tick = self.tick,
            initiators = initiators.len(),
            state_changed = report.state_changed,
            resolved = report.resolved,
            dropped = report.dropped.len(),
            "tick_processed"
        );

        TickReport {
            tick: self.tick,
            emission,
            pipeline: report,
            unclaimed_responses,
            purged,
        }
    }

    pub fn drain_events(&mut self) -> Vec<PresentationEvent> {
        self.world.drain_events()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::actor::{Actor, ActorDesc, Capability, CoordinateHolder};
    use crate::sim::behavior::builtin::{
        self, ANIMATION, BUFFERED_MOVEMENT, MOVEMENT, PUPPETEER, PUSHABLE,
    };
    use crate::sim::collision::{Body, CollisionCategory};
    use crate::sim::grid::{Direction, Grid, GridCoord, Vec2};
    use crate::sim::input::{Key, KeyRecord};

    fn block_holder() -> CoordinateHolder {
        CoordinateHolder::new(Body::new(CollisionCategory::Block))
    }

    fn row_world() -> (World, ActorId, ActorId) {
        let mut world = World::new(Grid::new(10, 1).expect("grid"));
        let unit = world
            .spawn(
                ActorDesc::new()
                    .named("u")
                    .with_behavior(MOVEMENT)
                    .with_behavior(PUSHABLE)
                    .with_capability(Capability::Unit)
                    .with_coordinate_holder(block_holder())
                    .at(GridCoord::new(0, 0)),
            )
            .expect("unit");
        let crate_id = world
            .spawn(
                ActorDesc::new()
                    .named("crate")
                    .with_behavior(PUSHABLE)
                    .with_coordinate_holder(block_holder())
                    .at(GridCoord::new(1, 0)),
            )
            .expect("crate");
        (world, unit, crate_id)
    }

    fn coords(sim: &Simulation, actor: ActorId) -> Option<GridCoord> {
        sim.world().actor(actor).and_then(Actor::coordinates)
    }

    #[test]
    fn empty_tick_changes_nothing() {
        let (world, _, _) = row_world();
        let mut sim = Simulation::with_builtins(world).expect("simulation");
        sim.drain_events();

        let first = sim.process_tick(0.1, TickInput::empty());
        let second = sim.process_tick(0.1, TickInput::empty());

        assert!(!first.state_changed());
        assert!(!second.state_changed());
        assert_eq!(second.tick, 2);
        assert!(sim.drain_events().is_empty());
    }

    #[test]
    fn sent_intention_resolves_on_next_tick() {
        let (world, unit, crate_id) = row_world();
        let mut sim = Simulation::with_builtins(world).expect("simulation");
        sim.drain_events();

        sim.send_message(
            unit,
            MessageType::IntentionToMove,
            Payload::Move {
                direction: Direction::Right,
            },
        )
        .expect("send");
        let report = sim.process_tick(0.1, TickInput::empty());

        assert!(report.state_changed());
        assert_eq!(coords(&sim, crate_id), Some(GridCoord::new(2, 0)));
        assert_eq!(coords(&sim, unit), Some(GridCoord::new(1, 0)));
        let moved: Vec<ActorId> = sim
            .drain_events()
            .iter()
            .map(PresentationEvent::actor)
            .collect();
        assert_eq!(moved, vec![crate_id, unit]);
    }

    #[test]
    fn puppeteer_input_pushes_through_unit() {
        let (mut world, unit, crate_id) = row_world();
        let player = world
            .spawn(
                ActorDesc::new()
                    .named("player")
                    .with_behavior(PUPPETEER)
                    .with_capability(Capability::Puppeteer),
            )
            .expect("player");
        builtin::assign_puppet(world.actor_mut(player).expect("player"), unit);
        let mut sim = Simulation::with_builtins(world).expect("simulation");

        let input = TickInput::empty().with_record(player, KeyRecord::pressed(5, Key::Right));
        let report = sim.process_tick(0.1, input);

        assert!(report.state_changed());
        assert_eq!(report.emission.messaged, vec![player]);
        assert_eq!(coords(&sim, unit), Some(GridCoord::new(1, 0)));
        assert_eq!(coords(&sim, crate_id), Some(GridCoord::new(2, 0)));
        assert!(sim.world().actors_with_pending().is_empty());
    }

    #[test]
    fn buffered_mover_advances_across_ticks() {
        let mut world = World::new(Grid::new(10, 1).expect("grid"));
        let runner = world
            .spawn(
                ActorDesc::new()
                    .with_behavior(BUFFERED_MOVEMENT)
                    .with_coordinate_holder(block_holder().with_intent_velocity(Vec2::new(2.0, 0.0)))
                    .at(GridCoord::new(0, 0)),
            )
            .expect("runner");
        let mut sim = Simulation::with_builtins(world).expect("simulation");

        for _ in 0..4 {
            sim.process_tick(0.25, TickInput::empty());
        }

        assert_eq!(coords(&sim, runner), Some(GridCoord::new(2, 0)));
    }

    #[test]
    fn tiny_animation_frames_do_not_stall_the_tick() {
        let mut world = World::new(Grid::new(1, 1).expect("grid"));
        let strobe = world
            .spawn(ActorDesc::new().named("strobe").with_behavior(ANIMATION))
            .expect("strobe");
        builtin::set_animation(
            world.actor_mut(strobe).expect("strobe"),
            builtin::AnimationState::new("flash", 2, 1e-10),
        );
        let mut sim = Simulation::with_builtins(world).expect("simulation");

        let report = sim.process_tick(0.05, TickInput::empty());

        assert_eq!(report.emission.messaged, vec![strobe]);
        assert!(report.pipeline.dropped.is_empty());
    }

    #[test]
    fn deleted_actors_are_purged_at_tick_end() {
        let (world, unit, _) = row_world();
        let mut sim = Simulation::with_builtins(world).expect("simulation");
        sim.world_mut().delete(unit).expect("delete");

        let report = sim.process_tick(0.1, TickInput::empty());

        assert_eq!(report.purged, 1);
        assert!(sim.world().find_by_name("u").is_none());
        assert_eq!(sim.world().grid().membership_count(unit), 0);
    }

    #[test]
    fn orchestrator_name_is_reserved() {
        let mut world = World::new(Grid::new(1, 1).expect("grid"));
        world
            .spawn(ActorDesc::new().named(crate::sim::orchestrator::ORCHESTRATOR_NAME))
            .expect("squatter");

        let result = Simulation::with_builtins(world);

        assert!(matches!(result, Err(WorldError::DuplicateName(_))));
    }
}
