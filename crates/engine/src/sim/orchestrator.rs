use std::collections::BTreeSet;

use tracing::{debug, error};

use super::actor::{Actor, ActorDesc, ActorId, Capability};
use super::behavior::builtin::{self, CURSOR_PLACEMENT};
use super::behavior::can_respond_to;
use super::context::SimContext;
use super::input::TickInput;
use super::message::{Message, MessageType, Payload};
use super::world::{World, WorldError};

pub const ORCHESTRATOR_NAME: &str = "orchestrator";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmissionReport {
    /// Actors that received at least one message, in id order.
    pub messaged: Vec<ActorId>,
    pub messages_sent: u32,
    pub dispatch_errors: u32,
}

/// Turns a tick's elapsed time and input into messages. It never touches the
/// grid itself; responders queue their actions on their own pending queues.
#[derive(Debug, Clone, Copy)]
pub struct Orchestrator {
    actor: ActorId,
}

impl Orchestrator {
    pub fn spawn(world: &mut World) -> Result<Self, WorldError> {
        let actor = world.spawn(
            ActorDesc::new()
                .named(ORCHESTRATOR_NAME)
                .with_capability(Capability::Orchestrator),
        )?;
        Ok(Self { actor })
    }

    pub fn actor(&self) -> ActorId {
        self.actor
    }

    pub fn emit(
        &self,
        ctx: &mut SimContext<'_>,
        delta_seconds: f32,
        input: &TickInput,
    ) -> EmissionReport {
        let mut emission = Emission::default();

        for (actor, records) in input.records_by_actor() {
            if records.is_empty() {
                continue;
            }
            let is_puppeteer = ctx
                .world
                .actor(actor)
                .is_some_and(|actor| actor.has_capability(Capability::Puppeteer));
            if !is_puppeteer {
                debug!(actor = %actor, "input_for_non_puppeteer_ignored");
                continue;
            }
            self.deliver(
                ctx,
                actor,
                MessageType::Input,
                Payload::Input(records.to_vec()),
                &mut emission,
            );
        }

        let cursors: Vec<ActorId> = live_actors(ctx.world)
            .filter(|actor| actor.has_behavior(CURSOR_PLACEMENT))
            .map(Actor::id)
            .collect();
        for cursor in cursors {
            let Some(target) = ctx.world.actor_mut(cursor).and_then(builtin::take_placement_intent)
            else {
                continue;
            };
            self.deliver(
                ctx,
                cursor,
                MessageType::IntentionToPlace,
                Payload::Place { target },
                &mut emission,
            );
        }

        let movers: Vec<ActorId> = live_actors(ctx.world)
            .filter(|actor| {
                can_respond_to(ctx.registry, actor, MessageType::BufferedMove)
                    && builtin::has_buffered_motion(actor)
            })
            .map(Actor::id)
            .collect();
        for mover in movers {
            self.deliver(
                ctx,
                mover,
                MessageType::BufferedMove,
                Payload::DeltaTime {
                    seconds: delta_seconds,
                },
                &mut emission,
            );
        }

        let animated: Vec<ActorId> = live_actors(ctx.world)
            .filter(|actor| {
                can_respond_to(ctx.registry, actor, MessageType::Animate)
                    && builtin::is_animating(actor)
            })
            .map(Actor::id)
            .collect();
        for actor in animated {
            self.deliver(
                ctx,
                actor,
                MessageType::Animate,
                Payload::DeltaTime {
                    seconds: delta_seconds,
                },
                &mut emission,
            );
        }

        emission.finish()
    }

    fn deliver(
        &self,
        ctx: &mut SimContext<'_>,
        responder: ActorId,
        message_type: MessageType,
        payload: Payload,
        emission: &mut Emission,
    ) {
        let message = Message::new(self.actor, message_type, payload);
        match ctx.send(&message, responder, true) {
            Ok(_) => {
                emission.messaged.insert(responder);
                emission.messages_sent += 1;
            }
            Err(err) => {
                error!(
                    responder = %responder,
                    message_type = %message_type,
                    error = %err,
                    "orchestrator_dispatch_failed"
                );
                emission.dispatch_errors += 1;
            }
        }
    }
}

#[derive(Default)]
struct Emission {
    messaged: BTreeSet<ActorId>,
    messages_sent: u32,
    dispatch_errors: u32,
}

impl Emission {
    fn finish(self) -> EmissionReport {
        EmissionReport {
            messaged: self.messaged.into_iter().collect(),
            messages_sent: self.messages_sent,
            dispatch_errors: self.dispatch_errors,
        }
    }
}

fn live_actors(world: &World) -> impl Iterator<Item = &Actor> + '_ {
    world.actors().filter(|actor| actor.is_live())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::actor::CoordinateHolder;
    use crate::sim::behavior::builtin::{
        AnimationState, ANIMATION, BUFFERED_MOVEMENT, MOVEMENT, PUPPETEER,
    };
    use crate::sim::behavior::BehaviorRegistry;
    use crate::sim::broker::MessageBroker;
    use crate::sim::collision::{Body, CollisionCategory};
    use crate::sim::grid::{Grid, GridCoord, Vec2};
    use crate::sim::input::{Key, KeyRecord};

    struct Harness {
        world: World,
        registry: BehaviorRegistry,
        broker: MessageBroker,
        orchestrator: Orchestrator,
    }

    impl Harness {
        fn new() -> Self {
            let mut world = World::new(Grid::new(6, 6).expect("grid"));
            let orchestrator = Orchestrator::spawn(&mut world).expect("orchestrator");
            Self {
                world,
                registry: BehaviorRegistry::with_builtins(),
                broker: MessageBroker::default(),
                orchestrator,
            }
        }

        fn emit(&mut self, input: &TickInput) -> EmissionReport {
            let mut ctx = SimContext::new(&mut self.world, &self.registry, &mut self.broker);
            self.orchestrator.emit(&mut ctx, 0.5, input)
        }

        fn pending_methods(&self, actor: ActorId) -> Vec<&'static str> {
            self.world
                .actor(actor)
                .expect("actor")
                .pending_actions()
                .iter()
                .map(|action| action.method)
                .collect()
        }
    }

    fn mover(intent: Vec2) -> ActorDesc {
        ActorDesc::new()
            .with_behavior(MOVEMENT)
            .with_behavior(BUFFERED_MOVEMENT)
            .with_capability(Capability::Unit)
            .with_coordinate_holder(
                CoordinateHolder::new(Body::new(CollisionCategory::Block))
                    .with_intent_velocity(intent),
            )
            .at(GridCoord::new(0, 0))
    }

    #[test]
    fn quiet_world_emits_nothing() {
        let mut harness = Harness::new();
        harness.world.spawn(mover(Vec2::ZERO)).expect("idle mover");

        let report = harness.emit(&TickInput::empty());

        assert_eq!(report, EmissionReport::default());
        assert!(harness.world.actors_with_pending().is_empty());
    }

    #[test]
    fn input_goes_only_to_puppeteers() {
        let mut harness = Harness::new();
        let player = harness
            .world
            .spawn(
                ActorDesc::new()
                    .with_behavior(PUPPETEER)
                    .with_capability(Capability::Puppeteer),
            )
            .expect("player");
        let bystander = harness.world.spawn(ActorDesc::new()).expect("bystander");
        let input = TickInput::empty()
            .with_record(player, KeyRecord::pressed(10, Key::Left))
            .with_record(bystander, KeyRecord::pressed(11, Key::Left));

        let report = harness.emit(&input);

        assert_eq!(report.messaged, vec![player]);
        assert_eq!(harness.pending_methods(player), vec!["steer"]);
        assert!(!harness.world.has_pending(bystander));
    }

    #[test]
    fn placement_intent_becomes_message_once() {
        let mut harness = Harness::new();
        let cursor = harness
            .world
            .spawn(
                ActorDesc::new()
                    .with_behavior(CURSOR_PLACEMENT)
                    .with_coordinate_holder(CoordinateHolder::new(Body::new(
                        CollisionCategory::Ignore,
                    ))),
            )
            .expect("cursor");
        builtin::request_placement(
            harness.world.actor_mut(cursor).expect("cursor"),
            GridCoord::new(3, 3),
        );

        let first = harness.emit(&TickInput::empty());
        let second = harness.emit(&TickInput::empty());

        assert_eq!(first.messaged, vec![cursor]);
        assert!(second.messaged.is_empty());
        assert_eq!(harness.pending_methods(cursor), vec!["place_at"]);
    }

    #[test]
    fn buffered_move_and_animation_follow_state() {
        let mut harness = Harness::new();
        let runner = harness
            .world
            .spawn(mover(Vec2::new(1.0, 0.0)))
            .expect("runner");
        let torch = harness
            .world
            .spawn(ActorDesc::new().with_behavior(ANIMATION))
            .expect("torch");
        let still = harness
            .world
            .spawn(ActorDesc::new().with_behavior(ANIMATION))
            .expect("still");
        builtin::set_animation(
            harness.world.actor_mut(torch).expect("torch"),
            AnimationState::new("flicker", 2, 0.25),
        );

        let report = harness.emit(&TickInput::empty());

        assert_eq!(report.messaged, vec![runner, torch]);
        assert_eq!(report.messages_sent, 2);
        assert_eq!(harness.pending_methods(runner), vec!["accumulate"]);
        assert_eq!(harness.pending_methods(torch), vec!["advance"]);
        assert!(!harness.world.has_pending(still));
    }

    #[test]
    fn orchestrator_is_an_actor() {
        let harness = Harness::new();
        let actor = harness
            .world
            .actor(harness.orchestrator.actor())
            .expect("orchestrator actor");

        assert_eq!(actor.name(), ORCHESTRATOR_NAME);
        assert!(actor.has_capability(Capability::Orchestrator));
    }
}
