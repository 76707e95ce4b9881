use std::collections::BTreeSet;

use tracing::{debug, warn};

use super::action::{requeue_position, Action, ActionQueue};
use super::actor::ActorId;
use super::behavior::{resolve_action, BehaviorId};
use super::context::SimContext;

pub const MAX_RECURSION_DEPTH: u32 = 5;
pub const MAX_ACTION_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    pub max_recursion_depth: u32,
    pub max_action_attempts: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_recursion_depth: MAX_RECURSION_DEPTH,
            max_action_attempts: MAX_ACTION_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedAction {
    pub receiver: ActorId,
    pub behavior: BehaviorId,
    pub method: &'static str,
    pub attempts: u32,
}

impl DroppedAction {
    fn from_action(action: &Action) -> Self {
        Self {
            receiver: action.receiver,
            behavior: action.behavior,
            method: action.method,
            attempts: action.attempts(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    /// At least one action resolved somewhere in the recursive tree.
    pub state_changed: bool,
    pub resolved: u32,
    pub failed_attempts: u32,
    pub dropped: Vec<DroppedAction>,
    /// Actors a capped flush left holding pending actions at the end of the run.
    pub deferred_owners: BTreeSet<ActorId>,
    /// Pending actions those actors still hold when the run ends.
    pub deferred_at_cap: u32,
    pub deepest_level: u32,
}

/// Drains and resolves actor pending queues for one tick.
///
/// Each processing queue is built by swapping actors' pending queues for empty
/// ones, so anything a handler queues while resolving waits for the next
/// recursive flush. Unresolved actions are retried until they reach the
/// attempt limit; flushes stop at the recursion cap and leave work pending.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandPipeline {
    config: PipelineConfig,
}

impl CommandPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> PipelineConfig {
        self.config
    }

    pub fn process(&self, ctx: &mut SimContext<'_>, initiators: &[ActorId]) -> PipelineReport {
        let mut report = PipelineReport::default();
        let mut queue = ActionQueue::new();
        for &initiator in initiators {
            let mut pending = ctx.world.take_pending(initiator);
            queue.append(&mut pending);
        }
        if queue.is_empty() {
            return report;
        }

        debug!(
            initiators = initiators.len(),
            actions = queue.len(),
            "pipeline_started"
        );
        self.resolve_queue(ctx, queue, 0, &mut report);
        report
            .deferred_owners
            .retain(|owner| ctx.world.has_pending(*owner));
        let waiting: usize = report
            .deferred_owners
            .iter()
            .filter_map(|owner| ctx.world.actor(*owner))
            .map(|actor| actor.pending_actions().len())
            .sum();
        report.deferred_at_cap = u32::try_from(waiting).unwrap_or(u32::MAX);
        report
    }

    /// Resolves `actor`'s own pending actions one level deeper. Returns whether
    /// the flush ran; at the cap the actions stay queued on the actor.
    fn flush(
        &self,
        ctx: &mut SimContext<'_>,
        actor: ActorId,
        depth: u32,
        report: &mut PipelineReport,
    ) -> bool {
        if depth >= self.config.max_recursion_depth {
            if ctx.world.has_pending(actor) && report.deferred_owners.insert(actor) {
                debug!(actor = %actor, depth, "flush_deferred_at_cap");
            }
            return false;
        }

        let queue = ctx.world.take_pending(actor);
        if !queue.is_empty() {
            self.resolve_queue(ctx, queue, depth, report);
        }
        true
    }

    fn flush_all(&self, ctx: &mut SimContext<'_>, depth: u32, report: &mut PipelineReport) {
        for actor in ctx.world.actors_with_pending() {
            self.flush(ctx, actor, depth, report);
        }
    }

    fn resolve_queue(
        &self,
        ctx: &mut SimContext<'_>,
        mut queue: ActionQueue,
        depth: u32,
        report: &mut PipelineReport,
    ) {
        report.deepest_level = report.deepest_level.max(depth);

        while let Some(mut action) = queue.pop_front() {
            if action.attempts() >= self.config.max_action_attempts {
                warn!(
                    actor = %action.receiver,
                    behavior = %action.behavior,
                    method = action.method,
                    attempts = action.attempts(),
                    "action_dropped"
                );
                report.dropped.push(DroppedAction::from_action(&action));
                continue;
            }

            let receiver = action.receiver;
            if ctx.world.has_pending(receiver) {
                self.flush(ctx, receiver, depth + 1, report);
            }

            let outcome = resolve_action(ctx, &action);
            let resolved = outcome.is_resolved();
            action.record_attempt(resolved);
            debug!(
                actor = %receiver,
                behavior = %action.behavior,
                method = action.method,
                attempt = action.attempts(),
                outcome = ?outcome,
                depth,
                "action_attempted"
            );

            if resolved {
                report.resolved += 1;
                report.state_changed = true;
            } else {
                report.failed_attempts += 1;
                let position = requeue_position(ctx.world.has_pending(receiver));
                queue.requeue(action, position);
            }

            self.flush_all(ctx, depth + 1, report);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::actor::{Actor, ActorDesc, Capability, CoordinateHolder};
    use crate::sim::behavior::builtin::{self, MOVEMENT, PUSHABLE};
    use crate::sim::behavior::{Behavior, BehaviorMethod, BehaviorRegistry, HandlerEntry, Route};
    use crate::sim::broker::MessageBroker;
    use crate::sim::collision::{Body, CollisionCategory};
    use crate::sim::grid::{Direction, Grid, GridCoord};
    use crate::sim::message::{Message, MessageType, Payload};
    use crate::sim::world::World;

    const STUBBORN: BehaviorId = BehaviorId("behavior.test_stubborn");
    const PING: BehaviorId = BehaviorId("behavior.test_ping");

    const STUBBORN_HANDLERS: &[HandlerEntry] = &[HandlerEntry {
        message_type: MessageType::IntentionToMove,
        routes: &[Route {
            capability: Capability::Actor,
            method: "refuse",
        }],
    }];

    const PING_HANDLERS: &[HandlerEntry] = &[HandlerEntry {
        message_type: MessageType::PushedBy,
        routes: &[Route {
            capability: Capability::Actor,
            method: "ping",
        }],
    }];

    struct Stubborn;

    impl Behavior for Stubborn {
        fn id(&self) -> BehaviorId {
            STUBBORN
        }

        fn handlers(&self) -> &'static [HandlerEntry] {
            STUBBORN_HANDLERS
        }

        fn method(&self, name: &str) -> Option<BehaviorMethod> {
            match name {
                "refuse" => Some(refuse),
                _ => None,
            }
        }
    }

    fn refuse(_ctx: &mut SimContext<'_>, _actor: ActorId, _payload: &Payload) -> bool {
        false
    }

    /// Every ping answers by pinging the partner back: an endless A/B chain.
    struct Ping;

    impl Behavior for Ping {
        fn id(&self) -> BehaviorId {
            PING
        }

        fn handlers(&self) -> &'static [HandlerEntry] {
            PING_HANDLERS
        }

        fn method(&self, name: &str) -> Option<BehaviorMethod> {
            match name {
                "ping" => Some(ping),
                _ => None,
            }
        }
    }

    fn ping(ctx: &mut SimContext<'_>, actor: ActorId, payload: &Payload) -> bool {
        let partner_name = match ctx.world.actor(actor).map(Actor::name) {
            Some("a") => "b",
            _ => "a",
        };
        let Some(partner) = ctx.world.find_by_name(partner_name) else {
            return false;
        };
        ctx.request_into_pending(actor, partner, MessageType::PushedBy, payload.clone())
            .is_ok()
    }

    struct Harness {
        world: World,
        registry: BehaviorRegistry,
        broker: MessageBroker,
        pipeline: CommandPipeline,
    }

    impl Harness {
        fn new(width: u32, height: u32) -> Self {
            let mut registry = BehaviorRegistry::with_builtins();
            registry
                .register(STUBBORN, || Box::new(Stubborn))
                .expect("register stubborn");
            registry
                .register(PING, || Box::new(Ping))
                .expect("register ping");
            Self {
                world: World::new(Grid::new(width, height).expect("grid")),
                registry,
                broker: MessageBroker::default(),
                pipeline: CommandPipeline::default(),
            }
        }

        fn spawn(&mut self, desc: ActorDesc) -> ActorId {
            self.world.spawn(desc).expect("spawn")
        }

        fn unit(&mut self, name: &str, at: GridCoord, push_force: u32) -> ActorId {
            let id = self.spawn(
                ActorDesc::new()
                    .named(name)
                    .with_behavior(MOVEMENT)
                    .with_behavior(PUSHABLE)
                    .with_capability(Capability::Unit)
                    .with_coordinate_holder(CoordinateHolder::new(Body::new(
                        CollisionCategory::Block,
                    )))
                    .at(at),
            );
            builtin::set_push_force(self.world.actor_mut(id).expect("unit"), push_force);
            id
        }

        /// Queues the responder's actions on its own pending queue.
        fn deliver(&mut self, responder: ActorId, message_type: MessageType, payload: Payload) {
            let message = Message::new(responder, message_type, payload);
            self.broker
                .send_message(&mut self.world, &self.registry, &message, responder, true)
                .expect("deliver");
        }

        fn tick(&mut self) -> PipelineReport {
            let initiators = self.world.actors_with_pending();
            let mut ctx = SimContext::new(&mut self.world, &self.registry, &mut self.broker);
            self.pipeline.process(&mut ctx, &initiators)
        }

        fn coords(&self, actor: ActorId) -> Option<GridCoord> {
            self.world.actor(actor).and_then(Actor::coordinates)
        }
    }

    fn move_right() -> Payload {
        Payload::Move {
            direction: Direction::Right,
        }
    }

    #[test]
    fn no_pending_actions_means_no_state_change() {
        let mut harness = Harness::new(4, 1);
        harness.unit("u", GridCoord::new(0, 0), 1);

        let report = harness.tick();

        assert_eq!(report, PipelineReport::default());
        assert!(!report.state_changed);
    }

    #[test]
    fn failing_action_is_attempted_twice_then_dropped() {
        let mut harness = Harness::new(1, 1);
        let stubborn = harness.spawn(ActorDesc::new().named("s").with_behavior(STUBBORN));
        harness.deliver(stubborn, MessageType::IntentionToMove, move_right());

        let report = harness.tick();

        assert!(!report.state_changed);
        assert_eq!(report.failed_attempts, MAX_ACTION_ATTEMPTS);
        assert_eq!(
            report.dropped,
            vec![DroppedAction {
                receiver: stubborn,
                behavior: STUBBORN,
                method: "refuse",
                attempts: MAX_ACTION_ATTEMPTS,
            }]
        );
        assert!(!harness.world.has_pending(stubborn));
        assert_eq!(harness.tick(), PipelineReport::default());
    }

    #[test]
    fn cyclic_chain_stops_at_recursion_cap() {
        let mut harness = Harness::new(1, 1);
        let a = harness.spawn(ActorDesc::new().named("a").with_behavior(PING));
        harness.spawn(ActorDesc::new().named("b").with_behavior(PING));
        harness.deliver(
            a,
            MessageType::PushedBy,
            Payload::Push {
                direction: Direction::Right,
                force: 1,
            },
        );

        let report = harness.tick();

        assert!(report.state_changed);
        assert_eq!(report.deepest_level, MAX_RECURSION_DEPTH - 1);
        assert!(report.dropped.is_empty());
        let pending = harness.world.actors_with_pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(report.deferred_owners, pending.iter().copied().collect::<BTreeSet<_>>());
        let left_in_place = harness
            .world
            .actor(pending[0])
            .expect("deferred owner")
            .pending_actions()
            .len();
        assert_eq!(report.deferred_at_cap as usize, left_in_place);
    }

    #[test]
    fn push_chain_moves_blocker_then_mover() {
        let mut harness = Harness::new(10, 1);
        let u = harness.unit("u", GridCoord::new(0, 0), 1);
        let v = harness.unit("v", GridCoord::new(1, 0), 1);
        harness.deliver(u, MessageType::IntentionToMove, move_right());

        let report = harness.tick();

        assert!(report.state_changed);
        assert_eq!(harness.coords(v), Some(GridCoord::new(2, 0)));
        assert_eq!(harness.coords(u), Some(GridCoord::new(1, 0)));
        assert_eq!(report.resolved, 2);
        assert_eq!(report.failed_attempts, 1);
        assert!(report.dropped.is_empty());
        assert!(harness.world.actors_with_pending().is_empty());
    }

    #[test]
    fn zero_force_leaves_both_units_in_place() {
        let mut harness = Harness::new(10, 1);
        let u = harness.unit("u", GridCoord::new(0, 0), 0);
        let v = harness.unit("v", GridCoord::new(1, 0), 1);
        harness.deliver(u, MessageType::IntentionToMove, move_right());

        let report = harness.tick();

        assert!(!report.state_changed);
        assert_eq!(harness.coords(u), Some(GridCoord::new(0, 0)));
        assert_eq!(harness.coords(v), Some(GridCoord::new(1, 0)));
        assert_eq!(report.dropped.len(), 1);
        assert_eq!(harness.world.grid().membership_count(u), 1);
    }

    #[test]
    fn push_force_runs_out_down_a_row() {
        let mut harness = Harness::new(10, 1);
        let u = harness.unit("u", GridCoord::new(0, 0), 1);
        let v = harness.unit("v", GridCoord::new(1, 0), 1);
        let w = harness.unit("w", GridCoord::new(2, 0), 1);
        harness.deliver(u, MessageType::IntentionToMove, move_right());

        let report = harness.tick();

        assert!(!report.state_changed);
        assert_eq!(harness.coords(u), Some(GridCoord::new(0, 0)));
        assert_eq!(harness.coords(v), Some(GridCoord::new(1, 0)));
        assert_eq!(harness.coords(w), Some(GridCoord::new(2, 0)));
    }

    #[test]
    fn stronger_push_moves_whole_row() {
        let mut harness = Harness::new(10, 1);
        let u = harness.unit("u", GridCoord::new(0, 0), 2);
        let v = harness.unit("v", GridCoord::new(1, 0), 1);
        let w = harness.unit("w", GridCoord::new(2, 0), 1);
        harness.deliver(u, MessageType::IntentionToMove, move_right());

        let report = harness.tick();

        assert!(report.state_changed);
        assert_eq!(harness.coords(w), Some(GridCoord::new(3, 0)));
        assert_eq!(harness.coords(v), Some(GridCoord::new(2, 0)));
        assert_eq!(harness.coords(u), Some(GridCoord::new(1, 0)));
    }

    #[test]
    fn requeued_action_retries_after_receivers_follow_ups() {
        let mut harness = Harness::new(10, 1);
        let u = harness.unit("u", GridCoord::new(0, 0), 1);
        let v = harness.unit("v", GridCoord::new(1, 0), 1);
        let bystander = harness.unit("x", GridCoord::new(5, 0), 1);
        harness.deliver(u, MessageType::IntentionToMove, move_right());
        harness.deliver(bystander, MessageType::IntentionToMove, move_right());

        let report = harness.tick();

        assert_eq!(report.resolved, 3);
        assert_eq!(harness.coords(u), Some(GridCoord::new(1, 0)));
        assert_eq!(harness.coords(v), Some(GridCoord::new(2, 0)));
        assert_eq!(harness.coords(bystander), Some(GridCoord::new(6, 0)));
    }

    #[test]
    fn actions_for_deleted_receivers_are_dropped() {
        let mut harness = Harness::new(4, 1);
        let owner = harness.unit("u", GridCoord::new(0, 0), 1);
        let target = harness.unit("v", GridCoord::new(2, 0), 1);
        harness
            .world
            .actor_mut(owner)
            .expect("owner")
            .pending_actions_mut()
            .push_back(Action::new(target, MOVEMENT, "step", move_right()));
        harness.world.delete(target).expect("delete");

        let report = harness.tick();

        assert!(!report.state_changed);
        assert_eq!(report.failed_attempts, MAX_ACTION_ATTEMPTS);
        assert_eq!(report.dropped.len(), 1);
        assert_eq!(report.dropped[0].receiver, target);
    }
}
