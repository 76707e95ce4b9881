use tracing::{debug, error, warn};

use super::{
    Behavior, BehaviorFactory, BehaviorId, BehaviorMethod, BehaviorRegistry, HandlerEntry, Route,
};
use crate::sim::actor::{Actor, ActorId, Capability};
use crate::sim::context::SimContext;
use crate::sim::grid::{Direction, GridCoord, Vec2};
use crate::sim::message::{MessageType, Payload};
use crate::sim::presentation::PresentationEvent;

pub const MOVEMENT: BehaviorId = BehaviorId("behavior.movement");
pub const PUSHABLE: BehaviorId = BehaviorId("behavior.pushable");
pub const BUFFERED_MOVEMENT: BehaviorId = BehaviorId("behavior.buffered_movement");
pub const CURSOR_PLACEMENT: BehaviorId = BehaviorId("behavior.cursor_placement");
pub const PUPPETEER: BehaviorId = BehaviorId("behavior.puppeteer");
pub const ANIMATION: BehaviorId = BehaviorId("behavior.animation");

pub const DEFAULT_PUSH_FORCE: u32 = 1;

const BUILTINS: [(BehaviorId, BehaviorFactory); 6] = [
    (MOVEMENT, movement),
    (PUSHABLE, pushable),
    (BUFFERED_MOVEMENT, buffered_movement),
    (CURSOR_PLACEMENT, cursor_placement),
    (PUPPETEER, puppeteer),
    (ANIMATION, animation),
];

pub(crate) fn register_builtins(registry: &mut BehaviorRegistry) {
    for (id, factory) in BUILTINS {
        if let Err(error) = registry.register(id, factory) {
            warn!(error = %error, "builtin_registration_skipped");
        }
    }
}

fn movement() -> Box<dyn Behavior> {
    Box::new(Movement)
}

fn pushable() -> Box<dyn Behavior> {
    Box::new(Pushable)
}

fn buffered_movement() -> Box<dyn Behavior> {
    Box::new(BufferedMovement)
}

fn cursor_placement() -> Box<dyn Behavior> {
    Box::new(CursorPlacement)
}

fn puppeteer() -> Box<dyn Behavior> {
    Box::new(Puppeteer)
}

fn animation() -> Box<dyn Behavior> {
    Box::new(Animation)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MovementState {
    /// Force handed to blockers when a step is blocked. Each hop down a push
    /// chain spends one unit; zero means the mover never pushes.
    pub push_force: u32,
}

impl Default for MovementState {
    fn default() -> Self {
        Self {
            push_force: DEFAULT_PUSH_FORCE,
        }
    }
}

/// Fractional cell progress accumulated by continuous movers.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MovementBuffer {
    pub offset: Vec2,
}

impl MovementBuffer {
    pub fn is_empty(&self) -> bool {
        self.offset.is_zero()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlacementIntent {
    pub target: Option<GridCoord>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PuppeteerState {
    pub controlled: Option<ActorId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnimationState {
    pub animation: String,
    pub frame: u32,
    pub frame_count: u32,
    pub frame_seconds: f32,
    elapsed: f32,
}

impl Default for AnimationState {
    fn default() -> Self {
        Self::new("idle", 1, 0.0)
    }
}

impl AnimationState {
    pub fn new(animation: impl Into<String>, frame_count: u32, frame_seconds: f32) -> Self {
        Self {
            animation: animation.into(),
            frame: 0,
            frame_count: frame_count.max(1),
            frame_seconds,
            elapsed: 0.0,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.frame_count > 1 && self.frame_seconds.is_finite() && self.frame_seconds > 0.0
    }

    /// Skips as many whole frames as `seconds` covers in one step, keeping the
    /// remainder for the next call.
    pub fn advance(&mut self, seconds: f32) {
        if !self.is_playing() || !seconds.is_finite() || seconds <= 0.0 {
            return;
        }
        self.elapsed += seconds;
        if self.elapsed < self.frame_seconds {
            return;
        }
        let steps = (self.elapsed / self.frame_seconds).floor();
        self.elapsed = (self.elapsed - steps * self.frame_seconds).clamp(0.0, self.frame_seconds);
        let skipped = (steps as u64 % u64::from(self.frame_count)) as u32;
        self.frame = (self.frame + skipped) % self.frame_count;
    }
}

/// Records a cursor placement request; the orchestrator turns it into an
/// `intention_to_place` message on the next tick.
pub fn request_placement(actor: &mut Actor, target: GridCoord) {
    actor.state_mut::<PlacementIntent>(CURSOR_PLACEMENT).target = Some(target);
}

pub fn take_placement_intent(actor: &mut Actor) -> Option<GridCoord> {
    actor
        .state_mut::<PlacementIntent>(CURSOR_PLACEMENT)
        .target
        .take()
}

pub fn assign_puppet(puppeteer: &mut Actor, controlled: ActorId) {
    puppeteer.state_mut::<PuppeteerState>(PUPPETEER).controlled = Some(controlled);
}

pub fn set_push_force(actor: &mut Actor, push_force: u32) {
    actor.state_mut::<MovementState>(MOVEMENT).push_force = push_force;
}

pub fn set_animation(actor: &mut Actor, state: AnimationState) {
    actor.set_state(ANIMATION, state);
}

pub fn is_animating(actor: &Actor) -> bool {
    actor
        .state::<AnimationState>(ANIMATION)
        .is_some_and(AnimationState::is_playing)
}

pub fn has_buffered_motion(actor: &Actor) -> bool {
    let intent = actor
        .coordinate_holder()
        .map(|holder| holder.intent_velocity)
        .unwrap_or_default();
    let buffered = actor
        .state::<MovementBuffer>(BUFFERED_MOVEMENT)
        .is_some_and(|buffer| !buffer.is_empty());
    !intent.is_zero() || buffered
}

/// Tries one cell in `direction`; when blocked, forwards `pushed_by` with
/// `force` to every blocker and queues their follow-ups on `actor`.
fn step_or_push(
    ctx: &mut SimContext<'_>,
    actor: ActorId,
    direction: Direction,
    force: u32,
) -> bool {
    let Some(from) = ctx.world.actor(actor).and_then(Actor::coordinates) else {
        debug!(actor = %actor, "step_without_coordinates");
        return false;
    };
    let result = match ctx.world.move_actor(actor, from.offset(direction)) {
        Ok(result) => result,
        Err(error) => {
            warn!(actor = %actor, error = %error, "step_failed");
            return false;
        }
    };
    if result.placed {
        return true;
    }
    if force == 0 {
        return false;
    }

    for blocker in result.blocked {
        let push = Payload::Push { direction, force };
        if let Err(error) = ctx.request_into_pending(actor, blocker, MessageType::PushedBy, push) {
            error!(actor = %actor, blocker = %blocker, error = %error, "push_dispatch_failed");
        }
    }
    false
}

struct Movement;

const MOVEMENT_HANDLERS: &[HandlerEntry] = &[HandlerEntry {
    message_type: MessageType::IntentionToMove,
    routes: &[Route {
        capability: Capability::CoordinateHolder,
        method: "step",
    }],
}];

impl Behavior for Movement {
    fn id(&self) -> BehaviorId {
        MOVEMENT
    }

    fn handlers(&self) -> &'static [HandlerEntry] {
        MOVEMENT_HANDLERS
    }

    fn method(&self, name: &str) -> Option<BehaviorMethod> {
        match name {
            "step" => Some(movement_step),
            _ => None,
        }
    }
}

fn movement_step(ctx: &mut SimContext<'_>, actor: ActorId, payload: &Payload) -> bool {
    let Payload::Move { direction } = payload else {
        return false;
    };
    let Some(push_force) = ctx
        .world
        .actor_mut(actor)
        .map(|actor| actor.state_mut::<MovementState>(MOVEMENT).push_force)
    else {
        return false;
    };
    step_or_push(ctx, actor, *direction, push_force)
}

struct Pushable;

const PUSHABLE_HANDLERS: &[HandlerEntry] = &[HandlerEntry {
    message_type: MessageType::PushedBy,
    routes: &[Route {
        capability: Capability::CoordinateHolder,
        method: "yield_to_push",
    }],
}];

impl Behavior for Pushable {
    fn id(&self) -> BehaviorId {
        PUSHABLE
    }

    fn handlers(&self) -> &'static [HandlerEntry] {
        PUSHABLE_HANDLERS
    }

    fn method(&self, name: &str) -> Option<BehaviorMethod> {
        match name {
            "yield_to_push" => Some(pushable_yield),
            _ => None,
        }
    }
}

fn pushable_yield(ctx: &mut SimContext<'_>, actor: ActorId, payload: &Payload) -> bool {
    let Payload::Push { direction, force } = payload else {
        return false;
    };
    if *force == 0 {
        return false;
    }
    step_or_push(ctx, actor, *direction, force - 1)
}

struct BufferedMovement;

const BUFFERED_MOVEMENT_HANDLERS: &[HandlerEntry] = &[HandlerEntry {
    message_type: MessageType::BufferedMove,
    routes: &[Route {
        capability: Capability::CoordinateHolder,
        method: "accumulate",
    }],
}];

impl Behavior for BufferedMovement {
    fn id(&self) -> BehaviorId {
        BUFFERED_MOVEMENT
    }

    fn handlers(&self) -> &'static [HandlerEntry] {
        BUFFERED_MOVEMENT_HANDLERS
    }

    fn method(&self, name: &str) -> Option<BehaviorMethod> {
        match name {
            "accumulate" => Some(buffered_accumulate),
            _ => None,
        }
    }
}

/// Integrates intent velocity into the buffer and spends whole cells. A blocked
/// axis loses its buffered progress; an axis without intent snaps to zero.
fn buffered_accumulate(ctx: &mut SimContext<'_>, actor: ActorId, payload: &Payload) -> bool {
    let Payload::DeltaTime { seconds } = payload else {
        return false;
    };
    let Some(actor_ref) = ctx.world.actor_mut(actor) else {
        return false;
    };
    let Some(holder) = actor_ref.coordinate_holder_mut() else {
        return false;
    };
    let intent = holder.intent_velocity;
    holder.velocity = intent;

    let buffer = actor_ref.state_mut::<MovementBuffer>(BUFFERED_MOVEMENT);
    let mut offset = Vec2 {
        x: if intent.x == 0.0 { 0.0 } else { buffer.offset.x + intent.x * seconds },
        y: if intent.y == 0.0 { 0.0 } else { buffer.offset.y + intent.y * seconds },
    };

    offset.x = spend_axis(ctx, actor, offset.x, |sign| Direction::from_axis_sign(sign, 0));
    offset.y = spend_axis(ctx, actor, offset.y, |sign| Direction::from_axis_sign(0, sign));

    if let Some(actor_ref) = ctx.world.actor_mut(actor) {
        actor_ref.state_mut::<MovementBuffer>(BUFFERED_MOVEMENT).offset = offset;
    }
    true
}

fn spend_axis(
    ctx: &mut SimContext<'_>,
    actor: ActorId,
    mut remaining: f32,
    direction_for: impl Fn(i32) -> Option<Direction>,
) -> f32 {
    while remaining.abs() >= 1.0 {
        let sign = if remaining > 0.0 { 1 } else { -1 };
        let Some(direction) = direction_for(sign) else {
            return 0.0;
        };
        let Some(from) = ctx.world.actor(actor).and_then(Actor::coordinates) else {
            return 0.0;
        };
        match ctx.world.move_actor(actor, from.offset(direction)) {
            Ok(result) if result.placed => remaining -= sign as f32,
            Ok(_) => return 0.0,
            Err(error) => {
                warn!(actor = %actor, error = %error, "buffered_step_failed");
                return 0.0;
            }
        }
    }
    remaining
}

struct CursorPlacement;

const CURSOR_PLACEMENT_HANDLERS: &[HandlerEntry] = &[HandlerEntry {
    message_type: MessageType::IntentionToPlace,
    routes: &[Route {
        capability: Capability::CoordinateHolder,
        method: "place_at",
    }],
}];

impl Behavior for CursorPlacement {
    fn id(&self) -> BehaviorId {
        CURSOR_PLACEMENT
    }

    fn handlers(&self) -> &'static [HandlerEntry] {
        CURSOR_PLACEMENT_HANDLERS
    }

    fn method(&self, name: &str) -> Option<BehaviorMethod> {
        match name {
            "place_at" => Some(cursor_place_at),
            _ => None,
        }
    }
}

fn cursor_place_at(ctx: &mut SimContext<'_>, actor: ActorId, payload: &Payload) -> bool {
    let Payload::Place { target } = payload else {
        return false;
    };
    match ctx.world.place_actor(actor, *target) {
        Ok(result) => result.placed,
        Err(error) => {
            warn!(actor = %actor, error = %error, "cursor_place_failed");
            false
        }
    }
}

struct Puppeteer;

const PUPPETEER_HANDLERS: &[HandlerEntry] = &[HandlerEntry {
    message_type: MessageType::Input,
    routes: &[Route {
        capability: Capability::Puppeteer,
        method: "steer",
    }],
}];

impl Behavior for Puppeteer {
    fn id(&self) -> BehaviorId {
        PUPPETEER
    }

    fn handlers(&self) -> &'static [HandlerEntry] {
        PUPPETEER_HANDLERS
    }

    fn method(&self, name: &str) -> Option<BehaviorMethod> {
        match name {
            "steer" => Some(puppeteer_steer),
            _ => None,
        }
    }
}

/// Turns key-down arrows into `intention_to_move` for the controlled actor.
/// The controlled actor's actions are queued behind the puppeteer.
fn puppeteer_steer(ctx: &mut SimContext<'_>, actor: ActorId, payload: &Payload) -> bool {
    let Payload::Input(records) = payload else {
        return false;
    };
    let Some(controlled) = ctx
        .world
        .actor(actor)
        .and_then(|actor| actor.state::<PuppeteerState>(PUPPETEER))
        .and_then(|state| state.controlled)
    else {
        debug!(actor = %actor, "puppeteer_without_puppet");
        return false;
    };

    let directions: Vec<Direction> = records
        .iter()
        .filter(|record| record.down)
        .filter_map(|record| record.key.direction())
        .collect();
    if directions.is_empty() {
        return true;
    }

    let mut forwarded = 0usize;
    for direction in directions {
        match ctx.request_into_pending(
            actor,
            controlled,
            MessageType::IntentionToMove,
            Payload::Move { direction },
        ) {
            Ok(count) => forwarded += count,
            Err(error) => {
                error!(actor = %actor, controlled = %controlled, error = %error, "steer_dispatch_failed");
            }
        }
    }
    forwarded > 0
}

struct Animation;

const ANIMATION_HANDLERS: &[HandlerEntry] = &[HandlerEntry {
    message_type: MessageType::Animate,
    routes: &[Route {
        capability: Capability::Actor,
        method: "advance",
    }],
}];

impl Behavior for Animation {
    fn id(&self) -> BehaviorId {
        ANIMATION
    }

    fn handlers(&self) -> &'static [HandlerEntry] {
        ANIMATION_HANDLERS
    }

    fn method(&self, name: &str) -> Option<BehaviorMethod> {
        match name {
            "advance" => Some(animation_advance),
            _ => None,
        }
    }
}

fn animation_advance(ctx: &mut SimContext<'_>, actor: ActorId, payload: &Payload) -> bool {
    let Payload::DeltaTime { seconds } = payload else {
        return false;
    };
    let Some(actor_ref) = ctx.world.actor_mut(actor) else {
        return false;
    };
    let state = actor_ref.state_mut::<AnimationState>(ANIMATION);
    if !state.is_playing() {
        return false;
    }
    let previous = state.frame;
    state.advance(*seconds);
    if state.frame != previous {
        let event = PresentationEvent::AnimationChanged {
            actor,
            animation: state.animation.clone(),
            frame: state.frame,
        };
        ctx.world.push_event(event);
    }
    true
}
