use std::cell::OnceCell;
use std::collections::HashMap;
use std::fmt;

use thiserror::Error;
use tracing::{debug, warn};

use super::action::{Action, ActionQueue};
use super::actor::{Actor, ActorId, Capability};
use super::context::SimContext;
use super::message::{DispatchError, MessageBody, MessageType, Payload};

pub mod builtin;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BehaviorId(pub &'static str);

impl fmt::Display for BehaviorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Bound behavior method. Returns whether the action was handled.
pub type BehaviorMethod = fn(&mut SimContext<'_>, ActorId, &Payload) -> bool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub capability: Capability,
    pub method: &'static str,
}

/// One row of a behavior's dispatch table. Within a row the first route whose
/// capability the receiver has wins; every row for the message type fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerEntry {
    pub message_type: MessageType,
    pub routes: &'static [Route],
}

pub trait Behavior {
    fn id(&self) -> BehaviorId;
    fn handlers(&self) -> &'static [HandlerEntry];
    fn method(&self, name: &str) -> Option<BehaviorMethod>;
}

pub type BehaviorFactory = fn() -> Box<dyn Behavior>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("behavior `{0}` is already registered")]
    Duplicate(BehaviorId),
}

struct RegistrySlot {
    factory: BehaviorFactory,
    instance: OnceCell<Box<dyn Behavior>>,
}

/// Maps behavior ids to one shared instance each, built on first use.
///
/// Registration happens while building the registry; afterwards it is only
/// read, through `&self`.
#[derive(Default)]
pub struct BehaviorRegistry {
    slots: HashMap<BehaviorId, RegistrySlot>,
}

impl BehaviorRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        builtin::register_builtins(&mut registry);
        registry
    }

    pub fn register(
        &mut self,
        id: BehaviorId,
        factory: BehaviorFactory,
    ) -> Result<(), RegistryError> {
        if self.slots.contains_key(&id) {
            return Err(RegistryError::Duplicate(id));
        }
        self.slots.insert(
            id,
            RegistrySlot {
                factory,
                instance: OnceCell::new(),
            },
        );
        Ok(())
    }

    pub fn contains(&self, id: BehaviorId) -> bool {
        self.slots.contains_key(&id)
    }

    pub fn is_loaded(&self, id: BehaviorId) -> bool {
        self.slots
            .get(&id)
            .is_some_and(|slot| slot.instance.get().is_some())
    }

    pub fn resolve(&self, id: BehaviorId) -> Option<&dyn Behavior> {
        let slot = self.slots.get(&id)?;
        let instance = slot.instance.get_or_init(|| {
            debug!(behavior = %id, "behavior_loaded");
            (slot.factory)()
        });
        Some(instance.as_ref())
    }

    pub fn ids(&self) -> Vec<BehaviorId> {
        let mut ids: Vec<_> = self.slots.keys().copied().collect();
        ids.sort();
        ids
    }
}

impl fmt::Debug for BehaviorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BehaviorRegistry")
            .field("behaviors", &self.ids())
            .finish()
    }
}

fn matching_routes<'r>(
    registry: &'r BehaviorRegistry,
    actor: &'r Actor,
    message_type: MessageType,
) -> impl Iterator<Item = (BehaviorId, &'static Route)> + 'r {
    actor.behaviors().iter().flat_map(move |behavior_id| {
        let handlers: &'static [HandlerEntry] = match registry.resolve(*behavior_id) {
            Some(behavior) => behavior.handlers(),
            None => {
                warn!(
                    actor = %actor.id(),
                    behavior = %behavior_id,
                    "behavior_not_registered"
                );
                &[]
            }
        };
        handlers
            .iter()
            .filter(move |entry| entry.message_type == message_type)
            .filter_map(move |entry| {
                entry
                    .routes
                    .iter()
                    .find(|route| actor.has_capability(route.capability))
                    .map(|route| (*behavior_id, route))
            })
    })
}

/// Builds the actions `actor` produces for `body`. The payload contract is
/// checked before any behavior is consulted.
pub fn on_message(
    registry: &BehaviorRegistry,
    actor: &Actor,
    body: &MessageBody,
) -> Result<ActionQueue, DispatchError> {
    body.check_contract(actor.id())?;
    Ok(matching_routes(registry, actor, body.message_type)
        .map(|(behavior, route)| {
            Action::new(actor.id(), behavior, route.method, body.payload.clone())
        })
        .collect())
}

pub fn can_respond_to(
    registry: &BehaviorRegistry,
    actor: &Actor,
    message_type: MessageType,
) -> bool {
    matching_routes(registry, actor, message_type)
        .next()
        .is_some()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveOutcome {
    Handled,
    Declined,
    ReceiverUnavailable,
    MissingBehavior,
    MissingMethod,
}

impl ResolveOutcome {
    pub fn is_resolved(self) -> bool {
        self == Self::Handled
    }
}

pub fn resolve_action(ctx: &mut SimContext<'_>, action: &Action) -> ResolveOutcome {
    let Some(actor) = ctx.world.actor(action.receiver).filter(|actor| actor.is_live()) else {
        return ResolveOutcome::ReceiverUnavailable;
    };
    if !actor.has_behavior(action.behavior) {
        debug!(actor = %action.receiver, behavior = %action.behavior, "behavior_not_attached");
        return ResolveOutcome::MissingBehavior;
    }
    let registry = ctx.registry;
    let Some(behavior) = registry.resolve(action.behavior) else {
        debug!(actor = %action.receiver, behavior = %action.behavior, "behavior_not_registered");
        return ResolveOutcome::MissingBehavior;
    };
    let Some(method) = behavior.method(action.method) else {
        debug!(
            actor = %action.receiver,
            behavior = %action.behavior,
            method = action.method,
            "behavior_method_missing"
        );
        return ResolveOutcome::MissingMethod;
    };

    if method(ctx, action.receiver, &action.payload) {
        ResolveOutcome::Handled
    } else {
        ResolveOutcome::Declined
    }
}
