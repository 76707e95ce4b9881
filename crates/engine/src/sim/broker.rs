use std::collections::HashMap;
use std::fmt;

use tracing::{debug, trace};

use super::action::ActionQueue;
use super::actor::ActorId;
use super::behavior::{on_message, BehaviorRegistry};
use super::message::{DispatchError, Message};
use super::world::World;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg-{}", self.0)
    }
}

/// Synchronous request/response store.
///
/// Sending runs the responder's dispatch immediately; the resulting actions
/// (the promise) wait under a message id until the sender pops them once.
#[derive(Debug, Default)]
pub struct MessageBroker {
    next_id: u64,
    responses: HashMap<MessageId, ActionQueue>,
}

impl MessageBroker {
    /// Delivers `message` to `responder` if it is live.
    ///
    /// Returns `Ok(None)` when the responder is inactive, deleted or unknown.
    /// With `no_response` the produced actions go straight onto the
    /// responder's pending queue and no id is issued.
    pub fn send_message(
        &mut self,
        world: &mut World,
        registry: &BehaviorRegistry,
        message: &Message,
        responder: ActorId,
        no_response: bool,
    ) -> Result<Option<MessageId>, DispatchError> {
        let Some(actor) = world.actor(responder).filter(|actor| actor.is_live()) else {
            debug!(
                sender = %message.sender,
                responder = %responder,
                message_type = %message.body.message_type,
                "message_undelivered"
            );
            return Ok(None);
        };

        let mut actions = on_message(registry, actor, &message.body)?;
        trace!(
            sender = %message.sender,
            responder = %responder,
            message_type = %message.body.message_type,
            action_count = actions.len(),
            "message_delivered"
        );

        if no_response {
            world.append_pending(responder, &mut actions);
            return Ok(None);
        }

        let id = MessageId(self.next_id);
        self.next_id = self.next_id.saturating_add(1);
        self.responses.insert(id, actions);
        Ok(Some(id))
    }

    /// Pops the stored promise. A second call for the same id returns `None`.
    pub fn get_response(&mut self, id: MessageId) -> Option<ActionQueue> {
        self.responses.remove(&id)
    }

    pub fn unclaimed_count(&self) -> usize {
        self.responses.len()
    }

    /// Drops promises nobody harvested. Returns how many were discarded.
    pub fn discard_unclaimed(&mut self) -> usize {
        let count = self.responses.len();
        if count > 0 {
            debug!(count, "unclaimed_responses_discarded");
            self.responses.clear();
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::actor::{ActorDesc, Capability, CoordinateHolder};
    use crate::sim::behavior::builtin::MOVEMENT;
    use crate::sim::collision::Body;
    use crate::sim::grid::{Direction, Grid, GridCoord};
    use crate::sim::message::{MessageType, Payload};

    fn setup() -> (World, BehaviorRegistry, ActorId) {
        let mut world = World::new(Grid::new(3, 1).expect("grid"));
        let unit = world
            .spawn(
                ActorDesc::new()
                    .named("unit")
                    .with_behavior(MOVEMENT)
                    .with_capability(Capability::Unit)
                    .with_coordinate_holder(CoordinateHolder::new(Body::default()))
                    .at(GridCoord::new(0, 0)),
            )
            .expect("spawn");
        (world, BehaviorRegistry::with_builtins(), unit)
    }

    fn move_message() -> Message {
        Message::new(
            ActorId(100),
            MessageType::IntentionToMove,
            Payload::Move {
                direction: Direction::Right,
            },
        )
    }

    #[test]
    fn response_is_popped_exactly_once() {
        let (mut world, registry, unit) = setup();
        let mut broker = MessageBroker::default();

        let id = broker
            .send_message(&mut world, &registry, &move_message(), unit, false)
            .expect("send")
            .expect("id");

        let first = broker.get_response(id).expect("response");
        assert_eq!(first.len(), 1);
        assert!(broker.get_response(id).is_none());
    }

    #[test]
    fn message_ids_increase_monotonically() {
        let (mut world, registry, unit) = setup();
        let mut broker = MessageBroker::default();

        let first = broker
            .send_message(&mut world, &registry, &move_message(), unit, false)
            .expect("send")
            .expect("id");
        let second = broker
            .send_message(&mut world, &registry, &move_message(), unit, false)
            .expect("send")
            .expect("id");

        assert!(second > first);
        assert_eq!(broker.unclaimed_count(), 2);
        assert_eq!(broker.discard_unclaimed(), 2);
        assert_eq!(broker.unclaimed_count(), 0);
    }

    #[test]
    fn inactive_responder_gets_nothing() {
        let (mut world, registry, unit) = setup();
        let mut broker = MessageBroker::default();
        world.deactivate(unit).expect("deactivate");

        let result = broker
            .send_message(&mut world, &registry, &move_message(), unit, false)
            .expect("send");

        assert_eq!(result, None);
        assert_eq!(broker.unclaimed_count(), 0);
    }

    #[test]
    fn no_response_queues_onto_responder() {
        let (mut world, registry, unit) = setup();
        let mut broker = MessageBroker::default();

        let result = broker
            .send_message(&mut world, &registry, &move_message(), unit, true)
            .expect("send");

        assert_eq!(result, None);
        assert_eq!(world.actor(unit).expect("unit").pending_actions().len(), 1);
    }

    #[test]
    fn mismatched_payload_is_rejected() {
        let (mut world, registry, unit) = setup();
        let mut broker = MessageBroker::default();
        let message = Message::new(
            ActorId(100),
            MessageType::IntentionToMove,
            Payload::DeltaTime { seconds: 0.5 },
        );

        let error = broker
            .send_message(&mut world, &registry, &message, unit, false)
            .expect_err("mismatch");

        assert!(matches!(error, DispatchError::PayloadMismatch { .. }));
        assert_eq!(broker.unclaimed_count(), 0);
    }
}
