use super::action::ActionQueue;
use super::actor::ActorId;
use super::behavior::BehaviorRegistry;
use super::broker::{MessageBroker, MessageId};
use super::message::{DispatchError, Message, MessageType, Payload};
use super::world::World;

/// Everything a behavior method can touch while resolving an action.
pub struct SimContext<'a> {
    pub world: &'a mut World,
    pub registry: &'a BehaviorRegistry,
    pub broker: &'a mut MessageBroker,
}

impl<'a> SimContext<'a> {
    pub fn new(
        world: &'a mut World,
        registry: &'a BehaviorRegistry,
        broker: &'a mut MessageBroker,
    ) -> Self {
        Self {
            world,
            registry,
            broker,
        }
    }

    pub fn send(
        &mut self,
        message: &Message,
        responder: ActorId,
        no_response: bool,
    ) -> Result<Option<MessageId>, DispatchError> {
        self.broker
            .send_message(self.world, self.registry, message, responder, no_response)
    }

    /// Nested round-trip: send and immediately harvest the promise.
    /// An undelivered message yields an empty queue.
    pub fn request(
        &mut self,
        sender: ActorId,
        responder: ActorId,
        message_type: MessageType,
        payload: Payload,
    ) -> Result<ActionQueue, DispatchError> {
        let message = Message::new(sender, message_type, payload);
        let response = match self.send(&message, responder, false)? {
            Some(id) => self.broker.get_response(id).unwrap_or_default(),
            None => ActionQueue::new(),
        };
        Ok(response)
    }

    /// Sends to `responder` and appends the harvested actions onto `owner`'s
    /// pending queue. Returns how many actions were appended.
    pub fn request_into_pending(
        &mut self,
        owner: ActorId,
        responder: ActorId,
        message_type: MessageType,
        payload: Payload,
    ) -> Result<usize, DispatchError> {
        let mut harvested = self.request(owner, responder, message_type, payload)?;
        let count = harvested.len();
        if count > 0 {
            self.world.append_pending(owner, &mut harvested);
        }
        Ok(count)
    }
}
