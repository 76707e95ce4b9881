use std::collections::VecDeque;

use super::actor::ActorId;
use super::behavior::BehaviorId;
use super::message::Payload;

/// Deferred unit of work produced when a behavior handles a message.
///
/// Resolving it invokes `behavior.method(receiver, payload)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub receiver: ActorId,
    pub behavior: BehaviorId,
    pub method: &'static str,
    pub payload: Payload,
    attempts: u32,
    resolved: bool,
}

impl Action {
    pub fn new(
        receiver: ActorId,
        behavior: BehaviorId,
        method: &'static str,
        payload: Payload,
    ) -> Self {
        Self {
            receiver,
            behavior,
            method,
            payload,
            attempts: 0,
            resolved: false,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    pub(crate) fn record_attempt(&mut self, resolved: bool) {
        self.attempts = self.attempts.saturating_add(1);
        self.resolved = resolved;
    }
}

/// Double-ended queue of actions. Pending queues on actors and the pipeline's
/// processing queues share this type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionQueue {
    actions: VecDeque<Action>,
}

impl ActionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_front(&mut self, action: Action) {
        self.actions.push_front(action);
    }

    pub fn push_back(&mut self, action: Action) {
        self.actions.push_back(action);
    }

    pub fn pop_front(&mut self) -> Option<Action> {
        self.actions.pop_front()
    }

    pub fn append(&mut self, other: &mut ActionQueue) {
        self.actions.append(&mut other.actions);
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Action> + '_ {
        self.actions.iter()
    }

    pub fn requeue(&mut self, action: Action, position: RequeuePosition) {
        match position {
            RequeuePosition::Front => self.push_front(action),
            RequeuePosition::Back => self.push_back(action),
        }
    }
}

impl FromIterator<Action> for ActionQueue {
    fn from_iter<I: IntoIterator<Item = Action>>(iter: I) -> Self {
        Self {
            actions: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for ActionQueue {
    type Item = Action;
    type IntoIter = std::collections::vec_deque::IntoIter<Action>;

    fn into_iter(self) -> Self::IntoIter {
        self.actions.into_iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequeuePosition {
    Front,
    Back,
}

/// Where an unresolved action goes back into its processing queue.
///
/// A receiver that still has its own pending sub-actions gets its stale action
/// retried first, after those sub-actions; otherwise ordinary FIFO retry.
pub fn requeue_position(receiver_has_pending: bool) -> RequeuePosition {
    if receiver_has_pending {
        RequeuePosition::Front
    } else {
        RequeuePosition::Back
    }
}
