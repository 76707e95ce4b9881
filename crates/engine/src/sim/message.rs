use std::fmt;

use thiserror::Error;

use super::actor::ActorId;
use super::grid::{Direction, GridCoord};
use super::input::KeyRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MessageType {
    Input,
    IntentionToMove,
    IntentionToPlace,
    BufferedMove,
    Animate,
    PushedBy,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::IntentionToMove => "intention_to_move",
            Self::IntentionToPlace => "intention_to_place",
            Self::BufferedMove => "buffered_move",
            Self::Animate => "animate",
            Self::PushedBy => "pushed_by",
        }
    }

    /// Payload contract for this message type.
    pub fn accepts(self, payload: &Payload) -> bool {
        matches!(
            (self, payload),
            (Self::Input, Payload::Input(_))
                | (Self::IntentionToMove, Payload::Move { .. })
                | (Self::IntentionToPlace, Payload::Place { .. })
                | (Self::BufferedMove, Payload::DeltaTime { .. })
                | (Self::Animate, Payload::DeltaTime { .. })
                | (Self::PushedBy, Payload::Push { .. })
        )
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Input(Vec<KeyRecord>),
    Move { direction: Direction },
    Place { target: GridCoord },
    DeltaTime { seconds: f32 },
    Push { direction: Direction, force: u32 },
}

impl Payload {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Input(_) => "input",
            Self::Move { .. } => "move",
            Self::Place { .. } => "place",
            Self::DeltaTime { .. } => "delta_time",
            Self::Push { .. } => "push",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageBody {
    pub message_type: MessageType,
    pub payload: Payload,
}

impl MessageBody {
    pub fn new(message_type: MessageType, payload: Payload) -> Self {
        Self {
            message_type,
            payload,
        }
    }

    pub fn check_contract(&self, receiver: ActorId) -> Result<(), DispatchError> {
        if self.message_type.accepts(&self.payload) {
            Ok(())
        } else {
            Err(DispatchError::PayloadMismatch {
                message_type: self.message_type,
                payload_kind: self.payload.kind(),
                receiver,
            })
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub sender: ActorId,
    pub body: MessageBody,
}

impl Message {
    pub fn new(sender: ActorId, message_type: MessageType, payload: Payload) -> Self {
        Self {
            sender,
            body: MessageBody::new(message_type, payload),
        }
    }
}

/// Wiring failures between a behavior and its message contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("message `{message_type}` sent to actor {receiver} carries a `{payload_kind}` payload")]
    PayloadMismatch {
        message_type: MessageType,
        payload_kind: &'static str,
        receiver: ActorId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_time_is_shared_by_buffered_move_and_animate() {
        let payload = Payload::DeltaTime { seconds: 0.016 };
        assert!(MessageType::BufferedMove.accepts(&payload));
        assert!(MessageType::Animate.accepts(&payload));
        assert!(!MessageType::PushedBy.accepts(&payload));
    }

    #[test]
    fn contract_violation_is_typed_error() {
        let body = MessageBody::new(
            MessageType::IntentionToMove,
            Payload::Push {
                direction: Direction::Left,
                force: 1,
            },
        );

        let error = body.check_contract(ActorId(4)).expect_err("mismatch");

        assert_eq!(
            error,
            DispatchError::PayloadMismatch {
                message_type: MessageType::IntentionToMove,
                payload_kind: "push",
                receiver: ActorId(4),
            }
        );
        assert!(error.to_string().contains("intention_to_move"));
    }
}
