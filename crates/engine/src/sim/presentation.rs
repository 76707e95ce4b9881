use serde::Serialize;

use super::actor::{ActorId, ShapeRef};
use super::grid::GridCoord;

/// Fire-and-forget notifications for the presentation layer. The core never
/// reads them back.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PresentationEvent {
    Activated {
        actor: ActorId,
        name: String,
        shape: Option<ShapeRef>,
        coordinates: Option<GridCoord>,
    },
    Deactivated {
        actor: ActorId,
    },
    Placed {
        actor: ActorId,
        coordinates: GridCoord,
        shape: ShapeRef,
    },
    Moved {
        actor: ActorId,
        from: Option<GridCoord>,
        to: GridCoord,
        shape: ShapeRef,
    },
    Removed {
        actor: ActorId,
        from: GridCoord,
    },
    AnimationChanged {
        actor: ActorId,
        animation: String,
        frame: u32,
    },
}

impl PresentationEvent {
    pub fn actor(&self) -> ActorId {
        match self {
            Self::Activated { actor, .. }
            | Self::Deactivated { actor }
            | Self::Placed { actor, .. }
            | Self::Moved { actor, .. }
            | Self::Removed { actor, .. }
            | Self::AnimationChanged { actor, .. } => *actor,
        }
    }
}

/// Consumer of presentation events, e.g. a renderer or a log writer.
pub trait PresentationSink {
    fn present(&mut self, events: &[PresentationEvent]);
}

/// Keeps every event; handy for headless runs and tests.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub events: Vec<PresentationEvent>,
}

impl PresentationSink for RecordingSink {
    fn present(&mut self, events: &[PresentationEvent]) {
        self.events.extend_from_slice(events);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_kind_tag() {
        let event = PresentationEvent::Moved {
            actor: ActorId(2),
            from: Some(GridCoord::new(0, 0)),
            to: GridCoord::new(1, 0),
            shape: ShapeRef::new("unit.knight"),
        };

        let json = serde_json::to_value(&event).expect("serialize");

        assert_eq!(
            json,
            serde_json::json!({
                "kind": "moved",
                "actor": 2,
                "from": { "x": 0, "y": 0 },
                "to": { "x": 1, "y": 0 },
                "shape": "unit.knight",
            })
        );
        assert_eq!(event.actor(), ActorId(2));
    }

    #[test]
    fn recording_sink_keeps_order() {
        let mut sink = RecordingSink::default();
        sink.present(&[
            PresentationEvent::Deactivated { actor: ActorId(1) },
            PresentationEvent::Deactivated { actor: ActorId(2) },
        ]);

        let actors: Vec<_> = sink.events.iter().map(PresentationEvent::actor).collect();
        assert_eq!(actors, [ActorId(1), ActorId(2)]);
    }
}
