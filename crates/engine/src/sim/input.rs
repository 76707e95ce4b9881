use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::actor::ActorId;
use super::grid::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Key {
    Up,
    Down,
    Left,
    Right,
    Confirm,
    Cancel,
}

impl Key {
    pub fn direction(self) -> Option<Direction> {
        match self {
            Key::Up => Some(Direction::Up),
            Key::Down => Some(Direction::Down),
            Key::Left => Some(Direction::Left),
            Key::Right => Some(Direction::Right),
            Key::Confirm | Key::Cancel => None,
        }
    }
}

/// One key transition as reported by the input layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    pub timestamp_ms: u64,
    pub key: Key,
    pub down: bool,
}

impl KeyRecord {
    pub const fn pressed(timestamp_ms: u64, key: Key) -> Self {
        Self {
            timestamp_ms,
            key,
            down: true,
        }
    }

    pub const fn released(timestamp_ms: u64, key: Key) -> Self {
        Self {
            timestamp_ms,
            key,
            down: false,
        }
    }
}

/// Key records for a single tick, keyed by the actor that should receive them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickInput {
    records_by_actor: BTreeMap<ActorId, Vec<KeyRecord>>,
}

impl TickInput {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_record(mut self, actor: ActorId, record: KeyRecord) -> Self {
        self.push(actor, record);
        self
    }

    pub fn push(&mut self, actor: ActorId, record: KeyRecord) {
        self.records_by_actor.entry(actor).or_default().push(record);
    }

    pub fn is_empty(&self) -> bool {
        self.records_by_actor.is_empty()
    }

    pub fn records_by_actor(&self) -> impl Iterator<Item = (ActorId, &[KeyRecord])> + '_ {
        self.records_by_actor
            .iter()
            .map(|(actor, records)| (*actor, records.as_slice()))
    }
}

/// Collects key records between ticks and hands them over once per tick.
#[derive(Debug, Default, PartialEq)]
pub struct InputBuffer {
    pending: TickInput,
}

impl InputBuffer {
    pub fn record(&mut self, actor: ActorId, record: KeyRecord) {
        self.pending.push(actor, record);
    }

    /// Records come out sorted by timestamp per actor; the buffer is empty afterwards.
    pub fn take_tick_input(&mut self) -> TickInput {
        let mut input = std::mem::take(&mut self.pending);
        for records in input.records_by_actor.values_mut() {
            records.sort_by_key(|record| record.timestamp_ms);
        }
        input
    }
}
