use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

use super::behavior::BehaviorId;

/// Per-actor mutable records owned by behaviors.
///
/// Entries are keyed by `(BehaviorId, TypeId)` so a behavior can only ever get
/// back the record type it stored.
#[derive(Default)]
pub struct BehaviorStateStore {
    entries: HashMap<(BehaviorId, TypeId), Box<dyn Any>>,
}

impl BehaviorStateStore {
    pub fn get<T: Any>(&self, behavior: BehaviorId) -> Option<&T> {
        self.entries
            .get(&(behavior, TypeId::of::<T>()))
            .and_then(|entry| entry.downcast_ref::<T>())
    }

    /// Returns the record for `behavior`, inserting `T::default()` first if absent.
    pub fn get_mut<T: Any + Default>(&mut self, behavior: BehaviorId) -> &mut T {
        self.entries
            .entry((behavior, TypeId::of::<T>()))
            .or_insert_with(|| Box::new(T::default()))
            .downcast_mut::<T>()
            .unwrap_or_else(|| unreachable!("state entries are keyed by their TypeId"))
    }

    pub fn insert<T: Any>(&mut self, behavior: BehaviorId, value: T) {
        self.entries
            .insert((behavior, TypeId::of::<T>()), Box::new(value));
    }

    pub fn remove<T: Any>(&mut self, behavior: BehaviorId) -> Option<T> {
        self.entries
            .remove(&(behavior, TypeId::of::<T>()))
            .and_then(|entry| entry.downcast::<T>().ok())
            .map(|boxed| *boxed)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for BehaviorStateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut behaviors: Vec<&str> = self.entries.keys().map(|(id, _)| id.0).collect();
        behaviors.sort_unstable();
        f.debug_struct("BehaviorStateStore")
            .field("behaviors", &behaviors)
            .finish()
    }
}
