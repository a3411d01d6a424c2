//! Heterogeneous, type-tagged value bag attached to requests and responses.
//!
//! The original implementation (`kana.hpp`/`request.hpp::context` in the
//! source this engine continues from) used a hand-rolled type-erased store.
//! Rust's `std::any::TypeId` gives the same stable type tag without
//! reflection; this is that restated as a small `TypeMap`.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

/// Stored value didn't match the type requested at the call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("context value does not match the requested type")]
pub struct WrongType;

/// A map from type tag to one value of that type, at most one per type.
#[derive(Default)]
pub struct ContextBag {
    values: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl ContextBag {
    pub fn new() -> Self {
        Self { values: HashMap::new() }
    }

    /// Insert a value, replacing any previous value of the same type.
    pub fn insert<T: Any + Send + Sync>(&mut self, value: T) {
        self.values.insert(TypeId::of::<T>(), Box::new(value));
    }

    pub fn contains<T: Any + Send + Sync>(&self) -> bool {
        self.values.contains_key(&TypeId::of::<T>())
    }

    pub fn get<T: Any + Send + Sync>(&self) -> Result<&T, WrongType> {
        self.values
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
            .ok_or(WrongType)
    }

    pub fn get_mut<T: Any + Send + Sync>(&mut self) -> Result<&mut T, WrongType> {
        self.values
            .get_mut(&TypeId::of::<T>())
            .and_then(|v| v.downcast_mut::<T>())
            .ok_or(WrongType)
    }

    pub fn remove<T: Any + Send + Sync>(&mut self) -> Option<T> {
        self.values
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast::<T>().ok())
            .map(|b| *b)
    }
}

impl fmt::Debug for ContextBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextBag").field("entries", &self.values.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_value() {
        let mut bag = ContextBag::new();
        bag.insert(42u32);
        assert_eq!(*bag.get::<u32>().unwrap(), 42);
    }

    #[test]
    fn wrong_type_is_reported() {
        let mut bag = ContextBag::new();
        bag.insert(42u32);
        assert_eq!(bag.get::<String>().unwrap_err(), WrongType);
    }

    #[test]
    fn remove_takes_ownership() {
        let mut bag = ContextBag::new();
        bag.insert(String::from("stream-id:3"));
        assert_eq!(bag.remove::<String>().unwrap(), "stream-id:3");
        assert!(!bag.contains::<String>());
    }
}
