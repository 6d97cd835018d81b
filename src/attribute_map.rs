//! The per-carrier property map.
//!
//! Each (scope, carrier) pair owns one [`AttributeMap`]. It is an ordinary
//! name -> value map behind a reader-writer lock, kept insertion ordered so
//! that copies and listings are deterministic.
//!
//! The lock is only ever held for the map operation itself. Values that leave
//! the map (replaced, removed or rejected) are handed back to the caller and
//! dropped after the guard is released, because dropping a value runs user
//! code that may touch this very map again.
//!
//! Conditional writes are compare-and-swap operations on value identity
//! ([`PropertyValue::ptr_eq`]): the caller reads a snapshot, decides outside
//! the lock, and commits only if the entry still holds that snapshot.

use alloc::{string::String, vec::Vec};

use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;

use crate::{lock::Lock, value::PropertyValue};

type Entries = IndexMap<String, PropertyValue, FxBuildHasher>;

/// Outcome of [`AttributeMap::compare_exchange`].
pub(crate) enum Exchange {
    /// The entry held the expected value and now holds the new one. Carries
    /// the replaced value.
    Swapped(PropertyValue),
    /// The entry changed in the meantime. Carries the rejected new value.
    Stale(PropertyValue),
}

#[derive(Default)]
pub(crate) struct AttributeMap {
    entries: Lock<Entries>,
}

impl AttributeMap {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn get(&self, name: &str) -> Option<PropertyValue> {
        self.entries.read().get(name).cloned()
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    /// Inserts `value` if `name` is disconnected.
    ///
    /// On failure returns the current value together with the rejected one.
    pub(crate) fn insert_if_absent(
        &self,
        name: &str,
        value: PropertyValue,
    ) -> Result<(), (PropertyValue, PropertyValue)> {
        let mut entries = self.entries.write();
        if let Some(current) = entries.get(name) {
            return Err((current.clone(), value));
        }
        entries.insert(String::from(name), value);
        Ok(())
    }

    /// Connects or overwrites `name`, returning the previous value.
    pub(crate) fn insert(&self, name: &str, value: PropertyValue) -> Option<PropertyValue> {
        let mut entries = self.entries.write();
        match entries.get_mut(name) {
            Some(slot) => Some(core::mem::replace(slot, value)),
            None => {
                entries.insert(String::from(name), value);
                None
            }
        }
    }

    pub(crate) fn remove(&self, name: &str) -> Option<PropertyValue> {
        self.entries.write().shift_remove(name)
    }

    /// Replaces the value of `name` with `new` iff it is still `current`.
    pub(crate) fn compare_exchange(
        &self,
        name: &str,
        current: &PropertyValue,
        new: PropertyValue,
    ) -> Exchange {
        let mut entries = self.entries.write();
        match entries.get_mut(name) {
            Some(slot) if slot.ptr_eq(current) => Exchange::Swapped(core::mem::replace(slot, new)),
            _ => Exchange::Stale(new),
        }
    }

    /// A copy of every connected entry, in insertion order.
    pub(crate) fn snapshot(&self) -> Vec<(String, PropertyValue)> {
        self.entries
            .read()
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }
}

impl core::fmt::Debug for AttributeMap {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let entries = self.entries.read();
        f.debug_map()
            .entries(entries.iter().map(|(name, value)| (name, value.type_name())))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;

    static_assertions::assert_impl_all!(AttributeMap: Send, Sync);

    #[test]
    fn test_insert_if_absent() {
        let map = AttributeMap::new();
        assert!(map.insert_if_absent("a", 1_i32.into()).is_ok());

        let (current, rejected) = map.insert_if_absent("a", 2_i32.into()).unwrap_err();
        assert_eq!(current.downcast_ref::<i32>(), Some(&1));
        assert_eq!(rejected.downcast_ref::<i32>(), Some(&2));
        assert_eq!(map.get("a").unwrap().downcast_ref::<i32>(), Some(&1));
    }

    #[test]
    fn test_insert_returns_previous() {
        let map = AttributeMap::new();
        assert!(map.insert("a", 1_i32.into()).is_none());
        let previous = map.insert("a", 2_i32.into()).unwrap();
        assert_eq!(previous.downcast_ref::<i32>(), Some(&1));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_remove() {
        let map = AttributeMap::new();
        map.insert("a", 1_i32.into());
        assert!(map.contains("a"));
        assert!(map.remove("a").is_some());
        assert!(map.remove("a").is_none());
        assert!(!map.contains("a"));
    }

    #[test]
    fn test_compare_exchange_uses_identity() {
        let map = AttributeMap::new();
        map.insert("a", 1_i32.into());
        let snapshot = map.get("a").unwrap();

        // Equal by value, but not the stored allocation.
        let lookalike = PropertyValue::new(1_i32);
        assert!(matches!(
            map.compare_exchange("a", &lookalike, 5_i32.into()),
            Exchange::Stale(_)
        ));

        match map.compare_exchange("a", &snapshot, 2_i32.into()) {
            Exchange::Swapped(old) => assert!(old.ptr_eq(&snapshot)),
            Exchange::Stale(_) => panic!("expected swap"),
        }
        assert!(matches!(
            map.compare_exchange("a", &snapshot, 3_i32.into()),
            Exchange::Stale(_)
        ));
        assert!(matches!(
            map.compare_exchange("missing", &snapshot, 3_i32.into()),
            Exchange::Stale(_)
        ));
    }

    #[test]
    fn test_snapshot_keeps_insertion_order() {
        let map = AttributeMap::new();
        map.insert("z", 1_i32.into());
        map.insert("a", 2_i32.into());
        map.insert("m", 3_i32.into());
        map.remove("a");
        map.insert("a", 4_i32.into());

        assert_eq!(map.names(), vec!["z", "m", "a"]);
        let snapshot = map.snapshot();
        assert_eq!(snapshot[2].1.downcast_ref::<i32>(), Some(&4));
    }
}
