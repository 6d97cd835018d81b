//! Property handles.
//!
//! A [`PropertyHandle`] is bound to one carrier's attribute map and one
//! property name. It is obtained from a [`Scope`](crate::Scope) and from then
//! on talks to the map directly; the scope and its table are not involved.
//!
//! A property is either connected (it has a value, possibly `()` or `None`)
//! or disconnected (absent). Every operation is atomic with respect to the
//! others on the same property. Conditional operations follow a
//! compare-and-swap discipline: read a snapshot, decide with no lock held,
//! then commit only if the property still holds that snapshot. Factories,
//! updaters and `PartialEq` implementations therefore never run under a lock,
//! and may be invoked more than once under contention.
//!
//! ```
//! use std::sync::Arc;
//!
//! use tagalong::{PropertyError, Scope};
//!
//! let scope = Scope::new();
//! let carrier = Arc::new(());
//! let hits = scope.handle(&carrier, "hits")?;
//!
//! assert!(hits.try_connect(1_u32));
//! assert!(!hits.try_connect(10_u32));
//! assert!(hits.try_update(2_u32, 1_u32));
//! let value = hits.create_or_update(
//!     || 0_u32,
//!     |current| current.downcast_ref::<u32>().map_or(0, |n| n + 1),
//! );
//! assert_eq!(value.downcast_ref::<u32>(), Some(&3));
//! # Ok::<(), PropertyError>(())
//! ```

use alloc::string::String;
use core::fmt;

use triomphe::Arc;

use crate::{
    attribute_map::{AttributeMap, Exchange},
    error::PropertyError,
    value::PropertyValue,
};

/// A capability to read and write one named property of one carrier.
///
/// Handles are cheap to clone, and any number of handles for the same
/// (scope, carrier, name) are interchangeable.
#[derive(Clone)]
pub struct PropertyHandle {
    map: Arc<AttributeMap>,
    name: String,
}

impl PropertyHandle {
    pub(crate) fn new(map: Arc<AttributeMap>, name: &str) -> Self {
        Self {
            map,
            name: String::from(name),
        }
    }

    /// The property name this handle is bound to.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` if the property currently has a value.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.map.contains(&self.name)
    }

    /// Connects `value` if the property is disconnected.
    ///
    /// Returns `false`, leaving the current value in place, if it was
    /// already connected.
    pub fn try_connect(&self, value: impl Into<PropertyValue>) -> bool {
        self.map.insert_if_absent(&self.name, value.into()).is_ok()
    }

    /// Disconnects the property.
    ///
    /// Returns `true` only if this call performed the removal.
    pub fn try_disconnect(&self) -> bool {
        self.map.remove(&self.name).is_some()
    }

    /// Returns the value if the property is connected.
    #[must_use]
    pub fn try_get(&self) -> Option<PropertyValue> {
        self.map.get(&self.name)
    }

    /// Replaces the value with `new` if the current value equals `expected`.
    ///
    /// Equality is [`PropertyValue::equals`] evaluated on the current value,
    /// so values created with [`PropertyValue::new`] compare by contents.
    /// Returns `false` if the property is disconnected or the comparison
    /// fails; the stored value is then unchanged.
    pub fn try_update(
        &self,
        new: impl Into<PropertyValue>,
        expected: impl Into<PropertyValue>,
    ) -> bool {
        let expected = expected.into();
        let mut new = new.into();
        loop {
            let Some(current) = self.map.get(&self.name) else {
                return false;
            };
            if !current.equals(&expected) {
                return false;
            }
            match self.map.compare_exchange(&self.name, &current, new) {
                Exchange::Swapped(_) => return true,
                Exchange::Stale(rejected) => {
                    new = rejected;
                    core::hint::spin_loop();
                }
            }
        }
    }

    /// Returns the current value, connecting one from `factory` if the
    /// property is disconnected.
    ///
    /// Under contention `factory` may run on several threads, but only one
    /// result is stored and every caller returns that stored value.
    pub fn get_or_create<V, F>(&self, factory: F) -> PropertyValue
    where
        V: Into<PropertyValue>,
        F: FnOnce() -> V,
    {
        if let Some(current) = self.map.get(&self.name) {
            return current;
        }
        let created = factory().into();
        match self.map.insert_if_absent(&self.name, created.clone()) {
            Ok(()) => created,
            Err((current, _rejected)) => current,
        }
    }

    /// [`get_or_create`](Self::get_or_create) with a ready-made value.
    pub fn get_or_connect(&self, value: impl Into<PropertyValue>) -> PropertyValue {
        self.get_or_create(|| value)
    }

    /// Connects a value from `factory`, or replaces the current value with
    /// `updater(current)`, and returns the value stored.
    ///
    /// Runs an optimistic loop until its write wins, so both callbacks may
    /// be invoked any number of times and should be free of side effects
    /// that matter for correctness.
    pub fn create_or_update<C, U, F, G>(&self, mut factory: F, mut updater: G) -> PropertyValue
    where
        C: Into<PropertyValue>,
        U: Into<PropertyValue>,
        F: FnMut() -> C,
        G: FnMut(&PropertyValue) -> U,
    {
        loop {
            match self.map.get(&self.name) {
                None => {
                    let created = factory().into();
                    if self
                        .map
                        .insert_if_absent(&self.name, created.clone())
                        .is_ok()
                    {
                        return created;
                    }
                }
                Some(current) => {
                    let updated = updater(&current).into();
                    let stored = updated.clone();
                    if let Exchange::Swapped(_) =
                        self.map.compare_exchange(&self.name, &current, updated)
                    {
                        return stored;
                    }
                }
            }
            core::hint::spin_loop();
        }
    }

    /// [`create_or_update`](Self::create_or_update) with a ready-made
    /// initial value.
    pub fn connect_or_update<G, U>(&self, value: impl Into<PropertyValue>, updater: G) -> PropertyValue
    where
        U: Into<PropertyValue>,
        G: FnMut(&PropertyValue) -> U,
    {
        let value = value.into();
        self.create_or_update(|| value.clone(), updater)
    }

    /// Connects `value`, failing if the property is already connected.
    ///
    /// # Errors
    ///
    /// [`PropertyError::AlreadyConnected`] if the property has a value. The
    /// value is left untouched.
    pub fn connect(&self, value: impl Into<PropertyValue>) -> Result<(), PropertyError> {
        if self.try_connect(value) {
            Ok(())
        } else {
            Err(PropertyError::AlreadyConnected {
                name: self.name.clone(),
            })
        }
    }

    /// Disconnects the property, failing if it is not connected.
    ///
    /// # Errors
    ///
    /// [`PropertyError::NotConnected`] if the property has no value.
    pub fn disconnect(&self) -> Result<(), PropertyError> {
        if self.try_disconnect() {
            Ok(())
        } else {
            Err(self.not_connected())
        }
    }

    /// Returns the value, failing if the property is not connected.
    ///
    /// # Errors
    ///
    /// [`PropertyError::NotConnected`] if the property has no value.
    pub fn get(&self) -> Result<PropertyValue, PropertyError> {
        self.try_get().ok_or_else(|| self.not_connected())
    }

    /// Connects or overwrites the value. Never fails.
    pub fn set(&self, value: impl Into<PropertyValue>) {
        // Dropped here, outside the map lock.
        let _previous = self.map.insert(&self.name, value.into());
    }

    fn not_connected(&self) -> PropertyError {
        PropertyError::NotConnected {
            name: self.name.clone(),
        }
    }
}

impl fmt::Debug for PropertyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyHandle")
            .field("name", &self.name)
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use alloc::{format, string::ToString};

    use super::*;

    static_assertions::assert_impl_all!(PropertyHandle: Send, Sync, Clone);

    fn handle(name: &str) -> PropertyHandle {
        PropertyHandle::new(Arc::new(AttributeMap::new()), name)
    }

    fn as_i32(value: &PropertyValue) -> i32 {
        *value.downcast_ref::<i32>().unwrap()
    }

    #[test]
    fn test_try_connect() {
        let property = handle("p");
        assert!(property.try_connect(13));
        assert!(!property.try_connect(17));
        assert_eq!(as_i32(&property.get().unwrap()), 13);
    }

    #[test]
    fn test_connect_when_connected_fails_without_change() {
        let property = handle("p");
        property.connect(13).unwrap();
        let error = property.connect(17).unwrap_err();
        assert_eq!(
            error,
            PropertyError::AlreadyConnected {
                name: "p".to_string()
            }
        );
        assert_eq!(as_i32(&property.get().unwrap()), 13);
    }

    #[test]
    fn test_disconnect() {
        let property = handle("p");
        assert!(!property.try_disconnect());
        property.set(13);
        assert!(property.try_disconnect());
        assert!(property.try_get().is_none());
        assert!(matches!(
            property.disconnect(),
            Err(PropertyError::NotConnected { .. })
        ));
    }

    #[test]
    fn test_get_when_disconnected() {
        let property = handle("p");
        assert!(property.try_get().is_none());
        assert_eq!(
            property.get().unwrap_err(),
            PropertyError::NotConnected {
                name: "p".to_string()
            }
        );
    }

    #[test]
    fn test_connected_unit_is_not_disconnected() {
        let property = handle("p");
        property.set(());
        assert!(property.is_connected());
        assert!(property.get().unwrap().is::<()>());
    }

    #[test]
    fn test_set_overwrites() {
        let property = handle("p");
        property.set(1);
        property.set(2);
        assert_eq!(as_i32(&property.get().unwrap()), 2);
    }

    #[test]
    fn test_try_update() {
        let property = handle("p");
        assert!(!property.try_update(2, 1));
        assert!(property.try_get().is_none());

        property.set(1);
        assert!(!property.try_update(3, 2));
        assert_eq!(as_i32(&property.get().unwrap()), 1);

        // Matches by value, not by allocation.
        assert!(property.try_update(3, PropertyValue::new(1)));
        assert_eq!(as_i32(&property.get().unwrap()), 3);
    }

    #[test]
    fn test_try_update_opaque_requires_identity() {
        struct Token;

        let property = handle("p");
        let token = PropertyValue::opaque(Token);
        property.set(token.clone());

        assert!(!property.try_update(1, PropertyValue::opaque(Token)));
        assert!(property.try_update(1, token));
        assert_eq!(as_i32(&property.get().unwrap()), 1);
    }

    #[test]
    fn test_get_or_create() {
        let property = handle("p");
        let mut calls = 0;
        let value = property.get_or_create(|| {
            calls += 1;
            13
        });
        assert_eq!(as_i32(&value), 13);

        let value = property.get_or_create(|| {
            calls += 1;
            17
        });
        assert_eq!(as_i32(&value), 13);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_get_or_connect() {
        let property = handle("p");
        assert_eq!(as_i32(&property.get_or_connect(13)), 13);
        assert_eq!(as_i32(&property.get_or_connect(17)), 13);
    }

    #[test]
    fn test_create_or_update() {
        let property = handle("p");
        let value = property.create_or_update(|| 13, |current| as_i32(current) + 1);
        assert_eq!(as_i32(&value), 13);

        let value = property.create_or_update(|| 13, |current| as_i32(current) + 1);
        assert_eq!(as_i32(&value), 14);
        assert_eq!(as_i32(&property.get().unwrap()), 14);
    }

    #[test]
    fn test_connect_or_update() {
        let property = handle("p");
        assert_eq!(as_i32(&property.connect_or_update(13, |c| as_i32(c) * 2)), 13);
        assert_eq!(as_i32(&property.connect_or_update(13, |c| as_i32(c) * 2)), 26);
    }

    #[test]
    fn test_names_are_independent() {
        let map = Arc::new(AttributeMap::new());
        let a = PropertyHandle::new(Arc::clone(&map), "a");
        let b = PropertyHandle::new(Arc::clone(&map), "b");
        a.set(1);
        b.set(2);
        assert_eq!(as_i32(&a.get().unwrap()), 1);
        assert_eq!(as_i32(&b.get().unwrap()), 2);

        let again = PropertyHandle::new(map, "a");
        assert_eq!(as_i32(&again.get().unwrap()), 1);
    }

    #[test]
    fn test_values_dropped_outside_lock() {
        // A value whose destructor reads the same map would deadlock if it
        // were dropped while the write lock is held.
        struct Reentrant(PropertyHandle);

        impl Drop for Reentrant {
            fn drop(&mut self) {
                let _ = self.0.try_get();
            }
        }

        let property = handle("p");
        let other = PropertyHandle::new(Arc::clone(&property.map), "q");
        property.set(PropertyValue::opaque(Reentrant(other.clone())));
        property.set(1);
        property.set(PropertyValue::opaque(Reentrant(other)));
        assert!(property.try_disconnect());
    }

    #[test]
    fn test_debug() {
        let property = handle("p");
        property.set(1);
        let debug = format!("{property:?}");
        assert!(debug.contains("\"p\""));
        assert!(debug.contains("connected: true"));
    }
}
