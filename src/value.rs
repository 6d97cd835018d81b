//! Type-erased property values.
//!
//! A [`PropertyValue`] is an opaque payload: the attribute map never looks
//! inside it, and type correctness is checked only when the caller asks for
//! a concrete type with [`downcast_ref`](PropertyValue::downcast_ref) or
//! [`downcast`](PropertyValue::downcast).
//!
//! Values are reference counted, so cloning one is cheap and every clone
//! observes the same allocation. Alongside the data, each value carries a
//! static vtable recorded when it was created. The vtable remembers the
//! concrete type name and how two values of that type are compared, which is
//! what [`PropertyHandle::try_update`](crate::PropertyHandle::try_update)
//! relies on.
//!
//! # Equality
//!
//! - Values created with [`PropertyValue::new`] (or through [`From`]) compare
//!   by [`PartialEq`] on the concrete type. Values of different types are
//!   never equal.
//! - Values created with [`PropertyValue::opaque`] compare by identity: a
//!   value is only equal to itself and its clones.
//!
//! ```
//! use tagalong::PropertyValue;
//!
//! let a = PropertyValue::new(5_i32);
//! let b: PropertyValue = 5_i32.into();
//! assert!(a.equals(&b));
//! assert!(!a.ptr_eq(&b));
//! assert_eq!(a.downcast_ref::<i32>(), Some(&5));
//! assert!(a.downcast_ref::<u32>().is_none());
//! ```

use alloc::sync::Arc;
use core::{any::Any, fmt};

type Erased = dyn Any + Send + Sync;

/// Static per-type operations for an erased value.
struct ValueVtable {
    type_name: fn() -> &'static str,
    eq: fn(&Erased, &Erased) -> bool,
}

impl ValueVtable {
    const fn comparable<T: PartialEq + Send + Sync + 'static>() -> &'static Self {
        const {
            &Self {
                type_name: core::any::type_name::<T>,
                eq: eq_by_value::<T>,
            }
        }
    }

    const fn opaque<T: Send + Sync + 'static>() -> &'static Self {
        const {
            &Self {
                type_name: core::any::type_name::<T>,
                eq: eq_never,
            }
        }
    }
}

fn eq_by_value<T: PartialEq + 'static>(left: &Erased, right: &Erased) -> bool {
    match (left.downcast_ref::<T>(), right.downcast_ref::<T>()) {
        (Some(left), Some(right)) => left == right,
        _ => false,
    }
}

// Identity is checked before the vtable is consulted.
fn eq_never(_: &Erased, _: &Erased) -> bool {
    false
}

/// An opaque, cheaply clonable property value.
#[derive(Clone)]
pub struct PropertyValue {
    data: Arc<Erased>,
    vtable: &'static ValueVtable,
}

impl PropertyValue {
    /// Wraps a value that is compared by [`PartialEq`].
    #[must_use]
    pub fn new<T: PartialEq + Send + Sync + 'static>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    /// Wraps an already shared value that is compared by [`PartialEq`].
    ///
    /// The allocation is reused, so [`downcast`](Self::downcast) hands back
    /// the same `Arc`.
    #[must_use]
    pub fn from_arc<T: PartialEq + Send + Sync + 'static>(value: Arc<T>) -> Self {
        Self {
            data: value,
            vtable: ValueVtable::comparable::<T>(),
        }
    }

    /// Wraps a value that is compared by identity only.
    ///
    /// Use this for types without a [`PartialEq`] implementation, such as
    /// `Arc<T>` carriers stored as the value of another carrier's property.
    #[must_use]
    pub fn opaque<T: Send + Sync + 'static>(value: T) -> Self {
        Self {
            data: Arc::new(value),
            vtable: ValueVtable::opaque::<T>(),
        }
    }

    /// The name of the concrete type stored in this value.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        (self.vtable.type_name)()
    }

    /// Returns `true` if the stored value is of type `T`.
    #[must_use]
    pub fn is<T: Any>(&self) -> bool {
        self.data.is::<T>()
    }

    /// Borrows the stored value as `T`, if it is one.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.data.downcast_ref::<T>()
    }

    /// Returns a shared pointer to the stored value as `T`, if it is one.
    #[must_use]
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.data).downcast::<T>().ok()
    }

    /// Value equality, using the semantics recorded for `self`.
    ///
    /// A value always equals its own clones.
    #[must_use]
    pub fn equals(&self, other: &PropertyValue) -> bool {
        self.ptr_eq(other) || (self.vtable.eq)(&*self.data, &*other.data)
    }

    /// Returns `true` if both values share one allocation.
    #[must_use]
    pub fn ptr_eq(&self, other: &PropertyValue) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl<T: PartialEq + Send + Sync + 'static> From<T> for PropertyValue {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl fmt::Debug for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyValue")
            .field("type_name", &self.type_name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use alloc::{format, string::String, vec};

    use super::*;

    static_assertions::assert_impl_all!(PropertyValue: Send, Sync, Clone, Unpin);

    struct NoEq(#[allow(dead_code)] u8);

    #[test]
    fn test_value_equality() {
        let a = PropertyValue::new(String::from("x"));
        let b = PropertyValue::from(String::from("x"));
        let c = PropertyValue::from(String::from("y"));

        assert!(a.equals(&b));
        assert!(b.equals(&a));
        assert!(!a.equals(&c));
        assert!(!a.ptr_eq(&b));
    }

    #[test]
    fn test_different_types_never_equal() {
        let a = PropertyValue::new(5_i32);
        let b = PropertyValue::new(5_i64);
        assert!(!a.equals(&b));
        assert!(!b.equals(&a));
    }

    #[test]
    fn test_opaque_equality_is_identity() {
        let a = PropertyValue::opaque(NoEq(1));
        let b = PropertyValue::opaque(NoEq(1));
        let a2 = a.clone();

        assert!(a.equals(&a2));
        assert!(a.ptr_eq(&a2));
        assert!(!a.equals(&b));
    }

    #[test]
    fn test_connected_unit_is_a_value() {
        let unit = PropertyValue::new(());
        let none = PropertyValue::new(Option::<u8>::None);

        assert!(unit.is::<()>());
        assert!(none.equals(&PropertyValue::new(Option::<u8>::None)));
        assert!(!none.equals(&PropertyValue::new(Some(0_u8))));
    }

    #[test]
    fn test_downcast() {
        let shared = Arc::new(vec![1, 2, 3]);
        let value = PropertyValue::from_arc(Arc::clone(&shared));

        let back = value.downcast::<alloc::vec::Vec<i32>>().unwrap();
        assert!(Arc::ptr_eq(&shared, &back));
        assert!(value.downcast::<String>().is_none());
        assert_eq!(value.downcast_ref::<alloc::vec::Vec<i32>>().unwrap().len(), 3);
    }

    #[test]
    fn test_type_name_and_debug() {
        let value = PropertyValue::new(3_u16);
        assert_eq!(value.type_name(), "u16");
        assert!(format!("{value:?}").contains("u16"));
    }
}
