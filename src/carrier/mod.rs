//! Carriers: the objects properties are attached to.
//!
//! A carrier is anything implementing [`Carrier`]. The trait answers two
//! questions: what kind of type this is (for the [eligibility] policy), and
//! what identifies this particular instance (a [`CarrierIdentity`]).
//!
//! The built-in carriers are:
//!
//! - `Arc<T>`: keyed by the address of its allocation and tracked through a
//!   [`Weak`], so a scope never keeps it alive. This is the only eligible
//!   built-in carrier.
//! - integers, `bool`, `char`, `()`, [`String`] and `&'static str`: keyed by
//!   their contents and never expiring. They are ineligible and can only be
//!   used through the `_unchecked` entry points, where equal values share
//!   properties.
//!
//! Newtypes usually implement [`Carrier`] by forwarding to the carrier they
//! wrap, see [`CarrierKind::derived`].

pub mod eligibility;

use alloc::{
    boxed::Box,
    string::String,
    sync::{Arc, Weak},
};
use core::{
    any::{Any, TypeId},
    fmt,
    hash::{Hash, Hasher},
};

pub use self::eligibility::{CarrierKind, Equality, Representation, is_eligible};

/// An object that properties can be attached to.
///
/// `kind` and `identity` must agree: a type whose kind bottoms out in a
/// reference should return a shared identity. The checked entry points of
/// [`Scope`](crate::Scope) refuse value identities regardless of the kind.
pub trait Carrier: 'static {
    /// Describes this type for the eligibility check.
    fn kind() -> CarrierKind;

    /// The identity of this instance.
    fn identity(&self) -> CarrierIdentity;
}

/// Keeps track of whether a carrier is still alive.
pub(crate) trait Anchor: Send + Sync {
    fn is_alive(&self) -> bool;
}

impl<T: ?Sized + Send + Sync> Anchor for Weak<T> {
    fn is_alive(&self) -> bool {
        self.strong_count() > 0
    }
}

/// Hashable, comparable key for value carriers.
pub(crate) trait ValueKey: Send + Sync + 'static {
    fn as_any(&self) -> &dyn Any;
    fn key_eq(&self, other: &dyn ValueKey) -> bool;
    fn key_hash(&self, state: &mut dyn Hasher);
}

impl<T: Eq + Hash + Send + Sync + 'static> ValueKey for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn key_eq(&self, other: &dyn ValueKey) -> bool {
        other.as_any().downcast_ref::<T>() == Some(self)
    }

    fn key_hash(&self, mut state: &mut dyn Hasher) {
        TypeId::of::<T>().hash(&mut state);
        self.hash(&mut state);
    }
}

/// Lookup key of a carrier inside a scope's table.
pub(crate) enum CarrierKey {
    Address(usize),
    Value(Box<dyn ValueKey>),
}

impl PartialEq for CarrierKey {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Address(left), Self::Address(right)) => left == right,
            (Self::Value(left), Self::Value(right)) => left.key_eq(&**right),
            _ => false,
        }
    }
}

impl Eq for CarrierKey {}

impl Hash for CarrierKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::Address(address) => {
                state.write_u8(0);
                address.hash(state);
            }
            Self::Value(key) => {
                state.write_u8(1);
                key.key_hash(state);
            }
        }
    }
}

impl fmt::Debug for CarrierKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Address(address) => write!(f, "Address({address:#x})"),
            Self::Value(_) => f.write_str("Value(..)"),
        }
    }
}

/// The identity of one carrier instance.
///
/// Produced by [`Carrier::identity`]. An identity either refers to a shared
/// allocation, which it watches through a weak pointer, or to a value, which
/// never expires. Value identities come only from the built-in value
/// carriers; other types obtain one by forwarding to them.
pub struct CarrierIdentity {
    key: CarrierKey,
    anchor: Option<Box<dyn Anchor>>,
}

impl CarrierIdentity {
    /// The identity of a shared allocation.
    ///
    /// Only a [`Weak`] to the allocation is retained.
    #[must_use]
    pub fn shared<T: ?Sized + Send + Sync + 'static>(carrier: &Arc<T>) -> Self {
        Self {
            key: CarrierKey::Address(Arc::as_ptr(carrier).cast::<()>().addr()),
            anchor: Some(Box::new(Arc::downgrade(carrier))),
        }
    }

    /// The identity of a value: equal values are the same carrier.
    ///
    /// Restricted to the built-in value carriers, whose `Eq` and `Hash` are
    /// known not to touch any scope, since the key is compared under a shard
    /// lock.
    pub(crate) fn value<T: Eq + Hash + Send + Sync + 'static>(value: T) -> Self {
        Self {
            key: CarrierKey::Value(Box::new(value)),
            anchor: None,
        }
    }

    /// Returns `false` once a shared carrier has been dropped.
    ///
    /// Value identities are always alive.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.anchor.as_ref().is_none_or(|anchor| anchor.is_alive())
    }

    /// Returns `true` for identities that never expire.
    #[must_use]
    pub fn is_pinned(&self) -> bool {
        self.anchor.is_none()
    }

    pub(crate) fn key(&self) -> &CarrierKey {
        &self.key
    }

    pub(crate) fn into_parts(self) -> (CarrierKey, Liveness) {
        (self.key, Liveness(self.anchor))
    }
}

impl fmt::Debug for CarrierIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CarrierIdentity")
            .field("key", &self.key)
            .field("pinned", &self.is_pinned())
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// The liveness half of an identity, kept by the table next to each map.
pub(crate) struct Liveness(Option<Box<dyn Anchor>>);

impl Liveness {
    pub(crate) fn is_alive(&self) -> bool {
        self.0.as_ref().is_none_or(|anchor| anchor.is_alive())
    }
}

impl<T: ?Sized + Send + Sync + 'static> Carrier for Arc<T> {
    fn kind() -> CarrierKind {
        CarrierKind::reference::<Self>()
    }

    fn identity(&self) -> CarrierIdentity {
        CarrierIdentity::shared(self)
    }
}

macro_rules! value_carriers {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Carrier for $ty {
                fn kind() -> CarrierKind {
                    CarrierKind::value::<Self>()
                }

                fn identity(&self) -> CarrierIdentity {
                    CarrierIdentity::value(self.clone())
                }
            }
        )*
    };
}

value_carriers!(
    u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, bool, char, (), String,
    &'static str,
);
