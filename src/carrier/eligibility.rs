//! The carrier eligibility policy.
//!
//! Properties are keyed by carrier identity. A carrier type whose notion of
//! equality could make two distinct instances "the same" would let them
//! alias in a scope's table and silently share or overwrite each other's
//! properties, so the checked entry points refuse such types.
//!
//! Every [`Carrier`] describes itself with a [`CarrierKind`]: one layer per
//! type in its delegation chain. A newtype that forwards its identity to an
//! inner carrier names that carrier as its base, and the chain ends at a root
//! layer stating whether the carrier is a shared reference (keyed by
//! allocation) or a plain value (keyed by contents).
//!
//! A type is eligible iff its root is a reference and no layer declares
//! [`Equality::Value`]. The answer depends only on the exact type, so it is
//! computed once per [`TypeId`] and cached for the whole process.
//!
//! ```
//! use std::sync::Arc;
//!
//! use tagalong::{Carrier, CarrierIdentity, CarrierKind, Equality, is_eligible};
//!
//! struct Session(Arc<String>);
//!
//! impl Carrier for Session {
//!     fn kind() -> CarrierKind {
//!         CarrierKind::derived::<Self, Arc<String>>(Equality::Identity)
//!     }
//!
//!     fn identity(&self) -> CarrierIdentity {
//!         self.0.identity()
//!     }
//! }
//!
//! assert!(is_eligible::<Session>());
//! assert!(is_eligible::<Arc<u32>>());
//! assert!(!is_eligible::<u32>());
//! assert!(!is_eligible::<String>());
//! ```

use core::any::TypeId;

use hashbrown::HashMap;
use rustc_hash::FxBuildHasher;

use crate::{carrier::Carrier, lock::Lock};

/// Delegation chains longer than this are treated as cyclic.
const MAX_ANCESTRY_DEPTH: usize = 64;

type EligibilityMap = HashMap<TypeId, bool, FxBuildHasher>;

static ELIGIBILITY: Lock<Option<EligibilityMap>> = Lock::new(None);

/// How a carrier layer decides whether two instances are the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Equality {
    /// Two instances are equal only if they are the same object.
    Identity,
    /// Distinct instances with equal contents compare equal.
    Value,
}

/// What a carrier chain bottoms out in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Representation {
    /// A shared, reference-counted allocation keyed by address.
    Reference,
    /// A plain value keyed by its contents.
    Value,
}

#[derive(Clone, Copy)]
enum Base {
    Root(Representation),
    Derived(fn() -> CarrierKind),
}

/// Describes one layer of a carrier type for the eligibility check.
#[derive(Clone, Copy)]
pub struct CarrierKind {
    type_name: &'static str,
    equality: Equality,
    base: Base,
}

impl CarrierKind {
    /// A root layer for a shared reference compared by identity.
    #[must_use]
    pub fn reference<T: ?Sized>() -> Self {
        Self {
            type_name: core::any::type_name::<T>(),
            equality: Equality::Identity,
            base: Base::Root(Representation::Reference),
        }
    }

    /// A root layer for a value compared by contents.
    #[must_use]
    pub fn value<T: ?Sized>() -> Self {
        Self {
            type_name: core::any::type_name::<T>(),
            equality: Equality::Value,
            base: Base::Root(Representation::Value),
        }
    }

    /// A layer for type `T` that forwards its identity to the carrier `B`.
    ///
    /// `equality` states how `T` itself compares: a newtype that derives
    /// `PartialEq` over its contents should pass [`Equality::Value`].
    #[must_use]
    pub fn derived<T: ?Sized, B: Carrier>(equality: Equality) -> Self {
        Self {
            type_name: core::any::type_name::<T>(),
            equality,
            base: Base::Derived(B::kind),
        }
    }

    /// The name of the type this layer describes.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// The equality semantics this layer declares.
    #[must_use]
    pub fn equality(&self) -> Equality {
        self.equality
    }

    /// The kind of the carrier this layer delegates to, if any.
    #[must_use]
    pub fn base(&self) -> Option<CarrierKind> {
        match self.base {
            Base::Root(_) => None,
            Base::Derived(base) => Some(base()),
        }
    }

    /// Walks the chain without consulting the process-wide cache.
    #[must_use]
    pub fn is_eligible(&self) -> bool {
        let mut layer = *self;
        for _ in 0..MAX_ANCESTRY_DEPTH {
            if layer.equality == Equality::Value {
                return false;
            }
            match layer.base {
                Base::Root(representation) => {
                    return representation == Representation::Reference;
                }
                Base::Derived(base) => layer = base(),
            }
        }
        false
    }
}

impl core::fmt::Debug for CarrierKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut debug = f.debug_struct("CarrierKind");
        debug
            .field("type_name", &self.type_name)
            .field("equality", &self.equality);
        match self.base {
            Base::Root(representation) => debug.field("root", &representation),
            Base::Derived(base) => debug.field("base", &base().type_name),
        };
        debug.finish()
    }
}

/// Returns `true` if `C` may carry properties through the checked entry
/// points.
///
/// The result is cached per type for the lifetime of the process.
pub fn is_eligible<C: Carrier>() -> bool {
    let type_id = TypeId::of::<C>();
    let cached = ELIGIBILITY
        .read()
        .as_ref()
        .and_then(|map| map.get(&type_id).copied());
    if let Some(eligible) = cached {
        return eligible;
    }

    // Computed outside the lock: `kind` is user code.
    let eligible = C::kind().is_eligible();
    tracing::trace!(
        carrier = core::any::type_name::<C>(),
        eligible,
        "carrier eligibility computed"
    );

    *ELIGIBILITY
        .write()
        .get_or_insert_default()
        .entry(type_id)
        .or_insert(eligible)
}
