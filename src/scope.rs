//! Property scopes.
//!
//! A [`Scope`] is an isolated attachment space: the same carrier and name
//! in two scopes are two unrelated properties. Each scope owns one weak
//! table mapping carriers to their attribute maps.
//!
//! # Validation
//!
//! The checked entry points ([`handle`](Scope::handle),
//! [`try_handle`](Scope::try_handle), [`copy_all`](Scope::copy_all),
//! [`try_copy_all`](Scope::try_copy_all)) only accept carrier types that
//! pass the [eligibility] policy. The `_unchecked` variants skip it. They
//! are memory safe, but value carriers are keyed by contents, so two equal
//! values (say, two `"Hi"` literals) silently share one set of properties,
//! and those properties are never reclaimed.
//!
//! [eligibility]: crate::carrier::eligibility
//!
//! # Lifetime
//!
//! A scope never keeps a shared carrier alive. Dropping a scope drops every
//! attribute map it holds, except maps still reachable through a live
//! [`PropertyHandle`]. A property value that holds a strong reference to its
//! own carrier keeps that carrier alive for as long as the scope exists;
//! store a [`Weak`](alloc::sync::Weak) instead, or call
//! [`detach`](Scope::detach) to break the cycle.
//!
//! ```
//! use std::sync::Arc;
//!
//! use tagalong::{PropertyError, Scope};
//!
//! let ui = Scope::named("ui");
//! let net = Scope::named("net");
//! let carrier = Arc::new("window");
//!
//! ui.handle(&carrier, "id")?.set(1_u32);
//! net.handle(&carrier, "id")?.set(2_u32);
//!
//! assert_eq!(ui.handle(&carrier, "id")?.get()?.downcast_ref::<u32>(), Some(&1));
//! assert_eq!(net.handle(&carrier, "id")?.get()?.downcast_ref::<u32>(), Some(&2));
//! # Ok::<(), PropertyError>(())
//! ```

use alloc::{borrow::Cow, string::String, vec::Vec};
use core::fmt;

use crate::{
    carrier::{Carrier, CarrierIdentity, is_eligible},
    error::PropertyError,
    handle::PropertyHandle,
    table::WeakTable,
};

/// Default number of table shards.
pub const DEFAULT_SHARDS: usize = 16;

/// Upper bound on the number of table shards.
pub const MAX_SHARDS: usize = 1 << 16;

/// Default minimum shard size that triggers a lazy sweep.
pub const DEFAULT_SWEEP_THRESHOLD: usize = 32;

/// Configures a [`Scope`].
///
/// ```
/// use tagalong::Scope;
///
/// let scope = Scope::builder()
///     .name("sessions")
///     .shards(3)
///     .sweep_threshold(128)
///     .build();
/// assert_eq!(scope.name(), Some("sessions"));
/// assert_eq!(scope.shard_count(), 4);
/// ```
#[derive(Debug, Clone)]
#[must_use]
pub struct ScopeBuilder {
    name: Option<Cow<'static, str>>,
    shards: usize,
    sweep_threshold: usize,
}

impl Default for ScopeBuilder {
    fn default() -> Self {
        Self {
            name: None,
            shards: DEFAULT_SHARDS,
            sweep_threshold: DEFAULT_SWEEP_THRESHOLD,
        }
    }
}

impl ScopeBuilder {
    /// Labels the scope in `Debug` output and diagnostics.
    pub fn name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Number of table shards, rounded up to a power of two and clamped to
    /// `1..=`[`MAX_SHARDS`].
    pub fn shards(mut self, shards: usize) -> Self {
        self.shards = shards;
        self
    }

    /// Minimum shard size at which insertions first sweep dead carriers
    /// (at least one).
    pub fn sweep_threshold(mut self, sweep_threshold: usize) -> Self {
        self.sweep_threshold = sweep_threshold;
        self
    }

    /// Creates the scope.
    pub fn build(self) -> Scope {
        let shards = self
            .shards
            .clamp(1, MAX_SHARDS)
            .checked_next_power_of_two()
            .unwrap_or(MAX_SHARDS);
        let sweep_threshold = self.sweep_threshold.max(1);
        Scope {
            name: self.name,
            table: WeakTable::new(shards, sweep_threshold),
        }
    }
}

/// An isolated space of properties attached to carriers.
pub struct Scope {
    name: Option<Cow<'static, str>>,
    table: WeakTable,
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl Scope {
    /// Creates an anonymous scope with default settings.
    #[must_use]
    pub fn new() -> Self {
        ScopeBuilder::default().build()
    }

    /// Creates a named scope with default settings.
    #[must_use]
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        ScopeBuilder::default().name(name).build()
    }

    /// Starts configuring a scope.
    pub fn builder() -> ScopeBuilder {
        ScopeBuilder::default()
    }

    /// The scope's label, if it has one.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Number of shards in this scope's table.
    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.table.shard_count()
    }

    /// Returns a handle on the property `name` of `carrier`.
    ///
    /// The carrier's attribute map is created on first access, whether or
    /// not a property is ever connected.
    ///
    /// # Errors
    ///
    /// [`PropertyError::InvalidCarrierKind`] if `C` is not an eligible
    /// carrier type, or if `carrier` reports a value identity despite its
    /// type claiming to be a reference.
    pub fn handle<C: Carrier>(&self, carrier: &C, name: &str) -> Result<PropertyHandle, PropertyError> {
        let identity = Self::checked_identity(carrier)?;
        Ok(self.issue::<C>(identity, name))
    }

    /// Like [`handle`](Self::handle), but returns `None` for ineligible
    /// carriers.
    #[must_use]
    pub fn try_handle<C: Carrier>(&self, carrier: &C, name: &str) -> Option<PropertyHandle> {
        self.handle(carrier, name).ok()
    }

    /// Returns a handle without checking the carrier type.
    ///
    /// Ineligible carriers are keyed by value: equal values alias onto the
    /// same properties, and those properties live as long as the scope.
    #[must_use]
    pub fn handle_unchecked<C: Carrier>(&self, carrier: &C, name: &str) -> PropertyHandle {
        self.issue::<C>(carrier.identity(), name)
    }

    fn issue<C: Carrier>(&self, identity: CarrierIdentity, name: &str) -> PropertyHandle {
        let map = self.table.get_or_create(identity);
        tracing::trace!(
            scope = self.name(),
            carrier = core::any::type_name::<C>(),
            name,
            "property handle issued"
        );
        PropertyHandle::new(map, name)
    }

    /// Sets every connected property of `from` on `to` with the same name,
    /// overwriting existing values.
    ///
    /// Properties present only on `to` are left alone. The copy iterates a
    /// snapshot of `from`; concurrent changes to `from` may or may not be
    /// reflected.
    ///
    /// # Errors
    ///
    /// [`PropertyError::InvalidCarrierKind`] if either carrier is
    /// ineligible. Nothing is copied in that case.
    pub fn copy_all<F: Carrier, T: Carrier>(&self, from: &F, to: &T) -> Result<(), PropertyError> {
        let source = Self::checked_identity(from)?;
        let destination = Self::checked_identity(to)?;
        self.copy_maps(source, destination);
        Ok(())
    }

    /// Like [`copy_all`](Self::copy_all), but returns `false` instead of
    /// failing.
    pub fn try_copy_all<F: Carrier, T: Carrier>(&self, from: &F, to: &T) -> bool {
        self.copy_all(from, to).is_ok()
    }

    /// [`copy_all`](Self::copy_all) without checking either carrier type.
    pub fn copy_all_unchecked<F: Carrier, T: Carrier>(&self, from: &F, to: &T) {
        self.copy_maps(from.identity(), to.identity());
    }

    fn copy_maps(&self, from: CarrierIdentity, to: CarrierIdentity) {
        let source = self.table.get_or_create(from);
        let destination = self.table.get_or_create(to);
        for (name, value) in source.snapshot() {
            let _previous = destination.insert(&name, value);
        }
    }

    /// Names of the connected properties of `carrier`, in insertion order.
    ///
    /// Does not create an attribute map for a carrier seen for the first
    /// time.
    pub fn names<C: Carrier>(&self, carrier: &C) -> Vec<String> {
        self.table
            .get(&carrier.identity())
            .map(|map| map.names())
            .unwrap_or_default()
    }

    /// Drops every property of `carrier` in this scope right away.
    ///
    /// Returns `true` if the carrier had an attribute map. Existing handles
    /// keep working on the detached map, but new handles start empty.
    pub fn detach<C: Carrier>(&self, carrier: &C) -> bool {
        let detached = self.table.remove(&carrier.identity());
        if let Some(map) = &detached {
            tracing::debug!(
                scope = self.name(),
                carrier = core::any::type_name::<C>(),
                properties = map.len(),
                "carrier detached"
            );
        }
        detached.is_some()
    }

    /// Reclaims the maps of every carrier that has been dropped, returning
    /// how many were reclaimed.
    ///
    /// Dead carriers are also reclaimed lazily as the scope grows, so
    /// calling this is never required.
    pub fn purge(&self) -> usize {
        self.table.purge()
    }

    /// Number of live carriers that have an attribute map in this scope.
    #[must_use]
    pub fn carrier_count(&self) -> usize {
        self.table.len()
    }

    /// The identity of an eligible carrier. Pinned identities are refused
    /// even when the type passes, since they would alias by value.
    fn checked_identity<C: Carrier>(carrier: &C) -> Result<CarrierIdentity, PropertyError> {
        if !is_eligible::<C>() {
            return Err(PropertyError::invalid_carrier::<C>());
        }
        let identity = carrier.identity();
        if identity.is_pinned() {
            return Err(PropertyError::invalid_carrier::<C>());
        }
        Ok(identity)
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("name", &self.name)
            .field("shards", &self.table.shard_count())
            .finish_non_exhaustive()
    }
}

static DEFAULT_SCOPE: spin::Once<Scope> = spin::Once::new();

/// The process-wide default scope.
///
/// Created on first use and never torn down.
pub fn default_scope() -> &'static Scope {
    DEFAULT_SCOPE.call_once(|| Scope::named("default"))
}
