#![cfg_attr(not(doc), no_std)]
#![deny(
    missing_docs,
    unsafe_code,
    clippy::alloc_instead_of_core,
    clippy::std_instead_of_alloc,
    clippy::std_instead_of_core,
    rustdoc::invalid_rust_codeblocks,
    rustdoc::broken_intra_doc_links,
    missing_copy_implementations,
    unused_doc_comments
)]
// Make docs.rs generate better docs
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Attach named, opaque properties to shared objects at runtime.
//!
//! ## Overview
//!
//! This crate lets you hang arbitrary values off an object you do not own,
//! without changing its type and without keeping it alive. Properties are
//! looked up by the object's identity and a string name, and they disappear
//! together with the object.
//!
//! ```
//! use std::sync::Arc;
//!
//! use tagalong::prelude::*;
//!
//! struct Widget;
//!
//! let widget = Arc::new(Widget);
//! let scope = Scope::new();
//!
//! let label = scope.handle(&widget, "label")?;
//! label.connect("Save")?;
//! assert_eq!(label.get()?.downcast_ref::<&'static str>(), Some(&"Save"));
//!
//! drop(label);
//! drop(widget);
//! scope.purge();
//! assert_eq!(scope.carrier_count(), 0);
//! # Ok::<(), PropertyError>(())
//! ```
//!
//! ## Core Concepts
//!
//! - A **carrier** is the object properties are attached to. Any `Arc<T>` is
//!   a carrier, keyed by the address of its allocation. See [`carrier`].
//! - A **scope** ([`Scope`]) is an isolated namespace. The same carrier and
//!   name in two scopes are unrelated. A process-wide scope is available
//!   through [`default_scope`] and the helpers in [`global`].
//! - A **property** is a named [`PropertyValue`] attached to a carrier in a
//!   scope. It is either connected (has a value) or disconnected.
//! - A **handle** ([`PropertyHandle`]) is bound to one carrier's property
//!   map and one name, and offers the atomic operations: `try_connect`,
//!   `try_update`, `get_or_create`, `create_or_update`, and their strict
//!   counterparts.
//!
//! ## Lifetimes
//!
//! A scope only ever holds a weak pointer to a carrier. Once the last `Arc`
//! to a carrier is dropped, its properties become unreachable and are
//! reclaimed the next time the scope sweeps (lazily as it grows, or
//! explicitly through [`Scope::purge`]).
//!
//! Property values are held strongly. A value that strongly references its
//! own carrier, directly or through other carriers' properties, therefore
//! keeps the carrier alive. Reference carriers from property values through
//! [`Weak`](alloc::sync::Weak), or break the cycle with [`Scope::detach`].
//!
//! ## Concurrency
//!
//! Everything is `Send + Sync`. Each carrier's properties sit behind their
//! own lock, and the carrier table is sharded, so threads working on
//! different carriers rarely meet. Locks are held only for the map operation
//! itself; user code (factories, updaters, `PartialEq`, destructors and
//! [`Carrier`] impls) always runs outside them. Table keys are compared
//! under a shard lock, which is why value identities are limited to the
//! built-in value carriers. Conditional writes are compare-and-swap loops.
//!
//! ## Features
//!
//! - `std`: use `std::sync::RwLock` instead of the `spin` lock. Run
//!   `cargo test --features std` to exercise that backend.

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

mod attribute_map;
pub mod carrier;
mod error;
pub mod global;
mod handle;
mod lock;
pub mod prelude;
mod scope;
mod table;
mod value;

pub use self::{
    carrier::{Carrier, CarrierIdentity, CarrierKind, Equality, Representation, is_eligible},
    error::PropertyError,
    handle::PropertyHandle,
    scope::{
        DEFAULT_SHARDS, DEFAULT_SWEEP_THRESHOLD, MAX_SHARDS, Scope, ScopeBuilder, default_scope,
    },
    value::PropertyValue,
};
