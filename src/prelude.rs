//! Commonly used items for convenient importing.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use tagalong::prelude::*;
//!
//! let carrier = Arc::new(());
//! let handle: PropertyHandle = default_scope().handle(&carrier, "prelude")?;
//! handle.set(1_u8);
//! # Ok::<(), PropertyError>(())
//! ```

pub use crate::{
    Carrier, PropertyError, PropertyHandle, PropertyValue, Scope, default_scope,
};
