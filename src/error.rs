//! The error type returned by the strict property operations.
//!
//! Every failure described here is local and deterministic: the attribute
//! map is left exactly as it was before the failing call, and nothing is
//! retried internally.
//!
//! ```
//! use std::sync::Arc;
//!
//! use tagalong::{PropertyError, Scope};
//!
//! let scope = Scope::new();
//! let carrier = Arc::new(());
//! let handle = scope.handle(&carrier, "missing")?;
//!
//! assert!(matches!(handle.get(), Err(PropertyError::NotConnected { .. })));
//! # Ok::<(), PropertyError>(())
//! ```

use alloc::string::String;

/// Errors produced by [`Scope`](crate::Scope) and
/// [`PropertyHandle`](crate::PropertyHandle).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PropertyError {
    /// The carrier's type failed the eligibility check.
    ///
    /// Only reference carriers keyed by identity may have properties
    /// attached through the checked entry points. The `_unchecked` variants
    /// skip the check.
    #[error(
        "Object of type \"{type_name}\" may not have properties attached. Only shared \
         reference types that use identity equality may carry properties."
    )]
    InvalidCarrierKind {
        /// The name of the rejected carrier type.
        type_name: &'static str,
    },

    /// A strict connect found the property already connected.
    #[error("Property \"{name}\" was already connected.")]
    AlreadyConnected {
        /// The property name.
        name: String,
    },

    /// A strict get or disconnect found the property disconnected.
    #[error("Property \"{name}\" is disconnected.")]
    NotConnected {
        /// The property name.
        name: String,
    },
}

impl PropertyError {
    pub(crate) fn invalid_carrier<C: ?Sized>() -> Self {
        Self::InvalidCarrierKind {
            type_name: core::any::type_name::<C>(),
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::{format, string::ToString};

    use super::*;

    static_assertions::assert_impl_all!(PropertyError: Send, Sync, Clone, core::error::Error);

    #[test]
    fn test_invalid_carrier_names_type() {
        let error = PropertyError::invalid_carrier::<u32>();
        let message = format!("{error}");
        assert!(message.contains("\"u32\""));
    }

    #[test]
    fn test_connection_messages() {
        let already = PropertyError::AlreadyConnected {
            name: "color".to_string(),
        };
        let missing = PropertyError::NotConnected {
            name: "color".to_string(),
        };
        assert_eq!(
            already.to_string(),
            "Property \"color\" was already connected."
        );
        assert_eq!(missing.to_string(), "Property \"color\" is disconnected.");
    }
}
