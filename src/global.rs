//! One-line helpers on the [default scope](crate::default_scope).
//!
//! ```
//! use std::sync::Arc;
//!
//! use tagalong::{PropertyError, global};
//!
//! let button = Arc::new(String::from("ok"));
//! global::set(&button, "tooltip", "Confirm")?;
//! let tooltip = global::get(&button, "tooltip")?;
//! assert_eq!(tooltip.downcast_ref::<&'static str>(), Some(&"Confirm"));
//! # Ok::<(), PropertyError>(())
//! ```

use crate::{
    carrier::Carrier, error::PropertyError, handle::PropertyHandle, scope::default_scope,
    value::PropertyValue,
};

/// [`Scope::handle`](crate::Scope::handle) on the default scope.
///
/// # Errors
///
/// [`PropertyError::InvalidCarrierKind`] for ineligible carrier types.
pub fn handle<C: Carrier>(carrier: &C, name: &str) -> Result<PropertyHandle, PropertyError> {
    default_scope().handle(carrier, name)
}

/// Reads a property from the default scope.
///
/// # Errors
///
/// [`PropertyError::InvalidCarrierKind`] for ineligible carrier types,
/// [`PropertyError::NotConnected`] if the property has no value.
pub fn get<C: Carrier>(carrier: &C, name: &str) -> Result<PropertyValue, PropertyError> {
    handle(carrier, name)?.get()
}

/// Connects or overwrites a property in the default scope.
///
/// # Errors
///
/// [`PropertyError::InvalidCarrierKind`] for ineligible carrier types.
pub fn set<C: Carrier>(
    carrier: &C,
    name: &str,
    value: impl Into<PropertyValue>,
) -> Result<(), PropertyError> {
    handle(carrier, name)?.set(value);
    Ok(())
}

/// [`Scope::copy_all`](crate::Scope::copy_all) on the default scope.
///
/// # Errors
///
/// [`PropertyError::InvalidCarrierKind`] if either carrier type is
/// ineligible.
pub fn copy_all<F: Carrier, T: Carrier>(from: &F, to: &T) -> Result<(), PropertyError> {
    default_scope().copy_all(from, to)
}

#[cfg(test)]
mod tests {
    use alloc::sync::Arc;

    use super::*;

    #[test]
    fn test_round_trip_through_default_scope() {
        let carrier = Arc::new(0_u8);
        set(&carrier, "global-test", 3_u8).unwrap();
        assert_eq!(
            get(&carrier, "global-test").unwrap().downcast_ref::<u8>(),
            Some(&3)
        );

        let copy = Arc::new(1_u8);
        copy_all(&carrier, &copy).unwrap();
        assert!(handle(&copy, "global-test").unwrap().is_connected());
    }

    #[test]
    fn test_rejects_value_carriers() {
        assert!(matches!(
            set(&7_u64, "global-test", 1_u8),
            Err(PropertyError::InvalidCarrierKind { .. })
        ));
        assert!(get(&7_u64, "global-test").is_err());
    }
}
