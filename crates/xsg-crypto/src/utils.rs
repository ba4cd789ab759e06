//! Constant-time comparison helpers for tags and key material.

use constant_time_eq::constant_time_eq;

/// Compare two byte slices in constant time.
///
/// Slices of different length compare unequal.
///
/// ```rust
/// use xsg_crypto::utils::constant_time_compare;
///
/// let tag = [0u8; 32];
/// assert!(constant_time_compare(&tag, &[0u8; 32]));
/// assert!(!constant_time_compare(&tag, &[1u8; 32]));
/// ```
pub fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    constant_time_eq(a, b)
}
