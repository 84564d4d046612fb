//! Clock, randomness and comparison helpers

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Current unix time in whole seconds.
///
/// A clock before the epoch is treated as the epoch.
#[inline]
#[must_use]
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

/// Fill `N` bytes from the thread-local CSPRNG and base64url-encode them
/// without padding.
///
/// # Example
/// ```
/// use oidc_auth_session::utils::random_urlsafe;
///
/// // 32 bytes encode to 43 characters
/// assert_eq!(random_urlsafe::<32>().len(), 43);
/// ```
#[must_use]
pub fn random_urlsafe<const N: usize>() -> String {
    let mut bytes = [0u8; N];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Compare two strings without short-circuiting on the first differing byte.
///
/// Length is not secret: strings of different length compare unequal
/// immediately.
///
/// # Example
/// ```
/// use oidc_auth_session::utils::constant_time_eq;
///
/// assert!(constant_time_eq("abc", "abc"));
/// assert!(!constant_time_eq("abc", "abd"));
/// assert!(!constant_time_eq("abc", "ab"));
/// ```
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
