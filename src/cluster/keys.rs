//! Queue-key and app-key derivation.
//!
//! Keys are short fixed-width identifiers derived deterministically from
//! names: hash the name with CRC-32C, truncate to the key width. Queue
//! keys only need to be unique within their partition and app keys only
//! within their queue, so the narrow width is acceptable; when a
//! collision does occur the derivation is retried with a salt taken from
//! a monotonic counter until a free key is found.
//!
//! # Key Format
//!
//! - Queue key: first [`QUEUE_KEY_WIDTH`] bytes of `crc32c(uri)`,
//!   big-endian.
//! - App key: first [`APP_KEY_WIDTH`] bytes of `crc32c(app_id)`,
//!   big-endian.
//! - Salted form: `crc32c(name ++ salt_be)` for salt ≥ 1.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::{APP_KEY_WIDTH, MAX_KEY_COLLISION_RETRIES, QUEUE_KEY_WIDTH};
use crate::protocol::crc32c;

/// A queue's storage key, unique within its partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct QueueKey(pub [u8; QUEUE_KEY_WIDTH]);

impl QueueKey {
    /// Derive the key for `uri` with the given salt (0 = unsalted).
    pub fn derive(uri: &str, salt: u32) -> Self {
        QueueKey(hash_truncate(uri, salt))
    }

    /// Raw key bytes.
    pub const fn as_bytes(&self) -> &[u8; QUEUE_KEY_WIDTH] {
        &self.0
    }
}

impl fmt::Display for QueueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

/// An app's storage key, unique within its queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct AppKey(pub [u8; APP_KEY_WIDTH]);

impl AppKey {
    /// Derive the key for `app_id` with the given salt (0 = unsalted).
    pub fn derive(app_id: &str, salt: u32) -> Self {
        AppKey(hash_truncate(app_id, salt))
    }

    /// Raw key bytes.
    pub const fn as_bytes(&self) -> &[u8; APP_KEY_WIDTH] {
        &self.0
    }
}

impl fmt::Display for AppKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

fn hash_truncate<const W: usize>(name: &str, salt: u32) -> [u8; W] {
    let hash = if salt == 0 {
        crc32c(name.as_bytes())
    } else {
        let mut salted = Vec::with_capacity(name.len() + 4);
        salted.extend_from_slice(name.as_bytes());
        salted.extend_from_slice(&salt.to_be_bytes());
        crc32c(&salted)
    };
    let wide = hash.to_be_bytes();
    let mut key = [0u8; W];
    key.copy_from_slice(&wide[..W]);
    key
}

/// Derive a queue key for `uri` that is not already `taken`.
///
/// Tries the unsalted key first, then salts 1, 2, ... up to
/// [`MAX_KEY_COLLISION_RETRIES`]. Returns `None` when every candidate
/// collides, which the caller reports as a duplicate-key rejection.
pub fn unique_queue_key<F>(uri: &str, mut taken: F) -> Option<QueueKey>
where
    F: FnMut(&QueueKey) -> bool,
{
    for salt in 0..=MAX_KEY_COLLISION_RETRIES {
        let key = QueueKey::derive(uri, salt);
        if !taken(&key) {
            return Some(key);
        }
    }
    None
}

/// Derive an app key for `app_id` that is not already `taken`.
pub fn unique_app_key<F>(app_id: &str, mut taken: F) -> Option<AppKey>
where
    F: FnMut(&AppKey) -> bool,
{
    for salt in 0..=MAX_KEY_COLLISION_RETRIES {
        let key = AppKey::derive(app_id, salt);
        if !taken(&key) {
            return Some(key);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_queue_key_deterministic() {
        let a = QueueKey::derive("bmq://domain/queue", 0);
        let b = QueueKey::derive("bmq://domain/queue", 0);
        assert_eq!(a, b);
    }

    #[test]
    fn test_queue_key_differs_by_uri() {
        let a = QueueKey::derive("bmq://domain/q1", 0);
        let b = QueueKey::derive("bmq://domain/q2", 0);
        assert_ne!(a, b);
    }

    #[test]
    fn test_salt_changes_key() {
        let base = QueueKey::derive("bmq://domain/queue", 0);
        let salted = QueueKey::derive("bmq://domain/queue", 1);
        assert_ne!(base, salted);
    }

    #[test]
    fn test_unique_queue_key_no_collision() {
        let key = unique_queue_key("bmq://d/q", |_| false).unwrap();
        assert_eq!(key, QueueKey::derive("bmq://d/q", 0));
    }

    #[test]
    fn test_unique_queue_key_retries_past_collisions() {
        let mut taken = HashSet::new();
        taken.insert(QueueKey::derive("bmq://d/q", 0));
        taken.insert(QueueKey::derive("bmq://d/q", 1));

        let key = unique_queue_key("bmq://d/q", |k| taken.contains(k)).unwrap();
        assert_eq!(key, QueueKey::derive("bmq://d/q", 2));
    }

    #[test]
    fn test_unique_queue_key_exhausted() {
        assert_eq!(unique_queue_key("bmq://d/q", |_| true), None);
    }

    #[test]
    fn test_unique_app_key() {
        let first = AppKey::derive("billing", 0);
        let key = unique_app_key("billing", |k| *k == first).unwrap();
        assert_eq!(key, AppKey::derive("billing", 1));
    }

    #[test]
    fn test_key_display_is_hex() {
        let key = QueueKey([0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(key.to_string(), "DEADBEEF");
        let key = AppKey([0x00, 0x01, 0x02, 0x03]);
        assert_eq!(key.to_string(), "00010203");
    }
}
