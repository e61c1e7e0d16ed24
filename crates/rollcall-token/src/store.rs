//! Token store capability and the in-memory backend.
//!
//! The manager needs a handful of primitives from a key-value store with TTL: plain get/set,
//! an atomic swap for rotation, an atomic list append for redemptions and an atomic counter for
//! rotation generations. Any backend offering these (Redis, memcached with CAS, ...) can implement
//! [`TokenStore`].

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::StoreError;

/// Key-value store with per-key expiry.
///
/// Expired keys must behave exactly like missing keys.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Set a value that expires after `ttl`.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Set a value that expires after `ttl`, returning the value it replaced.
    async fn swap_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<Option<String>, StoreError>;

    /// Remove a key. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Append to a list. A missing list is created with `ttl`; an existing one keeps its expiry.
    /// Returns the new length.
    async fn append(&self, key: &str, item: &str, ttl: Duration) -> Result<usize, StoreError>;

    /// Items of a list, oldest first. A missing list is empty.
    async fn list(&self, key: &str) -> Result<Vec<String>, StoreError>;

    /// Increment a counter without expiry, starting from zero. Returns the new value.
    async fn incr(&self, key: &str) -> Result<i64, StoreError>;

    /// Time left before the key expires. `None` when missing or without expiry.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError>;
}

#[derive(Debug, Clone)]
enum Value {
    Text(String),
    List(Vec<String>),
    Counter(i64),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|deadline| now < deadline)
    }
}

/// In-memory [`TokenStore`].
///
/// Uses the tokio clock, so tests running with a paused clock control expiry with
/// `tokio::time::advance`. Expired entries are reaped lazily on access.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .map(|entries| entries.values().filter(|e| e.is_live(now)).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn with_entries<T>(
        &self,
        f: impl FnOnce(&mut HashMap<String, Entry>, Instant) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::LockPoisoned)?;
        let now = Instant::now();
        f(&mut entries, now)
    }
}

/// Remove `key` if it expired, then return the live entry.
fn live<'a>(entries: &'a mut HashMap<String, Entry>, key: &str, now: Instant) -> Option<&'a mut Entry> {
    if entries.get(key).is_some_and(|e| !e.is_live(now)) {
        entries.remove(key);
    }
    entries.get_mut(key)
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::WrongType { key: key.to_string() }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.with_entries(|entries, now| match live(entries, key, now) {
            None => Ok(None),
            Some(Entry {
                value: Value::Text(text),
                ..
            }) => Ok(Some(text.clone())),
            Some(_) => Err(wrong_type(key)),
        })
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.with_entries(|entries, now| {
            entries.insert(
                key.to_string(),
                Entry {
                    value: Value::Text(value.to_string()),
                    expires_at: Some(now + ttl),
                },
            );
            Ok(())
        })
    }

    async fn swap_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<Option<String>, StoreError> {
        self.with_entries(|entries, now| {
            let previous = match live(entries, key, now) {
                None => None,
                Some(Entry {
                    value: Value::Text(text),
                    ..
                }) => Some(text.clone()),
                Some(_) => return Err(wrong_type(key)),
            };
            entries.insert(
                key.to_string(),
                Entry {
                    value: Value::Text(value.to_string()),
                    expires_at: Some(now + ttl),
                },
            );
            Ok(previous)
        })
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.with_entries(|entries, now| Ok(entries.remove(key).is_some_and(|e| e.is_live(now))))
    }

    async fn append(&self, key: &str, item: &str, ttl: Duration) -> Result<usize, StoreError> {
        self.with_entries(|entries, now| match live(entries, key, now) {
            Some(Entry {
                value: Value::List(items),
                ..
            }) => {
                items.push(item.to_string());
                Ok(items.len())
            }
            Some(_) => Err(wrong_type(key)),
            None => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: Value::List(vec![item.to_string()]),
                        expires_at: Some(now + ttl),
                    },
                );
                Ok(1)
            }
        })
    }

    async fn list(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.with_entries(|entries, now| match live(entries, key, now) {
            None => Ok(Vec::new()),
            Some(Entry {
                value: Value::List(items),
                ..
            }) => Ok(items.clone()),
            Some(_) => Err(wrong_type(key)),
        })
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        self.with_entries(|entries, now| match live(entries, key, now) {
            Some(Entry {
                value: Value::Counter(n),
                ..
            }) => {
                *n += 1;
                Ok(*n)
            }
            Some(_) => Err(wrong_type(key)),
            None => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: Value::Counter(1),
                        expires_at: None,
                    },
                );
                Ok(1)
            }
        })
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        self.with_entries(|entries, now| {
            Ok(live(entries, key, now)
                .and_then(|e| e.expires_at)
                .map(|deadline| deadline.saturating_duration_since(now)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_set_ex_expires_with_the_clock() {
        let store = MemoryTokenStore::new();
        store.set_ex("k", "v", Duration::from_secs(10)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(9)).await;
        assert_eq!(store.ttl("k").await.unwrap(), Some(Duration::from_secs(1)));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(store.get("k").await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_append_keeps_original_expiry() {
        let store = MemoryTokenStore::new();
        assert_eq!(store.append("l", "a", Duration::from_secs(5)).await.unwrap(), 1);

        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(store.append("l", "b", Duration::from_secs(60)).await.unwrap(), 2);
        assert_eq!(store.list("l").await.unwrap(), vec!["a", "b"]);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(store.list("l").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_swap_returns_previous_value() {
        let store = MemoryTokenStore::new();
        let ttl = Duration::from_secs(60);
        assert!(store.swap_ex("p", "one", ttl).await.unwrap().is_none());
        assert_eq!(store.swap_ex("p", "two", ttl).await.unwrap().as_deref(), Some("one"));
        assert_eq!(store.get("p").await.unwrap().as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn test_wrong_type_is_an_error() {
        let store = MemoryTokenStore::new();
        store.incr("c").await.unwrap();
        assert!(matches!(store.get("c").await, Err(StoreError::WrongType { .. })));
        assert!(store.delete("c").await.unwrap());
        assert!(!store.delete("c").await.unwrap());
    }
}
