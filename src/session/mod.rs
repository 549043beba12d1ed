//! Session module - Conversation state management
//!
//! This module provides the conversation log and the sessions that own it:
//! - [`Turn`] and [`ToolCallRequest`], the entries of a conversation
//! - [`Conversation`], an append-only log with tool-call pairing checks
//! - [`SessionManager`], which hands out one conversation per session key
//!
//! Any HTTP client can name a new session, so the manager can be capped with
//! [`SessionManager::with_max_sessions`]. At the cap, creating a session
//! evicts the least recently used idle one and its history is lost.
//!
//! # Example
//!
//! ```
//! use mcp_assistant::session::{SessionManager, Turn};
//!
//! #[tokio::main]
//! async fn main() {
//!     let manager = SessionManager::new();
//!
//!     // Lock the session's conversation for one exchange
//!     let mut conversation = manager.acquire("web:alice").await.unwrap();
//!     conversation.append(Turn::user("Hello!")).unwrap();
//!     conversation.append(Turn::assistant("Hi there!")).unwrap();
//!     assert_eq!(conversation.len(), 2);
//! }
//! ```

pub mod conversation;
pub mod types;

pub use conversation::{Conversation, Exchange};
pub use types::{ToolCallRequest, Turn};

use crate::error::{AssistantError, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, warn};

/// Shared handle to one session's conversation.
pub type SessionHandle = Arc<Mutex<Conversation>>;

/// Session manager mapping session keys to conversations.
///
/// Conversations live in memory for the lifetime of the process. Each one is
/// guarded by its own mutex, so independent sessions proceed concurrently
/// while a single session only ever runs one exchange at a time.
///
/// # Thread Safety
///
/// The manager uses `Arc<RwLock>` internally, making it safe to clone
/// and share across async tasks.
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<String, Slot>>>,
    clock: Arc<AtomicU64>,
    max_sessions: Option<usize>,
}

struct Slot {
    handle: SessionHandle,
    last_used: AtomicU64,
}

impl SessionManager {
    /// A manager with no limit on the number of sessions.
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            clock: Arc::new(AtomicU64::new(0)),
            max_sessions: None,
        }
    }

    /// A manager holding at most `max` sessions.
    ///
    /// Sessions that are locked or otherwise referenced are never evicted,
    /// so the count can exceed `max` while every session is in use.
    pub fn with_max_sessions(max: usize) -> Self {
        Self {
            max_sessions: Some(max.max(1)),
            ..Self::new()
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Get an existing session or create an empty one.
    ///
    /// # Example
    /// ```
    /// use mcp_assistant::session::SessionManager;
    ///
    /// tokio_test::block_on(async {
    ///     let manager = SessionManager::new();
    ///     let session = manager.get_or_create("test-session").await;
    ///     assert_eq!(session.lock().await.id(), "test-session");
    /// });
    /// ```
    pub async fn get_or_create(&self, key: &str) -> SessionHandle {
        {
            let sessions = self.sessions.read().await;
            if let Some(slot) = sessions.get(key) {
                slot.last_used.store(self.tick(), Ordering::Relaxed);
                return Arc::clone(&slot.handle);
            }
        }

        let mut sessions = self.sessions.write().await;
        // Another task may have created it between the two locks
        if let Some(slot) = sessions.get(key) {
            slot.last_used.store(self.tick(), Ordering::Relaxed);
            return Arc::clone(&slot.handle);
        }

        if let Some(max) = self.max_sessions {
            if sessions.len() >= max {
                evict_idle(&mut sessions, max);
            }
        }

        let handle = Arc::new(Mutex::new(Conversation::new(key)));
        sessions.insert(
            key.to_string(),
            Slot {
                handle: Arc::clone(&handle),
                last_used: AtomicU64::new(self.tick()),
            },
        );
        handle
    }

    /// Get a session by key without creating it.
    pub async fn get(&self, key: &str) -> Option<SessionHandle> {
        let sessions = self.sessions.read().await;
        sessions.get(key).map(|slot| Arc::clone(&slot.handle))
    }

    /// Lock the session's conversation for exclusive use.
    ///
    /// The session is created if needed. If another request currently holds
    /// it, this fails immediately instead of waiting, so two messages are
    /// never interleaved in the same conversation.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::SessionBusy`] when the session is in use.
    pub async fn acquire(&self, key: &str) -> Result<OwnedMutexGuard<Conversation>> {
        let session = self.get_or_create(key).await;
        session
            .try_lock_owned()
            .map_err(|_| AssistantError::SessionBusy(key.to_string()))
    }

    /// Remove a session. Returns whether it existed.
    pub async fn delete(&self, key: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        sessions.remove(key).is_some()
    }

    /// All session keys, sorted.
    pub async fn list(&self) -> Vec<String> {
        let sessions = self.sessions.read().await;
        let mut keys: Vec<String> = sessions.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub async fn exists(&self, key: &str) -> bool {
        let sessions = self.sessions.read().await;
        sessions.contains_key(key)
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Drop the least recently used sessions nobody holds until there is room
/// for one more under `max`.
fn evict_idle(sessions: &mut HashMap<String, Slot>, max: usize) {
    while sessions.len() >= max {
        let oldest = sessions
            .iter()
            .filter(|(_, slot)| Arc::strong_count(&slot.handle) == 1)
            .min_by_key(|(_, slot)| slot.last_used.load(Ordering::Relaxed))
            .map(|(key, _)| key.clone());
        match oldest {
            Some(key) => {
                debug!(session = %key, "Evicting idle session");
                sessions.remove(&key);
            }
            None => {
                warn!(
                    sessions = sessions.len(),
                    max, "Session limit reached and every session is in use"
                );
                return;
            }
        }
    }
}

impl Clone for SessionManager {
    fn clone(&self) -> Self {
        Self {
            sessions: Arc::clone(&self.sessions),
            clock: Arc::clone(&self.clock),
            max_sessions: self.max_sessions,
        }
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_session_create_and_retrieve() {
        let manager = SessionManager::new();
        let session = manager.get_or_create("test-session").await;
        let conversation = session.lock().await;
        assert!(conversation.is_empty());
        assert_eq!(conversation.id(), "test-session");
    }

    #[tokio::test]
    async fn test_session_state_is_shared() {
        let manager = SessionManager::new();
        {
            let mut conversation = manager.acquire("shared").await.unwrap();
            conversation.append(Turn::user("Hello")).unwrap();
        }

        let loaded = manager.get("shared").await.unwrap();
        assert_eq!(loaded.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_acquire_busy_session_fails() {
        let manager = SessionManager::new();
        let _held = manager.acquire("busy").await.unwrap();

        let err = manager.acquire("busy").await.unwrap_err();
        assert!(matches!(err, AssistantError::SessionBusy(ref key) if key == "busy"));

        // Other sessions are unaffected
        assert!(manager.acquire("other").await.is_ok());
    }

    #[tokio::test]
    async fn test_acquire_after_release() {
        let manager = SessionManager::new();
        drop(manager.acquire("s").await.unwrap());
        assert!(manager.acquire("s").await.is_ok());
    }

    #[tokio::test]
    async fn test_session_delete() {
        let manager = SessionManager::new();
        manager.get_or_create("test-session").await;
        assert!(manager.exists("test-session").await);

        assert!(manager.delete("test-session").await);
        assert!(!manager.exists("test-session").await);
        assert!(!manager.delete("test-session").await);
    }

    #[tokio::test]
    async fn test_session_list() {
        let manager = SessionManager::new();
        manager.get_or_create("session-c").await;
        manager.get_or_create("session-a").await;
        manager.get_or_create("session-b").await;

        let keys = manager.list().await;
        assert_eq!(keys, vec!["session-a", "session-b", "session-c"]);
        assert_eq!(manager.len().await, 3);
    }

    #[tokio::test]
    async fn test_session_get_nonexistent() {
        let manager = SessionManager::new();
        assert!(manager.get("nonexistent").await.is_none());
        assert!(manager.is_empty().await);
    }

    #[tokio::test]
    async fn test_session_manager_clone() {
        let manager1 = SessionManager::new();
        let manager2 = manager1.clone();

        manager1.get_or_create("shared").await;
        assert!(manager2.exists("shared").await);
    }

    #[tokio::test]
    async fn test_concurrent_get_or_create_yields_one_session() {
        let manager = Arc::new(SessionManager::new());
        let mut handles = Vec::new();

        for _ in 0..10 {
            let manager = Arc::clone(&manager);
            handles.push(tokio::spawn(async move {
                manager.get_or_create("concurrent").await
            }));
        }

        let mut sessions = Vec::new();
        for handle in handles {
            sessions.push(handle.await.unwrap());
        }

        assert_eq!(manager.len().await, 1);
        assert!(sessions.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[tokio::test]
    async fn test_oldest_idle_session_is_evicted_at_capacity() {
        let manager = SessionManager::with_max_sessions(2);
        manager.acquire("a").await.unwrap().append(Turn::user("hi")).unwrap();
        manager.get_or_create("b").await;

        // Touch "a" so "b" becomes the least recently used
        manager.get_or_create("a").await;
        manager.get_or_create("c").await;

        assert_eq!(manager.list().await, vec!["a", "c"]);
        let kept = manager.get("a").await.unwrap();
        assert_eq!(kept.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_busy_session_is_never_evicted() {
        let manager = SessionManager::with_max_sessions(1);
        let held = manager.acquire("busy").await.unwrap();

        manager.get_or_create("other").await;
        assert_eq!(manager.len().await, 2);
        assert!(manager.exists("busy").await);

        // Once released it can go
        drop(held);
        manager.get_or_create("third").await;
        assert!(!manager.exists("busy").await);
    }

    #[tokio::test]
    async fn test_unbounded_manager_keeps_everything() {
        let manager = SessionManager::new();
        for i in 0..50 {
            manager.get_or_create(&format!("s{}", i)).await;
        }
        assert_eq!(manager.len().await, 50);
    }
}
