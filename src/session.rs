use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::llm::Msg;

struct SessionEntry {
    memory: Vec<Msg>,
    last_access: Instant,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, SessionEntry>,
    locks: HashMap<String, Arc<Mutex<()>>>,
}

/// Volatile per-session conversational memory. One global mutex guards
/// the maps; the per-session locks serialize chat handling so memory
/// reads and writes for a session are linearizable.
pub struct SessionStore {
    ttl: Duration,
    inner: Mutex<Inner>,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        SessionStore { ttl, inner: Mutex::new(Inner::default()) }
    }

    /// The lock for a session, created on first reference.
    pub async fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut inner = self.inner.lock().await;
        inner
            .locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Snapshot of the session's memory; unknown sessions start empty.
    /// Sweeps expired entries first.
    pub async fn load_memory(&self, session_id: &str) -> Vec<Msg> {
        let mut inner = self.inner.lock().await;
        Self::sweep_locked(&mut inner, self.ttl);
        inner.entries.get(session_id).map(|e| e.memory.clone()).unwrap_or_default()
    }

    pub async fn save_memory(&self, session_id: &str, memory: Vec<Msg>) {
        let mut inner = self.inner.lock().await;
        inner.entries.insert(
            session_id.to_string(),
            SessionEntry { memory, last_access: Instant::now() },
        );
    }

    fn sweep_locked(inner: &mut Inner, ttl: Duration) {
        let now = Instant::now();
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, e)| now.duration_since(e.last_access) > ttl)
            .map(|(sid, _)| sid.clone())
            .collect();
        for sid in expired {
            inner.entries.remove(&sid);
            inner.locks.remove(&sid);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;

    #[tokio::test]
    async fn memory_round_trip() {
        let store = SessionStore::new(Duration::from_secs(60));
        assert!(store.load_memory("s").await.is_empty());

        store.save_memory("s", vec![Msg::text(Role::User, "hi")]).await;
        let memory = store.load_memory("s").await;
        assert_eq!(memory.len(), 1);
        assert_eq!(memory[0].joined_text(), "hi");
    }

    #[tokio::test]
    async fn ttl_evicts_stale_sessions() {
        let store = SessionStore::new(Duration::from_millis(5));
        store.save_memory("stale", vec![Msg::text(Role::User, "hi")]).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(store.load_memory("stale").await.is_empty());
    }

    #[tokio::test]
    async fn session_lock_is_shared() {
        let store = SessionStore::new(Duration::from_secs(60));
        let a = store.session_lock("s").await;
        let b = store.session_lock("s").await;
        assert!(Arc::ptr_eq(&a, &b));

        let other = store.session_lock("t").await;
        assert!(!Arc::ptr_eq(&a, &other));
    }

    #[tokio::test]
    async fn same_session_requests_serialize() {
        let store = Arc::new(SessionStore::new(Duration::from_secs(60)));
        let lock = store.session_lock("s").await;

        let guard = lock.lock().await;
        let store2 = store.clone();
        let task = tokio::spawn(async move {
            let lock = store2.session_lock("s").await;
            let _guard = lock.lock().await;
            store2.save_memory("s", vec![Msg::text(Role::User, "second")]).await;
        });

        // The spawned task cannot proceed while we hold the lock.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!task.is_finished());
        drop(guard);
        task.await.unwrap();
        assert_eq!(store.load_memory("s").await.len(), 1);
    }
}
