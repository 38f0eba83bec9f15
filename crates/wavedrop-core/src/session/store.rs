//! Session persistence behind a trait, with the in-memory store the relay
//! actually runs on.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::debug;

use crate::error::{Error, Result};

use super::Session;

/// Capacity of the change-notification channel. A lagging subscriber only
/// misses wakeups, not data; the next poll re-reads the full record.
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Where session records live.
///
/// Mutations publish the affected token on a broadcast channel so
/// subscribers can wake up and re-read. Delivery is at-least-once at best;
/// consumers must tolerate missed and spurious wakeups.
#[allow(async_fn_in_trait)]
pub trait SessionStore: Send + Sync {
    /// Fetch a record.
    async fn get(&self, token: &str) -> Result<Option<Session>>;

    /// Insert a record if its token is free. Returns whether it went in.
    async fn insert_if_absent(&self, session: Session) -> Result<bool>;

    /// Mutate a record in place. Returns the updated record, or `None` if
    /// the token does not exist. The closure's error aborts the update.
    async fn update(
        &self,
        token: &str,
        apply: impl FnOnce(&mut Session) -> Result<()> + Send,
    ) -> Result<Option<Session>>;

    /// Delete a record. Returns whether it existed.
    async fn remove(&self, token: &str) -> Result<bool>;

    /// All live tokens, for the expiry sweep.
    async fn tokens(&self) -> Result<Vec<String>>;

    /// Subscribe to change notifications (the affected token).
    fn changes(&self) -> broadcast::Receiver<String>;
}

/// In-memory store.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<HashMap<String, Session>>>,
    changes: broadcast::Sender<String>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            changes,
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Session>>> {
        self.inner
            .lock()
            .map_err(|_| Error::Internal("session store lock poisoned".to_string()))
    }

    fn notify(&self, token: &str) {
        // No subscribers is fine.
        let _ = self.changes.send(token.to_string());
    }
}

impl SessionStore for MemoryStore {
    async fn get(&self, token: &str) -> Result<Option<Session>> {
        Ok(self.lock()?.get(token).cloned())
    }

    async fn insert_if_absent(&self, session: Session) -> Result<bool> {
        let token = session.token.clone();
        let inserted = {
            let mut map = self.lock()?;
            if map.contains_key(&token) {
                false
            } else {
                map.insert(token.clone(), session);
                true
            }
        };
        if inserted {
            debug!(%token, "session stored");
            self.notify(&token);
        }
        Ok(inserted)
    }

    async fn update(
        &self,
        token: &str,
        apply: impl FnOnce(&mut Session) -> Result<()> + Send,
    ) -> Result<Option<Session>> {
        // Apply to a copy so an erroring closure leaves the record as it was.
        let updated = {
            let mut map = self.lock()?;
            match map.get_mut(token) {
                None => None,
                Some(session) => {
                    let mut draft = session.clone();
                    apply(&mut draft)?;
                    *session = draft.clone();
                    Some(draft)
                }
            }
        };
        if updated.is_some() {
            self.notify(token);
        }
        Ok(updated)
    }

    async fn remove(&self, token: &str) -> Result<bool> {
        let removed = self.lock()?.remove(token).is_some();
        if removed {
            debug!(%token, "session removed");
            self.notify(token);
        }
        Ok(removed)
    }

    async fn tokens(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.keys().cloned().collect())
    }

    fn changes(&self) -> broadcast::Receiver<String> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{FileInfo, SessionStatus};
    use crate::transport::SessionDescription;

    fn sample(token: &str) -> Session {
        Session::new(
            token.to_string(),
            SessionDescription::offer("v=0"),
            FileInfo {
                name: "a.bin".to_string(),
                size: 1,
                media_type: "application/octet-stream".to_string(),
            },
            chrono::Duration::minutes(10),
        )
    }

    #[tokio::test]
    async fn insert_is_unique_per_token() {
        let store = MemoryStore::new();
        assert!(store.insert_if_absent(sample("riverstone")).await.unwrap());
        assert!(!store.insert_if_absent(sample("riverstone")).await.unwrap());
        assert!(store.insert_if_absent(sample("winterlake")).await.unwrap());
        let mut tokens = store.tokens().await.unwrap();
        tokens.sort();
        assert_eq!(tokens, vec!["riverstone", "winterlake"]);
    }

    #[tokio::test]
    async fn update_mutates_and_notifies() {
        let store = MemoryStore::new();
        let mut changes = store.changes();
        store.insert_if_absent(sample("riverstone")).await.unwrap();

        let updated = store
            .update("riverstone", |s| {
                s.status = SessionStatus::Connected;
                Ok(())
            })
            .await
            .unwrap()
            .expect("record exists");
        assert_eq!(updated.status, SessionStatus::Connected);

        // Insert and update both notified.
        assert_eq!(changes.recv().await.unwrap(), "riverstone");
        assert_eq!(changes.recv().await.unwrap(), "riverstone");
    }

    #[tokio::test]
    async fn update_missing_token_is_none() {
        let store = MemoryStore::new();
        let updated = store.update("riverstone", |_| Ok(())).await.unwrap();
        assert!(updated.is_none());
        assert!(!store.remove("riverstone").await.unwrap());
    }

    #[tokio::test]
    async fn failed_closure_leaves_record_untouched() {
        let store = MemoryStore::new();
        store.insert_if_absent(sample("riverstone")).await.unwrap();
        let err = store
            .update("riverstone", |s| {
                s.status = SessionStatus::Complete;
                Err(Error::AnswerAlreadySet)
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AnswerAlreadySet));
        let session = store.get("riverstone").await.unwrap().expect("still there");
        assert_eq!(session.status, SessionStatus::Waiting);
    }
}
