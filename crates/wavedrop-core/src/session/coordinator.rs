//! Session lifecycle on top of a [`SessionStore`].
//!
//! The coordinator owns every rule the relay enforces: unique token
//! generation with bounded retries, expiry checks that delete on read,
//! write-once answers, role-scoped field writes, and the update stream a
//! waiting peer watches. It never inspects description or candidate
//! payloads; those stay opaque end to end.

use std::time::Duration;

use async_stream::stream;
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::token::{ShareToken, TokenGenerator};
use crate::transport::{IceCandidate, SdpKind, SessionDescription};

use super::store::SessionStore;
use super::{FileInfo, Role, Session, SessionStatus};

/// How often a subscription re-reads its record when no change
/// notification arrives.
const SUBSCRIBE_POLL: Duration = Duration::from_secs(1);

/// Coordinator tunables.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// How long a session stays valid after creation.
    pub session_ttl: chrono::Duration,
    /// How many token collisions to tolerate before giving up.
    pub token_attempts: u32,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            session_ttl: chrono::Duration::seconds(crate::DEFAULT_TOKEN_EXPIRY_SECS as i64),
            token_attempts: crate::TOKEN_GENERATION_ATTEMPTS,
        }
    }
}

/// What a successful [`SessionCoordinator::create_session`] hands back.
#[derive(Debug, Clone)]
pub struct CreatedSession {
    /// The freshly minted share token.
    pub token: ShareToken,
    /// Expiry time, milliseconds since the epoch.
    pub expires_at: i64,
}

/// One update pushed to a subscribed peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SessionEvent {
    /// The record changed (or may have); re-apply its contents.
    ///
    /// Candidates carry the full list seen so far. Delivery is
    /// at-least-once; consumers de-duplicate.
    Update {
        /// Current status
        status: SessionStatus,
        /// The remote answer, present once the receiver submitted one and
        /// the subscriber is the sender
        #[serde(default, skip_serializing_if = "Option::is_none")]
        answer: Option<SessionDescription>,
        /// All candidates the other side has published
        candidates: Vec<IceCandidate>,
    },
    /// The record expired or disappeared; the subscription ends.
    Expired,
}

/// The relay's brain.
pub struct SessionCoordinator<S: SessionStore> {
    store: S,
    generator: TokenGenerator,
    config: CoordinatorConfig,
}

impl<S: SessionStore> SessionCoordinator<S> {
    /// Wrap a store with default tunables.
    pub fn new(store: S) -> Self {
        Self::with_config(store, CoordinatorConfig::default())
    }

    /// Wrap a store with explicit tunables.
    pub fn with_config(store: S, config: CoordinatorConfig) -> Self {
        Self {
            store,
            generator: TokenGenerator::new(),
            config,
        }
    }

    /// Mint a token and store a fresh session for `offer`.
    ///
    /// Retries on token collision a bounded number of times.
    pub async fn create_session(
        &self,
        offer: SessionDescription,
        file: FileInfo,
    ) -> Result<CreatedSession> {
        if offer.kind != SdpKind::Offer {
            return Err(Error::DescriptionFailed(
                "session must be created from an offer".to_string(),
            ));
        }

        for attempt in 1..=self.config.token_attempts {
            let token = self.generator.generate();
            let session = Session::new(
                token.as_str().to_string(),
                offer.clone(),
                file.clone(),
                self.config.session_ttl,
            );
            let expires_at = session.expires_at;
            if self.store.insert_if_absent(session).await? {
                info!(token = %token, attempt, "session created");
                return Ok(CreatedSession { token, expires_at });
            }
            debug!(token = %token, attempt, "token collision, retrying");
        }
        Err(Error::TokenGenerationExhausted(self.config.token_attempts))
    }

    /// Look a token up, enforcing format and expiry.
    ///
    /// An expired record is deleted on the spot and reported as expired,
    /// so a stale token can never be joined.
    pub async fn validate_session(&self, token: &str) -> Result<Session> {
        let token = ShareToken::parse(token)?;
        let Some(session) = self.store.get(token.as_str()).await? else {
            return Err(Error::TokenNotFound(token.as_str().to_string()));
        };
        if session.is_expired() {
            let _ = self.store.remove(token.as_str()).await?;
            info!(%token, "expired session removed on validation");
            return Err(Error::TokenExpired);
        }
        Ok(session)
    }

    /// Record the receiver's answer.
    ///
    /// The answer field belongs to the receiver and is write-once:
    /// re-submitting the identical answer is accepted (retries are
    /// routine), submitting a different one is rejected.
    pub async fn submit_answer(
        &self,
        token: &str,
        role: Role,
        answer: SessionDescription,
    ) -> Result<()> {
        if role != Role::Receiver {
            return Err(Error::FieldNotOwned {
                role: "sender",
                field: "answer",
            });
        }
        if answer.kind != SdpKind::Answer {
            return Err(Error::DescriptionFailed(
                "submitted description is not an answer".to_string(),
            ));
        }
        self.validate_session(token).await?;

        let updated = self
            .store
            .update(token, |session| {
                match &session.receiver.answer {
                    None => {
                        session.receiver.answer = Some(answer);
                        if session.status.can_advance_to(SessionStatus::Connected) {
                            session.status = SessionStatus::Connected;
                        }
                        Ok(())
                    }
                    Some(existing) if *existing == answer => Ok(()),
                    Some(_) => Err(Error::AnswerAlreadySet),
                }
            })
            .await?;
        if updated.is_none() {
            return Err(Error::TokenNotFound(token.to_string()));
        }
        debug!(token, "answer recorded");
        Ok(())
    }

    /// Append one candidate to the submitting role's own list.
    pub async fn submit_candidate(
        &self,
        token: &str,
        role: Role,
        candidate: IceCandidate,
    ) -> Result<()> {
        self.validate_session(token).await?;
        let updated = self
            .store
            .update(token, |session| {
                let list = match role {
                    Role::Sender => &mut session.sender.candidates,
                    Role::Receiver => &mut session.receiver.candidates,
                };
                list.push(candidate);
                Ok(())
            })
            .await?;
        if updated.is_none() {
            return Err(Error::TokenNotFound(token.to_string()));
        }
        Ok(())
    }

    /// Delete a session once its transfer completed or was abandoned.
    ///
    /// Deleting a token that is already gone is fine.
    pub async fn close_session(&self, token: &str) -> Result<()> {
        if self.store.remove(token).await? {
            info!(token, "session closed");
        }
        Ok(())
    }

    /// Advance a session's status, dropping backward transitions.
    pub async fn advance_status(&self, token: &str, next: SessionStatus) -> Result<()> {
        self.store
            .update(token, |session| {
                if session.status.can_advance_to(next) {
                    session.status = next;
                }
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Delete every expired record. Returns how many went away.
    pub async fn sweep_expired(&self) -> Result<usize> {
        let mut deleted = 0;
        for token in self.store.tokens().await? {
            if let Some(session) = self.store.get(&token).await? {
                if session.is_expired() && self.store.remove(&token).await? {
                    deleted += 1;
                }
            }
        }
        if deleted > 0 {
            info!(deleted, "expired sessions swept");
        }
        Ok(deleted)
    }

    /// Watch a session for updates, from `role`'s point of view.
    ///
    /// Emits an `Update` immediately, then on every change notification or
    /// poll tick, and a final `Expired` when the record lapses or
    /// disappears. Updates re-send the full candidate list.
    pub fn subscribe(&self, token: String, role: Role) -> impl Stream<Item = SessionEvent> + 'static
    where
        S: Clone + 'static,
    {
        let store = self.store.clone();
        stream! {
            let mut changes = store.changes();
            loop {
                match store.get(&token).await {
                    Ok(Some(session)) if !session.is_expired() => {
                        yield Self::event_for(&session, role);
                    }
                    Ok(Some(_)) => {
                        let _ = store.remove(&token).await;
                        yield SessionEvent::Expired;
                        break;
                    }
                    Ok(None) => {
                        yield SessionEvent::Expired;
                        break;
                    }
                    Err(e) => {
                        warn!(%e, token, "subscription read failed");
                        break;
                    }
                }

                tokio::select! {
                    () = sleep(SUBSCRIBE_POLL) => {}
                    changed = changes.recv() => match changed {
                        Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                        Err(broadcast::error::RecvError::Closed) => sleep(SUBSCRIBE_POLL).await,
                    },
                }
            }
        }
    }

    fn event_for(session: &Session, role: Role) -> SessionEvent {
        let (answer, candidates) = match role {
            Role::Sender => (
                session.receiver.answer.clone(),
                session.receiver.candidates.clone(),
            ),
            Role::Receiver => (None, session.sender.candidates.clone()),
        };
        SessionEvent::Update {
            status: session.status,
            answer,
            candidates,
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;
    use crate::session::MemoryStore;

    fn sample_file() -> FileInfo {
        FileInfo {
            name: "track.flac".to_string(),
            size: 9_000,
            media_type: "audio/flac".to_string(),
        }
    }

    fn coordinator() -> SessionCoordinator<MemoryStore> {
        SessionCoordinator::new(MemoryStore::new())
    }

    fn expiring_coordinator() -> SessionCoordinator<MemoryStore> {
        SessionCoordinator::with_config(
            MemoryStore::new(),
            CoordinatorConfig {
                session_ttl: chrono::Duration::zero(),
                token_attempts: 5,
            },
        )
    }

    fn candidate(n: u32) -> IceCandidate {
        IceCandidate {
            candidate: format!("candidate:{n} 1 udp 1 203.0.113.{n} 40000 typ host"),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(0),
        }
    }

    #[tokio::test]
    async fn create_then_validate_round_trip() {
        let coordinator = coordinator();
        let created = coordinator
            .create_session(SessionDescription::offer("v=0"), sample_file())
            .await
            .unwrap();

        let session = coordinator
            .validate_session(created.token.as_str())
            .await
            .unwrap();
        assert_eq!(session.status, SessionStatus::Waiting);
        assert_eq!(session.file.name, "track.flac");
        assert_eq!(session.expires_at, created.expires_at);
    }

    #[tokio::test]
    async fn create_rejects_an_answer_description() {
        let coordinator = coordinator();
        let err = coordinator
            .create_session(SessionDescription::answer("v=0"), sample_file())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DescriptionFailed(_)));
    }

    #[tokio::test]
    async fn expired_token_is_deleted_on_validation() {
        let coordinator = expiring_coordinator();
        let created = coordinator
            .create_session(SessionDescription::offer("v=0"), sample_file())
            .await
            .unwrap();

        let err = coordinator
            .validate_session(created.token.as_str())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TokenExpired));

        // Gone now: a second lookup is not-found, not expired.
        let err = coordinator
            .validate_session(created.token.as_str())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TokenNotFound(_)));
    }

    #[tokio::test]
    async fn unknown_and_malformed_tokens() {
        let coordinator = coordinator();
        assert!(matches!(
            coordinator.validate_session("oceanriver").await.unwrap_err(),
            Error::TokenNotFound(_)
        ));
        assert!(matches!(
            coordinator.validate_session("UPPER!").await.unwrap_err(),
            Error::InvalidTokenFormat(_)
        ));
    }

    #[tokio::test]
    async fn answer_is_write_once_but_idempotent() {
        let coordinator = coordinator();
        let created = coordinator
            .create_session(SessionDescription::offer("v=0"), sample_file())
            .await
            .unwrap();
        let token = created.token.as_str();
        let answer = SessionDescription::answer("v=0 a");

        coordinator
            .submit_answer(token, Role::Receiver, answer.clone())
            .await
            .unwrap();
        // Retry with the identical answer is fine.
        coordinator
            .submit_answer(token, Role::Receiver, answer)
            .await
            .unwrap();
        // A different answer is not.
        let err = coordinator
            .submit_answer(token, Role::Receiver, SessionDescription::answer("v=0 b"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AnswerAlreadySet));

        let session = coordinator.validate_session(token).await.unwrap();
        assert_eq!(session.status, SessionStatus::Connected);
    }

    #[tokio::test]
    async fn sender_may_not_write_the_answer() {
        let coordinator = coordinator();
        let created = coordinator
            .create_session(SessionDescription::offer("v=0"), sample_file())
            .await
            .unwrap();
        let err = coordinator
            .submit_answer(
                created.token.as_str(),
                Role::Sender,
                SessionDescription::answer("v=0"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::FieldNotOwned { .. }));
    }

    #[tokio::test]
    async fn candidates_land_in_the_submitting_half() {
        let coordinator = coordinator();
        let created = coordinator
            .create_session(SessionDescription::offer("v=0"), sample_file())
            .await
            .unwrap();
        let token = created.token.as_str();

        coordinator
            .submit_candidate(token, Role::Sender, candidate(1))
            .await
            .unwrap();
        coordinator
            .submit_candidate(token, Role::Receiver, candidate(2))
            .await
            .unwrap();
        coordinator
            .submit_candidate(token, Role::Receiver, candidate(3))
            .await
            .unwrap();

        let session = coordinator.validate_session(token).await.unwrap();
        assert_eq!(session.sender.candidates.len(), 1);
        assert_eq!(session.receiver.candidates.len(), 2);
    }

    #[tokio::test]
    async fn sweep_deletes_only_expired_records() {
        let store = MemoryStore::new();
        let live = SessionCoordinator::new(store.clone());
        let dead = SessionCoordinator::with_config(
            store.clone(),
            CoordinatorConfig {
                session_ttl: chrono::Duration::zero(),
                token_attempts: 5,
            },
        );

        live.create_session(SessionDescription::offer("v=0"), sample_file())
            .await
            .unwrap();
        dead.create_session(SessionDescription::offer("v=0"), sample_file())
            .await
            .unwrap();
        dead.create_session(SessionDescription::offer("v=0"), sample_file())
            .await
            .unwrap();

        assert_eq!(live.sweep_expired().await.unwrap(), 2);
        assert_eq!(live.sweep_expired().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn subscription_sees_answer_and_candidates_then_expiry() {
        let coordinator = coordinator();
        let created = coordinator
            .create_session(SessionDescription::offer("v=0"), sample_file())
            .await
            .unwrap();
        let token = created.token.as_str().to_string();

        let mut stream = Box::pin(coordinator.subscribe(token.clone(), Role::Sender));

        // Initial snapshot: waiting, nothing from the receiver yet.
        match stream.next().await {
            Some(SessionEvent::Update {
                status,
                answer,
                candidates,
            }) => {
                assert_eq!(status, SessionStatus::Waiting);
                assert!(answer.is_none());
                assert!(candidates.is_empty());
            }
            other => panic!("expected initial update, got {other:?}"),
        }

        coordinator
            .submit_answer(&token, Role::Receiver, SessionDescription::answer("v=0 a"))
            .await
            .unwrap();
        coordinator
            .submit_candidate(&token, Role::Receiver, candidate(1))
            .await
            .unwrap();

        // Watch for the answer to show up; candidate lists are cumulative.
        let mut saw_answer = false;
        for _ in 0..5 {
            if let Some(SessionEvent::Update { answer, .. }) = stream.next().await {
                if answer.is_some() {
                    saw_answer = true;
                    break;
                }
            }
        }
        assert!(saw_answer);

        coordinator.close_session(&token).await.unwrap();
        let mut saw_expired = false;
        for _ in 0..5 {
            match stream.next().await {
                Some(SessionEvent::Expired) | None => {
                    saw_expired = true;
                    break;
                }
                Some(SessionEvent::Update { .. }) => {}
            }
        }
        assert!(saw_expired);
    }
}
