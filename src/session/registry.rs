use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::Mutex;

use super::{ExamSession, SessionDeps, SessionSettings};
use crate::{
    error::SessionError,
    models::{
        exam::ExamDefinition,
        identity::Identity,
        session::{SessionKey, SessionStatus},
    },
};

/// Live sessions of this host, at most one per (subject, exam).
///
/// A session leaves the registry when it is closed, or once it has been
/// submitted and its retention period has passed. Abandoned sessions are
/// force-submitted at their deadline and then released the same way.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<SessionKey, Arc<ExamSession>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &SessionKey) -> Option<Arc<ExamSession>> {
        self.sessions.lock().await.get(key).cloned()
    }

    /// Returns the live session for `key` unless it has already been submitted.
    pub async fn get_unsubmitted(&self, key: &SessionKey) -> Option<Arc<ExamSession>> {
        let session = self.get(key).await?;
        match session.status().await {
            SessionStatus::Submitted { .. } => None,
            _ => Some(session),
        }
    }

    /// Returns the live session for the candidate, or opens and starts a new
    /// one (resuming its snapshot if any). A submitted session is replaced.
    pub async fn open(
        &self,
        exam: ExamDefinition,
        identity: Identity,
        deps: SessionDeps,
        settings: SessionSettings,
    ) -> Result<Arc<ExamSession>, SessionError> {
        let key = SessionKey::new(identity.subject_id(), exam.id);
        let mut sessions = self.sessions.lock().await;

        if let Some(existing) = sessions.get(&key) {
            if !matches!(existing.status().await, SessionStatus::Submitted { .. }) {
                return Ok(existing.clone());
            }
        }

        let retention = settings.submitted_retention;
        let session = ExamSession::open(Arc::new(exam), identity, deps, settings)?;
        session.start().await;
        if let Some(previous) = sessions.insert(key.clone(), session.clone()) {
            previous.stop().await;
        }
        self.release_when_submitted(key, &session, retention);
        Ok(session)
    }

    /// Drops `session` from the registry `retention` after it is submitted,
    /// unless it has been replaced or closed by then.
    fn release_when_submitted(
        &self,
        key: SessionKey,
        session: &Arc<ExamSession>,
        retention: Duration,
    ) {
        let mut status = session.status_updates();
        let registry = Arc::downgrade(&self.sessions);
        let watched: Weak<ExamSession> = Arc::downgrade(session);

        tokio::spawn(async move {
            // Errors once the session itself is dropped.
            let submitted = status
                .wait_for(|s| matches!(s, SessionStatus::Submitted { .. }))
                .await
                .is_ok();
            if !submitted {
                return;
            }
            tokio::time::sleep(retention).await;

            let Some(registry) = registry.upgrade() else {
                return;
            };
            let mut sessions = registry.lock().await;
            let still_registered = sessions
                .get(&key)
                .is_some_and(|live| std::ptr::eq(Arc::as_ptr(live), watched.as_ptr()));
            if still_registered {
                sessions.remove(&key);
                tracing::info!("Released submitted session {}", key);
            }
        });
    }

    /// Stops and forgets the session for `key`. Its snapshot is kept.
    pub async fn close(&self, key: &SessionKey) -> bool {
        let removed = self.sessions.lock().await.remove(key);
        match removed {
            Some(session) => {
                session.stop().await;
                tracing::info!("Session {} closed", key);
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }
}
