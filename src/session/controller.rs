//! Session controller: owns the engine components of one attempt and the
//! `Active -> Submitting -> Submitted` state machine.

use std::sync::{Arc, Weak};

use tokio::sync::{Mutex, watch};

use super::{
    SessionDeps, SessionSettings,
    clock::{ClockHandle, DeadlineClock},
    monitor::AntiCheatMonitor,
    pagination,
    store::SessionStore,
    submission::{SubmissionPipeline, check_manual_preconditions},
};
use crate::{
    error::{SessionError, StoreError, SubmitStage},
    models::{
        exam::ExamDefinition,
        identity::Identity,
        session::{
            FocusReport, FocusSignal, SessionKey, SessionState, SessionStatus, SessionView,
            SubmitOutcome,
        },
    },
    utils::time::TimeSource,
};

const FORCED_SUBMIT_NOTICE: &str = "Time is up. Your answers were submitted automatically.";

struct SessionInner {
    store: SessionStore,
    monitor: AntiCheatMonitor,
    status: SessionStatus,
    clock: Option<ClockHandle>,
    notice: Option<String>,
}

pub struct ExamSession {
    exam: Arc<ExamDefinition>,
    identity: Identity,
    deadline: DeadlineClock,
    settings: SessionSettings,
    time: Arc<dyn TimeSource>,
    pipeline: SubmissionPipeline,
    status_tx: watch::Sender<SessionStatus>,
    inner: Mutex<SessionInner>,
}

impl ExamSession {
    /// Resumes or creates the session of `identity` for `exam`.
    ///
    /// The session is idle until [`ExamSession::start`] is called.
    pub fn open(
        exam: Arc<ExamDefinition>,
        identity: Identity,
        deps: SessionDeps,
        settings: SessionSettings,
    ) -> Result<Arc<Self>, SessionError> {
        if !exam.is_public && identity.is_anonymous() {
            return Err(SessionError::IdentityRequired(exam.id));
        }

        let key = SessionKey::new(identity.subject_id(), exam.id);
        let store = SessionStore::init(&exam, key, deps.snapshots, deps.time.clone());
        let deadline = DeadlineClock::new(store.state().start_timestamp, exam.time_limit_minutes);
        let monitor = AntiCheatMonitor::new(settings.anti_cheat_enabled, settings.warning_window);

        Ok(Arc::new(Self {
            pipeline: SubmissionPipeline::new(deps.submissions, settings.remote_write_timeout),
            exam,
            identity,
            deadline,
            settings,
            time: deps.time,
            status_tx: watch::channel(SessionStatus::Active).0,
            inner: Mutex::new(SessionInner {
                store,
                monitor,
                status: SessionStatus::Active,
                clock: None,
                notice: None,
            }),
        }))
    }

    pub fn exam(&self) -> &ExamDefinition {
        &self.exam
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn deadline(&self) -> DeadlineClock {
        self.deadline
    }

    pub fn remaining_secs(&self) -> u64 {
        self.deadline.remaining_secs(self.time.now_ms())
    }

    /// Starts the deadline timer and the focus monitor. Idempotent.
    ///
    /// A session resumed after its deadline is submitted on the first tick.
    pub async fn start(self: &Arc<Self>) {
        let mut inner = self.inner.lock().await;
        if inner.status != SessionStatus::Active || inner.clock.is_some() {
            return;
        }

        let session: Weak<ExamSession> = Arc::downgrade(self);
        let handle = self.deadline.start(
            self.time.clone(),
            self.settings.tick_interval,
            move || {
                if let Some(session) = session.upgrade() {
                    tokio::spawn(async move {
                        if let Err(e) = session.finalize(true).await {
                            tracing::error!(
                                "Forced submission of {} failed: {}",
                                session.key(),
                                e
                            );
                        }
                    });
                }
            },
        );
        inner.clock = Some(handle);
        inner.monitor.start();
        tracing::debug!("Session {} started", inner.store.key());
    }

    /// Releases the timer and the focus subscription. An in-flight
    /// submission keeps running.
    pub async fn stop(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(clock) = inner.clock.take() {
            clock.stop();
        }
        inner.monitor.stop();
        tracing::debug!("Session {} stopped", inner.store.key());
    }

    pub fn key(&self) -> SessionKey {
        SessionKey::new(self.identity.subject_id(), self.exam.id)
    }

    pub async fn status(&self) -> SessionStatus {
        self.inner.lock().await.status
    }

    /// Every status transition of this session.
    pub fn status_updates(&self) -> watch::Receiver<SessionStatus> {
        self.status_tx.subscribe()
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.store.state().clone()
    }

    /// Remaining-seconds updates of the running timer, if any.
    pub async fn remaining_updates(&self) -> Option<watch::Receiver<u64>> {
        self.inner.lock().await.clock.as_ref().map(ClockHandle::subscribe)
    }

    pub async fn view(&self) -> SessionView {
        let inner = self.inner.lock().await;
        let state = inner.store.state();
        SessionView {
            exam_id: self.exam.id,
            exam_title: inner.store.exam_title().to_string(),
            status: inner.status,
            current_page: state.current_page,
            total_pages: self.exam.total_pages(),
            questions: self
                .exam
                .questions_on_page(state.current_page)
                .into_iter()
                .cloned()
                .collect(),
            answers: state.answers.clone(),
            applicant_name: state.applicant_name.clone(),
            applicant_name_required: self.exam.is_public && self.identity.is_anonymous(),
            tab_switch_count: state.tab_switch_count,
            start_timestamp: state.start_timestamp,
            deadline: self.deadline.deadline_ms(),
            remaining_seconds: self.remaining_secs(),
            notice: inner.notice.clone(),
        }
    }

    pub async fn set_answer(&self, question_id: i64, value: Option<String>) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;
        self.ensure_editable(&inner)?;
        inner.store.set_answer(&self.exam, question_id, value)
    }

    pub async fn set_applicant_name(&self, name: &str) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;
        self.ensure_editable(&inner)?;
        inner.store.set_applicant_name(name);
        Ok(())
    }

    /// Moves to the next page if every required question on the current page
    /// is answered; otherwise nothing changes and the unanswered ids are
    /// returned in the error.
    pub async fn advance(&self) -> Result<u32, SessionError> {
        let mut inner = self.inner.lock().await;
        self.ensure_editable(&inner)?;
        match pagination::next_page(&self.exam, inner.store.state()) {
            Ok(page) => Ok(inner.store.set_page(page)),
            Err(unanswered) => {
                tracing::debug!("Advance blocked in {}: {:?}", inner.store.key(), unanswered);
                Err(SessionError::Validation { unanswered })
            }
        }
    }

    pub async fn retreat(&self) -> Result<u32, SessionError> {
        let mut inner = self.inner.lock().await;
        self.ensure_editable(&inner)?;
        let page = pagination::previous_page(inner.store.state());
        Ok(inner.store.set_page(page))
    }

    /// Feeds one focus signal to the monitor. `None` when the monitor is not
    /// running (disabled, stopped, or the session is finished).
    pub async fn record_focus_loss(&self, signal: FocusSignal) -> Option<FocusReport> {
        let mut inner = self.inner.lock().await;
        if inner.status != SessionStatus::Active {
            return None;
        }
        let now = self.time.now_ms();
        let SessionInner { store, monitor, .. } = &mut *inner;
        monitor.observe(signal, store, now)
    }

    /// Candidate-initiated submission.
    ///
    /// Runs on its own task so that a dropped caller cannot cancel the
    /// remote writes halfway.
    pub async fn submit(self: &Arc<Self>) -> Result<SubmitOutcome, SessionError> {
        let session = Arc::clone(self);
        match tokio::spawn(async move { session.finalize(false).await }).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("Submission task of {} aborted: {}", self.key(), e);
                Err(SessionError::RemoteSubmission {
                    stage: SubmitStage::Submission,
                    source: StoreError::Unavailable(e.to_string()),
                })
            }
        }
    }

    /// The one-shot submission path shared by manual and deadline triggers.
    pub(crate) async fn finalize(&self, forced: bool) -> Result<SubmitOutcome, SessionError> {
        let now = self.time.now_ms();

        let (state, forced) = {
            let mut inner = self.inner.lock().await;
            match inner.status {
                SessionStatus::Submitting => {
                    tracing::debug!("Submission of {} already in progress", inner.store.key());
                    return Ok(SubmitOutcome::AlreadyInProgress);
                }
                SessionStatus::Submitted { submission_id, .. } => {
                    return Ok(SubmitOutcome::AlreadySubmitted { submission_id });
                }
                SessionStatus::Active => {}
            }

            // Past the deadline, a retry of a failed forced submission is forced too.
            let forced = forced || self.deadline.is_expired(now);
            if !forced {
                check_manual_preconditions(&self.exam, &self.identity, inner.store.state())?;
            }

            self.set_status(&mut inner, SessionStatus::Submitting);
            (inner.store.state().clone(), forced)
        };

        if forced {
            tracing::info!("Deadline submission of {}", state.subject_id);
        }

        let result = self
            .pipeline
            .execute(&self.exam, &self.identity, &state, forced, now)
            .await;

        let mut inner = self.inner.lock().await;
        match result {
            Ok(submission_id) => {
                inner.store.destroy();
                self.set_status(
                    &mut inner,
                    SessionStatus::Submitted {
                        submission_id,
                        forced,
                    },
                );
                inner.monitor.stop();
                if let Some(clock) = inner.clock.take() {
                    clock.stop();
                }
                if forced {
                    inner.notice = Some(FORCED_SUBMIT_NOTICE.to_string());
                }
                tracing::info!(
                    "Session {} submitted as {}",
                    inner.store.key(),
                    submission_id
                );
                Ok(SubmitOutcome::Submitted {
                    submission_id,
                    forced,
                })
            }
            Err(e) => {
                self.set_status(&mut inner, SessionStatus::Active);
                tracing::warn!(
                    "Submission of {} failed, answers kept for retry: {}",
                    inner.store.key(),
                    e
                );
                Err(e)
            }
        }
    }

    fn set_status(&self, inner: &mut SessionInner, status: SessionStatus) {
        inner.status = status;
        self.status_tx.send_replace(status);
    }

    fn ensure_editable(&self, inner: &SessionInner) -> Result<(), SessionError> {
        if inner.status != SessionStatus::Active {
            return Err(SessionError::NotActive(inner.status));
        }
        if self.deadline.is_expired(self.time.now_ms()) {
            return Err(SessionError::Expired);
        }
        Ok(())
    }
}
