//! Submission Pipeline: assembles the final records of an attempt and
//! persists them through the remote submission store.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    error::{SessionError, StoreError, SubmitStage},
    models::{
        exam::ExamDefinition,
        identity::Identity,
        session::SessionState,
        submission::{AnswerRecord, SubmissionRecord, SubmissionStatus},
    },
    session::pagination,
    stores::SubmissionStore,
    utils::time::to_datetime,
};

/// Checks that must pass before a candidate-initiated submission.
/// Deadline submissions skip them.
pub fn check_manual_preconditions(
    exam: &ExamDefinition,
    identity: &Identity,
    state: &SessionState,
) -> Result<(), SessionError> {
    if exam.is_public && identity.is_anonymous() && state.applicant_name.trim().is_empty() {
        return Err(SessionError::MissingApplicantName);
    }

    let unanswered = pagination::unanswered_required(exam, state);
    if !unanswered.is_empty() {
        return Err(SessionError::Validation { unanswered });
    }

    Ok(())
}

pub fn build_submission_record(
    exam: &ExamDefinition,
    identity: &Identity,
    state: &SessionState,
    now_ms: i64,
) -> SubmissionRecord {
    let (subject_id, applicant_name) = match identity {
        Identity::Authenticated { subject_id, .. } => (Some(subject_id.clone()), None),
        Identity::Anonymous { guest_id } => {
            // Deadline submissions may come before a name was entered.
            let name = state.applicant_name.trim();
            let name = if name.is_empty() { guest_id.as_str() } else { name };
            (None, Some(name.to_string()))
        }
    };

    SubmissionRecord {
        exam_id: exam.id,
        subject_id,
        applicant_name,
        start_time: to_datetime(state.start_timestamp),
        end_time: to_datetime(now_ms),
        tab_switch_count: i32::try_from(state.tab_switch_count).unwrap_or(i32::MAX),
        max_score: exam.max_score(),
        status: SubmissionStatus::Pending,
    }
}

/// One record per exam question, answered or not.
pub fn build_answer_records(
    exam: &ExamDefinition,
    state: &SessionState,
    submission_id: i64,
) -> Vec<AnswerRecord> {
    exam.questions
        .iter()
        .map(|q| AnswerRecord::for_question(submission_id, q, state.answer(q.id)))
        .collect()
}

pub struct SubmissionPipeline {
    store: Arc<dyn SubmissionStore>,
    timeout: Duration,
}

impl SubmissionPipeline {
    pub fn new(store: Arc<dyn SubmissionStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Writes the submission, then its answers, and returns the submission id.
    ///
    /// The two writes run in order because answers reference the generated
    /// id. If the answer batch fails the submission row is left in place.
    pub async fn execute(
        &self,
        exam: &ExamDefinition,
        identity: &Identity,
        state: &SessionState,
        forced: bool,
        now_ms: i64,
    ) -> Result<i64, SessionError> {
        let record = build_submission_record(exam, identity, state, now_ms);

        let submission_id = with_timeout(self.timeout, self.store.create(&record))
            .await
            .map_err(|source| SessionError::RemoteSubmission {
                stage: SubmitStage::Submission,
                source,
            })?;

        let answers = build_answer_records(exam, state, submission_id);
        with_timeout(self.timeout, self.store.create_many(&answers))
            .await
            .map_err(|source| {
                tracing::warn!(
                    "Submission {} has no answers after a failed batch write",
                    submission_id
                );
                SessionError::RemoteSubmission {
                    stage: SubmitStage::Answers,
                    source,
                }
            })?;

        tracing::info!(
            "Persisted submission {} for exam {} ({} answers, forced={})",
            submission_id,
            exam.id,
            answers.len(),
            forced
        );
        Ok(submission_id)
    }
}

async fn with_timeout<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| StoreError::Timeout(limit))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::exam::{Question, QuestionOption, QuestionType};
    use crate::models::session::{Answer, SessionKey};
    use crate::stores::memory::MemorySubmissionStore;

    fn exam(is_public: bool) -> ExamDefinition {
        ExamDefinition {
            id: 5,
            title: "Pipeline".to_string(),
            description: None,
            time_limit_minutes: 60,
            is_public,
            questions: vec![
                Question {
                    id: 1,
                    text: "Q1".to_string(),
                    question_type: QuestionType::Text,
                    points: 3,
                    is_required: true,
                    page_number: Some(1),
                    order_index: 0,
                    options: vec![],
                },
                Question {
                    id: 2,
                    text: "Q2".to_string(),
                    question_type: QuestionType::SingleChoice,
                    points: 2,
                    is_required: true,
                    page_number: Some(2),
                    order_index: 0,
                    options: vec![QuestionOption {
                        id: "A".to_string(),
                        text: "A".to_string(),
                    }],
                },
                Question {
                    id: 3,
                    text: "Q3".to_string(),
                    question_type: QuestionType::Text,
                    points: 5,
                    is_required: false,
                    page_number: Some(2),
                    order_index: 1,
                    options: vec![],
                },
            ],
        }
    }

    fn authenticated() -> Identity {
        Identity::Authenticated {
            subject_id: "u1".to_string(),
            display_name: None,
        }
    }

    fn answered_state() -> SessionState {
        let mut state = SessionState::fresh(&SessionKey::new("u1", 5), 1_000);
        state.answers.insert(1, Answer::Text("x".to_string()));
        state.answers.insert(2, Answer::Choice("A".to_string()));
        state.tab_switch_count = 2;
        state
    }

    #[test]
    fn test_manual_preconditions_check_all_pages() {
        let mut state = answered_state();
        state.current_page = 2;
        state.answers.remove(&1);
        match check_manual_preconditions(&exam(false), &authenticated(), &state) {
            Err(SessionError::Validation { unanswered }) => assert_eq!(unanswered, vec![1]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_anonymous_public_exam_needs_applicant_name() {
        let guest = Identity::guest();
        let mut state = answered_state();
        state.subject_id = guest.subject_id().to_string();
        assert!(matches!(
            check_manual_preconditions(&exam(true), &guest, &state),
            Err(SessionError::MissingApplicantName)
        ));

        state.applicant_name = "Ada".to_string();
        assert!(check_manual_preconditions(&exam(true), &guest, &state).is_ok());
        // Authenticated candidates never need one.
        state.applicant_name.clear();
        assert!(check_manual_preconditions(&exam(true), &authenticated(), &state).is_ok());
    }

    #[test]
    fn test_submission_record_fields() {
        let record = build_submission_record(&exam(false), &authenticated(), &answered_state(), 61_000);
        assert_eq!(record.exam_id, 5);
        assert_eq!(record.subject_id.as_deref(), Some("u1"));
        assert_eq!(record.applicant_name, None);
        assert_eq!(record.start_time.timestamp_millis(), 1_000);
        assert_eq!(record.end_time.timestamp_millis(), 61_000);
        assert_eq!(record.tab_switch_count, 2);
        assert_eq!(record.max_score, 10);
        assert_eq!(record.status, SubmissionStatus::Pending);

        let mut state = answered_state();
        state.applicant_name = "  Ada ".to_string();
        let record = build_submission_record(&exam(true), &Identity::guest(), &state, 61_000);
        assert_eq!(record.subject_id, None);
        assert_eq!(record.applicant_name.as_deref(), Some("Ada"));
    }

    #[test]
    fn test_nameless_guest_is_recorded_under_guest_id() {
        let guest = Identity::guest();
        let mut state = answered_state();
        state.applicant_name = "   ".to_string();

        let record = build_submission_record(&exam(true), &guest, &state, 61_000);
        assert_eq!(record.subject_id, None);
        assert_eq!(record.applicant_name.as_deref(), Some(guest.subject_id()));
    }

    #[test]
    fn test_answer_records_cover_every_question() {
        let records = build_answer_records(&exam(false), &answered_state(), 77);
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.submission_id == 77));
        assert_eq!(records[2].answer_text.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn test_execute_persists_submission_then_answers() {
        let store = Arc::new(MemorySubmissionStore::new());
        let pipeline = SubmissionPipeline::new(store.clone(), Duration::from_secs(5));

        let id = pipeline
            .execute(&exam(false), &authenticated(), &answered_state(), false, 2_000)
            .await
            .unwrap();

        assert_eq!(store.submissions().len(), 1);
        assert_eq!(store.submissions()[0].0, id);
        assert_eq!(store.answers().len(), 3);
    }

    #[tokio::test]
    async fn test_failed_create_skips_answers() {
        let store = Arc::new(MemorySubmissionStore::new());
        store.fail_next_creates(1);
        let pipeline = SubmissionPipeline::new(store.clone(), Duration::from_secs(5));

        let err = pipeline
            .execute(&exam(false), &authenticated(), &answered_state(), false, 2_000)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SessionError::RemoteSubmission {
                stage: SubmitStage::Submission,
                ..
            }
        ));
        assert_eq!(store.create_many_calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_batch_leaves_submission_row() {
        let store = Arc::new(MemorySubmissionStore::new());
        store.fail_next_batches(1);
        let pipeline = SubmissionPipeline::new(store.clone(), Duration::from_secs(5));

        let err = pipeline
            .execute(&exam(false), &authenticated(), &answered_state(), false, 2_000)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SessionError::RemoteSubmission {
                stage: SubmitStage::Answers,
                ..
            }
        ));
        assert_eq!(store.submissions().len(), 1);
        assert!(store.answers().is_empty());
    }

    #[tokio::test]
    async fn test_slow_store_times_out() {
        let store = Arc::new(MemorySubmissionStore::new());
        store.set_latency(Some(Duration::from_millis(500)));
        let pipeline = SubmissionPipeline::new(store.clone(), Duration::from_millis(20));

        let err = pipeline
            .execute(&exam(false), &authenticated(), &answered_state(), false, 2_000)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SessionError::RemoteSubmission {
                source: StoreError::Timeout(_),
                ..
            }
        ));
    }
}
