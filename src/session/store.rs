//! Session State Store: owns the attempt's answers, page and counters, and
//! mirrors every change into the snapshot store.

use std::sync::Arc;

use crate::{
    error::SessionError,
    models::{
        exam::{ExamDefinition, QuestionType},
        session::{Answer, SessionKey, SessionState, Snapshot},
    },
    stores::SnapshotStore,
    utils::time::TimeSource,
};

pub struct SessionStore {
    key: SessionKey,
    exam_title: String,
    total_pages: u32,
    state: SessionState,
    resumed: bool,
    snapshots: Arc<dyn SnapshotStore>,
    time: Arc<dyn TimeSource>,
}

impl SessionStore {
    /// Resumes the snapshot stored under `key` when it is present and valid,
    /// otherwise starts a fresh attempt at the current time.
    ///
    /// An unreadable or inconsistent snapshot is deleted and replaced; the
    /// answers it held are lost.
    pub fn init(
        exam: &ExamDefinition,
        key: SessionKey,
        snapshots: Arc<dyn SnapshotStore>,
        time: Arc<dyn TimeSource>,
    ) -> Self {
        let total_pages = exam.total_pages();

        let resumed_state = match snapshots.get(&key) {
            Ok(Some(snapshot)) => match validate_snapshot(&snapshot, &key, total_pages) {
                Ok(()) => Some(snapshot.state),
                Err(reason) => {
                    tracing::warn!("Discarding invalid snapshot for {}: {}", key, reason);
                    discard(snapshots.as_ref(), &key);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Discarding unreadable snapshot for {}: {}", key, e);
                discard(snapshots.as_ref(), &key);
                None
            }
        };

        let resumed = resumed_state.is_some();
        let state = resumed_state.unwrap_or_else(|| SessionState::fresh(&key, time.now_ms()));

        let store = Self {
            key,
            exam_title: exam.title.clone(),
            total_pages,
            state,
            resumed,
            snapshots,
            time,
        };

        if resumed {
            tracing::info!("Resumed session {} on page {}", store.key, store.state.current_page);
        } else {
            tracing::info!("Started session {}", store.key);
            // The start timestamp must survive a reload.
            store.persist();
        }

        store
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn exam_title(&self) -> &str {
        &self.exam_title
    }

    /// Whether the state came from a stored snapshot.
    pub fn is_resumed(&self) -> bool {
        self.resumed
    }

    /// Sets the answer to `question_id`.
    ///
    /// Text and single-choice answers are replaced. For multiple-choice,
    /// `value` is an option id whose membership is toggled; selection order
    /// is the order of first selection. `None` clears the answer.
    pub fn set_answer(
        &mut self,
        exam: &ExamDefinition,
        question_id: i64,
        value: Option<String>,
    ) -> Result<(), SessionError> {
        let question = exam
            .question(question_id)
            .ok_or(SessionError::UnknownQuestion(question_id))?;

        let Some(value) = value else {
            self.state.answers.remove(&question_id);
            self.persist();
            return Ok(());
        };

        if question.question_type.is_choice() && !question.has_option(&value) {
            return Err(SessionError::InvalidOption {
                question_id,
                option_id: value,
            });
        }

        match question.question_type {
            QuestionType::Text => {
                self.state.answers.insert(question_id, Answer::Text(value));
            }
            QuestionType::SingleChoice => {
                self.state.answers.insert(question_id, Answer::Choice(value));
            }
            QuestionType::MultipleChoice => {
                let mut selected = match self.state.answers.remove(&question_id) {
                    Some(Answer::Choices(ids)) => ids,
                    _ => Vec::new(),
                };
                if let Some(pos) = selected.iter().position(|id| *id == value) {
                    selected.remove(pos);
                } else {
                    selected.push(value);
                }
                if !selected.is_empty() {
                    self.state.answers.insert(question_id, Answer::Choices(selected));
                }
            }
        }

        self.persist();
        Ok(())
    }

    /// Moves to `page`, clamped to the exam's page range.
    pub fn set_page(&mut self, page: u32) -> u32 {
        self.state.current_page = page.clamp(1, self.total_pages);
        self.persist();
        self.state.current_page
    }

    /// Counts one focus-loss signal and returns the new total.
    pub fn record_tab_switch(&mut self) -> u32 {
        self.state.tab_switch_count = self.state.tab_switch_count.saturating_add(1);
        self.persist();
        self.state.tab_switch_count
    }

    pub fn set_applicant_name(&mut self, name: &str) {
        self.state.applicant_name = name.trim().to_string();
        self.persist();
    }

    /// Writes the full snapshot. Returns `false` if the write failed; the
    /// in-memory state is kept either way.
    pub fn persist(&self) -> bool {
        let snapshot = Snapshot {
            exam_id: self.key.exam_id,
            exam_title: self.exam_title.clone(),
            state: self.state.clone(),
            saved_at: self.time.now_ms(),
        };

        match self.snapshots.set(&self.key, &snapshot) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to persist snapshot for {}: {}", self.key, e);
                false
            }
        }
    }

    /// Deletes the snapshot after a confirmed submission.
    pub fn destroy(&self) {
        if let Err(e) = self.snapshots.delete(&self.key) {
            tracing::warn!("Failed to delete snapshot for {}: {}", self.key, e);
        }
    }
}

fn discard(snapshots: &dyn SnapshotStore, key: &SessionKey) {
    if let Err(e) = snapshots.delete(key) {
        tracing::warn!("Failed to delete invalid snapshot for {}: {}", key, e);
    }
}

fn validate_snapshot(snapshot: &Snapshot, key: &SessionKey, total_pages: u32) -> Result<(), String> {
    let state = &snapshot.state;
    if snapshot.exam_id != key.exam_id || state.exam_id != key.exam_id {
        return Err(format!(
            "exam id mismatch ({} / {})",
            snapshot.exam_id, state.exam_id
        ));
    }
    if state.subject_id != key.subject_id {
        return Err(format!("subject mismatch ({})", state.subject_id));
    }
    if state.current_page < 1 || state.current_page > total_pages {
        return Err(format!(
            "page {} outside 1..={}",
            state.current_page, total_pages
        ));
    }
    if state.start_timestamp <= 0 {
        return Err("missing start timestamp".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::exam::{Question, QuestionOption};
    use crate::stores::memory::MemorySnapshotStore;
    use crate::utils::time::ManualTime;

    fn options(ids: &[&str]) -> Vec<QuestionOption> {
        ids.iter()
            .map(|id| QuestionOption {
                id: id.to_string(),
                text: format!("Option {}", id),
            })
            .collect()
    }

    fn exam() -> ExamDefinition {
        ExamDefinition {
            id: 10,
            title: "Store exam".to_string(),
            description: None,
            time_limit_minutes: 60,
            is_public: false,
            questions: vec![
                Question {
                    id: 1,
                    text: "Name".to_string(),
                    question_type: QuestionType::Text,
                    points: 1,
                    is_required: true,
                    page_number: Some(1),
                    order_index: 0,
                    options: vec![],
                },
                Question {
                    id: 2,
                    text: "Pick".to_string(),
                    question_type: QuestionType::SingleChoice,
                    points: 1,
                    is_required: false,
                    page_number: Some(1),
                    order_index: 1,
                    options: options(&["A", "B"]),
                },
                Question {
                    id: 3,
                    text: "Pick many".to_string(),
                    question_type: QuestionType::MultipleChoice,
                    points: 1,
                    is_required: false,
                    page_number: Some(2),
                    order_index: 0,
                    options: options(&["A", "B", "C"]),
                },
            ],
        }
    }

    fn setup() -> (Arc<MemorySnapshotStore>, Arc<ManualTime>, SessionKey) {
        (
            Arc::new(MemorySnapshotStore::new()),
            Arc::new(ManualTime::new(1_000_000)),
            SessionKey::new("u1", 10),
        )
    }

    #[test]
    fn test_fresh_session_is_persisted_immediately() {
        let (snapshots, time, key) = setup();
        let store = SessionStore::init(&exam(), key.clone(), snapshots.clone(), time);

        assert!(!store.is_resumed());
        assert_eq!(store.state().current_page, 1);
        assert_eq!(store.state().start_timestamp, 1_000_000);
        assert_eq!(store.state().tab_switch_count, 0);
        assert!(store.state().answers.is_empty());
        assert!(snapshots.contains(&key));
    }

    #[test]
    fn test_resume_keeps_start_timestamp() {
        let (snapshots, time, key) = setup();
        let mut store = SessionStore::init(&exam(), key.clone(), snapshots.clone(), time.clone());
        store.set_answer(&exam(), 1, Some("x".to_string())).unwrap();
        store.set_page(2);

        time.advance_secs(600);
        let resumed = SessionStore::init(&exam(), key, snapshots, time);
        assert!(resumed.is_resumed());
        assert_eq!(resumed.state().start_timestamp, 1_000_000);
        assert_eq!(resumed.state().current_page, 2);
        assert_eq!(resumed.state().answer(1), Some(&Answer::Text("x".to_string())));
    }

    #[test]
    fn test_corrupt_snapshot_is_discarded() {
        let (snapshots, time, key) = setup();
        snapshots.insert_raw(&key, "{\"exam_id\": ");

        let store = SessionStore::init(&exam(), key.clone(), snapshots.clone(), time);
        assert!(!store.is_resumed());
        assert_eq!(store.state().start_timestamp, 1_000_000);
        // Replaced by the fresh state.
        assert!(snapshots.get(&key).unwrap().is_some());
    }

    #[test]
    fn test_snapshot_with_out_of_range_page_is_discarded() {
        let (snapshots, time, key) = setup();
        let mut state = SessionState::fresh(&key, 5);
        state.current_page = 9;
        let snapshot = Snapshot {
            exam_id: 10,
            exam_title: "Store exam".to_string(),
            state,
            saved_at: 5,
        };
        snapshots.set(&key, &snapshot).unwrap();

        let store = SessionStore::init(&exam(), key, snapshots, time);
        assert!(!store.is_resumed());
        assert_eq!(store.state().current_page, 1);
        assert_eq!(store.state().start_timestamp, 1_000_000);
    }

    #[test]
    fn test_snapshot_for_other_subject_is_discarded() {
        let (snapshots, time, key) = setup();
        let other = SessionKey::new("u2", 10);
        let snapshot = Snapshot {
            exam_id: 10,
            exam_title: "Store exam".to_string(),
            state: SessionState::fresh(&other, 5),
            saved_at: 5,
        };
        snapshots.set(&key, &snapshot).unwrap();

        let store = SessionStore::init(&exam(), key, snapshots, time);
        assert!(!store.is_resumed());
        assert_eq!(store.state().subject_id, "u1");
    }

    #[test]
    fn test_multi_select_toggles_in_first_insertion_order() {
        let (snapshots, time, key) = setup();
        let exam = exam();
        let mut store = SessionStore::init(&exam, key, snapshots, time);

        for id in ["C", "A", "B", "A"] {
            store.set_answer(&exam, 3, Some(id.to_string())).unwrap();
        }
        assert_eq!(
            store.state().answer(3),
            Some(&Answer::Choices(vec!["C".to_string(), "B".to_string()]))
        );

        store.set_answer(&exam, 3, Some("A".to_string())).unwrap();
        assert_eq!(
            store.state().answer(3),
            Some(&Answer::Choices(vec![
                "C".to_string(),
                "B".to_string(),
                "A".to_string()
            ]))
        );
    }

    #[test]
    fn test_scalar_answers_overwrite_and_clear() {
        let (snapshots, time, key) = setup();
        let exam = exam();
        let mut store = SessionStore::init(&exam, key, snapshots, time);

        store.set_answer(&exam, 2, Some("A".to_string())).unwrap();
        store.set_answer(&exam, 2, Some("B".to_string())).unwrap();
        assert_eq!(store.state().answer(2), Some(&Answer::Choice("B".to_string())));

        store.set_answer(&exam, 2, None).unwrap();
        assert_eq!(store.state().answer(2), None);
    }

    #[test]
    fn test_rejects_unknown_question_and_option() {
        let (snapshots, time, key) = setup();
        let exam = exam();
        let mut store = SessionStore::init(&exam, key, snapshots, time);

        assert!(matches!(
            store.set_answer(&exam, 99, Some("x".to_string())),
            Err(SessionError::UnknownQuestion(99))
        ));
        assert!(matches!(
            store.set_answer(&exam, 2, Some("Z".to_string())),
            Err(SessionError::InvalidOption { question_id: 2, .. })
        ));
        assert!(store.state().answers.is_empty());
    }

    #[test]
    fn test_failed_persist_keeps_memory_state() {
        let (snapshots, time, key) = setup();
        let exam = exam();
        let mut store = SessionStore::init(&exam, key.clone(), snapshots.clone(), time);
        snapshots.set_fail_writes(true);

        store.set_answer(&exam, 1, Some("kept".to_string())).unwrap();
        assert_eq!(store.state().answer(1), Some(&Answer::Text("kept".to_string())));
        assert!(!store.persist());
        // The durable copy still holds the state from before the failure.
        assert!(snapshots.get(&key).unwrap().unwrap().state.answers.is_empty());
    }

    #[test]
    fn test_page_is_clamped() {
        let (snapshots, time, key) = setup();
        let mut store = SessionStore::init(&exam(), key, snapshots, time);
        assert_eq!(store.set_page(0), 1);
        assert_eq!(store.set_page(7), 2);
    }

    #[test]
    fn test_destroy_removes_snapshot() {
        let (snapshots, time, key) = setup();
        let store = SessionStore::init(&exam(), key.clone(), snapshots.clone(), time);
        store.destroy();
        assert!(!snapshots.contains(&key));
    }
}
