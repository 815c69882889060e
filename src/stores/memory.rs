//! In-memory collaborators for tests and local runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use super::{ExamProvider, SnapshotStore, SubmissionStore};
use crate::{
    error::StoreError,
    models::{
        exam::ExamDefinition,
        session::{SessionKey, Snapshot},
        submission::{AnswerRecord, SubmissionRecord},
    },
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Serves a fixed set of exams.
#[derive(Default)]
pub struct MemoryExamProvider {
    exams: Mutex<HashMap<i64, ExamDefinition>>,
}

impl MemoryExamProvider {
    pub fn new(exams: impl IntoIterator<Item = ExamDefinition>) -> Self {
        Self {
            exams: Mutex::new(exams.into_iter().map(|e| (e.id, e)).collect()),
        }
    }

    pub fn insert(&self, exam: ExamDefinition) {
        lock(&self.exams).insert(exam.id, exam);
    }
}

#[async_trait]
impl ExamProvider for MemoryExamProvider {
    async fn fetch_exam(&self, exam_id: i64) -> Result<Option<ExamDefinition>, StoreError> {
        Ok(lock(&self.exams).get(&exam_id).cloned())
    }
}

/// Keeps snapshots as serialized JSON, like a browser's local storage.
#[derive(Default)]
pub struct MemorySnapshotStore {
    entries: Mutex<HashMap<SessionKey, String>>,
    fail_writes: AtomicBool,
    writes: AtomicU32,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `set` fail until reset.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Stores raw text under `key`, bypassing serialization.
    pub fn insert_raw(&self, key: &SessionKey, raw: impl Into<String>) {
        lock(&self.entries).insert(key.clone(), raw.into());
    }

    pub fn contains(&self, key: &SessionKey) -> bool {
        lock(&self.entries).contains_key(key)
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> u32 {
        self.writes.load(Ordering::SeqCst)
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn get(&self, key: &SessionKey) -> Result<Option<Snapshot>, StoreError> {
        match lock(&self.entries).get(key) {
            Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
            None => Ok(None),
        }
    }

    fn set(&self, key: &SessionKey, snapshot: &Snapshot) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("snapshot storage is full".to_string()));
        }
        let raw = serde_json::to_string(snapshot)?;
        lock(&self.entries).insert(key.clone(), raw);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn delete(&self, key: &SessionKey) -> Result<(), StoreError> {
        lock(&self.entries).remove(key);
        Ok(())
    }
}

/// Records submissions and answers, with optional failure injection.
pub struct MemorySubmissionStore {
    submissions: Mutex<Vec<(i64, SubmissionRecord)>>,
    answers: Mutex<Vec<AnswerRecord>>,
    next_id: AtomicI64,
    create_calls: AtomicU32,
    create_many_calls: AtomicU32,
    failing_creates: AtomicU32,
    failing_batches: AtomicU32,
    latency: Mutex<Option<Duration>>,
}

impl Default for MemorySubmissionStore {
    fn default() -> Self {
        Self {
            submissions: Mutex::new(Vec::new()),
            answers: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(1),
            create_calls: AtomicU32::new(0),
            create_many_calls: AtomicU32::new(0),
            failing_creates: AtomicU32::new(0),
            failing_batches: AtomicU32::new(0),
            latency: Mutex::new(None),
        }
    }
}

impl MemorySubmissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` calls to `create` fail.
    pub fn fail_next_creates(&self, n: u32) {
        self.failing_creates.store(n, Ordering::SeqCst);
    }

    /// The next `n` calls to `create_many` fail.
    pub fn fail_next_batches(&self, n: u32) {
        self.failing_batches.store(n, Ordering::SeqCst);
    }

    /// Delays every call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *lock(&self.latency) = latency;
    }

    pub fn create_calls(&self) -> u32 {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn create_many_calls(&self) -> u32 {
        self.create_many_calls.load(Ordering::SeqCst)
    }

    pub fn submissions(&self) -> Vec<(i64, SubmissionRecord)> {
        lock(&self.submissions).clone()
    }

    pub fn answers(&self) -> Vec<AnswerRecord> {
        lock(&self.answers).clone()
    }

    async fn simulate_latency(&self) {
        let latency = *lock(&self.latency);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl SubmissionStore for MemorySubmissionStore {
    async fn create(&self, record: &SubmissionRecord) -> Result<i64, StoreError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        if Self::take_failure(&self.failing_creates) {
            return Err(StoreError::Unavailable("submission insert rejected".to_string()));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        lock(&self.submissions).push((id, record.clone()));
        Ok(id)
    }

    async fn create_many(&self, records: &[AnswerRecord]) -> Result<(), StoreError> {
        self.create_many_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        if Self::take_failure(&self.failing_batches) {
            return Err(StoreError::Unavailable("answer batch rejected".to_string()));
        }
        lock(&self.answers).extend_from_slice(records);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::session::SessionState;

    fn snapshot(key: &SessionKey) -> Snapshot {
        Snapshot {
            exam_id: key.exam_id,
            exam_title: "T".to_string(),
            state: SessionState::fresh(key, 1_000),
            saved_at: 1_000,
        }
    }

    #[test]
    fn test_snapshot_keys_do_not_collide() {
        let store = MemorySnapshotStore::new();
        let a = SessionKey::new("u1", 1);
        let b = SessionKey::new("u1", 2);
        let c = SessionKey::new("u2", 1);
        store.set(&a, &snapshot(&a)).unwrap();

        assert!(store.get(&a).unwrap().is_some());
        assert!(store.get(&b).unwrap().is_none());
        assert!(store.get(&c).unwrap().is_none());
    }

    #[test]
    fn test_raw_garbage_fails_to_load() {
        let store = MemorySnapshotStore::new();
        let key = SessionKey::new("u1", 1);
        store.insert_raw(&key, "{not json");
        assert!(store.get(&key).is_err());
    }

    #[test]
    fn test_failed_write_keeps_previous_snapshot() {
        let store = MemorySnapshotStore::new();
        let key = SessionKey::new("u1", 1);
        store.set(&key, &snapshot(&key)).unwrap();
        store.set_fail_writes(true);

        let mut changed = snapshot(&key);
        changed.state.current_page = 2;
        assert!(store.set(&key, &changed).is_err());
        assert_eq!(store.get(&key).unwrap().unwrap().state.current_page, 1);
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_failure_injection_is_consumed() {
        let store = MemorySubmissionStore::new();
        store.fail_next_creates(1);
        let record = SubmissionRecord {
            exam_id: 1,
            subject_id: Some("u1".to_string()),
            applicant_name: None,
            start_time: chrono::Utc::now(),
            end_time: chrono::Utc::now(),
            tab_switch_count: 0,
            max_score: 1,
            status: crate::models::submission::SubmissionStatus::Pending,
        };

        assert!(store.create(&record).await.is_err());
        assert_eq!(store.create(&record).await.unwrap(), 1);
        assert_eq!(store.create_calls(), 2);
        assert_eq!(store.submissions().len(), 1);
    }
}
