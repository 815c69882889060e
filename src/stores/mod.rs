//! Seams for the session engine's external collaborators.
//!
//! Every collaborator has an in-memory implementation (tests, local runs)
//! and a durable one: a JSON file per snapshot, Postgres for exams and
//! submissions.

pub mod file;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::{
    error::StoreError,
    models::{
        exam::ExamDefinition,
        session::{SessionKey, Snapshot},
        submission::{AnswerRecord, SubmissionRecord},
    },
};

/// One-shot read of exam definitions.
#[async_trait]
pub trait ExamProvider: Send + Sync {
    async fn fetch_exam(&self, exam_id: i64) -> Result<Option<ExamDefinition>, StoreError>;
}

/// Durable local storage of session snapshots.
///
/// Calls are synchronous: a session persists its full snapshot on every
/// mutation and treats a failed write as non-fatal.
pub trait SnapshotStore: Send + Sync {
    /// Returns `Err(StoreError::Corrupt)` or a serialization error when a
    /// stored snapshot exists but cannot be read back.
    fn get(&self, key: &SessionKey) -> Result<Option<Snapshot>, StoreError>;

    fn set(&self, key: &SessionKey, snapshot: &Snapshot) -> Result<(), StoreError>;

    /// Deleting a missing key is not an error.
    fn delete(&self, key: &SessionKey) -> Result<(), StoreError>;
}

/// Remote persistence of finished attempts.
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    /// Inserts the submission and returns its generated id.
    async fn create(&self, record: &SubmissionRecord) -> Result<i64, StoreError>;

    /// Inserts all answers of one submission as a single batch.
    async fn create_many(&self, records: &[AnswerRecord]) -> Result<(), StoreError>;
}
