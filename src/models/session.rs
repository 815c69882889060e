// src/models/session.rs

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::exam::{Question, QuestionType};

/// A candidate's answer to one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Answer {
    /// Free text for `text` questions.
    Text(String),
    /// Selected option id for `single_choice` questions.
    Choice(String),
    /// Selected option ids for `multiple_choice` questions, in first-selection order.
    Choices(Vec<String>),
}

impl Answer {
    /// Whether this answer satisfies a required question.
    pub fn is_filled(&self) -> bool {
        match self {
            Answer::Text(text) => !text.trim().is_empty(),
            Answer::Choice(id) => !id.is_empty(),
            Answer::Choices(ids) => !ids.is_empty(),
        }
    }
}

/// Identifies one durable session: at most one per (subject, exam).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionKey {
    pub subject_id: String,
    pub exam_id: i64,
}

impl SessionKey {
    pub fn new(subject_id: impl Into<String>, exam_id: i64) -> Self {
        Self {
            subject_id: subject_id.into(),
            exam_id,
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.subject_id, self.exam_id)
    }
}

/// Mutable state of one exam attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub exam_id: i64,
    pub subject_id: String,
    #[serde(default)]
    pub answers: BTreeMap<i64, Answer>,
    #[serde(default)]
    pub tab_switch_count: u32,
    #[serde(default)]
    pub applicant_name: String,
    /// Epoch milliseconds. Set once when the attempt starts.
    pub start_timestamp: i64,
    pub current_page: u32,
}

impl SessionState {
    pub fn fresh(key: &SessionKey, now_ms: i64) -> Self {
        Self {
            exam_id: key.exam_id,
            subject_id: key.subject_id.clone(),
            answers: BTreeMap::new(),
            tab_switch_count: 0,
            applicant_name: String::new(),
            start_timestamp: now_ms,
            current_page: 1,
        }
    }

    pub fn answer(&self, question_id: i64) -> Option<&Answer> {
        self.answers.get(&question_id)
    }

    /// Whether `question` has a non-empty answer of the right shape.
    pub fn is_answered(&self, question: &Question) -> bool {
        match (question.question_type, self.answer(question.id)) {
            (QuestionType::Text, Some(a @ Answer::Text(_))) => a.is_filled(),
            (QuestionType::SingleChoice, Some(a @ Answer::Choice(_))) => a.is_filled(),
            (QuestionType::MultipleChoice, Some(a @ Answer::Choices(_))) => a.is_filled(),
            _ => false,
        }
    }
}

/// Durable form of a session, used for reload and crash recovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub exam_id: i64,
    pub exam_title: String,
    pub state: SessionState,
    /// Epoch milliseconds of the last write.
    pub saved_at: i64,
}

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Submitting,
    Submitted { submission_id: i64, forced: bool },
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Active => write!(f, "active"),
            SessionStatus::Submitting => write!(f, "submitting"),
            SessionStatus::Submitted { .. } => write!(f, "submitted"),
        }
    }
}

/// Foreground/focus signal reported by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusSignal {
    /// The exam view became hidden (tab switch, minimize).
    Hidden,
    /// The exam window lost focus.
    Blur,
}

/// Result of observing one focus signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FocusReport {
    pub tab_switch_count: u32,
    /// Whether the client should show a warning for this signal.
    pub warning: bool,
}

/// Outcome of a submit call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmitOutcome {
    Submitted { submission_id: i64, forced: bool },
    /// Another submission holds the guard; this call did nothing.
    AlreadyInProgress,
    AlreadySubmitted { submission_id: i64 },
}

/// Client view of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub exam_id: i64,
    pub exam_title: String,
    #[serde(flatten)]
    pub status: SessionStatus,
    pub current_page: u32,
    pub total_pages: u32,
    pub questions: Vec<Question>,
    pub answers: BTreeMap<i64, Answer>,
    pub applicant_name: String,
    pub applicant_name_required: bool,
    pub tab_switch_count: u32,
    pub start_timestamp: i64,
    pub deadline: i64,
    pub remaining_seconds: u64,
    pub notice: Option<String>,
}

/// Response of starting or resuming a session.
#[derive(Debug, Clone, Serialize)]
pub struct StartSessionResponse {
    #[serde(flatten)]
    pub session: SessionView,
    /// Bearer token an anonymous candidate sends on every later call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guest_token: Option<String>,
}

/// DTO for setting, toggling or clearing an answer.
#[derive(Debug, Deserialize)]
pub struct SetAnswerRequest {
    pub question_id: i64,
    /// Text, option id to select, or option id to toggle for multi-select.
    /// `null` clears the answer.
    pub value: Option<String>,
}

/// DTO for the applicant name of an anonymous candidate.
#[derive(Debug, Deserialize, Validate)]
pub struct ApplicantNameRequest {
    #[validate(length(max = 100, message = "Applicant name must be at most 100 characters."))]
    pub applicant_name: String,
}

#[derive(Debug, Deserialize)]
pub struct FocusEventRequest {
    pub signal: FocusSignal,
}
