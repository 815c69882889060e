// src/models/submission.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{
    exam::{Question, QuestionType},
    session::Answer,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    /// Awaiting grading by an external process.
    Pending,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Pending => "pending",
        }
    }
}

/// Represents a row of the 'submissions' table.
/// Exactly one of `subject_id` / `applicant_name` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub exam_id: i64,
    pub subject_id: Option<String>,
    pub applicant_name: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub tab_switch_count: i32,
    pub max_score: i64,
    pub status: SubmissionStatus,
}

/// Represents a row of the 'submission_answers' table.
///
/// Text questions carry `answer_text`, choice questions carry
/// `selected_option_ids`; the other column is always `None`. Unanswered
/// questions still produce a record with an empty value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub submission_id: i64,
    pub question_id: i64,
    pub answer_text: Option<String>,
    pub selected_option_ids: Option<Vec<String>>,
}

impl AnswerRecord {
    pub fn for_question(submission_id: i64, question: &Question, answer: Option<&Answer>) -> Self {
        let (answer_text, selected_option_ids) = match question.question_type {
            QuestionType::Text => {
                let text = match answer {
                    Some(Answer::Text(text)) => text.clone(),
                    _ => String::new(),
                };
                (Some(text), None)
            }
            QuestionType::SingleChoice | QuestionType::MultipleChoice => {
                let ids = match answer {
                    Some(Answer::Choice(id)) if !id.is_empty() => vec![id.clone()],
                    Some(Answer::Choices(ids)) => ids.clone(),
                    _ => Vec::new(),
                };
                (None, Some(ids))
            }
        };

        Self {
            submission_id,
            question_id: question.id,
            answer_text,
            selected_option_ids,
        }
    }
}
