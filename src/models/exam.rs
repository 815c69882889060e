// src/models/exam.rs

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Kind of answer a question accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Text,
    SingleChoice,
    MultipleChoice,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::Text => "text",
            QuestionType::SingleChoice => "single_choice",
            QuestionType::MultipleChoice => "multiple_choice",
        }
    }

    pub fn is_choice(&self) -> bool {
        !matches!(self, QuestionType::Text)
    }
}

impl FromStr for QuestionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(QuestionType::Text),
            "single_choice" => Ok(QuestionType::SingleChoice),
            "multiple_choice" => Ok(QuestionType::MultipleChoice),
            other => Err(format!("unknown question type '{}'", other)),
        }
    }
}

/// One selectable option of a choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub id: String,
    pub text: String,
}

/// A single exam question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,

    pub text: String,

    /// Mapped from `type` since it is a reserved keyword in Rust.
    #[serde(rename = "type")]
    pub question_type: QuestionType,

    pub points: i32,

    pub is_required: bool,

    /// Page the question is shown on. Missing or non-positive values mean page 1.
    #[serde(default)]
    pub page_number: Option<i32>,

    #[serde(default)]
    pub order_index: i32,

    #[serde(default)]
    pub options: Vec<QuestionOption>,
}

impl Question {
    pub fn page(&self) -> u32 {
        match self.page_number {
            Some(p) if p >= 1 => p as u32,
            _ => 1,
        }
    }

    pub fn has_option(&self, option_id: &str) -> bool {
        self.options.iter().any(|o| o.id == option_id)
    }
}

/// Read-only exam definition consumed at session start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamDefinition {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub time_limit_minutes: i64,
    #[serde(default)]
    pub is_public: bool,
    pub questions: Vec<Question>,
}

impl ExamDefinition {
    /// Highest page any question sits on, never less than 1.
    pub fn total_pages(&self) -> u32 {
        self.questions.iter().map(Question::page).max().unwrap_or(1).max(1)
    }

    pub fn max_score(&self) -> i64 {
        self.questions.iter().map(|q| q.points as i64).sum()
    }

    pub fn time_limit_ms(&self) -> i64 {
        self.time_limit_minutes * 60_000
    }

    pub fn question(&self, id: i64) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == id)
    }

    /// Questions shown on `page`, in display order.
    pub fn questions_on_page(&self, page: u32) -> Vec<&Question> {
        let mut questions: Vec<&Question> =
            self.questions.iter().filter(|q| q.page() == page).collect();
        questions.sort_by_key(|q| q.order_index);
        questions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(id: i64, page_number: Option<i32>, order_index: i32, points: i32) -> Question {
        Question {
            id,
            text: format!("Q{}", id),
            question_type: QuestionType::Text,
            points,
            is_required: false,
            page_number,
            order_index,
            options: vec![],
        }
    }

    fn exam(questions: Vec<Question>) -> ExamDefinition {
        ExamDefinition {
            id: 1,
            title: "Exam".to_string(),
            description: None,
            time_limit_minutes: 30,
            is_public: false,
            questions,
        }
    }

    #[test]
    fn test_total_pages_defaults_to_one() {
        assert_eq!(exam(vec![]).total_pages(), 1);
        assert_eq!(exam(vec![question(1, None, 0, 1)]).total_pages(), 1);
        assert_eq!(exam(vec![question(1, Some(0), 0, 1)]).total_pages(), 1);
    }

    #[test]
    fn test_total_pages_uses_highest_page() {
        let e = exam(vec![
            question(1, Some(1), 0, 1),
            question(2, Some(3), 0, 1),
            question(3, None, 0, 1),
        ]);
        assert_eq!(e.total_pages(), 3);
    }

    #[test]
    fn test_questions_on_page_sorted_by_order_index() {
        let e = exam(vec![
            question(1, Some(2), 5, 1),
            question(2, None, 0, 1),
            question(3, Some(2), 1, 1),
        ]);
        let ids: Vec<i64> = e.questions_on_page(2).iter().map(|q| q.id).collect();
        assert_eq!(ids, vec![3, 1]);
        let ids: Vec<i64> = e.questions_on_page(1).iter().map(|q| q.id).collect();
        assert_eq!(ids, vec![2]);
    }

    #[test]
    fn test_max_score_and_time_limit() {
        let e = exam(vec![question(1, None, 0, 4), question(2, None, 0, 6)]);
        assert_eq!(e.max_score(), 10);
        assert_eq!(e.time_limit_ms(), 30 * 60_000);
    }

    #[test]
    fn test_question_type_parses_wire_names() {
        assert_eq!("text".parse::<QuestionType>(), Ok(QuestionType::Text));
        assert_eq!(
            "multiple_choice".parse::<QuestionType>(),
            Ok(QuestionType::MultipleChoice)
        );
        assert!("essay".parse::<QuestionType>().is_err());
    }
}
