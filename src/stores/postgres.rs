//! Postgres-backed exam provider and submission store.

use async_trait::async_trait;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, types::Json};

use super::{ExamProvider, SubmissionStore};
use crate::{
    error::StoreError,
    models::{
        exam::{ExamDefinition, Question, QuestionOption, QuestionType},
        submission::{AnswerRecord, SubmissionRecord},
    },
};

/// Helper struct for fetching an exam header.
#[derive(FromRow)]
struct ExamRow {
    id: i64,
    title: String,
    description: Option<String>,
    time_limit_minutes: i32,
    is_public: bool,
}

/// Helper struct for fetching exam questions.
#[derive(FromRow)]
struct QuestionRow {
    id: i64,
    text: String,
    question_type: String,
    points: i32,
    is_required: bool,
    page_number: Option<i32>,
    order_index: i32,
    options: Json<Vec<QuestionOption>>,
}

impl TryFrom<QuestionRow> for Question {
    type Error = StoreError;

    fn try_from(row: QuestionRow) -> Result<Self, Self::Error> {
        let question_type: QuestionType = row
            .question_type
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("question {}: {}", row.id, e)))?;

        Ok(Question {
            id: row.id,
            text: row.text,
            question_type,
            points: row.points,
            is_required: row.is_required,
            page_number: row.page_number,
            order_index: row.order_index,
            options: row.options.0,
        })
    }
}

#[derive(Clone)]
pub struct PgExamProvider {
    pool: PgPool,
}

impl PgExamProvider {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExamProvider for PgExamProvider {
    async fn fetch_exam(&self, exam_id: i64) -> Result<Option<ExamDefinition>, StoreError> {
        let exam = sqlx::query_as::<_, ExamRow>(
            r#"
            SELECT id, title, description, time_limit_minutes, is_public
            FROM exams
            WHERE id = $1
            "#,
        )
        .bind(exam_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(exam) = exam else {
            return Ok(None);
        };

        let questions = sqlx::query_as::<_, QuestionRow>(
            r#"
            SELECT
                id,
                text,
                type as question_type,
                points,
                is_required,
                page_number,
                order_index,
                options
            FROM exam_questions
            WHERE exam_id = $1
            ORDER BY page_number NULLS FIRST, order_index, id
            "#,
        )
        .bind(exam_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Question::try_from)
        .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(ExamDefinition {
            id: exam.id,
            title: exam.title,
            description: exam.description,
            time_limit_minutes: exam.time_limit_minutes as i64,
            is_public: exam.is_public,
            questions,
        }))
    }
}

#[derive(Clone)]
pub struct PgSubmissionStore {
    pool: PgPool,
}

impl PgSubmissionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubmissionStore for PgSubmissionStore {
    async fn create(&self, record: &SubmissionRecord) -> Result<i64, StoreError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO submissions
                (exam_id, subject_id, applicant_name, start_time, end_time,
                 tab_switch_count, max_score, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(record.exam_id)
        .bind(&record.subject_id)
        .bind(&record.applicant_name)
        .bind(record.start_time)
        .bind(record.end_time)
        .bind(record.tab_switch_count)
        .bind(record.max_score)
        .bind(record.status.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to insert submission: {:?}", e);
            StoreError::from(e)
        })?;

        Ok(id)
    }

    async fn create_many(&self, records: &[AnswerRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }

        // Single multi-row INSERT so the batch lands all-or-nothing.
        let mut query_builder = QueryBuilder::<Postgres>::new(
            "INSERT INTO submission_answers (submission_id, question_id, answer_text, selected_option_ids) ",
        );
        query_builder.push_values(records, |mut row, record| {
            row.push_bind(record.submission_id)
                .push_bind(record.question_id)
                .push_bind(record.answer_text.clone())
                .push_bind(record.selected_option_ids.clone().map(Json));
        });

        query_builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to insert answer batch: {:?}", e);
                StoreError::from(e)
            })?;

        Ok(())
    }
}
