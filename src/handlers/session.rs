// src/handlers/session.rs

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use validator::Validate;

use crate::{
    error::{AppError, SessionError},
    models::{
        identity::Identity,
        session::{
            ApplicantNameRequest, FocusEventRequest, SessionKey, SetAnswerRequest,
            StartSessionResponse, SubmitOutcome,
        },
    },
    session::ExamSession,
    state::AppState,
    utils::jwt::sign_guest_jwt,
};

const GUEST_TOKEN_GRACE_SECS: u64 = 24 * 60 * 60;

/// Looks up the caller's live session for `exam_id`.
async fn live_session(
    state: &AppState,
    identity: &Identity,
    exam_id: i64,
) -> Result<Arc<ExamSession>, AppError> {
    let key = SessionKey::new(identity.subject_id(), exam_id);
    state
        .sessions
        .get(&key)
        .await
        .ok_or_else(|| AppError::NotFound(format!("No session for exam {}", exam_id)))
}

/// Starts or resumes the caller's attempt at an exam.
///
/// * Returns the live session if one exists.
/// * Otherwise loads the exam and resumes its snapshot, or starts fresh.
/// * Anonymous candidates also get a guest token bound to this attempt.
pub async fn start_session(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(exam_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let key = SessionKey::new(identity.subject_id(), exam_id);
    if let Some(session) = state.sessions.get_unsubmitted(&key).await {
        let body = start_response(&state, &session).await?;
        return Ok((StatusCode::OK, Json(body)));
    }

    let exam = state
        .exams
        .fetch_exam(exam_id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch exam {}: {:?}", exam_id, e);
            AppError::InternalServerError(e.to_string())
        })?
        .ok_or(SessionError::ExamNotFound(exam_id))?;

    let session = state
        .sessions
        .open(exam, identity, state.session_deps(), state.settings.clone())
        .await?;

    let body = start_response(&state, &session).await?;
    Ok((StatusCode::CREATED, Json(body)))
}

async fn start_response(
    state: &AppState,
    session: &ExamSession,
) -> Result<StartSessionResponse, AppError> {
    let guest_token = match session.identity() {
        Identity::Anonymous { guest_id } => {
            // Valid for the whole attempt plus a grace period.
            let ttl = session.exam().time_limit_ms().max(0) as u64 / 1_000 + GUEST_TOKEN_GRACE_SECS;
            Some(sign_guest_jwt(guest_id, &state.config.jwt_secret, ttl)?)
        }
        Identity::Authenticated { .. } => None,
    };

    Ok(StartSessionResponse {
        session: session.view().await,
        guest_token,
    })
}

pub async fn get_session(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(exam_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let session = live_session(&state, &identity, exam_id).await?;
    Ok(Json(session.view().await))
}

/// Tears the session down: stops its timer and focus monitor. The snapshot
/// is kept so the attempt can be resumed later.
pub async fn close_session(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(exam_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let key = SessionKey::new(identity.subject_id(), exam_id);
    if !state.sessions.close(&key).await {
        return Err(AppError::NotFound(format!("No session for exam {}", exam_id)));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_answer(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(exam_id): Path<i64>,
    Json(req): Json<SetAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    let session = live_session(&state, &identity, exam_id).await?;
    session.set_answer(req.question_id, req.value).await?;
    Ok(Json(session.view().await))
}

pub async fn set_applicant_name(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(exam_id): Path<i64>,
    Json(req): Json<ApplicantNameRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = req.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let session = live_session(&state, &identity, exam_id).await?;
    session.set_applicant_name(&req.applicant_name).await?;
    Ok(Json(session.view().await))
}

/// Moves to the next page. Responds 422 with the unanswered required
/// question ids when the current page is incomplete.
pub async fn advance(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(exam_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let session = live_session(&state, &identity, exam_id).await?;
    session.advance().await?;
    Ok(Json(session.view().await))
}

pub async fn retreat(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(exam_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let session = live_session(&state, &identity, exam_id).await?;
    session.retreat().await?;
    Ok(Json(session.view().await))
}

/// Records a "hidden" or "blur" signal from the client.
/// `warning` tells the client whether to show a warning now.
pub async fn focus_event(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(exam_id): Path<i64>,
    Json(req): Json<FocusEventRequest>,
) -> Result<impl IntoResponse, AppError> {
    let session = live_session(&state, &identity, exam_id).await?;

    let body = match session.record_focus_loss(req.signal).await {
        Some(report) => json!({
            "recorded": true,
            "tab_switch_count": report.tab_switch_count,
            "warning": report.warning,
        }),
        None => json!({
            "recorded": false,
            "tab_switch_count": session.state().await.tab_switch_count,
            "warning": false,
        }),
    };

    Ok(Json(body))
}

/// Candidate-initiated final submission.
///
/// * 200 with the submission id on success (or if already submitted).
/// * 202 if another submission of this session is still running.
/// * 422 naming unanswered questions, or a missing applicant name.
/// * 503 when the remote store failed; answers are kept for a retry.
pub async fn submit(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(exam_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let session = live_session(&state, &identity, exam_id).await?;

    let outcome = session.submit().await?;
    let status = match outcome {
        SubmitOutcome::AlreadyInProgress => StatusCode::ACCEPTED,
        _ => StatusCode::OK,
    };

    Ok((status, Json(outcome)))
}
