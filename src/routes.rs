// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method},
    middleware,
    routing::{post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{handlers::session, state::AppState, utils::jwt::identity_middleware};

/// Assembles the main application router.
///
/// * Mounts the exam session API under `/api/sessions/{exam_id}`.
/// * Resolves the caller's identity on every session route.
/// * Applies global middleware (Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        HeaderValue::from_static("http://localhost:3000"),
        HeaderValue::from_static("http://127.0.0.1:3000"),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let session_routes = Router::new()
        .route(
            "/{exam_id}",
            post(session::start_session)
                .get(session::get_session)
                .delete(session::close_session),
        )
        .route("/{exam_id}/answers", put(session::set_answer))
        .route("/{exam_id}/applicant", put(session::set_applicant_name))
        .route("/{exam_id}/advance", post(session::advance))
        .route("/{exam_id}/retreat", post(session::retreat))
        .route("/{exam_id}/focus-events", post(session::focus_event))
        .route("/{exam_id}/submit", post(session::submit))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            identity_middleware,
        ));

    Router::new()
        .nest("/api/sessions", session_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
