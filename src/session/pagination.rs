//! Pagination Validator: gates forward navigation and final submission on
//! required-answer completeness.

use crate::models::{exam::ExamDefinition, session::SessionState};

/// Required questions on `page` that have no usable answer, in display order.
pub fn unanswered_on_page(exam: &ExamDefinition, state: &SessionState, page: u32) -> Vec<i64> {
    exam.questions_on_page(page)
        .into_iter()
        .filter(|q| q.is_required && !state.is_answered(q))
        .map(|q| q.id)
        .collect()
}

/// Required questions across every page that have no usable answer.
pub fn unanswered_required(exam: &ExamDefinition, state: &SessionState) -> Vec<i64> {
    (1..=exam.total_pages())
        .flat_map(|page| unanswered_on_page(exam, state, page))
        .collect()
}

pub fn can_advance(exam: &ExamDefinition, state: &SessionState, page: u32) -> bool {
    unanswered_on_page(exam, state, page).is_empty()
}

/// Page to move to on "next": the current page + 1, capped at the last page.
///
/// Fails with the unanswered required ids of the current page, in which case
/// the caller must leave the state untouched.
pub fn next_page(exam: &ExamDefinition, state: &SessionState) -> Result<u32, Vec<i64>> {
    let unanswered = unanswered_on_page(exam, state, state.current_page);
    if !unanswered.is_empty() {
        return Err(unanswered);
    }
    Ok((state.current_page + 1).min(exam.total_pages()))
}

/// Page to move to on "back", floored at 1. Never blocked.
pub fn previous_page(state: &SessionState) -> u32 {
    state.current_page.saturating_sub(1).max(1)
}
