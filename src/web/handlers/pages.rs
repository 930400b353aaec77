use crate::state::AppState;
use crate::types::AppError;
use axum::{extract::State, response::Html};
use uuid::Uuid;

pub async fn index(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    let session_id = Uuid::now_v7().to_string();

    {
        let mut sessions = state.sessions.write().await;
        sessions.get_or_create(&session_id);
        sessions.prune_to(state.config.max_sessions);
    }

    let html = state.templates.render_index(
        &session_id,
        state.config.top_k,
        state.config.max_words,
    )?;
    Ok(Html(html))
}
