//! API endpoint handlers

use crate::generation::AppendOutcome;
use crate::state::AppState;
use crate::types::{AppError, Prompt, StreamEvent};
use axum::{
    extract::{Form, Path, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        Html, Json,
    },
};
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::ReceiverStream;

#[derive(Debug, Deserialize)]
pub struct PromptForm {
    session_id: String,
    #[serde(default)]
    prompt: String,
    top_k: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct SessionForm {
    session_id: String,
}

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    prompt: String,
    predictions: Vec<crate::types::Prediction>,
}

#[derive(Debug, Serialize)]
pub struct AppendResponse {
    prompt: String,
    word: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StopResponse {
    stopped: bool,
    prompt: String,
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    prompt: String,
}

/// Rank next-word candidates for the submitted prompt.
pub async fn predict(
    State(state): State<AppState>,
    Form(form): Form<PromptForm>,
) -> Result<Json<PredictResponse>, AppError> {
    let generation = state.generation()?;
    let prompt = Prompt::from_text(&form.prompt);
    let top_k = form.top_k.unwrap_or(state.config.top_k);

    let predictions = generation.predict(&prompt, top_k)?;
    tracing::debug!(
        "predicted {} candidates for session {}",
        predictions.len(),
        form.session_id
    );

    let mut sessions = state.sessions.write().await;
    sessions.get_or_create(&form.session_id).prompt = prompt.clone();

    Ok(Json(PredictResponse {
        prompt: prompt.to_string(),
        predictions,
    }))
}

/// Append the single top-ranked word to the submitted prompt.
pub async fn append_word(
    State(state): State<AppState>,
    Form(form): Form<PromptForm>,
) -> Result<Json<AppendResponse>, AppError> {
    let generation = state.generation()?;
    let prompt = Prompt::from_text(&form.prompt);

    let (prompt, word) = match generation.append(prompt)? {
        AppendOutcome::Appended(prompt) => {
            let word = prompt.last().map(str::to_string);
            (prompt, word)
        }
        AppendOutcome::Exhausted(prompt) => (prompt, None),
    };

    let mut sessions = state.sessions.write().await;
    sessions.get_or_create(&form.session_id).prompt = prompt.clone();

    Ok(Json(AppendResponse {
        prompt: prompt.to_string(),
        word,
    }))
}

/// Kick off an auto-generation run in the background.
///
/// Returns immediately with an HTML fragment echoing the starting prompt;
/// snapshots arrive over the session's SSE stream.
pub async fn start_generation(
    State(state): State<AppState>,
    Form(form): Form<PromptForm>,
) -> Result<Html<String>, AppError> {
    let generation = Arc::clone(state.generation()?);
    let prompt = Prompt::from_text(&form.prompt);
    tracing::info!(
        "▶️ starting run for session {} from \"{}\"",
        form.session_id,
        prompt
    );

    let (cancel, sender) = {
        let mut sessions = state.sessions.write().await;
        let session = sessions.get_or_create(&form.session_id);
        session.prompt = prompt.clone();
        let cancel = session.begin_run();
        (cancel, sessions.sender(&form.session_id))
    };

    let session_id = form.session_id.clone();
    let state_clone = state.clone();
    tokio::spawn(async move {
        let final_prompt = generation.run(prompt, cancel, sender).await;
        let mut sessions = state_clone.sessions.write().await;
        if let Some(session) = sessions.get_mut(&session_id) {
            session.prompt = final_prompt;
        }
    });

    let html = format!(
        r#"<div class="prompt-text" id="run-output">{}</div>"#,
        html_escape::encode_text(&form.prompt)
    );
    Ok(Html(html))
}

/// Persistent SSE stream of generation events for one session.
pub async fn stream_events(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    tracing::info!("SSE connection request for session: {}", session_id);

    let receiver = {
        let mut sessions = state.sessions.write().await;
        sessions.take_receiver(&session_id)
    };

    let stream = ReceiverStream::new(receiver).map(|event: StreamEvent| {
        Ok(Event::default()
            .event(event.event_type())
            .data(event.to_sse_data()))
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("keep-alive"),
    )
}

/// Cancel the run in flight for a session.
pub async fn stop_generation(
    State(state): State<AppState>,
    Form(form): Form<SessionForm>,
) -> Result<Json<StopResponse>, AppError> {
    let mut sessions = state.sessions.write().await;
    let session = sessions
        .get_mut(&form.session_id)
        .ok_or_else(|| AppError::UnknownSession(form.session_id.clone()))?;

    let stopped = session.stop_run();
    tracing::info!(
        "⏹️ stop requested for session {} (run in flight: {})",
        form.session_id,
        stopped
    );

    Ok(Json(StopResponse {
        stopped,
        prompt: session.prompt.to_string(),
    }))
}

/// Clear a session's prompt and cancel any run in flight.
pub async fn reset_prompt(
    State(state): State<AppState>,
    Form(form): Form<SessionForm>,
) -> Result<Json<ResetResponse>, AppError> {
    let mut sessions = state.sessions.write().await;
    let session = sessions
        .get_mut(&form.session_id)
        .ok_or_else(|| AppError::UnknownSession(form.session_id.clone()))?;

    session.reset_prompt();

    Ok(Json(ResetResponse {
        prompt: session.prompt.to_string(),
    }))
}

/// Predictor availability, session count, and counters.
pub async fn system_status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let sessions = state.sessions.read().await.count();
    Json(serde_json::json!({
        "predictor_loaded": state.generation.is_some(),
        "sessions": sessions,
        "metrics": state.metrics.get_stats(),
        "defaults": {
            "top_k": state.config.top_k,
            "max_words": state.config.max_words,
        },
    }))
}
