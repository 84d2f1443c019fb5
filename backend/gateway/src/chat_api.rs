//! `POST /api/ask-ai`: grounded campaign chat over server-sent events.
//!
//! Each event is one `data:` line carrying `{"text": ...}` or `{"error": ...}`;
//! the stream always ends with `data: [DONE]`.

use std::convert::Infallible;

use axum::{
    extract::{rejection::JsonRejection, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::Stream;
use tokio_stream::StreamExt;
use tracing::info;

use crowdhealth_pipeline::ChatRequest;

use crate::error::ApiError;
use crate::server::GatewayState;

pub async fn ask_ai(
    State(state): State<GatewayState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let Json(request) = payload?;
    info!(campaign_id = request.campaign_id.as_deref().unwrap_or_default(), "Starting chat stream");

    let events = state.chat.answer(request).await?;
    let stream = events.map(|event| Ok(Event::default().data(event.to_data())));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
