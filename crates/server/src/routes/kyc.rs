//! KYC status and event publishing routes.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use kycwatch_shared::{InboundMessage, ProblemDetails};
use serde::Serialize;
use serde_json::Value;

use crate::state::AppState;

type ApiResult<T> = Result<T, (StatusCode, Json<ProblemDetails>)>;

#[derive(Debug, Serialize)]
pub struct PublishResponse {
    pub delivered: usize,
}

/// `GET /api/investors/{key}/kyc`: the latest `kyc_update` payload for the key.
pub async fn get_kyc_status(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<Json<Value>> {
    match state.hub.latest(&key).await {
        Some(data) => Ok(Json(data)),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(ProblemDetails::not_found(format!("no KYC state for {key}"))),
        )),
    }
}

/// `POST /api/investors/{key}/events`: publish an event to the key's sockets.
pub async fn publish_event(
    State(state): State<AppState>,
    Path(key): Path<String>,
    body: Result<Json<InboundMessage>, axum::extract::rejection::JsonRejection>,
) -> ApiResult<(StatusCode, Json<PublishResponse>)> {
    let Json(message) = body.map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(ProblemDetails::bad_request(e.body_text())),
        )
    })?;

    let event_type = message.event_type();
    let delivered = state.hub.publish(&key, message).await;
    tracing::debug!(%key, %event_type, delivered, "event published");

    Ok((StatusCode::ACCEPTED, Json(PublishResponse { delivered })))
}
