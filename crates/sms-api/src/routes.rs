//! HTTP routes for SMS operations
//!
//! Thin handlers: deserialize, delegate to the service, map errors through
//! `ApiError`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::dto::{MessageView, SendMessageRequest};
use crate::error::ApiError;
use crate::service::MessageService;

#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<MessageService>,
}

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/sms/send", post(send_message))
        .route("/api/sms/:id", get(get_message))
        .route("/api/sms/phone/:address", get(get_by_participant))
        .route("/api/sms/from/:address", get(get_by_source))
        .route("/api/sms/to/:address", get(get_by_destination))
        .with_state(state)
}

async fn send_message(
    State(state): State<ApiState>,
    Json(request): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let view = state.service.send_message(request).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn get_message(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> Result<Json<MessageView>, ApiError> {
    let view = state.service.get_message(id).await?;
    Ok(Json(view))
}

async fn get_by_participant(
    State(state): State<ApiState>,
    Path(address): Path<String>,
) -> Result<Json<Vec<MessageView>>, ApiError> {
    let views = state.service.list_by_participant(&address).await?;
    Ok(Json(views))
}

async fn get_by_source(
    State(state): State<ApiState>,
    Path(address): Path<String>,
) -> Result<Json<Vec<MessageView>>, ApiError> {
    let views = state.service.list_by_source(&address).await?;
    Ok(Json(views))
}

async fn get_by_destination(
    State(state): State<ApiState>,
    Path(address): Path<String>,
) -> Result<Json<Vec<MessageView>>, ApiError> {
    let views = state.service.list_by_destination(&address).await?;
    Ok(Json(views))
}
