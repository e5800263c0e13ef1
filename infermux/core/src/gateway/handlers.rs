use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use tracing::{debug, info};

use super::dto::{HealthResponse, InferRequest, InferResponse, MistInferPayload, ProvidersResponse};
use super::error::ApiError;
use super::state::GatewayState;
use crate::message::{Message, TYPE_INFER_REQUEST, TYPE_INFER_RESPONSE};
use crate::registry::AUTO_MODEL;
use crate::routing::{RouterMetricsSnapshot, RoutingRequest};

pub async fn infer_handler(
    State(state): State<Arc<GatewayState>>,
    payload: Result<Json<InferRequest>, JsonRejection>,
) -> Result<Json<InferResponse>, ApiError> {
    let Json(payload) = payload.map_err(|e| ApiError::invalid_request(e.body_text()))?;
    debug!(model = %payload.model, "Received /infer request");

    let request = RoutingRequest {
        requested_model: model_or_auto(Some(payload.model)),
        prompt: payload.prompt,
        deadline: payload.deadline_ms.map(Duration::from_millis),
    };
    let result = state.dispatch(request).await?;
    Ok(Json(result.into()))
}

pub async fn ingest_handler(
    State(state): State<Arc<GatewayState>>,
    message: Result<Json<Message>, JsonRejection>,
) -> Result<Json<Message>, ApiError> {
    let Json(message) = message.map_err(|e| ApiError::invalid_request(e.body_text()))?;
    debug!(id = %message.id, kind = %message.kind, source = %message.source, "Received MIST message");

    if message.kind != TYPE_INFER_REQUEST {
        return Err(ApiError::invalid_request(format!(
            "unsupported message type {:?}",
            message.kind
        )));
    }
    let payload: MistInferPayload = message
        .decode()
        .map_err(|e| ApiError::invalid_request(format!("invalid {TYPE_INFER_REQUEST} payload: {e}")))?;

    let request = RoutingRequest {
        requested_model: model_or_auto(payload.model),
        prompt: payload.prompt,
        deadline: payload.deadline_ms.map(Duration::from_millis),
    };
    let result = state.dispatch(request).await?;

    let reply = Message::new(
        state.service_name(),
        TYPE_INFER_RESPONSE,
        &InferResponse::from(result),
    )
    .map_err(|e| ApiError::internal(e.to_string()))?;
    info!(request_id = %message.id, reply_id = %reply.id, "Answered MIST inference request");
    Ok(Json(reply))
}

pub async fn providers_handler(State(state): State<Arc<GatewayState>>) -> Json<ProvidersResponse> {
    Json(ProvidersResponse {
        providers: state.router().registry().list(),
    })
}

pub async fn health_handler(State(state): State<Arc<GatewayState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        providers: state.router().registry().len(),
    })
}

pub async fn stats_handler(State(state): State<Arc<GatewayState>>) -> Json<RouterMetricsSnapshot> {
    Json(state.router().metrics().snapshot())
}

fn model_or_auto(model: Option<String>) -> String {
    match model {
        Some(model) if !model.is_empty() => model,
        _ => AUTO_MODEL.to_string(),
    }
}
