use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;

use crate::api::error::ApiError;
use crate::api::server::AppState;
use crate::client::API_VERSION;
use crate::types::{Instructions, StateItem};

#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    #[serde(rename = "api-version")]
    pub api_version: Option<String>,
}

pub async fn create_state(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(definition): Json<Value>,
) -> Result<(StatusCode, Json<StateItem>), ApiError> {
    let item = StateItem::new(id.clone(), definition);
    if !state.store.create_state(item.clone()).await? {
        return Err(ApiError::Conflict(format!("State '{}' already exists.", id)));
    }

    log::debug!("Created state '{}'", id);
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn get_state(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StateItem>, ApiError> {
    state
        .store
        .get_state(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("State '{}' does not exist.", id)))
}

pub async fn update_state(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(item): Json<StateItem>,
) -> Result<Json<StateItem>, ApiError> {
    if !item.id.eq_ignore_ascii_case(&id) {
        return Err(ApiError::BadRequest(format!(
            "State id '{}' in the body does not match the route id '{}'.",
            item.id, id
        )));
    }

    if !state.store.update_state(item.clone()).await? {
        log::debug!("Created state '{}' on update", id);
    }
    Ok(Json(item))
}

pub async fn delete_state(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_state(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn heartbeat(State(state): State<AppState>) -> Json<Value> {
    Json(serde_json::json!({
        "agentId": state.runtime.agent_id(),
        "experimentId": state.runtime.experiment_id(),
        "timestamp": Utc::now(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn online_status(State(state): State<AppState>) -> StatusCode {
    if state.runtime.is_online() {
        StatusCode::OK
    } else {
        StatusCode::LOCKED
    }
}

pub async fn send_instructions(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
    Json(mut body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    if !state.runtime.is_online() {
        return Err(ApiError::Locked(
            "The agent is not yet online to receive instructions.".to_string(),
        ));
    }

    let typed = query.api_version.as_deref() == Some(API_VERSION);
    let Some(fields) = body.as_object_mut() else {
        return Err(ApiError::BadRequest(
            "Instructions must be a JSON object.".to_string(),
        ));
    };
    if !fields.contains_key("type") {
        if typed {
            return Err(ApiError::BadRequest(
                "Typed instructions require a 'type' field.".to_string(),
            ));
        }
        fields.insert("type".to_string(), Value::from("Undefined"));
    }

    let instructions: Instructions = serde_json::from_value(body)?;
    let dispatched = state.runtime.publish(instructions.clone()).len();
    log::info!(
        "Received {} instructions; dispatched to {} subscribers",
        instructions.instructions_type.as_str(),
        dispatched
    );

    Ok(Json(serde_json::json!({
        "type": instructions.instructions_type,
        "subscribers": dispatched,
    })))
}
