/**
 * POLLING GATEWAY - Endpoints HTTP appelés par les devices et le dashboard
 *
 * RÔLE : Colle le protocole JSON/HTTP sur le cœur en mémoire (liveness,
 * télémétrie, commandes). Aucune authentification : la confiance
 * device → serveur est établie hors bande.
 *
 * ROUTES :
 * - POST /api/device-connect          → registre + touch
 * - POST /api/device-data             → record_data (status + data requis, pas de check registre)
 * - GET  /api/device-data/{deviceId}  → registre + snapshot + liveness
 * - POST /api/send-command            → enqueue
 * - GET  /api/device-commands/{id}    → drain_all
 * - POST /api/component-update        → record_confirmation
 *
 * Seuls les appels au registre peuvent échouer (500, loggé, pas de retry).
 */

use crate::error::ApiError;
use crate::models::*;
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use serde_json::Value;
use tracing::{debug, info, warn};

const INVALID_CONNECT: &str = "Invalid request format";
const INVALID_DATA: &str = "Invalid data format";
const INVALID_COMMAND: &str = "Invalid command format";
const INVALID_UPDATE: &str = "Invalid update format";

/// Corps JSON illisible → même 400 que les champs manquants
pub(crate) fn body<T>(payload: Result<Json<T>, JsonRejection>, invalid: &str) -> Result<T, ApiError> {
    payload.map(|Json(body)| body).map_err(|e| {
        warn!("[http] rejected body: {}", e.body_text());
        ApiError::bad_request(format!("{invalid}: {}", e.body_text()))
    })
}

fn required<'a>(value: &'a Option<String>, field: &str, invalid: &str) -> Result<&'a str, ApiError> {
    match value.as_deref() {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ApiError::bad_request(format!("{invalid}: {field} is required"))),
    }
}

fn required_value(value: Option<Value>, field: &str, invalid: &str) -> Result<Value, ApiError> {
    value.ok_or_else(|| ApiError::bad_request(format!("{invalid}: {field} is required")))
}

fn expect_type(kind: &Option<String>, expected: &str, invalid: &str) -> Result<(), ApiError> {
    if kind.as_deref() == Some(expected) {
        Ok(())
    } else {
        Err(ApiError::bad_request(format!("{invalid}: type must be \"{expected}\"")))
    }
}

fn message(message: &'static str) -> Json<MessageOut> {
    Json(MessageOut { message })
}

// POST /api/device-connect
pub async fn device_connect(
    State(app): State<AppState>,
    payload: Result<Json<DeviceConnectIn>, JsonRejection>,
) -> Result<Json<MessageOut>, ApiError> {
    let req = body(payload, INVALID_CONNECT)?;
    expect_type(&req.kind, "deviceConnect", INVALID_CONNECT)?;
    let device_id = required(&req.device_id, "deviceId", INVALID_CONNECT)?;

    if app.lookup.find_by_id(device_id).await?.is_none() {
        return Err(ApiError::not_found("Device not found"));
    }

    app.core.liveness.touch(device_id);
    info!("[gateway] device {device_id} connected");
    Ok(message("Device connected successfully"))
}

// POST /api/device-data
pub async fn device_data(
    State(app): State<AppState>,
    payload: Result<Json<DeviceDataIn>, JsonRejection>,
) -> Result<Json<MessageOut>, ApiError> {
    let req = body(payload, INVALID_DATA)?;
    expect_type(&req.kind, "deviceData", INVALID_DATA)?;
    let device_id = required(&req.device_id, "deviceId", INVALID_DATA)?;
    let name = required(&req.name, "name", INVALID_DATA)?;
    let status = required_value(req.status.clone(), "status", INVALID_DATA)?;
    let data = required_value(req.data.clone(), "data", INVALID_DATA)?;

    app.core.telemetry.record_data(device_id, name, status, Some(data));
    debug!("[gateway] data from device {device_id} for component {name}");
    Ok(message("Data received successfully"))
}

// GET /api/device-data/{deviceId}
pub async fn get_device_data(
    State(app): State<AppState>,
    Path(device_id): Path<String>,
) -> Result<Json<DeviceDataView>, ApiError> {
    if app.lookup.find_by_id(&device_id).await?.is_none() {
        return Err(ApiError::not_found("Device not found"));
    }

    let is_connected = app
        .core
        .liveness
        .status(&device_id)
        .map(|s| s.is_connected)
        .unwrap_or(false);
    let components = app.core.telemetry.snapshot(&device_id);

    Ok(Json(DeviceDataView { device_id, is_connected, components }))
}

// POST /api/send-command
pub async fn send_command(
    State(app): State<AppState>,
    payload: Result<Json<SendCommandIn>, JsonRejection>,
) -> Result<Json<MessageOut>, ApiError> {
    let req = body(payload, INVALID_COMMAND)?;
    let device_id = required(&req.device_id, "deviceId", INVALID_COMMAND)?;
    let name = required(&req.name, "name", INVALID_COMMAND)?;
    let status = required_value(req.status.clone(), "status", INVALID_COMMAND)?;

    let shown = status.to_string();
    app.core.commands.enqueue(device_id, name, status);
    info!("[gateway] command queued for device {device_id}, component {name}: {shown} ({} pending)",
          app.core.commands.pending(device_id));
    Ok(message("Command sent successfully"))
}

// GET /api/device-commands/{deviceId}
pub async fn device_commands(
    State(app): State<AppState>,
    Path(device_id): Path<String>,
) -> Json<CommandsView> {
    let commands = app.core.commands.drain_all(&device_id);
    if !commands.is_empty() {
        info!("[gateway] delivered {} command(s) to device {device_id}", commands.len());
    }
    Json(CommandsView { commands })
}

// POST /api/component-update
pub async fn component_update(
    State(app): State<AppState>,
    payload: Result<Json<ComponentUpdateIn>, JsonRejection>,
) -> Result<Json<MessageOut>, ApiError> {
    let req = body(payload, INVALID_UPDATE)?;
    expect_type(&req.kind, "updateComponent", INVALID_UPDATE)?;
    let device_id = required(&req.device_id, "deviceId", INVALID_UPDATE)?;
    let name = required(&req.name, "name", INVALID_UPDATE)?;
    let status = required_value(req.status.clone(), "status", INVALID_UPDATE)?;

    info!("[gateway] component update from device {device_id} for {name}: {status}");
    app.core.telemetry.record_confirmation(device_id, name, status);
    Ok(message("Component update successful"))
}
