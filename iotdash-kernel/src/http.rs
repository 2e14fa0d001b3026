/**
 * API REST IOTDASH - Serveur HTTP principal du kernel
 *
 * RÔLE :
 * Expose sur un seul routeur Axum :
 * - les endpoints de polling devices/dashboard (/api/..., voir gateway.rs)
 * - les comptes utilisateurs (/user/register, /user/login)
 * - la gestion des devices du dashboard (/device/..., bearer token obligatoire)
 * - l'observabilité (/health, /system/health)
 *
 * SÉCURITÉ :
 * - /device/... passe par le middleware `require_auth`
 * - /api/... reste ouvert : les devices n'ont pas de token
 * - CORS ouvert (dashboard servi depuis une autre origine)
 */

use crate::auth::{require_auth, AuthUser};
use crate::error::ApiError;
use crate::gateway::{self, body};
use crate::models::*;
use crate::registry::DeviceComponent;
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, Method, StatusCode};
use axum::routing::{get, post};
use axum::{middleware, Extension, Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub fn build_router(app_state: AppState) -> Router {
    let device_routes = Router::new()
        .route("/add", post(add_device))
        .route("/all", get(list_devices))
        .route("/{id}", get(get_device).put(update_device))
        .route_layer(middleware::from_fn_with_state(app_state.clone(), require_auth));

    Router::new()
        .route("/", get(|| async { "Welcome" }))
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/user/register", post(register))
        .route("/user/login", post(login))
        .nest("/device", device_routes)
        .route("/api/device-connect", post(gateway::device_connect))
        .route("/api/device-data", post(gateway::device_data))
        .route("/api/device-data/{device_id}", get(gateway::get_device_data))
        .route("/api/send-command", post(gateway::send_command))
        .route("/api/device-commands/{device_id}", get(gateway::device_commands))
        .route("/api/component-update", post(gateway::component_update))
        .with_state(app_state)
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::HEAD, Method::PUT])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> Json<crate::health::KernelHealth> {
    Json(app.health_tracker.get_health(&app.core.liveness, &app.core.commands))
}

// ============ COMPTES ============

// POST /user/register
async fn register(
    State(app): State<AppState>,
    payload: Result<Json<RegisterIn>, JsonRejection>,
) -> Result<Json<UserView>, ApiError> {
    let req = body(payload, "Invalid user data")?;
    let (Some(email), Some(password)) = (
        req.email.filter(|e| !e.is_empty()),
        req.password.filter(|p| !p.is_empty()),
    ) else {
        return Err(ApiError::bad_request("Invalid user data"));
    };

    match app.users.register(req.name, &email, &password).await? {
        Some(user) => Ok(Json(UserView::new(user, None))),
        None => Err(ApiError::bad_request("User already exists")),
    }
}

// POST /user/login
async fn login(
    State(app): State<AppState>,
    payload: Result<Json<LoginIn>, JsonRejection>,
) -> Result<(StatusCode, Json<UserView>), ApiError> {
    const INVALID: &str = "Invalid email or password";
    let req = payload.map(|Json(b)| b).map_err(|_| ApiError::unauthorized(INVALID))?;
    let (Some(email), Some(password)) = (req.email, req.password) else {
        return Err(ApiError::unauthorized(INVALID));
    };

    let Some(user) = app.users.authenticate(&email, &password).await? else {
        warn!("[auth] failed login for {email}");
        return Err(ApiError::unauthorized(INVALID));
    };

    let token = app.tokens.issue(&user.id);
    info!("[auth] user {} logged in", user.id);
    Ok((StatusCode::CREATED, Json(UserView::new(user, Some(token)))))
}

// ============ GESTION DES DEVICES ============

// POST /device/add
async fn add_device(
    State(app): State<AppState>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<AddDeviceIn>, JsonRejection>,
) -> Result<(StatusCode, Json<CreatedOut>), ApiError> {
    let req = body(payload, "Invalid input")?;
    let (Some(name), Some(device_type)) = (
        req.device_name.filter(|n| !n.is_empty()),
        req.device_type.filter(|t| !t.is_empty()),
    ) else {
        return Err(ApiError::bad_request("Invalid input"));
    };

    let created = app
        .devices
        .create(&user.id, &name, &device_type)
        .await
        .map_err(|e| ApiError::internal("Server error", e))?;

    match created {
        Some(device) => Ok((StatusCode::CREATED, Json(CreatedOut { id: device.id }))),
        None => Err(ApiError::bad_request("Device's name already exists")),
    }
}

// GET /device/all
async fn list_devices(
    State(app): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Json<Vec<DeviceSummary>> {
    let devices = app.devices.list_by_owner(&user.id);
    Json(devices.into_iter().map(DeviceSummary::from).collect())
}

// GET /device/{id}
async fn get_device(
    State(app): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<DeviceDetail>, ApiError> {
    app.devices
        .get(&id)
        .filter(|d| d.user_id == user.id)
        .map(|d| Json(DeviceDetail::from(d)))
        .ok_or_else(|| ApiError::not_found("Device not found"))
}

// PUT /device/{id}
async fn update_device(
    State(app): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateComponentsIn>, JsonRejection>,
) -> Result<Json<DeviceUpdatedOut>, ApiError> {
    const INVALID: &str = "Invalid components data";
    let req = body(payload, INVALID)?;
    let components: Vec<DeviceComponent> = match req.components {
        Some(list @ serde_json::Value::Array(_)) => {
            serde_json::from_value(list).map_err(|_| ApiError::bad_request(INVALID))?
        }
        _ => return Err(ApiError::bad_request(INVALID)),
    };

    if app.devices.get(&id).filter(|d| d.user_id == user.id).is_none() {
        return Err(ApiError::not_found("Device not found"));
    }

    match app.devices.update_components(&id, components).await? {
        Some(device) => Ok(Json(DeviceUpdatedOut {
            message: "Components updated successfully",
            device,
        })),
        None => Err(ApiError::not_found("Device not found")),
    }
}
