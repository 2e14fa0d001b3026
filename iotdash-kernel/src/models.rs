use crate::commands::Command;
use crate::registry::{Device, DeviceComponent};
use crate::telemetry::ComponentState;
use crate::users::User;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============ POLLING (devices / dashboard) ============
// Tous les champs sont optionnels : la validation est faite par le gateway
// pour renvoyer un message 400 précis plutôt qu'une erreur serde.

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConnectIn {
    pub device_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDataIn {
    pub device_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub name: Option<String>,
    pub status: Option<Value>,
    pub data: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendCommandIn {
    pub device_id: Option<String>,
    pub name: Option<String>,
    pub status: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentUpdateIn {
    pub device_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub name: Option<String>,
    pub status: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct MessageOut {
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDataView {
    pub device_id: String,
    pub is_connected: bool,
    pub components: Vec<ComponentState>,
}

#[derive(Debug, Serialize)]
pub struct CommandsView {
    pub commands: Vec<Command>,
}

// ============ COMPTES ============

#[derive(Debug, Deserialize)]
pub struct RegisterIn {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginIn {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserView {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: Option<String>,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl UserView {
    pub fn new(user: User, token: Option<String>) -> Self {
        Self { id: user.id, name: user.name, email: user.email, token }
    }
}

// ============ GESTION DES DEVICES ============

#[derive(Debug, Deserialize)]
pub struct AddDeviceIn {
    pub device_name: Option<String>,
    pub device_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreatedOut {
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct DeviceSummary {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(rename = "deviceType")]
    pub device_type: String,
}

impl From<Device> for DeviceSummary {
    fn from(d: Device) -> Self {
        Self { id: d.id, name: d.name, device_type: d.device_type }
    }
}

#[derive(Debug, Serialize)]
pub struct DeviceDetail {
    pub name: String,
    #[serde(rename = "type")]
    pub device_type: String,
    pub components: Vec<DeviceComponent>,
}

impl From<Device> for DeviceDetail {
    fn from(d: Device) -> Self {
        Self { name: d.name, device_type: d.device_type, components: d.components }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateComponentsIn {
    pub components: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct DeviceUpdatedOut {
    pub message: &'static str,
    pub device: Device,
}
