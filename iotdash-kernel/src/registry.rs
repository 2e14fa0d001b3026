/**
 * DEVICE REGISTRY - Identité, propriétaire et layout dashboard des devices
 *
 * RÔLE : Registre durable des devices (devices.json). Le gateway de polling
 * n'y accède qu'au travers de `DeviceLookup::find_by_id`, les routes
 * /device/... authentifiées utilisent le CRUD complet de `DeviceStore`.
 *
 * Les `components` stockés ici décrivent le widget dashboard (label, type,
 * taille de grille). Les valeurs live sont dans le cache télémétrie.
 */

use crate::error::StoreError;
use crate::store::JsonFile;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub name: String,
    #[serde(rename = "deviceType")]
    pub device_type: String,
    #[serde(default)]
    pub components: Vec<DeviceComponent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceComponent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>, // type de widget : switch, gauge, slider...
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_span: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub col_span: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<serde_json::Number>,
}

/// Seule dépendance du gateway de polling envers le registre
#[async_trait]
pub trait DeviceLookup: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<Device>, StoreError>;
}

pub struct DeviceStore {
    devices: JsonFile<Vec<Device>>,
}

impl DeviceStore {
    pub fn in_memory() -> Self {
        Self { devices: JsonFile::in_memory() }
    }

    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let devices = JsonFile::open(path).await?;
        info!("[registry] loaded {} devices", devices.read(|d: &Vec<Device>| d.len()));
        Ok(Self { devices })
    }

    /// Crée un device ; `None` si ce propriétaire a déjà un device de ce nom
    pub async fn create(&self, user_id: &str, name: &str, device_type: &str) -> Result<Option<Device>, StoreError> {
        let created = self.devices.update(|devices| {
            if devices.iter().any(|d| d.user_id == user_id && d.name == name) {
                return None;
            }
            let device = Device {
                id: Uuid::new_v4().to_string(),
                user_id: user_id.to_string(),
                name: name.to_string(),
                device_type: device_type.to_string(),
                components: Vec::new(),
            };
            devices.push(device.clone());
            Some(device)
        }).await?;

        if let Some(device) = &created {
            info!("[registry] device {} ({}) created for user {}", device.id, device.name, user_id);
        }
        Ok(created)
    }

    pub fn list_by_owner(&self, user_id: &str) -> Vec<Device> {
        self.devices.read(|devices| {
            devices.iter().filter(|d| d.user_id == user_id).cloned().collect()
        })
    }

    pub fn get(&self, id: &str) -> Option<Device> {
        self.devices.read(|devices| devices.iter().find(|d| d.id == id).cloned())
    }

    /// Remplace le layout des composants ; `None` si le device n'existe pas
    pub async fn update_components(&self, id: &str, components: Vec<DeviceComponent>) -> Result<Option<Device>, StoreError> {
        self.devices.update(|devices| {
            let device = devices.iter_mut().find(|d| d.id == id)?;
            device.components = components;
            Some(device.clone())
        }).await
    }
}

#[async_trait]
impl DeviceLookup for DeviceStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<Device>, StoreError> {
        Ok(self.get(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_rejects_duplicate_name_per_owner() {
        let store = DeviceStore::in_memory();
        let first = store.create("u1", "greenhouse", "esp32").await.unwrap();
        assert!(first.is_some());

        let again = store.create("u1", "greenhouse", "esp8266").await.unwrap();
        assert!(again.is_none());

        // un autre utilisateur peut réutiliser le nom
        let other = store.create("u2", "greenhouse", "esp8266").await.unwrap();
        assert!(other.is_some());
        assert_eq!(store.list_by_owner("u1").len(), 1);
    }

    #[tokio::test]
    async fn test_failed_persist_does_not_register_device() {
        let dir = tempfile::tempdir().unwrap();
        let store = DeviceStore::open(dir.path().join("missing-subdir").join("devices.json")).await.unwrap();

        assert!(store.create("u1", "ghost", "esp32").await.is_err());
        assert!(store.list_by_owner("u1").is_empty());
    }

    #[tokio::test]
    async fn test_list_by_owner() {
        let store = DeviceStore::in_memory();
        store.create("u1", "kitchen", "esp32").await.unwrap();
        store.create("u2", "garage", "esp32").await.unwrap();
        store.create("u1", "bedroom", "esp32").await.unwrap();

        let names: Vec<_> = store.list_by_owner("u1").into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["kitchen", "bedroom"]);
        assert!(store.list_by_owner("u3").is_empty());
    }

    #[tokio::test]
    async fn test_update_components_and_lookup() {
        let store = DeviceStore::in_memory();
        let device = store.create("u1", "desk", "esp32").await.unwrap().unwrap();

        let layout: Vec<DeviceComponent> = serde_json::from_value(serde_json::json!([
            {"name": "led", "label": "Desk lamp", "component": "switch", "rowSpan": 1, "colSpan": 2, "status": 0}
        ])).unwrap();
        let updated = store.update_components(&device.id, layout).await.unwrap().unwrap();
        assert_eq!(updated.components[0].col_span, Some(2));

        let found = store.find_by_id(&device.id).await.unwrap().unwrap();
        assert_eq!(found.components, updated.components);
        assert!(store.update_components("missing", Vec::new()).await.unwrap().is_none());
        assert!(store.find_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_devices_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devices.json");

        let id = {
            let store = DeviceStore::open(&path).await.unwrap();
            store.create("u1", "porch", "esp32").await.unwrap().unwrap().id
        };

        let store = DeviceStore::open(&path).await.unwrap();
        assert_eq!(store.get(&id).unwrap().name, "porch");
    }
}
