/**
 * TELEMETRY CACHE - Dernière valeur connue de chaque composant de device
 *
 * RÔLE : Stocke par (device, composant) le dernier status + payload poussé par
 * le device, ou le status confirmé après application d'une commande.
 * Lu par le dashboard en polling.
 *
 * FONCTIONNEMENT :
 * - Une entrée DashMap par device, verrouillée pendant chaque upsert
 * - Composants gardés dans l'ordre d'insertion (stable pour le dashboard)
 * - Données éphémères : aucune persistance, aucune suppression
 */

use crate::liveness::LivenessTracker;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentState {
    pub name: String,
    pub status: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

pub struct TelemetryCache {
    devices: DashMap<String, Vec<ComponentState>>,
    liveness: Arc<LivenessTracker>,
}

impl TelemetryCache {
    pub fn new(liveness: Arc<LivenessTracker>) -> Self {
        Self {
            devices: DashMap::new(),
            liveness,
        }
    }

    /// Push capteur : remplace status et data du composant, rafraîchit la liveness
    pub fn record_data(&self, device_id: &str, name: &str, status: Value, data: Option<Value>) {
        self.liveness.touch(device_id);

        let mut components = self.devices.entry(device_id.to_string()).or_default();
        match components.iter_mut().find(|c| c.name == name) {
            Some(component) => {
                component.status = status;
                component.data = data;
            }
            None => components.push(ComponentState {
                name: name.to_string(),
                status,
                data,
            }),
        }
    }

    /// Confirmation de commande : ne touche qu'au status, le payload reste intact
    pub fn record_confirmation(&self, device_id: &str, name: &str, status: Value) {
        let mut components = self.devices.entry(device_id.to_string()).or_default();
        match components.iter_mut().find(|c| c.name == name) {
            Some(component) => component.status = status,
            None => components.push(ComponentState {
                name: name.to_string(),
                status,
                data: None,
            }),
        }
    }

    pub fn snapshot(&self, device_id: &str) -> Vec<ComponentState> {
        self.devices
            .get(device_id)
            .map(|components| components.clone())
            .unwrap_or_default()
    }
}
