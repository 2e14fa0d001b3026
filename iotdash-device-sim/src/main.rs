/**
 * DEVICE SIMULÉ - Se comporte comme un firmware ESP32 face au kernel
 *
 * BOUCLE :
 * 1. POST /api/device-connect jusqu'à acceptation (device enregistré)
 * 2. Toutes les N secondes : push d'une lecture par composant
 * 3. Poll /api/device-commands, application locale de chaque commande
 * 4. Confirmation via /api/component-update
 */

use anyhow::{Context, Result};
use clap::Parser;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};

#[derive(Parser, Debug)]
#[command(name = "iotdash-device-sim", about = "Simulated polling device")]
struct Args {
    /// URL du kernel
    #[arg(long, env = "IOTDASH_SERVER", default_value = "http://127.0.0.1:8000")]
    server: String,

    /// Id du device (retourné par POST /device/add)
    #[arg(long, env = "IOTDASH_DEVICE_ID")]
    device_id: String,

    /// Composants simulés (répétable)
    #[arg(long = "component", default_values = ["temp", "led"])]
    components: Vec<String>,

    #[arg(long, default_value_t = 5)]
    interval_secs: u64,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct DataPush<'a> {
    device_id: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    name: &'a str,
    status: &'a Value,
    data: Value,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Confirmation<'a> {
    device_id: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    name: &'a str,
    status: &'a Value,
}

#[derive(Deserialize, Debug)]
struct PendingCommand {
    name: String,
    status: Value,
    timestamp: i64,
}

#[derive(Deserialize, Debug)]
struct CommandsOut {
    commands: Vec<PendingCommand>,
}

/// État local des composants du device
struct SimulatedDevice {
    components: BTreeMap<String, Value>,
}

impl SimulatedDevice {
    fn new(names: &[String]) -> Self {
        Self {
            components: names.iter().map(|n| (n.clone(), json!(0))).collect(),
        }
    }

    /// Applique une commande ; `false` si le status était déjà celui demandé
    fn apply(&mut self, command: &PendingCommand) -> bool {
        let previous = self.components.insert(command.name.clone(), command.status.clone());
        previous.as_ref() != Some(&command.status)
    }

    /// Lecture capteur pseudo-périodique, déterministe par tick
    fn reading(name: &str, tick: u64) -> Value {
        let phase = name.bytes().map(u64::from).sum::<u64>() % 60;
        let angle = ((tick + phase) as f64) / 10.0;
        let value = ((20.0 + 5.0 * angle.sin()) * 100.0).round() / 100.0;
        json!({ "reading": value, "tick": tick })
    }
}

struct KernelClient {
    http: Client,
    server: String,
    device_id: String,
}

impl KernelClient {
    async fn connect(&self) -> Result<StatusCode> {
        let resp = self.http
            .post(format!("{}/api/device-connect", self.server))
            .json(&json!({ "deviceId": self.device_id, "type": "deviceConnect" }))
            .send()
            .await?;
        Ok(resp.status())
    }

    async fn push(&self, name: &str, status: &Value, data: Value) -> Result<()> {
        let body = DataPush { device_id: &self.device_id, kind: "deviceData", name, status, data };
        self.http
            .post(format!("{}/api/device-data", self.server))
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn poll_commands(&self) -> Result<Vec<PendingCommand>> {
        let out: CommandsOut = self.http
            .get(format!("{}/api/device-commands/{}", self.server, self.device_id))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(out.commands)
    }

    async fn confirm(&self, name: &str, status: &Value) -> Result<()> {
        let body = Confirmation { device_id: &self.device_id, kind: "updateComponent", name, status };
        self.http
            .post(format!("{}/api/component-update", self.server))
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

async fn run_cycle(client: &KernelClient, device: &mut SimulatedDevice, tick: u64) -> Result<()> {
    for (name, status) in &device.components {
        client.push(name, status, SimulatedDevice::reading(name, tick))
            .await
            .with_context(|| format!("push {name}"))?;
    }

    for command in client.poll_commands().await.context("poll commands")? {
        debug!("command {} = {} (queued at {})", command.name, command.status, command.timestamp);
        if device.apply(&command) {
            info!("applied {} -> {}", command.name, command.status);
        }
        client.confirm(&command.name, &command.status)
            .await
            .with_context(|| format!("confirm {}", command.name))?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("iotdash_device_sim=info")),
        )
        .init();

    let args = Args::parse();
    let every = Duration::from_secs(args.interval_secs.max(1));
    let client = KernelClient {
        http: Client::builder().timeout(Duration::from_secs(10)).build()?,
        server: args.server.trim_end_matches('/').to_string(),
        device_id: args.device_id.clone(),
    };
    let mut device = SimulatedDevice::new(&args.components);

    // Connexion : on insiste tant que le kernel ne reconnaît pas le device
    let mut ticker = interval(every);
    loop {
        ticker.tick().await;
        match client.connect().await {
            Ok(StatusCode::OK) => break,
            Ok(StatusCode::NOT_FOUND) => warn!("device {} not registered on {}, retrying", client.device_id, client.server),
            Ok(status) => warn!("connect refused ({status}), retrying"),
            Err(e) => warn!("connect failed: {e:#}"),
        }
    }
    info!("device {} connected to {} ({} components)", client.device_id, client.server, device.components.len());

    let mut tick: u64 = 0;
    loop {
        ticker.tick().await;
        tick += 1;
        // le kernel retentera au prochain cycle : pas de retry local
        if let Err(e) = run_cycle(&client, &mut device, tick).await {
            warn!("cycle {tick} failed: {e:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(name: &str, status: Value) -> PendingCommand {
        PendingCommand { name: name.into(), status, timestamp: 0 }
    }

    #[test]
    fn test_apply_command() {
        let mut device = SimulatedDevice::new(&["led".to_string()]);
        assert!(device.apply(&command("led", json!(1))));
        assert!(!device.apply(&command("led", json!(1))));
        assert_eq!(device.components["led"], json!(1));

        // commande pour un composant inconnu : il est adopté
        assert!(device.apply(&command("fan", json!("on"))));
        assert_eq!(device.components.len(), 2);
    }

    #[test]
    fn test_reading_is_deterministic() {
        assert_eq!(SimulatedDevice::reading("temp", 3), SimulatedDevice::reading("temp", 3));
        assert_eq!(SimulatedDevice::reading("temp", 3)["tick"], json!(3));
    }

    #[test]
    fn test_wire_format() {
        let status = json!(37);
        let push = DataPush { device_id: "x", kind: "deviceData", name: "temp", status: &status, data: json!({}) };
        assert_eq!(
            serde_json::to_value(&push).unwrap(),
            json!({"deviceId": "x", "type": "deviceData", "name": "temp", "status": 37, "data": {}})
        );

        let out: CommandsOut = serde_json::from_value(json!({
            "commands": [{"name": "led", "status": 1, "timestamp": 1700000000000i64}]
        })).unwrap();
        assert_eq!(out.commands[0].name, "led");
    }
}
