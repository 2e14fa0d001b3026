use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::warn;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct KernelConfig {
    pub http: HttpConf,
    pub storage: StorageConf,
    pub liveness: LivenessConf,
    pub auth: AuthConf,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConf {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConf {
    pub data_dir: PathBuf, // users.json + devices.json
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LivenessConf {
    pub timeout_ms: i64,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AuthConf {
    pub token_ttl_days: i64,
}

impl Default for HttpConf {
    fn default() -> Self {
        Self { host: "0.0.0.0".into(), port: 8000 }
    }
}

impl Default for StorageConf {
    fn default() -> Self {
        Self { data_dir: PathBuf::from("./data") }
    }
}

impl Default for LivenessConf {
    fn default() -> Self {
        Self { timeout_ms: 30_000, sweep_interval_secs: 30 }
    }
}

impl Default for AuthConf {
    fn default() -> Self {
        Self { token_ttl_days: 30 }
    }
}

pub fn parse_config(txt: &str) -> Result<KernelConfig, serde_yaml::Error> {
    if txt.trim().is_empty() {
        return Ok(KernelConfig::default());
    }
    serde_yaml::from_str(txt)
}

pub async fn load_config() -> KernelConfig {
    let path = std::env::var("IOTDASH_KERNEL_CONFIG").unwrap_or_else(|_| "kernel.yaml".into());
    if !Path::new(&path).exists() {
        warn!("[kernel] no {path}, using default config");
        return KernelConfig::default();
    }

    let txt = fs::read_to_string(&path).await.unwrap_or_default();
    parse_config(&txt).unwrap_or_else(|e| {
        warn!("[kernel] invalid config {path}: {e}");
        KernelConfig::default()
    })
}

/// Secret de signature des tokens, jamais dans le fichier de config
pub fn secret_key() -> Option<String> {
    std::env::var("IOTDASH_SECRET_KEY").ok().filter(|s| !s.trim().is_empty())
}
