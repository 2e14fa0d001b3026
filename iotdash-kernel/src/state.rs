use crate::auth::TokenIssuer;
use crate::commands::CommandQueue;
use crate::health::HealthTracker;
use crate::liveness::LivenessTracker;
use crate::registry::{DeviceLookup, DeviceStore};
use crate::telemetry::TelemetryCache;
use crate::users::UserStore;
use std::sync::Arc;

/// Cœur en mémoire : liveness, télémétrie et files de commandes.
/// Construit une fois au démarrage, partagé par handle.
#[derive(Clone)]
pub struct Core {
    pub liveness: Arc<LivenessTracker>,
    pub telemetry: Arc<TelemetryCache>,
    pub commands: Arc<CommandQueue>,
}

impl Core {
    pub fn new(timeout_ms: i64) -> Self {
        let liveness = Arc::new(LivenessTracker::new(timeout_ms));
        Self {
            telemetry: Arc::new(TelemetryCache::new(liveness.clone())),
            commands: Arc::new(CommandQueue::new(liveness.clone())),
            liveness,
        }
    }
}

/// État unique injecté dans le routeur Axum
#[derive(Clone)]
pub struct AppState {
    pub core: Core,
    pub lookup: Arc<dyn DeviceLookup>,
    pub devices: Arc<DeviceStore>,
    pub users: Arc<UserStore>,
    pub tokens: Arc<TokenIssuer>,
    pub health_tracker: HealthTracker,
}

#[cfg(test)]
impl AppState {
    /// Stores en mémoire, registre injecté, bcrypt au coût minimal
    pub fn for_tests(lookup: Arc<dyn DeviceLookup>) -> Self {
        Self {
            core: Core::new(crate::liveness::DEFAULT_TIMEOUT_MS),
            lookup,
            devices: Arc::new(DeviceStore::in_memory()),
            users: Arc::new(UserStore::in_memory().with_cost(4)),
            tokens: Arc::new(TokenIssuer::new("test-secret", 30)),
            health_tracker: HealthTracker::new(),
        }
    }
}
