use crate::commands::CommandQueue;
use crate::liveness::LivenessTracker;
use serde::Serialize;
use std::time::Instant;

#[derive(Debug, Serialize)]
pub struct KernelHealth {
    pub uptime_seconds: u64,
    pub devices_tracked: usize,
    pub devices_connected: usize,
    pub pending_commands: usize,
    pub memory_usage_mb: f32,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self { start_time: Instant::now() }
    }

    pub fn get_health(&self, liveness: &LivenessTracker, commands: &CommandQueue) -> KernelHealth {
        KernelHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            devices_tracked: liveness.tracked(),
            devices_connected: liveness.connected(),
            pending_commands: commands.pending_total(),
            memory_usage_mb: get_memory_usage_mb(),
        }
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn get_memory_usage_mb() -> f32 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            let rss_kb = status
                .lines()
                .find(|line| line.starts_with("VmRSS:"))
                .and_then(|line| line.split_whitespace().nth(1))
                .and_then(|kb| kb.parse::<u64>().ok());
            if let Some(kb) = rss_kb {
                return kb as f32 / 1024.0;
            }
        }
    }

    // pas de /proc : valeur inconnue
    0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_health_counts_core_stores() {
        let liveness = Arc::new(LivenessTracker::default());
        let commands = CommandQueue::new(liveness.clone());
        liveness.touch("a");
        liveness.touch("b");
        commands.enqueue("a", "led", json!(1));
        commands.enqueue("c", "fan", json!(0));

        let health = HealthTracker::new().get_health(&liveness, &commands);
        assert_eq!(health.devices_tracked, 2);
        assert_eq!(health.devices_connected, 2);
        assert_eq!(health.pending_commands, 2);
        assert!(health.memory_usage_mb >= 0.0);
    }
}
