/**
 * LIVENESS TRACKER - État de connexion des devices déduit du polling
 *
 * RÔLE : Un ConnectionState par device, rafraîchi à chaque appel initié par le
 * device (push, connect, poll de commandes) et périmé par un sweep périodique.
 *
 * FONCTIONNEMENT :
 * - touch() : marque connecté + lastSeen = maintenant (insère si absent)
 * - sweep(now) : tout device silencieux depuis > timeout passe déconnecté
 * - Aucune suppression : le registre de devices borne le nombre d'entrées
 *
 * Pas de socket longue durée : la liveness est un signal indicatif basé
 * uniquement sur la récence des requêtes.
 */

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use time::{Duration, OffsetDateTime};
use tracing::{debug, info};

/// Seuil d'inactivité par défaut (ms)
pub const DEFAULT_TIMEOUT_MS: i64 = 30_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionState {
    pub is_connected: bool,
    pub last_seen: OffsetDateTime,
}

pub struct LivenessTracker {
    devices: DashMap<String, ConnectionState>,
    timeout: Duration,
}

impl LivenessTracker {
    pub fn new(timeout_ms: i64) -> Self {
        Self {
            devices: DashMap::new(),
            timeout: Duration::milliseconds(timeout_ms),
        }
    }

    pub fn touch(&self, device_id: &str) {
        self.touch_at(device_id, OffsetDateTime::now_utc());
    }

    /// Variante à horloge injectée de `touch`
    pub fn touch_at(&self, device_id: &str, at: OffsetDateTime) {
        self.devices.insert(
            device_id.to_string(),
            ConnectionState { is_connected: true, last_seen: at },
        );
    }

    pub fn status(&self, device_id: &str) -> Option<ConnectionState> {
        self.devices.get(device_id).map(|entry| *entry)
    }

    /// Marque déconnectés les devices dont `now - lastSeen` dépasse strictement
    /// le seuil. Retourne le nombre de devices qui viennent de passer offline.
    pub fn sweep(&self, now: OffsetDateTime) -> usize {
        let mut went_stale = 0;
        for mut entry in self.devices.iter_mut() {
            let (device_id, state) = entry.pair_mut();
            if state.is_connected && now - state.last_seen > self.timeout {
                state.is_connected = false;
                went_stale += 1;
                debug!("device {} marked disconnected (last seen {})", device_id, state.last_seen);
            }
        }
        went_stale
    }

    pub fn tracked(&self) -> usize {
        self.devices.len()
    }

    pub fn connected(&self) -> usize {
        self.devices.iter().filter(|e| e.is_connected).count()
    }

    /// Démarre le sweep périodique, indépendant du trafic HTTP
    pub fn spawn_sweeper(tracker: Arc<Self>, every: StdDuration) -> tokio::task::JoinHandle<()> {
        info!("[liveness] starting sweeper (every {}s, timeout {}ms)",
              every.as_secs(), tracker.timeout.whole_milliseconds());

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            // le premier tick est immédiat, rien à balayer au démarrage
            interval.tick().await;

            loop {
                interval.tick().await;
                let stale = tracker.sweep(OffsetDateTime::now_utc());
                if stale > 0 {
                    info!("[liveness] {} device(s) went offline ({} tracked)", stale, tracker.tracked());
                }
            }
        })
    }
}

impl Default for LivenessTracker {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_unknown_device_has_no_status() {
        let tracker = LivenessTracker::default();
        assert_eq!(tracker.status("ghost"), None);
    }

    #[test]
    fn test_touch_marks_connected() {
        let tracker = LivenessTracker::default();
        let t0 = datetime!(2024-05-01 12:00:00 UTC);
        tracker.touch_at("esp32", t0);

        let state = tracker.status("esp32").unwrap();
        assert!(state.is_connected);
        assert_eq!(state.last_seen, t0);
    }

    #[test]
    fn test_sweep_boundary() {
        let tracker = LivenessTracker::default();
        let t0 = datetime!(2024-05-01 12:00:00 UTC);
        tracker.touch_at("esp32", t0);

        // exactement 30000ms : pas encore périmé
        assert_eq!(tracker.sweep(t0 + Duration::milliseconds(30_000)), 0);
        assert!(tracker.status("esp32").unwrap().is_connected);

        assert_eq!(tracker.sweep(t0 + Duration::milliseconds(30_001)), 1);
        let state = tracker.status("esp32").unwrap();
        assert!(!state.is_connected);
        assert_eq!(state.last_seen, t0);
        assert_eq!(tracker.tracked(), 1);
    }

    #[test]
    fn test_touch_after_sweep_reconnects() {
        let tracker = LivenessTracker::default();
        let t0 = datetime!(2024-05-01 12:00:00 UTC);
        tracker.touch_at("a", t0);
        tracker.touch_at("b", t0 + Duration::seconds(20));
        tracker.sweep(t0 + Duration::seconds(45));

        assert!(!tracker.status("a").unwrap().is_connected);
        assert!(tracker.status("b").unwrap().is_connected);
        assert_eq!(tracker.connected(), 1);

        tracker.touch_at("a", t0 + Duration::seconds(46));
        assert!(tracker.status("a").unwrap().is_connected);
        assert_eq!(tracker.connected(), 2);
    }

    #[tokio::test]
    async fn test_sweeper_runs_without_traffic() {
        let tracker = Arc::new(LivenessTracker::new(0));
        tracker.touch("a");

        let sweeper = LivenessTracker::spawn_sweeper(tracker.clone(), StdDuration::from_millis(20));
        tokio::time::sleep(StdDuration::from_millis(200)).await;
        sweeper.abort();

        assert!(!tracker.status("a").unwrap().is_connected);
        assert_eq!(tracker.connected(), 0);
    }
}
