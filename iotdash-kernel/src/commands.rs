/**
 * COMMAND QUEUE - Commandes en attente par device (FIFO)
 *
 * RÔLE : Le dashboard empile des commandes, le device les récupère toutes en
 * un seul poll. Livraison at-most-once : pas de remise en file si le device
 * n'applique pas la commande.
 *
 * ATOMICITÉ : drain_all prend le verrou de l'entrée du device et remplace la
 * file par une file vide. Un enqueue concurrent tombe entièrement avant
 * (dans le lot retourné) ou après (dans la nouvelle file), jamais entre deux.
 */

use crate::liveness::LivenessTracker;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Command {
    pub name: String,
    pub status: Value,
    /// Horodatage Unix en millisecondes
    pub timestamp: i64,
}

pub struct CommandQueue {
    queues: DashMap<String, Vec<Command>>,
    liveness: Arc<LivenessTracker>,
}

impl CommandQueue {
    pub fn new(liveness: Arc<LivenessTracker>) -> Self {
        Self {
            queues: DashMap::new(),
            liveness,
        }
    }

    pub fn enqueue(&self, device_id: &str, name: &str, status: Value) {
        let command = Command {
            name: name.to_string(),
            status,
            timestamp: now_millis(),
        };
        self.queues.entry(device_id.to_string()).or_default().push(command);
    }

    /// Vide la file du device et retourne son contenu dans l'ordre d'arrivée.
    /// Un poll vaut preuve de connectivité : la liveness est rafraîchie.
    pub fn drain_all(&self, device_id: &str) -> Vec<Command> {
        self.liveness.touch(device_id);

        self.queues
            .get_mut(device_id)
            .map(|mut queue| std::mem::take(&mut *queue))
            .unwrap_or_default()
    }

    pub fn pending(&self, device_id: &str) -> usize {
        self.queues.get(device_id).map(|q| q.len()).unwrap_or(0)
    }

    pub fn pending_total(&self) -> usize {
        self.queues.iter().map(|q| q.len()).sum()
    }
}

fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::Barrier;

    fn queue() -> (Arc<LivenessTracker>, CommandQueue) {
        let liveness = Arc::new(LivenessTracker::default());
        let queue = CommandQueue::new(liveness.clone());
        (liveness, queue)
    }

    #[test]
    fn test_drain_in_fifo_order_then_empty() {
        let (_, queue) = queue();
        queue.enqueue("d1", "led", json!(1));
        queue.enqueue("d1", "fan", json!(0));

        let drained = queue.drain_all("d1");
        let pairs: Vec<_> = drained.iter().map(|c| (c.name.as_str(), c.status.clone())).collect();
        assert_eq!(pairs, vec![("led", json!(1)), ("fan", json!(0))]);
        assert!(drained[0].timestamp <= drained[1].timestamp);

        assert!(queue.drain_all("d1").is_empty());
        assert_eq!(queue.pending("d1"), 0);
    }

    #[test]
    fn test_queues_are_per_device() {
        let (_, queue) = queue();
        queue.enqueue("d1", "led", json!(1));
        queue.enqueue("d2", "relay", json!(0));

        assert_eq!(queue.drain_all("d1").len(), 1);
        assert_eq!(queue.pending("d2"), 1);
        assert_eq!(queue.pending_total(), 1);
    }

    #[test]
    fn test_drain_touches_liveness() {
        let (liveness, queue) = queue();
        assert!(queue.drain_all("fresh").is_empty());
        assert!(liveness.status("fresh").unwrap().is_connected);
    }

    #[test]
    fn test_concurrent_enqueue_and_drain_partition() {
        let (_, queue) = queue();
        const WRITERS: usize = 8;
        const PER_WRITER: usize = 250;

        // writers et drain démarrent ensemble pour entrelacer réellement
        let start = Barrier::new(WRITERS + 1);

        let drained = std::thread::scope(|s| {
            for w in 0..WRITERS {
                let (queue, start) = (&queue, &start);
                s.spawn(move || {
                    start.wait();
                    for i in 0..PER_WRITER {
                        queue.enqueue("d1", &format!("{w}-{i}"), json!(i));
                    }
                });
            }
            let (queue, start) = (&queue, &start);
            s.spawn(move || {
                start.wait();
                let mut drained = Vec::new();
                for _ in 0..64 {
                    drained.extend(queue.drain_all("d1"));
                    std::thread::yield_now();
                }
                drained
            })
            .join()
            .unwrap()
        });
        let remaining = queue.drain_all("d1");

        let mut seen = HashSet::new();
        for command in drained.iter().chain(remaining.iter()) {
            assert!(seen.insert(command.name.clone()), "duplicate {}", command.name);
        }
        assert_eq!(seen.len(), WRITERS * PER_WRITER);

        // drains successifs = préfixes de la file : l'ordre par writer tient
        for batch in [&drained, &remaining] {
            for w in 0..WRITERS {
                let prefix = format!("{w}-");
                let indexes: Vec<usize> = batch
                    .iter()
                    .filter_map(|c| c.name.strip_prefix(&prefix))
                    .map(|i| i.parse().unwrap())
                    .collect();
                assert!(indexes.windows(2).all(|p| p[0] < p[1]));
            }
        }
    }
}
