use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;

/// Liveness timestamp for one named agent (the signal tick, the position
/// tick, or the data collector), exposed over `/health` for external
/// monitoring. Cheap to update: a single `Mutex<HashMap>` write per beat.
#[derive(Default)]
pub struct HeartbeatRegistry {
    beats: Mutex<HashMap<String, DateTime<Utc>>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentHeartbeat {
    pub agent: String,
    pub last_beat_at: DateTime<Utc>,
    pub seconds_since: i64,
}

impl HeartbeatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `agent` is alive as of now.
    pub fn beat(&self, agent: &str) {
        self.beats.lock().unwrap().insert(agent.to_string(), Utc::now());
    }

    /// Snapshot of every agent that has ever beaten, most-recently-seen order.
    pub fn snapshot(&self) -> Vec<AgentHeartbeat> {
        let now = Utc::now();
        let mut beats: Vec<AgentHeartbeat> = self
            .beats
            .lock()
            .unwrap()
            .iter()
            .map(|(agent, at)| AgentHeartbeat {
                agent: agent.clone(),
                last_beat_at: *at,
                seconds_since: (now - *at).num_seconds(),
            })
            .collect();
        beats.sort_by(|a, b| a.agent.cmp(&b.agent));
        beats
    }

    /// Whether every name in `expected` has beaten within `max_age_secs`.
    pub fn is_healthy(&self, expected: &[&str], max_age_secs: i64) -> bool {
        let guard = self.beats.lock().unwrap();
        let now = Utc::now();
        expected.iter().all(|name| {
            guard
                .get(*name)
                .is_some_and(|at| (now - *at).num_seconds() <= max_age_secs)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unseen_agent_fails_health_check() {
        let registry = HeartbeatRegistry::new();
        registry.beat("signal_tick");
        assert!(!registry.is_healthy(&["signal_tick", "position_tick"], 60));
    }

    #[test]
    fn recent_beats_pass_health_check() {
        let registry = HeartbeatRegistry::new();
        registry.beat("signal_tick");
        registry.beat("position_tick");
        assert!(registry.is_healthy(&["signal_tick", "position_tick"], 60));
    }

    #[test]
    fn snapshot_is_sorted_by_agent_name() {
        let registry = HeartbeatRegistry::new();
        registry.beat("position_tick");
        registry.beat("data_collector");
        let snapshot = registry.snapshot();
        assert_eq!(snapshot[0].agent, "data_collector");
        assert_eq!(snapshot[1].agent, "position_tick");
    }
}
