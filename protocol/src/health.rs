//! Endpoint health DTOs
//!
//! Response shape of `GET /health`: per-state job and worker counts. Used
//! only as a connectivity diagnostic, never for scheduling decisions.

use serde::{Deserialize, Serialize};

/// Job counts by lifecycle state.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JobCounts {
    #[serde(default)]
    pub completed: u64,
    #[serde(default)]
    pub failed: u64,
    #[serde(default)]
    pub in_progress: u64,
    #[serde(default)]
    pub in_queue: u64,
    #[serde(default)]
    pub retried: u64,
}

/// Worker counts by readiness state.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkerCounts {
    #[serde(default)]
    pub idle: u64,
    #[serde(default)]
    pub initializing: u64,
    #[serde(default)]
    pub ready: u64,
    #[serde(default)]
    pub running: u64,
    #[serde(default)]
    pub throttled: u64,
    #[serde(default)]
    pub unhealthy: u64,
}

/// Response for `GET /health`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthStatus {
    #[serde(default)]
    pub jobs: JobCounts,
    #[serde(default)]
    pub workers: WorkerCounts,
}

impl HealthStatus {
    /// Jobs waiting to be picked up.
    pub fn queue_depth(&self) -> u64 {
        self.jobs.in_queue
    }

    pub fn total_workers(&self) -> u64 {
        self.workers.idle
            + self.workers.initializing
            + self.workers.ready
            + self.workers.running
            + self.workers.throttled
            + self.workers.unhealthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_camel_case_counts() {
        let health: HealthStatus = serde_json::from_str(
            r#"{"jobs":{"completed":12,"inProgress":1,"inQueue":3},
                "workers":{"idle":2,"running":1}}"#,
        )
        .unwrap();
        assert_eq!(health.jobs.completed, 12);
        assert_eq!(health.queue_depth(), 3);
        assert_eq!(health.total_workers(), 3);
    }

    #[test]
    fn missing_sections_default_to_zero() {
        let health: HealthStatus = serde_json::from_str("{}").unwrap();
        assert_eq!(health.queue_depth(), 0);
        assert_eq!(health.total_workers(), 0);
    }
}
