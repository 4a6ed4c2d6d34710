//! Session job tracking over the in-memory queue slice

use std::sync::Arc;
use uuid::Uuid;

use flux_studio_protocol::JobKind;

use crate::error::{Result, StudioError};
use crate::store::{LocalJobState, QueueJob, QueueJobPatch, StudioStore};

/// View and lifecycle updates for locally tracked jobs.
///
/// Tracking is best-effort display state for the current session only; it
/// is not reconciled against the engine after the fact.
pub struct QueueService {
    store: Arc<StudioStore>,
}

impl QueueService {
    pub fn new(store: Arc<StudioStore>) -> Self {
        Self { store }
    }

    pub fn list(&self) -> Vec<QueueJob> {
        self.store.queue.snapshot().jobs
    }

    pub fn track(&self, kind: JobKind, label: impl Into<String>) -> Uuid {
        self.store.queue_add(QueueJob::new(kind, label))
    }

    /// The remote id is attached when known; the async wait path only
    /// learns it from the final result.
    pub fn mark_running(&self, id: Uuid, remote_id: Option<&str>) {
        self.store.queue_update(
            id,
            QueueJobPatch {
                state: Some(LocalJobState::Running),
                remote_id: remote_id.map(str::to_string),
                error: None,
            },
        );
    }

    pub fn mark_completed(&self, id: Uuid, remote_id: Option<&str>) {
        self.store.queue_update(
            id,
            QueueJobPatch {
                state: Some(LocalJobState::Completed),
                remote_id: remote_id.map(str::to_string),
                ..Default::default()
            },
        );
    }

    pub fn mark_failed(&self, id: Uuid, error: impl Into<String>) {
        self.store.queue_update(
            id,
            QueueJobPatch {
                state: Some(LocalJobState::Failed),
                error: Some(error.into()),
                ..Default::default()
            },
        );
    }

    pub fn remove(&self, id: Uuid) -> Result<()> {
        if self.store.queue_remove(id) {
            Ok(())
        } else {
            Err(StudioError::not_found(format!("queued job {}", id)))
        }
    }

    /// Drop every finished job, keeping pending and running ones.
    pub fn clear_completed(&self) {
        self.store.queue_clear_completed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> QueueService {
        QueueService::new(Arc::new(StudioStore::in_memory()))
    }

    #[test]
    fn track_starts_pending() {
        let svc = service();
        let id = svc.track(JobKind::Generate, "sunset portrait");
        let jobs = svc.list();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, id);
        assert_eq!(jobs[0].state, LocalJobState::Pending);
        assert!(jobs[0].remote_id.is_none());
    }

    #[test]
    fn lifecycle_marks_propagate() {
        let svc = service();
        let id = svc.track(JobKind::Edit, "retouch");

        svc.mark_running(id, Some("job-77"));
        let job = &svc.list()[0];
        assert_eq!(job.state, LocalJobState::Running);
        assert_eq!(job.remote_id.as_deref(), Some("job-77"));

        svc.mark_failed(id, "worker exception");
        let job = &svc.list()[0];
        assert_eq!(job.state, LocalJobState::Failed);
        assert_eq!(job.error.as_deref(), Some("worker exception"));
    }

    #[test]
    fn clear_completed_keeps_active_jobs() {
        let svc = service();
        let done = svc.track(JobKind::Generate, "a");
        let failed = svc.track(JobKind::Generate, "b");
        let running = svc.track(JobKind::Generate, "c");

        svc.mark_completed(done, None);
        svc.mark_failed(failed, "oom");
        svc.mark_running(running, Some("job-3"));

        svc.clear_completed();
        let jobs = svc.list();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, running);
    }

    #[test]
    fn remove_unknown_is_not_found() {
        let svc = service();
        assert!(svc.remove(Uuid::new_v4()).is_err());
    }
}
