//! In-process job store.
//!
//! [`MemoryDatabase`] implements the [`Database`] collaborator over a
//! `tokio::sync::RwLock<HashMap>`. It backs the worker binary and tests;
//! a durable store plugs in behind the same trait.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use voxline_core::error::CoreError;
use voxline_core::job::Job;
use voxline_core::job_status::JobStatus;
use voxline_core::services::Database;
use voxline_core::types::JobId;

/// Default page size when a caller passes `limit = 0`.
pub const DEFAULT_LIST_LIMIT: usize = 50;

/// Upper bound on a single page.
pub const MAX_LIST_LIMIT: usize = 500;

/// Job store held entirely in memory.
#[derive(Default)]
pub struct MemoryDatabase {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored jobs.
    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn save_job(&self, job: &Job) -> Result<(), CoreError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id()) {
            return Err(CoreError::Conflict(format!("Job {} already saved", job.id())));
        }
        jobs.insert(job.id(), job.clone());
        tracing::debug!(job_id = %job.id(), "Job saved");
        Ok(())
    }

    async fn get_job(&self, id: JobId) -> Result<Job, CoreError> {
        self.jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("job", id))
    }

    async fn update_job(&self, job: &Job) -> Result<(), CoreError> {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&job.id()) {
            Some(stored) => {
                *stored = job.clone();
                Ok(())
            }
            None => Err(CoreError::not_found("job", job.id())),
        }
    }

    async fn delete_job(&self, id: JobId) -> Result<(), CoreError> {
        self.jobs
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| CoreError::not_found("job", id))
    }

    async fn list_jobs(
        &self,
        status: Option<JobStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Job>, CoreError> {
        let limit = match limit {
            0 => DEFAULT_LIST_LIMIT,
            n => n.min(MAX_LIST_LIMIT),
        };

        let jobs = self.jobs.read().await;
        let mut matching: Vec<&Job> = jobs
            .values()
            .filter(|job| status.map_or(true, |s| job.status() == s))
            .collect();
        matching.sort_by_key(|job| (job.created_at(), job.id()));

        Ok(matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn job(text: &str) -> Job {
        Job::narration("", format!("/out/{text}.wav"), text, "v1")
    }

    #[tokio::test]
    async fn save_and_get() {
        let db = MemoryDatabase::new();
        let job = job("a");
        db.save_job(&job).await.unwrap();

        let loaded = db.get_job(job.id()).await.unwrap();
        assert_eq!(loaded, job);
        assert_eq!(db.len().await, 1);
    }

    #[tokio::test]
    async fn duplicate_save_conflicts() {
        let db = MemoryDatabase::new();
        let job = job("a");
        db.save_job(&job).await.unwrap();
        assert_matches!(db.save_job(&job).await, Err(CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn missing_job_not_found() {
        let db = MemoryDatabase::new();
        assert_matches!(
            db.get_job(JobId::new_v4()).await,
            Err(CoreError::NotFound { entity: "job", .. })
        );
        assert_matches!(
            db.update_job(&job("x")).await,
            Err(CoreError::NotFound { .. })
        );
        assert_matches!(
            db.delete_job(JobId::new_v4()).await,
            Err(CoreError::NotFound { .. })
        );
    }

    #[tokio::test]
    async fn update_replaces_record() {
        let db = MemoryDatabase::new();
        let mut job = job("a");
        db.save_job(&job).await.unwrap();

        job.start().unwrap();
        db.update_job(&job).await.unwrap();
        assert_eq!(db.get_job(job.id()).await.unwrap().status(), JobStatus::Running);
    }

    #[tokio::test]
    async fn delete_removes_record() {
        let db = MemoryDatabase::new();
        let job = job("a");
        db.save_job(&job).await.unwrap();
        db.delete_job(job.id()).await.unwrap();
        assert!(db.is_empty().await);
    }

    #[tokio::test]
    async fn list_filters_orders_and_pages() {
        let db = MemoryDatabase::new();
        let mut ids = Vec::new();
        for name in ["a", "b", "c", "d"] {
            let mut job = job(name);
            if name == "b" {
                job.cancel().unwrap();
            }
            ids.push(job.id());
            db.save_job(&job).await.unwrap();
        }

        let pending = db.list_jobs(Some(JobStatus::Pending), 10, 0).await.unwrap();
        assert_eq!(pending.len(), 3);
        assert!(pending.windows(2).all(|w| w[0].created_at() <= w[1].created_at()));

        let page = db.list_jobs(None, 2, 1).await.unwrap();
        assert_eq!(page.len(), 2);

        let canceled = db.list_jobs(Some(JobStatus::Canceled), 0, 0).await.unwrap();
        assert_eq!(canceled.len(), 1);
        assert_eq!(canceled[0].id(), ids[1]);
    }
}
