//! In-memory store implementations
//!
//! Default implementations of the persistence collaborator traits, used in
//! tests and in deployments that keep audit state in process. Each store is
//! a mutex-guarded map; the traits stay async so durable backends can be
//! swapped in without touching the engines.

use crate::{
    AppliedChange, BenchmarkJob, ChangeStore, JobStore, Recommendation, RecommendationStore,
    Result, TuneError,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

/// In-memory [`RecommendationStore`]
#[derive(Default)]
pub struct MemoryRecommendationStore {
    records: Mutex<HashMap<Uuid, Recommendation>>,
}

impl MemoryRecommendationStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecommendationStore for MemoryRecommendationStore {
    async fn create(&self, recommendation: &Recommendation) -> Result<()> {
        self.records
            .lock()
            .insert(recommendation.id, recommendation.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Recommendation>> {
        Ok(self.records.lock().get(&id).cloned())
    }
}

/// In-memory [`ChangeStore`]
#[derive(Default)]
pub struct MemoryChangeStore {
    records: Mutex<HashMap<Uuid, AppliedChange>>,
}

impl MemoryChangeStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChangeStore for MemoryChangeStore {
    async fn create(&self, change: &AppliedChange) -> Result<()> {
        self.records
            .lock()
            .insert(change.recommendation_id, change.clone());
        Ok(())
    }

    async fn get(&self, recommendation_id: Uuid) -> Result<Option<AppliedChange>> {
        Ok(self.records.lock().get(&recommendation_id).cloned())
    }

    async fn update(&self, change: &AppliedChange) -> Result<()> {
        let mut records = self.records.lock();
        if !records.contains_key(&change.recommendation_id) {
            return Err(TuneError::NotFound(format!(
                "no change record for recommendation {}",
                change.recommendation_id
            )));
        }
        records.insert(change.recommendation_id, change.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<AppliedChange>> {
        let mut changes: Vec<_> = self.records.lock().values().cloned().collect();
        changes.sort_by_key(|c| c.applied_at);
        Ok(changes)
    }
}

/// In-memory [`JobStore`]
#[derive(Default)]
pub struct MemoryJobStore {
    records: Mutex<HashMap<Uuid, BenchmarkJob>>,
}

impl MemoryJobStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, job: &BenchmarkJob) -> Result<()> {
        self.records.lock().insert(job.id, job.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<BenchmarkJob>> {
        Ok(self.records.lock().get(&id).cloned())
    }

    async fn update(&self, job: &BenchmarkJob) -> Result<()> {
        let mut records = self.records.lock();
        if !records.contains_key(&job.id) {
            return Err(TuneError::NotFound(format!("no job record {}", job.id)));
        }
        records.insert(job.id, job.clone());
        Ok(())
    }
}
