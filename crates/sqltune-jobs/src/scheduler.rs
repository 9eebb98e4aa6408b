//! Background benchmark job scheduling
//!
//! Jobs run as spawned tasks against a benchmark target chosen at start
//! time (read replica when healthy, sandbox otherwise). Lifecycle:
//! pending, running, then exactly one terminal state. Cancellation is
//! cooperative; a running job is flagged and finishes at its own pace.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sqltune_core::{
    BenchmarkJob, ConnectionSource, JobStatus, JobStore, JobType, ReplicaCheck, Result,
    TargetKind, TuneError,
};
use uuid::Uuid;

/// Work a benchmark job performs
///
/// Implementations receive the chosen target and a cancellation token;
/// long-running work is expected to poll the token between phases.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, ctx: JobContext) -> Result<serde_json::Value>;
}

/// Everything a runner needs for one job
pub struct JobContext {
    pub job_id: Uuid,
    pub recommendation_id: Uuid,
    pub job_type: JobType,
    pub target_kind: TargetKind,
    pub target: Arc<dyn ConnectionSource>,
    cancel: CancelToken,
}

impl JobContext {
    /// True once the job has been asked to stop
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[derive(Clone)]
struct CancelToken {
    job_id: Uuid,
    flags: Arc<parking_lot::Mutex<HashSet<Uuid>>>,
}

impl CancelToken {
    fn is_cancelled(&self) -> bool {
        self.flags.lock().contains(&self.job_id)
    }
}

/// Schedules benchmark jobs and tracks their lifecycle
pub struct JobScheduler {
    jobs: Arc<dyn JobStore>,
    replica: Arc<dyn ReplicaCheck>,
    cancel_flags: Arc<parking_lot::Mutex<HashSet<Uuid>>>,
}

impl JobScheduler {
    pub fn new(jobs: Arc<dyn JobStore>, replica: Arc<dyn ReplicaCheck>) -> Self {
        Self {
            jobs,
            replica,
            cancel_flags: Arc::new(parking_lot::Mutex::new(HashSet::new())),
        }
    }

    /// Create a pending job and spawn its work
    ///
    /// Returns the pending snapshot immediately; progress is observable
    /// through [`JobScheduler::get_job`]. `prefer_replica` picks the read
    /// replica as benchmark target when it is healthy.
    #[tracing::instrument(skip(self, runner), fields(recommendation_id = %recommendation_id))]
    pub async fn submit(
        &self,
        recommendation_id: Uuid,
        job_type: JobType,
        runner: Arc<dyn JobRunner>,
        prefer_replica: bool,
    ) -> Result<BenchmarkJob> {
        let job = BenchmarkJob::new(recommendation_id, job_type);
        self.jobs.create(&job).await?;
        tracing::info!(job_id = %job.id, ?job_type, "job submitted");

        let jobs = self.jobs.clone();
        let replica = self.replica.clone();
        let flags = self.cancel_flags.clone();
        let snapshot = job.clone();
        tokio::spawn(async move {
            run_job(jobs, replica, flags, snapshot, runner, prefer_replica).await;
        });

        Ok(job)
    }

    /// Ask a job to stop
    ///
    /// A pending job is cancelled outright. A running job is only
    /// flagged; the runner observes the flag and the job lands in
    /// `cancelled` when it yields. Terminal jobs cannot be cancelled.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_job(&self, job_id: Uuid) -> Result<BenchmarkJob> {
        let mut job = self
            .jobs
            .get(job_id)
            .await?
            .ok_or_else(|| TuneError::NotFound(format!("job {job_id}")))?;
        if job.status.is_terminal() {
            return Err(TuneError::InvalidState(format!(
                "job {job_id} is already {:?}",
                job.status
            )));
        }

        self.cancel_flags.lock().insert(job_id);
        if job.status == JobStatus::Pending {
            job.status = JobStatus::Cancelled;
            job.completed_at = Some(Utc::now());
            self.jobs.update(&job).await?;
            tracing::info!(job_id = %job_id, "pending job cancelled");
        } else {
            tracing::info!(job_id = %job_id, "running job flagged for cancellation");
        }
        Ok(job)
    }

    pub async fn get_job(&self, job_id: Uuid) -> Result<Option<BenchmarkJob>> {
        self.jobs.get(job_id).await
    }
}

async fn run_job(
    jobs: Arc<dyn JobStore>,
    replica: Arc<dyn ReplicaCheck>,
    flags: Arc<parking_lot::Mutex<HashSet<Uuid>>>,
    mut job: BenchmarkJob,
    runner: Arc<dyn JobRunner>,
    prefer_replica: bool,
) {
    // submit and cancel can race; trust the store over the snapshot
    match jobs.get(job.id).await {
        Ok(Some(current)) if !current.status.is_terminal() => job = current,
        Ok(_) => return,
        Err(e) => {
            tracing::warn!(job_id = %job.id, error = %e, "job lookup failed, abandoning");
            return;
        }
    }

    job.status = JobStatus::Running;
    job.started_at = Some(Utc::now());
    if let Err(e) = jobs.update(&job).await {
        tracing::warn!(job_id = %job.id, error = %e, "could not mark job running");
        return;
    }

    let (target_kind, target) = match replica.benchmark_target(prefer_replica).await {
        Ok(target) => target,
        Err(e) => {
            finish(&jobs, job, JobStatus::Error, None, Some(e.to_string())).await;
            return;
        }
    };
    tracing::debug!(job_id = %job.id, ?target_kind, "benchmark target selected");

    let ctx = JobContext {
        job_id: job.id,
        recommendation_id: job.recommendation_id,
        job_type: job.job_type,
        target_kind,
        target,
        cancel: CancelToken {
            job_id: job.id,
            flags: flags.clone(),
        },
    };
    let outcome = runner.run(ctx).await;

    let cancelled = flags.lock().remove(&job.id);
    match outcome {
        Ok(output) if !cancelled => {
            let payload = serde_json::json!({
                "target": target_kind,
                "output": output,
            });
            finish(&jobs, job, JobStatus::Completed, Some(payload), None).await;
        }
        // output of cancelled work is partial by definition; drop it
        Ok(_) => finish(&jobs, job, JobStatus::Cancelled, None, None).await,
        Err(e) => {
            // infrastructure failures are distinguished from the work
            // itself reporting a negative result
            let status = if cancelled {
                JobStatus::Cancelled
            } else if e.is_connectivity() {
                JobStatus::Error
            } else {
                JobStatus::Failed
            };
            finish(&jobs, job, status, None, Some(e.to_string())).await;
        }
    }
}

async fn finish(
    jobs: &Arc<dyn JobStore>,
    mut job: BenchmarkJob,
    status: JobStatus,
    result: Option<serde_json::Value>,
    error: Option<String>,
) {
    job.status = status;
    job.result = result;
    job.error = error;
    job.completed_at = Some(Utc::now());
    if let Err(e) = jobs.update(&job).await {
        tracing::warn!(job_id = %job.id, error = %e, "could not record job outcome");
    } else {
        tracing::info!(job_id = %job.id, ?status, "job finished");
    }
}
