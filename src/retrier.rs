use log::{debug, error, info, log, Level};
use std::sync::Arc;

use crate::error::Result;
use crate::providers::{CiClient, STATUS_SUCCESS};

/// Result of checking one pipeline during one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The pipeline or its job list could not be fetched; no job was examined.
    Abandoned,
    Checked {
        pipeline_status: String,
        failed_jobs: usize,
        retried: usize,
        retry_failed: usize,
    },
}

impl CheckOutcome {
    pub fn saw_failed_jobs(&self) -> bool {
        matches!(self, Self::Checked { failed_jobs, .. } if *failed_jobs > 0)
    }

    /// One-line summary and the level it is logged at.
    pub fn summary(&self, pipeline_id: u64) -> (Level, String) {
        match self {
            Self::Abandoned => (
                Level::Error,
                format!("Pipeline {pipeline_id}: check abandoned"),
            ),
            Self::Checked {
                failed_jobs: 0,
                pipeline_status,
                ..
            } if pipeline_status == STATUS_SUCCESS => (
                Level::Debug,
                format!("Pipeline {pipeline_id}: all jobs successful, no action needed"),
            ),
            Self::Checked {
                failed_jobs: 0,
                pipeline_status,
                ..
            } => (
                Level::Debug,
                format!("Pipeline {pipeline_id}: no failed jobs, current status: {pipeline_status}"),
            ),
            Self::Checked {
                retried,
                retry_failed,
                ..
            } => {
                let mut message = format!("Pipeline {pipeline_id}: retried {retried} failed job(s)");
                if *retry_failed > 0 {
                    message.push_str(&format!(", {retry_failed} could not be retried"));
                }
                (Level::Info, message)
            }
        }
    }
}

/// Checks a single pipeline and retries its failed jobs.
///
/// Bound to one client and project; a configuration reload builds a new
/// retrier instead of mutating this one.
pub struct PipelineRetrier {
    client: Arc<dyn CiClient>,
    project_id: String,
}

impl PipelineRetrier {
    pub fn new(client: Arc<dyn CiClient>, project_id: String) -> Self {
        Self { client, project_id }
    }

    /// Fetch the pipeline and its jobs, retry every job whose status is
    /// exactly `failed`, and log a summary.
    ///
    /// Never fails: fetch errors abandon this pipeline for the current
    /// cycle and retry errors only affect the job concerned.
    pub async fn check_and_retry_pipeline(&self, pipeline_id: u64) -> CheckOutcome {
        match self.check(pipeline_id).await {
            Ok(outcome) => {
                let (level, message) = outcome.summary(pipeline_id);
                log!(level, "{message}");
                outcome
            }
            Err(e) => {
                error!("Failed to check/retry pipeline {pipeline_id}: {e}");
                CheckOutcome::Abandoned
            }
        }
    }

    async fn check(&self, pipeline_id: u64) -> Result<CheckOutcome> {
        debug!("Checking pipeline {pipeline_id}...");

        let pipeline = self
            .client
            .get_pipeline(&self.project_id, pipeline_id)
            .await?;
        debug!(
            "Pipeline {pipeline_id} status: {} (ref: {})",
            pipeline.status,
            pipeline.ref_.as_deref().unwrap_or("unknown")
        );

        let jobs = self.client.list_jobs(&self.project_id, pipeline_id).await?;
        debug!("Found {} jobs in pipeline {pipeline_id}", jobs.len());

        let mut failed_jobs = 0;
        let mut retried = 0;
        let mut retry_failed = 0;

        for job in &jobs {
            debug!(
                "Job {} ({}, stage {}): {}",
                job.id,
                job.name,
                job.stage.as_deref().unwrap_or("-"),
                job.status
            );

            if !job.is_failed() {
                continue;
            }

            failed_jobs += 1;
            info!("Job {} ({}) has failed. Retrying...", job.id, job.name);

            match self.client.retry_job(&self.project_id, job.id).await {
                Ok(()) => {
                    info!("Job {} ({}) has been retried successfully", job.id, job.name);
                    retried += 1;
                }
                Err(e) => {
                    error!("Failed to retry job {} ({}): {e}", job.id, job.name);
                    retry_failed += 1;
                }
            }
        }

        Ok(CheckOutcome::Checked {
            pipeline_status: pipeline.status,
            failed_jobs,
            retried,
            retry_failed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::fake::{job, Call, FakeCiClient};

    fn retrier_for(fake: &Arc<FakeCiClient>) -> PipelineRetrier {
        PipelineRetrier::new(fake.clone(), "42".to_string())
    }

    #[tokio::test]
    async fn test_retries_only_failed_jobs() {
        let fake = Arc::new(FakeCiClient::new().with_pipeline(
            101,
            "failed",
            vec![job(1, "build", "failed"), job(2, "lint", "success")],
        ));

        let outcome = retrier_for(&fake).check_and_retry_pipeline(101).await;

        assert_eq!(fake.retried_jobs(), vec![1]);
        assert_eq!(
            outcome.summary(101).1,
            "Pipeline 101: retried 1 failed job(s)"
        );
        assert!(outcome.saw_failed_jobs());
    }

    #[tokio::test]
    async fn test_no_failed_jobs_reports_current_status() {
        let fake = Arc::new(FakeCiClient::new().with_pipeline(
            102,
            "running",
            vec![job(3, "test", "running")],
        ));

        let outcome = retrier_for(&fake).check_and_retry_pipeline(102).await;

        assert!(fake.retried_jobs().is_empty());
        assert_eq!(
            outcome.summary(102),
            (
                Level::Debug,
                "Pipeline 102: no failed jobs, current status: running".to_string()
            )
        );
    }

    #[tokio::test]
    async fn test_successful_pipeline_needs_no_action() {
        let fake = Arc::new(FakeCiClient::new().with_pipeline(
            5,
            "success",
            vec![job(1, "build", "success"), job(2, "deploy", "skipped")],
        ));

        let outcome = retrier_for(&fake).check_and_retry_pipeline(5).await;

        assert!(fake.retried_jobs().is_empty());
        assert_eq!(
            outcome.summary(5).1,
            "Pipeline 5: all jobs successful, no action needed"
        );
    }

    #[tokio::test]
    async fn test_other_statuses_are_never_retried() {
        let fake = Arc::new(FakeCiClient::new().with_pipeline(
            6,
            "canceled",
            vec![
                job(1, "a", "canceled"),
                job(2, "b", "skipped"),
                job(3, "c", "manual"),
                job(4, "d", "pending"),
            ],
        ));

        let outcome = retrier_for(&fake).check_and_retry_pipeline(6).await;

        assert!(fake.retried_jobs().is_empty());
        assert!(!outcome.saw_failed_jobs());
    }

    #[tokio::test]
    async fn test_pipeline_without_jobs() {
        let fake = Arc::new(FakeCiClient::new().with_pipeline(7, "pending", vec![]));

        let outcome = retrier_for(&fake).check_and_retry_pipeline(7).await;

        assert_eq!(
            outcome,
            CheckOutcome::Checked {
                pipeline_status: "pending".to_string(),
                failed_jobs: 0,
                retried: 0,
                retry_failed: 0,
            }
        );
    }

    #[tokio::test]
    async fn test_fetch_failure_abandons_pipeline() {
        let fake = Arc::new(FakeCiClient::new());

        let outcome = retrier_for(&fake).check_and_retry_pipeline(999).await;

        assert_eq!(outcome, CheckOutcome::Abandoned);
        assert_eq!(fake.calls(), vec![Call::GetPipeline(999)]);
    }

    #[tokio::test]
    async fn test_job_list_failure_abandons_pipeline() {
        let fake = Arc::new(
            FakeCiClient::new()
                .with_pipeline(8, "failed", vec![job(1, "build", "failed")])
                .failing_job_list(8),
        );

        let outcome = retrier_for(&fake).check_and_retry_pipeline(8).await;

        assert_eq!(outcome, CheckOutcome::Abandoned);
        assert!(fake.retried_jobs().is_empty());
    }

    #[tokio::test]
    async fn test_failed_retry_does_not_stop_siblings() {
        let fake = Arc::new(
            FakeCiClient::new()
                .with_pipeline(
                    9,
                    "failed",
                    vec![
                        job(1, "build", "failed"),
                        job(2, "test", "failed"),
                        job(3, "deploy", "failed"),
                    ],
                )
                .failing_retry(1),
        );

        let outcome = retrier_for(&fake).check_and_retry_pipeline(9).await;

        assert_eq!(fake.retried_jobs(), vec![1, 2, 3]);
        assert_eq!(
            outcome,
            CheckOutcome::Checked {
                pipeline_status: "failed".to_string(),
                failed_jobs: 3,
                retried: 2,
                retry_failed: 1,
            }
        );
        assert_eq!(
            outcome.summary(9).1,
            "Pipeline 9: retried 2 failed job(s), 1 could not be retried"
        );
    }

    #[tokio::test]
    async fn test_pipeline_fetched_before_jobs_and_jobs_in_order() {
        let fake = Arc::new(FakeCiClient::new().with_pipeline(
            10,
            "failed",
            vec![job(30, "c", "failed"), job(10, "a", "failed"), job(20, "b", "failed")],
        ));

        retrier_for(&fake).check_and_retry_pipeline(10).await;

        assert_eq!(
            fake.calls(),
            vec![
                Call::GetPipeline(10),
                Call::ListJobs(10),
                Call::RetryJob(30),
                Call::RetryJob(10),
                Call::RetryJob(20),
            ]
        );
    }

    #[tokio::test]
    async fn test_each_cycle_retries_again() {
        let fake = Arc::new(FakeCiClient::new().with_pipeline(
            11,
            "failed",
            vec![job(1, "flaky", "failed")],
        ));
        let retrier = retrier_for(&fake);

        retrier.check_and_retry_pipeline(11).await;
        retrier.check_and_retry_pipeline(11).await;

        assert_eq!(fake.retried_jobs(), vec![1, 1]);
    }
}
