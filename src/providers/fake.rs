use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use super::{CiClient, Job, Pipeline};
use crate::error::{RetrierError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    GetPipeline(u64),
    ListJobs(u64),
    RetryJob(u64),
}

/// In-memory `CiClient` that records every call it receives.
///
/// Unknown pipelines answer `PipelineNotFound`; pipelines without
/// registered jobs have none.
#[derive(Default)]
pub struct FakeCiClient {
    pipelines: HashMap<u64, Pipeline>,
    jobs: HashMap<u64, Vec<Job>>,
    failing_job_lists: HashSet<u64>,
    failing_retries: HashSet<u64>,
    panicking_pipelines: HashSet<u64>,
    calls: Mutex<Vec<Call>>,
}

pub fn job(id: u64, name: &str, status: &str) -> Job {
    Job {
        id,
        name: name.to_string(),
        status: status.to_string(),
        stage: Some("test".to_string()),
    }
}

impl FakeCiClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pipeline(mut self, id: u64, status: &str, jobs: Vec<Job>) -> Self {
        self.pipelines.insert(
            id,
            Pipeline {
                id,
                status: status.to_string(),
                ref_: Some("main".to_string()),
            },
        );
        self.jobs.insert(id, jobs);
        self
    }

    pub fn failing_job_list(mut self, pipeline_id: u64) -> Self {
        self.failing_job_lists.insert(pipeline_id);
        self
    }

    pub fn failing_retry(mut self, job_id: u64) -> Self {
        self.failing_retries.insert(job_id);
        self
    }

    pub fn panicking(mut self, pipeline_id: u64) -> Self {
        self.panicking_pipelines.insert(pipeline_id);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn retried_jobs(&self) -> Vec<u64> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::RetryJob(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl CiClient for FakeCiClient {
    async fn get_pipeline(&self, _project_id: &str, pipeline_id: u64) -> Result<Pipeline> {
        self.record(Call::GetPipeline(pipeline_id));
        if self.panicking_pipelines.contains(&pipeline_id) {
            panic!("fake client exploded on pipeline {pipeline_id}");
        }
        self.pipelines
            .get(&pipeline_id)
            .cloned()
            .ok_or(RetrierError::PipelineNotFound(pipeline_id))
    }

    async fn list_jobs(&self, _project_id: &str, pipeline_id: u64) -> Result<Vec<Job>> {
        self.record(Call::ListJobs(pipeline_id));
        if self.failing_job_lists.contains(&pipeline_id) {
            return Err(RetrierError::Api {
                status: 502,
                message: "Bad Gateway".to_string(),
            });
        }
        Ok(self.jobs.get(&pipeline_id).cloned().unwrap_or_default())
    }

    async fn retry_job(&self, _project_id: &str, job_id: u64) -> Result<()> {
        self.record(Call::RetryJob(job_id));
        if self.failing_retries.contains(&job_id) {
            return Err(RetrierError::Api {
                status: 403,
                message: "Job is not retryable".to_string(),
            });
        }
        Ok(())
    }
}
