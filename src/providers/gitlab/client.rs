mod core;
mod jobs;
mod pipelines;

use async_trait::async_trait;

use super::types::{Job, Pipeline};
use crate::error::Result;
use crate::providers::CiClient;

pub use self::core::GitLabClient;

#[async_trait]
impl CiClient for GitLabClient {
    async fn get_pipeline(&self, project_id: &str, pipeline_id: u64) -> Result<Pipeline> {
        self.fetch_pipeline(project_id, pipeline_id).await
    }

    async fn list_jobs(&self, project_id: &str, pipeline_id: u64) -> Result<Vec<Job>> {
        self.fetch_pipeline_jobs(project_id, pipeline_id).await
    }

    async fn retry_job(&self, project_id: &str, job_id: u64) -> Result<()> {
        self.retry(project_id, job_id).await
    }
}
