pub mod gitlab;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;

pub use gitlab::{GitLabClient, Job, Pipeline, STATUS_SUCCESS};

/// The three CI operations the retrier needs.
///
/// `GitLabClient` is the production implementation; tests substitute an
/// in-memory fake.
#[async_trait]
pub trait CiClient: Send + Sync {
    /// Fetch a single pipeline's current state.
    async fn get_pipeline(&self, project_id: &str, pipeline_id: u64) -> Result<Pipeline>;

    /// List every job of a pipeline, in the order the API returns them.
    async fn list_jobs(&self, project_id: &str, pipeline_id: u64) -> Result<Vec<Job>>;

    /// Ask the CI platform to run a job again.
    async fn retry_job(&self, project_id: &str, job_id: u64) -> Result<()>;
}

/// Build the production client for a configuration snapshot.
pub fn connect(config: &Config) -> Result<Arc<dyn CiClient>> {
    let client = GitLabClient::new(&config.gitlab_url, config.token.clone())?;
    Ok(Arc::new(client))
}

#[cfg(test)]
pub mod fake;
