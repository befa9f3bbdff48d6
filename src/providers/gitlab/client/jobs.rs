use log::debug;

use super::core::GitLabClient;
use crate::error::{RetrierError, Result};

impl GitLabClient {
    /// Retry a single job via `POST /projects/:id/jobs/:job_id/retry`.
    ///
    /// # Errors
    ///
    /// GitLab answers with a 403 when a job is not retryable (already
    /// retried, archived, or the token lacks permission); that surfaces as
    /// `RetrierError::Api`.
    pub async fn retry(&self, project_id: &str, job_id: u64) -> Result<()> {
        let url = self
            .project_url(project_id)?
            .join(&format!("jobs/{job_id}/retry"))
            .map_err(|e| RetrierError::Config(format!("Invalid retry URL: {e}")))?;

        let response = self.auth_request(self.client().post(url)).send().await?;
        let response = Self::error_for_status(response).await?;

        debug!("Retry of job {job_id} accepted ({})", response.status());

        Ok(())
    }
}
