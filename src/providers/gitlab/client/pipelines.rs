use log::debug;
use reqwest::StatusCode;

use super::core::{GitLabClient, PAGE_SIZE};
use crate::error::{RetrierError, Result};
use crate::providers::gitlab::types::{Job, Pipeline};

const NEXT_PAGE_HEADER: &str = "x-next-page";

impl GitLabClient {
    /// Fetch a single pipeline.
    ///
    /// # Errors
    ///
    /// Returns `PipelineNotFound` on 404, `Api` on any other non-2xx
    /// status, and `Network` on transport failures.
    pub async fn fetch_pipeline(&self, project_id: &str, pipeline_id: u64) -> Result<Pipeline> {
        let url = self
            .project_url(project_id)?
            .join(&format!("pipelines/{pipeline_id}"))
            .map_err(|e| RetrierError::Config(format!("Invalid pipeline URL: {e}")))?;

        let response = self.auth_request(self.client().get(url)).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(RetrierError::PipelineNotFound(pipeline_id));
        }

        let pipeline = Self::error_for_status(response).await?.json().await?;
        Ok(pipeline)
    }

    /// Fetch every job of a pipeline, following `x-next-page` until the
    /// last page. Jobs keep the order the API returns them in.
    pub async fn fetch_pipeline_jobs(&self, project_id: &str, pipeline_id: u64) -> Result<Vec<Job>> {
        let url = self
            .project_url(project_id)?
            .join(&format!("pipelines/{pipeline_id}/jobs"))
            .map_err(|e| RetrierError::Config(format!("Invalid jobs URL: {e}")))?;

        let mut all_jobs = Vec::new();
        let mut page = 1_u32;

        loop {
            let request = self.client().get(url.clone()).query(&[
                ("per_page", PAGE_SIZE.to_string()),
                ("page", page.to_string()),
            ]);

            let response = self.auth_request(request).send().await?;

            if response.status() == StatusCode::NOT_FOUND {
                return Err(RetrierError::PipelineNotFound(pipeline_id));
            }

            let response = Self::error_for_status(response).await?;

            let next_page = response
                .headers()
                .get(NEXT_PAGE_HEADER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<u32>().ok());

            let jobs: Vec<Job> = response.json().await?;
            debug!(
                "Fetched page {page} of jobs for pipeline {pipeline_id} ({} jobs)",
                jobs.len()
            );
            all_jobs.extend(jobs);

            match next_page {
                // Guard against a server echoing the same page forever
                Some(next) if next > page => page = next,
                _ => break,
            }
        }

        Ok(all_jobs)
    }
}
