use serde::Deserialize;

pub const STATUS_FAILED: &str = "failed";
pub const STATUS_SUCCESS: &str = "success";

/// A GitLab CI/CD pipeline as returned by `GET /projects/:id/pipelines/:pipeline_id`.
///
/// Only read for the duration of one check; never stored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Pipeline {
    /// Numeric pipeline ID
    pub id: u64,
    /// Pipeline status (e.g., "success", "failed", "running")
    pub status: String,
    /// Git reference that triggered the pipeline (e.g., "main")
    #[serde(rename = "ref", default)]
    pub ref_: Option<String>,
}

/// A job within a GitLab CI/CD pipeline.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Job {
    /// Numeric job ID
    pub id: u64,
    /// Job name as defined in .gitlab-ci.yml
    pub name: String,
    /// Job status (e.g., "success", "failed", "canceled", "skipped")
    pub status: String,
    #[serde(default)]
    pub stage: Option<String>,
}

impl Job {
    /// Only jobs in exactly the `failed` state qualify for a retry.
    pub fn is_failed(&self) -> bool {
        self.status == STATUS_FAILED
    }
}
