use reqwest::{Client, RequestBuilder, Response};
use url::Url;

use crate::auth::Token;
use crate::error::{RetrierError, Result};

pub(super) const PAGE_SIZE: usize = 100;

pub struct GitLabClient {
    client: Client,
    api_url: Url,
    token: Token,
}

impl GitLabClient {
    /// Creates a REST v4 client for the GitLab instance at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the API URL
    /// cannot be derived from `base_url`.
    pub fn new(base_url: &str, token: Token) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("gitlab-retrier/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RetrierError::Config(format!("Failed to create HTTP client: {e}")))?;

        // Without a trailing slash `join` would drop the last path segment
        // of instances hosted under a sub-path
        let base = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };

        let api_url = Url::parse(&base)
            .map_err(|e| RetrierError::Config(format!("Invalid base URL: {e}")))?
            .join("api/v4/")
            .map_err(|e| RetrierError::Config(format!("Invalid API base URL: {e}")))?;

        Ok(Self {
            client,
            api_url,
            token,
        })
    }

    pub(super) fn client(&self) -> &Client {
        &self.client
    }

    pub(super) fn auth_request(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(self.token.as_str())
    }

    /// Construct project base URL
    pub(super) fn project_url(&self, project_id: &str) -> Result<Url> {
        self.api_url
            .join(&format!("projects/{}/", urlencoding::encode(project_id)))
            .map_err(|e| RetrierError::Config(format!("Invalid project URL: {e}")))
    }

    /// Turn a non-2xx response into `RetrierError::Api`, keeping the body as
    /// the message.
    pub(super) async fn error_for_status(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error response".to_string());

        Err(RetrierError::Api {
            status: status.as_u16(),
            message,
        })
    }
}
