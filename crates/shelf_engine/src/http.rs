//! HTTP transport implementation.

use crate::error::{EngineError, EngineResult};
use crate::transport::RemoteTransport;
use async_trait::async_trait;
use shelf_protocol::{ContentKind, PendingUpdate, PullPage, RecordId, SyncCursor, UpdateMethod};

/// Bearer-authenticated HTTP transport over reqwest.
pub struct HttpTransport {
    base_url: String,
    client: reqwest::Client,
}

impl HttpTransport {
    /// Creates a transport against the given server base URL.
    pub fn new(base_url: impl Into<String>) -> EngineResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| EngineError::transport_fatal(e.to_string()))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Returns the server base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn check_status(response: &reqwest::Response) -> EngineResult<()> {
        match EngineError::from_status(response.status().as_u16()) {
            None => Ok(()),
            Some(error) => Err(error),
        }
    }
}

#[async_trait]
impl RemoteTransport for HttpTransport {
    async fn fetch_page(
        &self,
        bearer: &str,
        after: Option<&SyncCursor>,
    ) -> EngineResult<PullPage> {
        let mut request = self.client.get(self.url("/records")).bearer_auth(bearer);
        if let Some(cursor) = after {
            request = request.query(&[
                ("after_timestamp", cursor.updated_at.to_string()),
                ("after_id", cursor.id.to_string()),
            ]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| EngineError::transport_retryable(e.to_string()))?;
        Self::check_status(&response)?;

        response
            .json::<PullPage>()
            .await
            .map_err(|e| EngineError::Protocol(format!("invalid pull page: {e}")))
    }

    async fn fetch_content(
        &self,
        bearer: &str,
        id: &RecordId,
        kind: ContentKind,
    ) -> EngineResult<Vec<u8>> {
        let response = self
            .client
            .get(self.url(&format!("/records/{id}/{kind}")))
            .bearer_auth(bearer)
            .send()
            .await
            .map_err(|e| EngineError::transport_retryable(e.to_string()))?;
        Self::check_status(&response)?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| EngineError::transport_retryable(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn deliver(&self, bearer: &str, update: &PendingUpdate) -> EngineResult<()> {
        let wire = update.request();
        let url = self.url(&wire.path);

        let request = match wire.method {
            UpdateMethod::Put => self.client.put(url),
            UpdateMethod::Delete => self.client.delete(url),
        };
        let request = request.bearer_auth(bearer);
        let request = match &wire.form {
            Some(fields) => request.form(fields),
            None => request,
        };

        let response = request
            .send()
            .await
            .map_err(|e| EngineError::transport_retryable(e.to_string()))?;
        Self::check_status(&response)?;
        Ok(())
    }
}
