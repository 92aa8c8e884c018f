use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument};

use super::ExternalError;

/// Blob storage holding uploaded materials.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Remove the blob at `file_ref`. Removing an absent blob succeeds.
    async fn remove(&self, file_ref: &str) -> Result<(), ExternalError>;
}

/// Storage API client: `DELETE {base}/object/{bucket}` with a prefix list.
#[derive(Debug, Clone)]
pub struct HttpObjectStorage {
    http_client: Client,
    base_url: String,
    bucket: String,
    api_key: Option<String>,
}

impl HttpObjectStorage {
    pub fn new(base_url: impl Into<String>, bucket: impl Into<String>, api_key: Option<String>) -> Result<Self, ExternalError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ExternalError::Configuration(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bucket: bucket.into(),
            api_key,
        })
    }
}

#[async_trait]
impl ObjectStorage for HttpObjectStorage {
    #[instrument(skip(self), fields(bucket = %self.bucket), err)]
    async fn remove(&self, file_ref: &str) -> Result<(), ExternalError> {
        let url = format!("{}/object/{}", self.base_url, self.bucket);

        let mut request = self
            .http_client
            .delete(&url)
            .json(&serde_json::json!({ "prefixes": [file_ref] }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key).header("apikey", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ExternalError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExternalError::Api {
                status: status.as_u16(),
                body,
            });
        }

        debug!(file_ref, "blob removed");
        Ok(())
    }
}

/// Removals kept by [`InMemoryObjectStorage`]; older entries are dropped.
pub const REMOVAL_LOG_CAPACITY: usize = 256;

/// Records removals instead of performing them.
#[derive(Debug, Default)]
pub struct InMemoryObjectStorage {
    removed: Mutex<VecDeque<String>>,
    fail_with: Mutex<Option<ExternalError>>,
}

impl InMemoryObjectStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent removals, oldest first.
    pub fn removed(&self) -> Vec<String> {
        match self.removed.lock() {
            Ok(r) => r.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        }
    }

    /// Make every following call fail with `error` (`None` to recover).
    pub fn fail_with(&self, error: Option<ExternalError>) {
        match self.fail_with.lock() {
            Ok(mut slot) => *slot = error,
            Err(poisoned) => *poisoned.into_inner() = error,
        }
    }
}

#[async_trait]
impl ObjectStorage for InMemoryObjectStorage {
    async fn remove(&self, file_ref: &str) -> Result<(), ExternalError> {
        let failure = match self.fail_with.lock() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        if let Some(err) = failure {
            return Err(err);
        }

        let mut removed = match self.removed.lock() {
            Ok(r) => r,
            Err(poisoned) => poisoned.into_inner(),
        };
        if removed.len() == REMOVAL_LOG_CAPACITY {
            removed.pop_front();
        }
        removed.push_back(file_ref.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_records_removals_and_can_fail() {
        let storage = InMemoryObjectStorage::new();
        storage.remove("2025-06-05T08:55:05_Concurrency").await.unwrap();
        assert_eq!(storage.removed(), vec!["2025-06-05T08:55:05_Concurrency".to_string()]);

        storage.fail_with(Some(ExternalError::Network("down".into())));
        assert!(storage.remove("other").await.is_err());
        assert_eq!(storage.removed().len(), 1);
    }

    #[tokio::test]
    async fn removal_log_keeps_only_the_latest_entries() {
        let storage = InMemoryObjectStorage::new();
        for i in 0..REMOVAL_LOG_CAPACITY + 10 {
            storage.remove(&format!("blob-{i}")).await.unwrap();
        }

        let removed = storage.removed();
        assert_eq!(removed.len(), REMOVAL_LOG_CAPACITY);
        assert_eq!(removed[0], "blob-10");
        assert_eq!(removed.last().map(String::as_str), Some(format!("blob-{}", REMOVAL_LOG_CAPACITY + 9).as_str()));
    }

    #[test]
    fn http_storage_normalizes_base_url() {
        let storage = HttpObjectStorage::new("http://storage.local/", "materials", None).unwrap();
        assert_eq!(storage.base_url, "http://storage.local");
    }
}
