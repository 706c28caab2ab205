// HTTP progress channel
// POST {base}/{executionId}/progress with the snapshot as JSON body

use async_trait::async_trait;
use scrapeflow_core::error::{AppError, Result};
use scrapeflow_core::port::{ProgressReporter, ProgressSnapshot};
use std::time::Duration;
use tracing::debug;
use url::Url;

pub struct HttpProgressReporter {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpProgressReporter {
    /// Fails with `AppError::Config` when `base_url` is not an absolute http(s) URL
    pub fn new(base_url: impl AsRef<str>, timeout: Duration) -> Result<Self> {
        let raw = base_url.as_ref();
        let base_url = Url::parse(raw)
            .map_err(|e| AppError::Config(format!("Invalid progress URL '{}': {}", raw, e)))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(AppError::Config(format!(
                "Progress URL '{}' must use http or https",
                raw
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, base_url })
    }

    /// `{base}/{executionId}/progress`, with the id percent-encoded as one segment
    fn endpoint(&self, execution_id: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(execution_id).push("progress");
        }
        url
    }
}

#[async_trait]
impl ProgressReporter for HttpProgressReporter {
    async fn report(&self, snapshot: &ProgressSnapshot) -> Result<()> {
        let url = self.endpoint(&snapshot.execution_id);
        let response = self
            .client
            .post(url.clone())
            .json(snapshot)
            .send()
            .await
            .map_err(|e| AppError::Persistence(format!("progress push to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Persistence(format!(
                "progress push to {} returned {}",
                url, status
            )));
        }
        debug!(
            execution_id = %snapshot.execution_id,
            phase = %snapshot.phase,
            percentage = snapshot.progress.percentage,
            "Progress pushed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrapeflow_core::domain::{BatchProgress, MerchantTask};

    fn snapshot() -> ProgressSnapshot {
        ProgressSnapshot {
            execution_id: "exec-7".to_string(),
            phase: "scraping".to_string(),
            progress: BatchProgress::compute(Vec::<MerchantTask>::new().iter(), 0, 1),
            message: None,
            timestamp: 42,
        }
    }

    #[tokio::test]
    async fn test_posts_snapshot_to_execution_endpoint() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/scrapes/exec-7/progress")
            .match_header("content-type", "application/json")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "executionId": "exec-7",
                "phase": "scraping",
                "timestamp": 42
            })))
            .with_status(204)
            .create_async()
            .await;

        let reporter = HttpProgressReporter::new(
            format!("{}/api/scrapes/", server.url()),
            Duration::from_secs(5),
        )
        .unwrap();
        tokio_test::assert_ok!(reporter.report(&snapshot()).await);

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status_is_persistence_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/exec-7/progress")
            .with_status(503)
            .create_async()
            .await;

        let reporter = HttpProgressReporter::new(server.url(), Duration::from_secs(5)).unwrap();
        let err = reporter.report(&snapshot()).await.unwrap_err();
        assert!(matches!(err, AppError::Persistence(_)));
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn test_invalid_base_url_is_config_error() {
        for base in ["not a url", "mailto:ops@example.com", "ftp://example.com/progress"] {
            let result = HttpProgressReporter::new(base, Duration::from_secs(5));
            assert!(matches!(result, Err(AppError::Config(_))), "{}", base);
        }
    }

    #[test]
    fn test_endpoint_joins_segments() {
        let reporter =
            HttpProgressReporter::new("http://localhost:3000/api/scrapes/", Duration::from_secs(5))
                .unwrap();
        assert_eq!(
            reporter.endpoint("exec-7").as_str(),
            "http://localhost:3000/api/scrapes/exec-7/progress"
        );
        assert_eq!(
            reporter.endpoint("a/b c").as_str(),
            "http://localhost:3000/api/scrapes/a%2Fb%20c/progress"
        );

        let bare = HttpProgressReporter::new("http://localhost:3000", Duration::from_secs(5)).unwrap();
        assert_eq!(bare.endpoint("exec-7").as_str(), "http://localhost:3000/exec-7/progress");
    }
}
