//! Metric sampler — queries the metrics backend for a target's signals.

use std::time::Duration;

use http_body_util::BodyExt;
use thiserror::Error;
use tracing::debug;

use swarmgate_core::{DeploymentTarget, MetricSample};

/// Default timeout for one metrics query.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors from the metrics backend.
///
/// The coordinator treats any of these as fail-closed: a stage that
/// cannot be observed cannot be trusted.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("metrics backend unavailable: {0}")]
    Unavailable(String),

    #[error("malformed metrics payload: {0}")]
    Malformed(String),
}

/// Polls an external metrics source for a target's error-rate and
/// latency over a trailing window.
#[async_trait::async_trait]
pub trait MetricSampler: Send + Sync {
    async fn sample(
        &self,
        target: &DeploymentTarget,
        window: Duration,
    ) -> Result<MetricSample, MetricsError>;
}

/// Expected JSON body from the metrics endpoint.
#[derive(serde::Deserialize)]
struct MetricsPayload {
    /// Error rate as a fraction (0.0-1.0) over the requested window.
    error_rate: f64,
    /// 95th-percentile latency in milliseconds over the window.
    p95_latency_ms: f64,
}

/// HTTP metric sampler.
///
/// Issues `GET {path}?target={name}&window={secs}` against the metrics
/// backend and expects a JSON body with `error_rate` and
/// `p95_latency_ms` fields. The query language of the real backend is
/// hidden behind this aggregation endpoint.
pub struct HttpMetricSampler {
    address: String,
    path: String,
    timeout: Duration,
}

impl HttpMetricSampler {
    pub fn new(address: &str, path: &str) -> Self {
        Self {
            address: address.to_string(),
            path: path.to_string(),
            timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait::async_trait]
impl MetricSampler for HttpMetricSampler {
    async fn sample(
        &self,
        target: &DeploymentTarget,
        window: Duration,
    ) -> Result<MetricSample, MetricsError> {
        let body = http_query(
            &self.address,
            &format!(
                "{}?target={}&window={}",
                self.path,
                target.name,
                window.as_secs()
            ),
            self.timeout,
        )
        .await?;

        let payload: MetricsPayload = serde_json::from_slice(&body)
            .map_err(|e| MetricsError::Malformed(e.to_string()))?;

        debug!(
            target = %target.name,
            error_rate = payload.error_rate,
            p95_ms = payload.p95_latency_ms,
            "metric sample"
        );
        Ok(MetricSample::new(
            &target.name,
            payload.error_rate,
            payload.p95_latency_ms,
        ))
    }
}

/// One HTTP GET against the metrics backend, returning the raw body.
async fn http_query(
    address: &str,
    path_and_query: &str,
    timeout: Duration,
) -> Result<bytes::Bytes, MetricsError> {
    let uri = format!("http://{address}{path_and_query}");

    let result = tokio::time::timeout(timeout, async {
        let stream = tokio::net::TcpStream::connect(address)
            .await
            .map_err(|e| MetricsError::Unavailable(format!("connect: {e}")))?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| MetricsError::Unavailable(format!("handshake: {e}")))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = http::Request::builder()
            .method("GET")
            .uri(&uri)
            .header("host", address)
            .header("user-agent", "swarmgate-metrics/0.1")
            .body(http_body_util::Empty::<bytes::Bytes>::new())
            .unwrap();

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| MetricsError::Unavailable(format!("request: {e}")))?;

        if !resp.status().is_success() {
            return Err(MetricsError::Unavailable(format!(
                "status {}",
                resp.status()
            )));
        }

        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| MetricsError::Unavailable(format!("body: {e}")))?;
        Ok(body.to_bytes())
    })
    .await;

    match result {
        Ok(inner) => inner,
        Err(_) => {
            debug!(%uri, "metrics query timed out");
            Err(MetricsError::Unavailable("timeout".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarmgate_core::Environment;

    fn test_target() -> DeploymentTarget {
        DeploymentTarget::new("trend-bot", Environment::Staging, "v2", "v1")
    }

    async fn serve_once(response: &'static str) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            use tokio::io::{AsyncReadExt, AsyncWriteExt};
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 2048];
            let _ = stream.read(&mut buf).await;
            let _ = stream.write_all(response.as_bytes()).await;
        });
        addr
    }

    #[tokio::test]
    async fn sample_parses_json_payload() {
        let addr = serve_once(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 44\r\n\r\n{\"error_rate\":0.012,\"p95_latency_ms\":230.5}\n",
        )
        .await;

        let sampler = HttpMetricSampler::new(&addr, "/api/v1/swarm/metrics");
        let sample = sampler
            .sample(&test_target(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(sample.target, "trend-bot");
        assert_eq!(sample.error_rate, 0.012);
        assert_eq!(sample.p95_latency_ms, 230.5);
    }

    #[tokio::test]
    async fn unreachable_backend_is_unavailable() {
        let sampler = HttpMetricSampler::new("127.0.0.1:1", "/metrics")
            .with_timeout(Duration::from_millis(500));
        let err = sampler
            .sample(&test_target(), Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(err, MetricsError::Unavailable(_)));
    }

    #[tokio::test]
    async fn non_2xx_is_unavailable() {
        let addr =
            serve_once("HTTP/1.1 500 Internal Server Error\r\ncontent-length: 0\r\n\r\n").await;
        let sampler = HttpMetricSampler::new(&addr, "/metrics");
        let err = sampler
            .sample(&test_target(), Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(err, MetricsError::Unavailable(_)));
    }

    #[tokio::test]
    async fn garbage_body_is_malformed() {
        let addr = serve_once("HTTP/1.1 200 OK\r\ncontent-length: 9\r\n\r\nnot json!").await;
        let sampler = HttpMetricSampler::new(&addr, "/metrics");
        let err = sampler
            .sample(&test_target(), Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(err, MetricsError::Malformed(_)));
    }
}
