//! Health probe logic.
//!
//! Performs timeout-bounded HTTP GET probes against a target's health
//! endpoint. A probe has exactly two outcomes from the coordinator's
//! point of view: pass or fail-with-detail.

use std::time::Duration;

use tracing::debug;

use swarmgate_core::{DeploymentTarget, HealthReport};

/// Default probe timeout when none is configured.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Queries a target environment's liveness/readiness endpoint.
#[async_trait::async_trait]
pub trait HealthProbe: Send + Sync {
    /// Probe the target. Never errors; failures fold into `pass = false`.
    async fn check(&self, target: &DeploymentTarget) -> HealthReport;
}

/// HTTP health probe against a fixed instance address.
///
/// The address points at the new-version instance under observation;
/// which address that is belongs to the integration layer, not to the
/// coordinator.
pub struct HttpHealthProbe {
    address: String,
    path: String,
    timeout: Duration,
}

impl HttpHealthProbe {
    pub fn new(address: &str, path: &str) -> Self {
        Self {
            address: address.to_string(),
            path: path.to_string(),
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait::async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn check(&self, target: &DeploymentTarget) -> HealthReport {
        match http_probe(&self.address, &self.path, self.timeout).await {
            Ok(()) => HealthReport::pass(&target.name),
            Err(detail) => HealthReport::fail(&target.name, &detail),
        }
    }
}

/// Perform one HTTP probe. `Ok(())` for a 2xx response, `Err(detail)`
/// for everything else (timeout, connect failure, non-2xx status).
pub async fn http_probe(
    address: &str,
    path: &str,
    timeout: Duration,
) -> Result<(), String> {
    let uri = format!("http://{address}{path}");

    let result = tokio::time::timeout(timeout, async {
        let stream = match tokio::net::TcpStream::connect(address).await {
            Ok(s) => s,
            Err(e) => {
                debug!(error = %e, %uri, "health probe connection failed");
                return Err(format!("connect: {e}"));
            }
        };

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = match hyper::client::conn::http1::handshake(io).await {
            Ok(pair) => pair,
            Err(e) => {
                debug!(error = %e, %uri, "health probe handshake failed");
                return Err(format!("handshake: {e}"));
            }
        };

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = http::Request::builder()
            .method("GET")
            .uri(&uri)
            .header("host", address)
            .header("user-agent", "swarmgate-health/0.1")
            .body(http_body_util::Empty::<bytes::Bytes>::new())
            .unwrap();

        match sender.send_request(req).await {
            Ok(resp) => {
                if resp.status().is_success() {
                    Ok(())
                } else {
                    debug!(status = %resp.status(), %uri, "health probe non-2xx");
                    Err(format!("status {}", resp.status()))
                }
            }
            Err(e) => {
                debug!(error = %e, %uri, "health probe request failed");
                Err(format!("request: {e}"))
            }
        }
    })
    .await;

    match result {
        Ok(probe) => probe,
        Err(_) => {
            debug!(%uri, "health probe timed out");
            Err("timeout".to_string())
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

    #[tokio::test]
    async fn probe_to_closed_port_fails_with_connect_detail() {
        let probe = HttpHealthProbe::new("127.0.0.1:1", "/healthz")
            .with_timeout(Duration::from_millis(500));
        let report = probe.check(&test_target()).await;
        assert!(!report.pass);
        assert!(report.detail.unwrap().starts_with("connect:"));
    }

    #[tokio::test]
    async fn probe_reports_timeout_when_server_hangs() {
        // Listener that accepts but never responds.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        let probe = HttpHealthProbe::new(&addr.to_string(), "/healthz")
            .with_timeout(Duration::from_millis(100));
        let report = probe.check(&test_target()).await;
        assert!(!report.pass);
        assert_eq!(report.detail.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn probe_passes_on_2xx() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            use tokio::io::{AsyncReadExt, AsyncWriteExt};
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await;
            let _ = stream
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\n\r\nok")
                .await;
        });

        let probe = HttpHealthProbe::new(&addr.to_string(), "/healthz")
            .with_timeout(Duration::from_secs(2));
        let report = probe.check(&test_target()).await;
        assert!(report.pass, "detail: {:?}", report.detail);
        assert!(report.detail.is_none());
    }

    #[tokio::test]
    async fn probe_fails_on_5xx() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            use tokio::io::{AsyncReadExt, AsyncWriteExt};
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await;
            let _ = stream
                .write_all(b"HTTP/1.1 503 Service Unavailable\r\ncontent-length: 0\r\n\r\n")
                .await;
        });

        let probe = HttpHealthProbe::new(&addr.to_string(), "/healthz")
            .with_timeout(Duration::from_secs(2));
        let report = probe.check(&test_target()).await;
        assert!(!report.pass);
        assert!(report.detail.unwrap().contains("503"));
    }
}
