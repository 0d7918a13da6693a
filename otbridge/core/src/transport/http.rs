//! reqwest-backed transport

use std::time::Duration;

use async_trait::async_trait;

use super::{HttpMethod, RobotRequest, RobotResponse, RobotTransport};
use crate::error::TransportError;

/// HTTP transport talking to a real robot server
#[derive(Clone)]
pub struct HttpTransport {
    /// HTTP client
    http_client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport whose requests time out after `timeout`
    ///
    /// The timeout bounds a whole request, including the time the robot
    /// spends executing a command sent with `waitUntilComplete`.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Request(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { http_client })
    }

    /// Wrap an existing client
    #[must_use]
    pub fn with_client(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl RobotTransport for HttpTransport {
    fn name(&self) -> &str {
        "http"
    }

    async fn execute(&self, request: RobotRequest) -> Result<RobotResponse, TransportError> {
        let mut builder = match request.method {
            HttpMethod::Post => self.http_client.post(&request.url),
            HttpMethod::Delete => self.http_client.delete(&request.url),
        };

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        tracing::trace!(method = %request.method, url = %request.url, "Sending robot request");

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::InvalidResponse(e.to_string()))?;

        tracing::trace!(status, url = %request.url, "Robot responded");

        Ok(RobotResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_robot_is_transport_error() {
        let transport = HttpTransport::new(Duration::from_millis(500)).unwrap();
        // Port 9 (discard) on loopback is closed on test machines
        let request = super::super::RobotApi::new("127.0.0.1", 9, "3").post(
            "http://127.0.0.1:9/runs",
            None,
        );
        let result = transport.execute(request).await;
        assert!(matches!(
            result,
            Err(TransportError::Request(_) | TransportError::Timeout)
        ));
    }

    #[test]
    fn test_transport_name() {
        let transport = HttpTransport::new(Duration::from_secs(1)).unwrap();
        assert_eq!(transport.name(), "http");
    }

    #[tokio::test]
    async fn test_wrapped_client_is_used() {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_millis(500))
            .build()
            .unwrap();
        let transport = HttpTransport::with_client(http_client);
        assert_eq!(transport.name(), "http");

        let api = super::super::RobotApi::new("127.0.0.1", 9, "3");
        let result = transport.execute(api.delete(api.run_url("run-1"))).await;
        assert!(matches!(
            result,
            Err(TransportError::Request(_) | TransportError::Timeout)
        ));
    }
}
