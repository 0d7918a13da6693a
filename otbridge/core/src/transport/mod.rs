//! Robot HTTP Transport
//!
//! The seam between the session core and the network. The core builds
//! [`RobotRequest`] values and hands them to a [`RobotTransport`]; the
//! transport returns the raw status and body without interpreting them.
//!
//! # Implementations
//!
//! - [`HttpTransport`]: reqwest client talking to a real robot
//! - [`ScriptedTransport`]: replays queued responses and records every
//!   request (tests, dry runs)
//!
//! # Endpoints
//!
//! [`RobotApi`] owns the base URL and the protocol-version header. It is
//! built once per client from the configuration and never mutated.

mod http;
mod scripted;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::ClientConfig;
use crate::error::TransportError;

pub use http::HttpTransport;
pub use scripted::ScriptedTransport;

/// Header carrying the robot HTTP API version
pub const PROTOCOL_VERSION_HEADER: &str = "opentrons-version";

/// HTTP method used by the robot API
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HttpMethod {
    /// POST
    Post,
    /// DELETE
    Delete,
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Post => write!(f, "POST"),
            Self::Delete => write!(f, "DELETE"),
        }
    }
}

/// A request ready to be sent
#[derive(Clone, Debug, PartialEq)]
pub struct RobotRequest {
    /// HTTP method
    pub method: HttpMethod,
    /// Absolute URL without query string
    pub url: String,
    /// Query parameters
    pub query: Vec<(String, String)>,
    /// Request headers
    pub headers: Vec<(String, String)>,
    /// JSON body, if any
    pub body: Option<Value>,
}

impl RobotRequest {
    /// Add a query parameter
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Value of a header, if present
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Value of a query parameter, if present
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Raw response from the robot
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RobotResponse {
    /// HTTP status code
    pub status: u16,
    /// Raw body text
    pub body: String,
}

impl RobotResponse {
    /// Create a response
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Create a response with a JSON body
    #[must_use]
    pub fn json(status: u16, body: &Value) -> Self {
        Self::new(status, body.to_string())
    }

    /// Parse the body as JSON
    #[must_use]
    pub fn parse_json(&self) -> Option<Value> {
        serde_json::from_str(&self.body).ok()
    }
}

/// Transport for robot API requests
///
/// Implementations send the request and report what came back. They must not
/// retry and must not treat any status code as an error.
#[async_trait]
pub trait RobotTransport: Send + Sync {
    /// Transport name for logs (e.g. "http", "scripted")
    fn name(&self) -> &str;

    /// Send a request and wait for the full response
    async fn execute(&self, request: RobotRequest) -> Result<RobotResponse, TransportError>;
}

#[async_trait]
impl<T: RobotTransport + ?Sized> RobotTransport for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn execute(&self, request: RobotRequest) -> Result<RobotResponse, TransportError> {
        (**self).execute(request).await
    }
}

/// Endpoint and header factory for one robot
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RobotApi {
    base_url: String,
    protocol_version: String,
}

impl RobotApi {
    /// Create for `http://{address}:{port}`
    pub fn new(address: &str, port: u16, protocol_version: impl Into<String>) -> Self {
        Self {
            base_url: format!("http://{address}:{port}"),
            protocol_version: protocol_version.into(),
        }
    }

    /// Create from client configuration
    #[must_use]
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(&config.robot_address, config.port, config.protocol_version.clone())
    }

    /// Base URL
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Protocol version sent with every request
    #[must_use]
    pub fn protocol_version(&self) -> &str {
        &self.protocol_version
    }

    /// `/runs`
    #[must_use]
    pub fn runs_url(&self) -> String {
        format!("{}/runs", self.base_url)
    }

    /// `/runs/{id}`
    #[must_use]
    pub fn run_url(&self, run_id: &str) -> String {
        format!("{}/{run_id}", self.runs_url())
    }

    /// `/runs/{id}/commands`
    #[must_use]
    pub fn commands_url(&self, run_id: &str) -> String {
        format!("{}/commands", self.run_url(run_id))
    }

    /// `/runs/{id}/labware_definitions`
    #[must_use]
    pub fn labware_definitions_url(&self, run_id: &str) -> String {
        format!("{}/labware_definitions", self.run_url(run_id))
    }

    /// `/robot/home`
    #[must_use]
    pub fn home_url(&self) -> String {
        format!("{}/robot/home", self.base_url)
    }

    /// POST request with the protocol header
    #[must_use]
    pub fn post(&self, url: impl Into<String>, body: Option<Value>) -> RobotRequest {
        self.request(HttpMethod::Post, url.into(), body)
    }

    /// DELETE request with the protocol header
    #[must_use]
    pub fn delete(&self, url: impl Into<String>) -> RobotRequest {
        self.request(HttpMethod::Delete, url.into(), None)
    }

    fn request(&self, method: HttpMethod, url: String, body: Option<Value>) -> RobotRequest {
        RobotRequest {
            method,
            url,
            query: Vec::new(),
            headers: vec![(
                PROTOCOL_VERSION_HEADER.to_string(),
                self.protocol_version.clone(),
            )],
            body,
        }
    }
}
