//! Blocking HTTP gateway.
//!
//! Sources never hold a `reqwest` client directly; they build an `HttpRequest`
//! and hand it to an `HttpGateway`. That keeps every source testable with canned
//! bodies and gives one place to set the timeout.

use reqwest::blocking::Client;

use crate::config::HttpConfig;
use crate::error::{AppError, GatewayError};

/// A GET request: URL, query parameters and extra headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
        }
    }

    pub fn query(mut self, name: &str, value: impl Into<String>) -> Self {
        self.query.push((name.to_string(), value.into()));
        self
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    /// URL with the query string appended (used for logging and test routing).
    pub fn display_url(&self) -> String {
        if self.query.is_empty() {
            return self.url.clone();
        }
        let query: Vec<String> = self.query.iter().map(|(k, v)| format!("{k}={v}")).collect();
        format!("{}?{}", self.url, query.join("&"))
    }
}

/// "Give me the raw response body for this URL."
pub trait HttpGateway: Send + Sync {
    fn get_text(&self, request: &HttpRequest) -> Result<String, GatewayError>;
}

/// Headers that make a request look like a desktop browser.
///
/// Portal pages reject the default client signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserProfile {
    pub user_agent: String,
    pub accept_language: String,
}

impl BrowserProfile {
    pub fn from_config(config: &HttpConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            accept_language: config.accept_language.clone(),
        }
    }

    pub fn apply(&self, request: HttpRequest) -> HttpRequest {
        request
            .header("User-Agent", self.user_agent.clone())
            .header("Accept-Language", self.accept_language.clone())
    }
}

pub struct ReqwestGateway {
    client: Client,
}

impl ReqwestGateway {
    pub fn new(config: &HttpConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| AppError::config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl HttpGateway for ReqwestGateway {
    fn get_text(&self, request: &HttpRequest) -> Result<String, GatewayError> {
        let mut req = self.client.get(&request.url).query(&request.query);
        for (name, value) in &request.headers {
            req = req.header(name.as_str(), value.as_str());
        }

        let url = request.url.clone();
        let resp = req.send().map_err(|e| {
            if e.is_timeout() {
                GatewayError::Timeout { url: url.clone() }
            } else {
                GatewayError::Transport {
                    url: url.clone(),
                    message: e.to_string(),
                }
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(GatewayError::Status {
                url,
                status: status.as_u16(),
            });
        }

        resp.text().map_err(|e| GatewayError::Transport {
            url,
            message: format!("failed to read body: {e}"),
        })
    }
}
