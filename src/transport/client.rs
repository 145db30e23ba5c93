//! Engine REST API Client
//!
//! HTTP client for the engine's `/rest/sql` endpoint.

use super::error::TransportError;
use super::response::{EngineResponse, TabularData};
use super::Transport;
use async_trait::async_trait;
use base64::prelude::*;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Client, Url};
use serde::Deserialize;
use std::time::Duration;

/// How the transport authenticates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// `Authorization: Basic base64(user:password)` on every request
    Basic,
    /// One login exchange, then `Authorization: Taosd <token>`
    Token,
}

impl AuthMode {
    fn scheme(&self) -> &'static str {
        match self {
            AuthMode::Basic => "Basic",
            AuthMode::Token => "Taosd",
        }
    }
}

/// Configuration for the engine transport
#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    /// Base URL of the REST endpoint (e.g., "http://localhost:6041")
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_auth")]
    pub auth: AuthMode,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default = "default_password")]
    pub password: String,
    /// Per-request deadline in milliseconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

fn default_url() -> String {
    "http://localhost:6041".to_string()
}

fn default_auth() -> AuthMode {
    AuthMode::Basic
}

fn default_username() -> String {
    "root".to_string()
}

fn default_password() -> String {
    "taosdata".to_string()
}

fn default_request_timeout() -> u64 {
    5000
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            auth: default_auth(),
            username: default_username(),
            password: default_password(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

impl TransportConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Builder: set credentials and auth mode
    pub fn credentials(
        mut self,
        auth: AuthMode,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.auth = auth;
        self.username = username.into();
        self.password = password.into();
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// reqwest-backed transport
///
/// Cloning is cheap and clones share the connection pool.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    sql_url: Url,
    authorization: HeaderValue,
}

impl HttpTransport {
    /// Build the transport, logging in first when token auth is configured
    ///
    /// A failed login fails construction; there is no lazy re-login.
    pub async fn connect(config: TransportConfig) -> Result<Self, TransportError> {
        let base = config.url.trim_end_matches('/');
        let sql_url = Url::parse(&format!("{}/rest/sql", base))
            .map_err(|e| TransportError::Config(format!("{}: {}", config.url, e)))?;

        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(TransportError::Connection)?;

        let credential = match config.auth {
            AuthMode::Basic => {
                BASE64_STANDARD.encode(format!("{}:{}", config.username, config.password))
            }
            AuthMode::Token => Self::login(&client, base, &config).await?,
        };

        let authorization =
            HeaderValue::from_str(&format!("{} {}", config.auth.scheme(), credential))
                .map_err(|e| TransportError::Config(format!("authorization header: {}", e)))?;

        Ok(Self {
            client,
            sql_url,
            authorization,
        })
    }

    /// Trade credentials for a bearer token
    async fn login(
        client: &Client,
        base: &str,
        config: &TransportConfig,
    ) -> Result<String, TransportError> {
        let url = format!(
            "{}/rest/login/{}/{}",
            base,
            urlencoding::encode(&config.username),
            urlencoding::encode(&config.password)
        );

        let response = client.get(&url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(TransportError::Authentication(format!(
                "login returned {}: {}",
                status.as_u16(),
                body
            )));
        }

        let resp: EngineResponse = serde_json::from_str(&body)
            .map_err(|e| TransportError::Authentication(format!("undecodable login body: {}", e)))?;

        if !resp.is_success() || resp.desc.is_empty() {
            return Err(TransportError::Authentication(format!(
                "login rejected (code {}): {}",
                resp.code, resp.desc
            )));
        }

        tracing::info!(user = %config.username, "Obtained engine token");
        Ok(resp.desc)
    }

    /// Endpoint statements are posted to
    pub fn sql_url(&self) -> &Url {
        &self.sql_url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, statement: &str) -> Result<TabularData, TransportError> {
        tracing::debug!(statement, "Executing statement");

        let response = self
            .client
            .post(self.sql_url.clone())
            .header(AUTHORIZATION, self.authorization.clone())
            .body(statement.to_string())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        // Engines report logical failures with a JSON body even on 4xx/5xx
        match serde_json::from_str::<EngineResponse>(&body) {
            Ok(resp) if !resp.is_success() => Err(TransportError::Engine {
                code: resp.code,
                desc: resp.desc,
            }),
            Ok(resp) if status.is_success() => {
                tracing::debug!(rows = resp.data.len(), "Statement succeeded");
                Ok(resp.into_tabular())
            }
            Ok(_) => Err(TransportError::Http {
                status: status.as_u16(),
                body,
            }),
            Err(_) if !status.is_success() => Err(TransportError::Http {
                status: status.as_u16(),
                body,
            }),
            Err(e) => Err(TransportError::Decode(e)),
        }
    }
}
