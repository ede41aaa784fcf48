//! Proof-of-origin tokens from a bgutil provider, handed to ytarchive.

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

const PING_TIMEOUT: Duration = Duration::from_secs(10);
const TOKEN_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum PoTokenError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("invalid json from {endpoint}: {source}")]
    Json {
        endpoint: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid /ping answer: {0}")]
    BadPing(Value),

    #[error("invalid /get_pot answer: {0}")]
    NoToken(Value),
}

pub struct PoTokenProvider {
    client: reqwest::Client,
    base: String,
}

impl PoTokenProvider {
    pub fn new(base: &str) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: reqwest::Client::builder().build()?,
            base: base.trim().trim_end_matches('/').to_string(),
        })
    }

    /// A fresh token, or `None` when the provider is unreachable or answers
    /// with something unexpected. The proxy is the one the recorder will
    /// use; the provider binds the token to it.
    pub async fn fetch(&self, proxy: Option<&str>) -> Option<String> {
        match self.request(proxy).await {
            Ok(token) => {
                tracing::debug!(provider = %self.base, "got po token");
                Some(token)
            }
            Err(e) => {
                tracing::warn!(provider = %self.base, "bgutil: {e}");
                None
            }
        }
    }

    async fn request(&self, proxy: Option<&str>) -> Result<String, PoTokenError> {
        let ping = self
            .client
            .get(format!("{}/ping", self.base))
            .timeout(PING_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        check_ping(&ping)?;

        let form: Vec<(&str, &str)> = proxy.map(|p| ("proxy", p)).into_iter().collect();
        let answer = self
            .client
            .post(format!("{}/get_pot", self.base))
            .form(&form)
            .timeout(TOKEN_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        token_from(&answer)
    }
}

fn parse(endpoint: &'static str, body: &str) -> Result<Value, PoTokenError> {
    serde_json::from_str(body).map_err(|source| PoTokenError::Json { endpoint, source })
}

fn check_ping(body: &str) -> Result<(), PoTokenError> {
    let value = parse("/ping", body)?;
    if value.get("server_uptime").is_some() && value.get("version").is_some() {
        Ok(())
    } else {
        Err(PoTokenError::BadPing(value))
    }
}

fn token_from(body: &str) -> Result<String, PoTokenError> {
    let value = parse("/get_pot", body)?;
    match value.get("poToken").and_then(Value::as_str) {
        Some(token) if !token.is_empty() => Ok(token.to_string()),
        _ => Err(PoTokenError::NoToken(value)),
    }
}
