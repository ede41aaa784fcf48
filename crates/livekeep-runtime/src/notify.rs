//! Push notifications for sessions going online and offline.

use std::time::Duration;

use async_trait::async_trait;
use livekeep_core::is_http_url;

const NTFY_SERVER: &str = "https://ntfy.sh";

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Best effort: failures are logged, never returned.
    async fn notify(&self, title: &str, body: &str, click: Option<&str>);
}

pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _title: &str, _body: &str, _click: Option<&str>) {}
}

/// Posts to an ntfy topic.
pub struct NtfyNotifier {
    client: reqwest::Client,
    endpoint: String,
}

impl NtfyNotifier {
    pub fn new(topic: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint(topic),
        })
    }
}

#[async_trait]
impl Notifier for NtfyNotifier {
    async fn notify(&self, title: &str, body: &str, click: Option<&str>) {
        // Title and click go in the query string: header values must be
        // ASCII and stream titles often are not.
        let mut query = vec![("title", title)];
        if let Some(click) = click {
            query.push(("click", click));
        }
        let result = self
            .client
            .post(&self.endpoint)
            .query(&query)
            .body(body.to_string())
            .send()
            .await
            .and_then(reqwest::Response::error_for_status);
        if let Err(e) = result {
            tracing::debug!(endpoint = %self.endpoint, "ntfy notification failed: {e}");
        }
    }
}

/// A bare topic name goes to the public server.
fn endpoint(topic: &str) -> String {
    let topic = topic.trim();
    if is_http_url(topic) {
        topic.to_string()
    } else {
        format!("{NTFY_SERVER}/{}", topic.trim_start_matches('/'))
    }
}
