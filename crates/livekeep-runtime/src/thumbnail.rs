//! YouTube thumbnail download.

use std::path::Path;
use std::time::Duration;

const CANDIDATES: [&str; 2] = ["maxresdefault.jpg", "hqdefault.jpg"];

pub struct ThumbnailFetcher {
    timeout: Duration,
}

impl Default for ThumbnailFetcher {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }
}

impl ThumbnailFetcher {
    /// Save the best available thumbnail for `video_id` to `dest`. Returns
    /// whether a non-empty image was written.
    pub async fn fetch(&self, video_id: &str, dest: &Path, proxy: Option<&str>) -> bool {
        let client = match self.client(proxy) {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!("thumbnail client: {e}");
                return false;
            }
        };
        for url in candidate_urls(video_id) {
            match download(&client, &url).await {
                Ok(bytes) if !bytes.is_empty() => match tokio::fs::write(dest, &bytes).await {
                    Ok(()) => return true,
                    Err(e) => {
                        tracing::warn!(path = %dest.display(), "cannot write thumbnail: {e}");
                        return false;
                    }
                },
                Ok(_) => {}
                Err(e) => tracing::debug!(url = %url, "thumbnail download failed: {e}"),
            }
        }
        false
    }

    fn client(&self, proxy: Option<&str>) -> Result<reqwest::Client, reqwest::Error> {
        let mut builder = reqwest::Client::builder().timeout(self.timeout);
        if let Some(proxy) = proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }
        builder.build()
    }
}

async fn download(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, reqwest::Error> {
    let resp = client.get(url).send().await?.error_for_status()?;
    Ok(resp.bytes().await?.to_vec())
}

fn candidate_urls(video_id: &str) -> Vec<String> {
    CANDIDATES
        .iter()
        .map(|file| format!("https://i.ytimg.com/vi/{video_id}/{file}"))
        .collect()
}
