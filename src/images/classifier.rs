//! Food detection and menu recognition behind one seam. The shipped adapter
//! talks JSON to a model server; tests script the answers.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

#[async_trait]
pub trait ImageClassifier: Send + Sync {
    async fn is_food(&self, image: Bytes) -> anyhow::Result<bool>;
    /// Id of the most likely catalogue menu.
    async fn recognize_menu(&self, image: Bytes) -> anyhow::Result<i64>;
}

#[derive(Debug, Deserialize)]
struct IsFoodResponse {
    is_food: bool,
}

#[derive(Debug, Deserialize)]
struct RecognizeResponse {
    menu_id: i64,
}

#[derive(Debug, Clone)]
pub struct HttpClassifier {
    base_url: String,
    client: Client,
}

impl HttpClassifier {
    /// `timeout` bounds each request, connect through body.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("build classifier http client")?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn post_image<T: for<'de> Deserialize<'de>>(&self, path: &str, image: Bytes) -> anyhow::Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(image)
            .send()
            .await
            .with_context(|| format!("classifier request {url}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("classifier {url} returned {status}: {body}");
        }
        response
            .json::<T>()
            .await
            .with_context(|| format!("decode classifier response {url}"))
    }
}

#[async_trait]
impl ImageClassifier for HttpClassifier {
    async fn is_food(&self, image: Bytes) -> anyhow::Result<bool> {
        let r: IsFoodResponse = self.post_image("/is_food", image).await?;
        debug!(is_food = r.is_food, "food detection");
        Ok(r.is_food)
    }

    async fn recognize_menu(&self, image: Bytes) -> anyhow::Result<i64> {
        let r: RecognizeResponse = self.post_image("/recognize", image).await?;
        debug!(menu_id = r.menu_id, "menu recognized");
        Ok(r.menu_id)
    }
}
