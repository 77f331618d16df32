use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::relay::{ChatClient, InboundMessage, MediaRef};

/// Graph API client for one business phone number
pub struct CloudApiClient {
    graph_url: String,
    phone_number_id: String,
    access_token: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct MediaInfo {
    url: String,
}

impl CloudApiClient {
    pub fn new(
        graph_url: impl Into<String>,
        phone_number_id: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        let graph_url: String = graph_url.into();
        Self {
            graph_url: graph_url.trim_end_matches('/').to_string(),
            phone_number_id: phone_number_id.into(),
            access_token: access_token.into(),
            client: reqwest::Client::new(),
        }
    }

    fn messages_url(&self) -> String {
        format!("{}/{}/messages", self.graph_url, self.phone_number_id)
    }

    async fn post_message(&self, body: serde_json::Value, what: &str) -> Result<()> {
        let response = self
            .client
            .post(self.messages_url())
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("WhatsApp {} request failed", what))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("WhatsApp API error {} on {}: {}", status, what, body);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ChatClient for CloudApiClient {
    fn channel(&self) -> &'static str {
        "whatsapp"
    }

    async fn download_media(&self, media: &MediaRef) -> Result<Vec<u8>> {
        // Media ids resolve to a short-lived URL that needs the same bearer token.
        let info_url = format!("{}/{}", self.graph_url, media.id);
        let response = self
            .client
            .get(&info_url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .context("media lookup request failed")?;
        if !response.status().is_success() {
            anyhow::bail!("media lookup failed with status: {}", response.status());
        }
        let info: MediaInfo = response.json().await.context("failed to parse media lookup")?;

        let response = self
            .client
            .get(&info.url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .context("media download request failed")?;
        if !response.status().is_success() {
            anyhow::bail!("media download failed with status: {}", response.status());
        }
        let bytes = response.bytes().await.context("failed to read media body")?;
        debug!(media = %media.id, bytes = bytes.len(), "downloaded whatsapp media");
        Ok(bytes.to_vec())
    }

    async fn send_reply(&self, original: &InboundMessage, text: &str) -> Result<()> {
        let body = json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": original.chat_id,
            "context": { "message_id": original.id },
            "type": "text",
            "text": { "preview_url": false, "body": text }
        });
        self.post_message(body, "send").await
    }

    async fn acknowledge(&self, original: &InboundMessage) -> Result<()> {
        let body = json!({
            "messaging_product": "whatsapp",
            "status": "read",
            "message_id": original.id
        });
        self.post_message(body, "mark-read").await
    }
}
