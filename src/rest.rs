use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;

use crate::error::ClientError;

#[derive(Debug, Deserialize)]
struct GatewayInfo {
    url: String,
}

/// Minimal REST client. Its only job in this crate is resolving the
/// gateway WebSocket URL; it performs no retries.
pub struct RestClient {
    client: Client,
    base_url: String,
    token: String,
}

impl RestClient {
    pub fn new(base_url: String, token: String, timeout: Duration) -> Result<Self, ClientError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// `GET <base>/gateway` -> `{"url": "wss://..."}`.
    pub async fn get_gateway(&self) -> Result<String, ClientError> {
        let url = format!("{}/gateway", self.base_url);
        let resp = self
            .client
            .get(&url)
            .header("Authorization", format!("Bot {}", self.token))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Discovery { status, body });
        }

        let info: GatewayInfo = resp.json().await.map_err(|e| ClientError::Discovery {
            status: 200,
            body: format!("malformed discovery body: {e}"),
        })?;

        Ok(info.url)
    }
}
