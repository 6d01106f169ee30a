use crate::data_sync::config::{SyncConfig, render_page_url};
use crate::error::{SyncError, SyncResult};
use crate::logic::types::PairKey;
use async_trait::async_trait;
use eyre::Result;
use std::time::Duration;
use tracing::debug;

/// Opaque page I/O for one tracked pair
#[async_trait]
pub trait PageTransport: Send + Sync {
    async fn get_page(&self, pair: PairKey, page: u32) -> SyncResult<String>;
}

/// HTTP transport for the leaderboard site
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http_client: reqwest::Client,
    url_template: String,
}

impl HttpTransport {
    pub fn new(url_template: String, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| eyre::eyre!("Failed to create HTTP client: {}", e))?;

        Ok(Self { http_client, url_template })
    }

    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        Self::new(config.datasource_url.clone(), config.request_timeout())
    }

    pub fn page_url(&self, pair: PairKey, page: u32) -> String {
        render_page_url(&self.url_template, pair.track_id, pair.vehicle_id, page)
    }
}

#[async_trait]
impl PageTransport for HttpTransport {
    async fn get_page(&self, pair: PairKey, page: u32) -> SyncResult<String> {
        let url = self.page_url(pair, page);
        debug!("GET {}", url);

        let response = self.http_client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Transport(format!("{url} returned HTTP {status}")));
        }
        Ok(response.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_url_from_config() {
        let config = SyncConfig {
            datasource_url: "https://lb.test/{track_id}/{vehicle_id}?p={page}".to_string(),
            ..SyncConfig::default()
        };
        let transport = HttpTransport::from_config(&config).unwrap();
        let pair = PairKey::new(12, 345);
        assert_eq!(transport.page_url(pair, 7), "https://lb.test/12/345?p=7");
        assert_eq!(transport.page_url(pair, 7), config.page_url(12, 345, 7));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let transport =
            HttpTransport::new("http://127.0.0.1:9/{track_id}/{vehicle_id}/{page}".to_string(), Duration::from_secs(2))
                .unwrap();
        let err = transport.get_page(PairKey::new(1, 1), 1).await.unwrap_err();
        assert!(err.is_transient());
    }
}
