use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

use super::CatalogSource;
use crate::sync::error::SyncError;
use crate::sync::item::{CatalogItem, CatalogPayload};

#[derive(Debug, Clone)]
pub struct HttpSourceConfig {
    pub url: Url,
    pub token: Option<String>,
    pub timeout: Duration,
}

/// Catalog served as JSON over HTTP (bare array or `{ "items": [...] }`).
#[derive(Clone)]
pub struct HttpCatalogSource {
    cfg: HttpSourceConfig,
    http: Client,
}

impl HttpCatalogSource {
    pub fn new(cfg: HttpSourceConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(cfg.timeout)
            .user_agent(concat!("catalog-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { cfg, http })
    }
}

#[async_trait]
impl CatalogSource for HttpCatalogSource {
    fn describe(&self) -> String {
        // Never log query strings; they sometimes carry API keys.
        let mut u = self.cfg.url.clone();
        u.set_query(None);
        u.to_string()
    }

    #[instrument(skip(self), fields(source = %self.describe()))]
    async fn fetch_items(&self) -> Result<Vec<CatalogItem>, SyncError> {
        let mut req = self.http.get(self.cfg.url.clone());
        if let Some(token) = &self.cfg.token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            return Err(SyncError::Transport(format!(
                "catalog source answered {status}: {snippet}"
            )));
        }
        let raw = resp.bytes().await?;
        let items = CatalogPayload::parse(&raw)?;
        debug!(count = items.len(), "catalog fetched");
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::error::ErrorKind;
    use crate::testing::serve_once;

    fn source(url: String, token: Option<&str>) -> HttpCatalogSource {
        HttpCatalogSource::new(HttpSourceConfig {
            url: Url::parse(&url).unwrap(),
            token: token.map(str::to_string),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn fetches_wrapped_payload_with_bearer_token() {
        let body = r#"{"items":[{"sku":"A","name":"Mug","price_minor":500}]}"#;
        let (url, requests) = serve_once(200, body).await;

        let items = source(format!("{url}/catalog?key=secret"), Some("tok"))
            .fetch_items()
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].sku, "A");

        let request = requests.await.unwrap();
        assert!(request.starts_with("GET /catalog?key=secret"), "{request}");
        assert!(request.to_ascii_lowercase().contains("authorization: bearer tok"));
    }

    #[tokio::test]
    async fn non_success_status_is_transport_error() {
        let (url, _req) = serve_once(503, "maintenance").await;
        let err = source(url, None).fetch_items().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("maintenance"));
    }

    #[tokio::test]
    async fn unreachable_source_is_transport_error() {
        // Bind then drop to get a port nobody listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = source(format!("http://{addr}/"), None)
            .fetch_items()
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[tokio::test]
    async fn malformed_body_is_validation_error() {
        let (url, _req) = serve_once(200, "<html>").await;
        let err = source(url, None).fetch_items().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn describe_strips_query() {
        let s = source("http://catalog.local/items?api_key=abc".into(), None);
        assert_eq!(s.describe(), "http://catalog.local/items");
    }
}
