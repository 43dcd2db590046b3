use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use url::Url;

use super::HealthProbe;

/// Healthy iff `GET url` answers 2xx within the timeout.
#[derive(Clone)]
pub struct HttpHealthProbe {
    url: Url,
    http: Client,
}

impl HttpHealthProbe {
    pub fn new(url: Url, timeout: Duration) -> anyhow::Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { url, http })
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn healthy(&self) -> bool {
        match self.http.get(self.url.clone()).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}
