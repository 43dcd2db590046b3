//! PocketBase records API backend.
//!
//! Talks to `/api/collections/{collection}/records` with a superuser token.
//! The collection is expected to carry `sku` (unique), `name`, `price_minor`,
//! `currency`, `stock`, `category`, `barcode`, `active` and `content_hash`
//! fields; that schema is owned by the application's migrations, not here.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::{CatalogStore, StoreIndex, StoredItem};
use crate::sync::error::SyncError;
use crate::sync::item::CatalogItem;

const PAGE_SIZE: u32 = 500;

#[derive(Debug, Clone)]
pub enum PocketBaseAuth {
    /// Pre-issued token, sent as-is.
    Token(String),
    /// Superuser credentials exchanged for a token on first use.
    Password {
        collection: String,
        identity: String,
        password: String,
    },
    None,
}

#[derive(Debug, Clone)]
pub struct PocketBaseConfig {
    pub base_url: Url,
    pub collection: String,
    pub auth: PocketBaseAuth,
    pub timeout: Duration,
}

pub struct PocketBaseStore {
    cfg: PocketBaseConfig,
    http: Client,
    token: RwLock<Option<String>>,
}

#[derive(Debug, Deserialize)]
struct ListPage {
    #[serde(rename = "totalPages", default)]
    total_pages: u32,
    items: Vec<RecordRow>,
}

#[derive(Debug, Deserialize)]
struct RecordRow {
    id: String,
    #[serde(default)]
    sku: String,
    #[serde(default)]
    content_hash: Option<String>,
    #[serde(default = "default_true")]
    active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    token: String,
}

/// Full record body; absent optionals are sent as null so a PATCH clears them.
fn record_body(item: &CatalogItem, content_hash: &str) -> serde_json::Value {
    serde_json::json!({
        "sku": item.sku,
        "name": item.name,
        "price_minor": item.price_minor,
        "currency": item.currency,
        "stock": item.stock,
        "category": item.category,
        "barcode": item.barcode,
        "active": item.active,
        "content_hash": content_hash,
    })
}

impl PocketBaseStore {
    pub fn new(cfg: PocketBaseConfig) -> anyhow::Result<Self> {
        let http = Client::builder().timeout(cfg.timeout).build()?;
        let token = match &cfg.auth {
            PocketBaseAuth::Token(t) => Some(t.clone()),
            _ => None,
        };
        Ok(Self {
            cfg,
            http,
            token: RwLock::new(token),
        })
    }

    fn url(&self, path: &str) -> Result<Url, SyncError> {
        self.cfg
            .base_url
            .join(path)
            .map_err(|e| SyncError::Persistence(format!("bad pocketbase url {path}: {e}")))
    }

    fn records_url(&self, id: Option<&str>) -> Result<Url, SyncError> {
        match id {
            Some(id) => self.url(&format!(
                "api/collections/{}/records/{}",
                self.cfg.collection, id
            )),
            None => self.url(&format!("api/collections/{}/records", self.cfg.collection)),
        }
    }

    async fn authenticate(&self) -> Result<Option<String>, SyncError> {
        let PocketBaseAuth::Password {
            collection,
            identity,
            password,
        } = &self.cfg.auth
        else {
            return Ok(self.token.read().await.clone());
        };
        let url = self.url(&format!("api/collections/{collection}/auth-with-password"))?;
        let resp = self
            .http
            .post(url)
            .json(&serde_json::json!({ "identity": identity, "password": password }))
            .send()
            .await
            .map_err(SyncError::from_store_http)?;
        let resp = check(resp, "authenticate").await?;
        let auth: AuthResponse = resp.json().await.map_err(SyncError::from_store_http)?;
        info!(collection = %collection, "authenticated against pocketbase");
        *self.token.write().await = Some(auth.token.clone());
        Ok(Some(auth.token))
    }

    /// Send a request with the cached token, authenticating lazily and retrying
    /// once on 401.
    async fn send<F>(&self, build: F) -> Result<Response, SyncError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let mut token = self.token.read().await.clone();
        if token.is_none() {
            token = self.authenticate().await?;
        }
        let mut retried = false;
        loop {
            let mut req = build(&self.http);
            if let Some(t) = &token {
                req = req.header("Authorization", t.as_str());
            }
            let resp = req.send().await.map_err(SyncError::from_store_http)?;
            let password_auth = matches!(self.cfg.auth, PocketBaseAuth::Password { .. });
            if resp.status() == StatusCode::UNAUTHORIZED && password_auth && !retried {
                warn!("pocketbase token rejected; re-authenticating");
                *self.token.write().await = None;
                token = self.authenticate().await?;
                retried = true;
                continue;
            }
            return Ok(resp);
        }
    }

    async fn find_by_sku(&self, sku: &str) -> Result<Option<StoredItem>, SyncError> {
        let url = self.records_url(None)?;
        let filter = format!("sku=\"{}\"", sku.replace('\\', "\\\\").replace('"', "\\\""));
        let resp = self
            .send(|c| {
                c.get(url.clone()).query(&[
                    ("filter", filter.as_str()),
                    ("perPage", "1"),
                    ("fields", "id,sku,content_hash,active"),
                ])
            })
            .await?;
        let page: ListPage = check(resp, "lookup")
            .await?
            .json()
            .await
            .map_err(SyncError::from_store_http)?;
        Ok(page.items.into_iter().next().map(into_stored))
    }

    async fn write(
        &self,
        method: Method,
        id: Option<&str>,
        body: &serde_json::Value,
    ) -> Result<Response, SyncError> {
        let url = self.records_url(id)?;
        self.send(|c| c.request(method.clone(), url.clone()).json(body))
            .await
    }
}

fn into_stored(r: RecordRow) -> StoredItem {
    StoredItem {
        id: r.id,
        sku: r.sku,
        content_hash: r.content_hash.filter(|h| !h.is_empty()),
        active: r.active,
    }
}

async fn check(resp: Response, what: &str) -> Result<Response, SyncError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let snippet: String = body.chars().take(300).collect();
    Err(SyncError::Persistence(format!(
        "pocketbase {what} answered {status}: {snippet}"
    )))
}

#[async_trait]
impl CatalogStore for PocketBaseStore {
    fn describe(&self) -> String {
        format!("{}#{}", self.cfg.base_url, self.cfg.collection)
    }

    #[instrument(skip(self), fields(collection = %self.cfg.collection))]
    async fn load_index(&self) -> Result<StoreIndex, SyncError> {
        let url = self.records_url(None)?;
        let mut index = StoreIndex::new();
        let mut page = 1u32;
        loop {
            let page_str = page.to_string();
            let per_page = PAGE_SIZE.to_string();
            let resp = self
                .send(|c| {
                    c.get(url.clone()).query(&[
                        ("page", page_str.as_str()),
                        ("perPage", per_page.as_str()),
                        ("fields", "id,sku,content_hash,active"),
                    ])
                })
                .await?;
            let body: ListPage = check(resp, "list")
                .await?
                .json()
                .await
                .map_err(SyncError::from_store_http)?;
            let fetched = body.items.len();
            for row in body.items {
                if row.sku.is_empty() {
                    continue;
                }
                let stored = into_stored(row);
                index.insert(stored.sku.clone(), stored);
            }
            debug!(page, fetched, total_pages = body.total_pages, "pocketbase page loaded");
            if fetched == 0 || page >= body.total_pages {
                break;
            }
            page += 1;
        }
        Ok(index)
    }

    async fn create(&self, item: &CatalogItem, content_hash: &str) -> Result<(), SyncError> {
        let body = record_body(item, content_hash);
        let resp = self.write(Method::POST, None, &body).await?;
        if resp.status() != StatusCode::BAD_REQUEST {
            check(resp, "create").await?;
            return Ok(());
        }
        // A unique-index rejection means the SKU already exists (e.g. an earlier
        // run died after the write landed); converge by patching it.
        let rejection = resp.text().await.unwrap_or_default();
        match self.find_by_sku(&item.sku).await? {
            Some(existing) => {
                debug!(sku = %item.sku, "create hit existing record; patching instead");
                let resp = self.write(Method::PATCH, Some(&existing.id), &body).await?;
                check(resp, "update").await?;
                Ok(())
            }
            None => Err(SyncError::Persistence(format!(
                "pocketbase create rejected {}: {}",
                item.sku,
                rejection.chars().take(300).collect::<String>()
            ))),
        }
    }

    async fn update(
        &self,
        existing: &StoredItem,
        item: &CatalogItem,
        content_hash: &str,
    ) -> Result<(), SyncError> {
        let body = record_body(item, content_hash);
        let resp = self.write(Method::PATCH, Some(&existing.id), &body).await?;
        check(resp, "update").await?;
        Ok(())
    }

    async fn deactivate(&self, existing: &StoredItem) -> Result<(), SyncError> {
        let url = self.records_url(Some(&existing.id))?;
        let resp = self
            .send(|c| c.patch(url.clone()).json(&serde_json::json!({ "active": false })))
            .await?;
        check(resp, "deactivate").await?;
        Ok(())
    }
}
