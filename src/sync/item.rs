// Catalog item model: wire shape, normalization and content fingerprint

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;

use super::error::SyncError;

/// One record as supplied by a catalog source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub sku: String,
    pub name: String,
    pub price_minor: i64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub barcode: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_active() -> bool {
    true
}

impl CatalogItem {
    pub fn new(sku: impl Into<String>, name: impl Into<String>, price_minor: i64) -> Self {
        Self {
            sku: sku.into(),
            name: name.into(),
            price_minor,
            currency: default_currency(),
            stock: None,
            category: None,
            barcode: None,
            active: true,
        }
    }

    /// Trim and canonicalize fields, then check them. The returned item is what
    /// gets fingerprinted and written.
    pub fn normalized(&self) -> Result<CatalogItem, SyncError> {
        let sku = self.sku.trim().to_string();
        if sku.is_empty() {
            return Err(SyncError::Validation("sku is empty".into()));
        }
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(SyncError::Validation(format!("{sku}: name is empty")));
        }
        if self.price_minor < 0 {
            return Err(SyncError::Validation(format!(
                "{sku}: negative price {}",
                self.price_minor
            )));
        }
        let currency = self.currency.trim().to_ascii_uppercase();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(SyncError::Validation(format!(
                "{sku}: invalid currency code {:?}",
                self.currency
            )));
        }
        if let Some(stock) = self.stock {
            if stock < 0 {
                return Err(SyncError::Validation(format!("{sku}: negative stock {stock}")));
            }
        }
        Ok(CatalogItem {
            sku,
            name,
            price_minor: self.price_minor,
            currency,
            stock: self.stock,
            category: non_empty(self.category.as_deref()),
            barcode: non_empty(self.barcode.as_deref()),
            active: self.active,
        })
    }

    /// SHA-256 over the canonical JSON of this item (field order is the struct order).
    pub fn fingerprint(&self) -> String {
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        let digest = Sha256::digest(&canonical);
        let mut out = String::with_capacity(64);
        for b in digest {
            let _ = write!(out, "{b:02x}");
        }
        out
    }
}

fn non_empty(v: Option<&str>) -> Option<String> {
    v.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

/// Accepts either a bare JSON array of items or an object with an `items` array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum CatalogPayload {
    Items(Vec<CatalogItem>),
    Wrapped { items: Vec<CatalogItem> },
}

impl CatalogPayload {
    pub fn into_items(self) -> Vec<CatalogItem> {
        match self {
            CatalogPayload::Items(items) => items,
            CatalogPayload::Wrapped { items } => items,
        }
    }

    pub fn parse(raw: &[u8]) -> Result<Vec<CatalogItem>, SyncError> {
        serde_json::from_slice::<CatalogPayload>(raw)
            .map(CatalogPayload::into_items)
            .map_err(|e| SyncError::Validation(format!("catalog payload is malformed: {e}")))
    }
}
