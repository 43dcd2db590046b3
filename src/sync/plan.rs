// Reconciliation planning: pure diff between the catalog and the store index

use std::collections::HashSet;

use super::error::SyncError;
use super::item::CatalogItem;
use super::result::ItemError;
use crate::store::{StoreIndex, StoredItem};

#[derive(Debug, Clone, Copy, Default)]
pub struct PlanOptions {
    pub deactivate_missing: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Create {
        item: CatalogItem,
        hash: String,
    },
    Update {
        existing: StoredItem,
        item: CatalogItem,
        hash: String,
    },
    Deactivate {
        existing: StoredItem,
    },
}

impl Action {
    pub fn sku(&self) -> &str {
        match self {
            Action::Create { item, .. } | Action::Update { item, .. } => &item.sku,
            Action::Deactivate { existing } => &existing.sku,
        }
    }
}

#[derive(Debug, Default)]
pub struct Plan {
    pub actions: Vec<Action>,
    pub unchanged: usize,
    pub rejected: Vec<ItemError>,
}

impl Plan {
    pub fn creates(&self) -> usize {
        self.count(|a| matches!(a, Action::Create { .. }))
    }

    pub fn updates(&self) -> usize {
        self.count(|a| matches!(a, Action::Update { .. }))
    }

    pub fn deactivations(&self) -> usize {
        self.count(|a| matches!(a, Action::Deactivate { .. }))
    }

    fn count(&self, f: impl Fn(&Action) -> bool) -> usize {
        self.actions.iter().filter(|a| f(a)).count()
    }
}

/// Diff `items` against `index`.
///
/// Items that fail validation or repeat an earlier SKU land in `rejected` and are
/// never written. Deactivation only happens when the catalog is non-empty and
/// every item was accepted: a truncated or broken feed must not soft-delete the
/// store.
pub fn plan(items: &[CatalogItem], index: &StoreIndex, opts: PlanOptions) -> Plan {
    let mut out = Plan::default();
    let mut seen: HashSet<String> = HashSet::with_capacity(items.len());

    for raw in items {
        let item = match raw.normalized() {
            Ok(item) => item,
            Err(e) => {
                out.rejected.push(ItemError::new(raw.sku.trim(), &e));
                continue;
            }
        };
        if !seen.insert(item.sku.clone()) {
            let e = SyncError::Validation(format!("duplicate sku {} in catalog", item.sku));
            out.rejected.push(ItemError::new(item.sku.as_str(), &e));
            continue;
        }

        let hash = item.fingerprint();
        match index.get(&item.sku) {
            None => out.actions.push(Action::Create { item, hash }),
            Some(existing) => {
                let same_content = existing.content_hash.as_deref() == Some(hash.as_str());
                let revived = item.active && !existing.active;
                if same_content && !revived {
                    out.unchanged += 1;
                } else {
                    out.actions.push(Action::Update {
                        existing: existing.clone(),
                        item,
                        hash,
                    });
                }
            }
        }
    }

    if opts.deactivate_missing && !items.is_empty() && out.rejected.is_empty() {
        let mut missing: Vec<&StoredItem> = index
            .values()
            .filter(|s| s.active && !seen.contains(&s.sku))
            .collect();
        missing.sort_by(|a, b| a.sku.cmp(&b.sku));
        out.actions.extend(missing.into_iter().map(|s| Action::Deactivate {
            existing: s.clone(),
        }));
    }

    out
}
