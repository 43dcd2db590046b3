use async_trait::async_trait;
use chrono::Utc;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Row, SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument};

use super::{CatalogStore, StoreIndex, StoredItem};
use crate::sync::error::SyncError;
use crate::sync::item::CatalogItem;

/// Catalog mirror in a local SQLite file. This crate owns the schema, so
/// migrations always run on connect.
#[derive(Clone)]
pub struct SqliteStore {
    pub pool: SqlitePool,
}

impl SqliteStore {
    // SECURITY: never include raw DSNs in tracing spans.
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, SyncError> {
        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .connect_with(connect_options)
            .await?;
        info!("connected to sqlite store");
        Self::migrate(pool).await
    }

    /// Single-connection in-memory database; every connection to `:memory:` is a
    /// fresh database, so the pool must never open a second one.
    pub async fn in_memory() -> Result<Self, SyncError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::migrate(pool).await
    }

    async fn migrate(pool: SqlitePool) -> Result<Self, SyncError> {
        sqlx::migrate!().run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn count_items(&self) -> Result<i64, SyncError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM catalog_items")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}

#[async_trait]
impl CatalogStore for SqliteStore {
    fn describe(&self) -> String {
        "sqlite:catalog_items".into()
    }

    async fn load_index(&self) -> Result<StoreIndex, SyncError> {
        let rows = sqlx::query("SELECT id, sku, content_hash, active FROM catalog_items")
            .fetch_all(&self.pool)
            .await?;
        let mut index = StoreIndex::with_capacity(rows.len());
        for r in rows {
            let id: i64 = r.get("id");
            let sku: String = r.get("sku");
            index.insert(
                sku.clone(),
                StoredItem {
                    id: id.to_string(),
                    sku,
                    content_hash: r.get("content_hash"),
                    active: r.get::<i64, _>("active") != 0,
                },
            );
        }
        Ok(index)
    }

    async fn create(&self, item: &CatalogItem, content_hash: &str) -> Result<(), SyncError> {
        sqlx::query(
            "INSERT INTO catalog_items (sku, name, price_minor, currency, stock, category, barcode, active, content_hash, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) \
             ON CONFLICT (sku) DO UPDATE SET name=excluded.name, price_minor=excluded.price_minor, \
             currency=excluded.currency, stock=excluded.stock, category=excluded.category, \
             barcode=excluded.barcode, active=excluded.active, content_hash=excluded.content_hash, \
             updated_at=excluded.updated_at",
        )
        .bind(&item.sku)
        .bind(&item.name)
        .bind(item.price_minor)
        .bind(&item.currency)
        .bind(item.stock)
        .bind(&item.category)
        .bind(&item.barcode)
        .bind(item.active)
        .bind(content_hash)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(
        &self,
        existing: &StoredItem,
        item: &CatalogItem,
        content_hash: &str,
    ) -> Result<(), SyncError> {
        let id: i64 = existing
            .id
            .parse()
            .map_err(|_| SyncError::Persistence(format!("bad record id {}", existing.id)))?;
        let done = sqlx::query(
            "UPDATE catalog_items SET name=?1, price_minor=?2, currency=?3, stock=?4, category=?5, \
             barcode=?6, active=?7, content_hash=?8, updated_at=?9 WHERE id=?10",
        )
        .bind(&item.name)
        .bind(item.price_minor)
        .bind(&item.currency)
        .bind(item.stock)
        .bind(&item.category)
        .bind(&item.barcode)
        .bind(item.active)
        .bind(content_hash)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        if done.rows_affected() == 0 {
            return Err(SyncError::Persistence(format!(
                "record {} for {} disappeared",
                existing.id, existing.sku
            )));
        }
        Ok(())
    }

    async fn deactivate(&self, existing: &StoredItem) -> Result<(), SyncError> {
        sqlx::query("UPDATE catalog_items SET active=0, updated_at=?1 WHERE sku=?2")
            .bind(Utc::now().to_rfc3339())
            .bind(&existing.sku)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FileCatalogSource;
    use crate::sync::runner::{RunMode, SyncOptions, SyncRunner};
    use std::sync::Arc;

    #[tokio::test]
    async fn create_is_an_upsert_on_sku() {
        let store = SqliteStore::in_memory().await.unwrap();
        let item = CatalogItem::new("A", "Mug", 500);

        store.create(&item, "h1").await.unwrap();
        store.create(&item, "h1").await.unwrap();
        assert_eq!(store.count_items().await.unwrap(), 1);

        let index = store.load_index().await.unwrap();
        assert_eq!(index["A"].content_hash.as_deref(), Some("h1"));
        assert!(index["A"].active);
    }

    #[tokio::test]
    async fn update_and_deactivate_touch_existing_row() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.create(&CatalogItem::new("A", "Mug", 500), "h1").await.unwrap();
        let existing = store.load_index().await.unwrap().remove("A").unwrap();

        let mut changed = CatalogItem::new("A", "Big mug", 650);
        changed.stock = Some(12);
        store.update(&existing, &changed, "h2").await.unwrap();
        store.deactivate(&existing).await.unwrap();

        let row = sqlx::query("SELECT name, price_minor, stock, active FROM catalog_items WHERE sku = 'A'")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(row.get::<String, _>("name"), "Big mug");
        assert_eq!(row.get::<i64, _>("price_minor"), 650);
        assert_eq!(row.get::<Option<i64>, _>("stock"), Some(12));
        assert_eq!(row.get::<i64, _>("active"), 0);
    }

    #[tokio::test]
    async fn update_of_vanished_row_is_persistence_error() {
        let store = SqliteStore::in_memory().await.unwrap();
        let ghost = StoredItem {
            id: "42".into(),
            sku: "GHOST".into(),
            content_hash: None,
            active: true,
        };
        let err = store
            .update(&ghost, &CatalogItem::new("GHOST", "x", 1), "h")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("disappeared"));
    }

    #[tokio::test]
    async fn file_catalog_into_sqlite_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(
            &path,
            r#"{"items":[
                {"sku":"A","name":"Mug","price_minor":500},
                {"sku":"B","name":"Plate","price_minor":900,"category":"kitchen"},
                {"sku":"C","name":"Bowl","price_minor":700,"barcode":"123"}
            ]}"#,
        )
        .unwrap();

        let db_url = format!("sqlite://{}", dir.path().join("catalog.db").display());
        let store = Arc::new(SqliteStore::connect(&db_url, 2).await.unwrap());
        let runner = SyncRunner::new(
            Arc::new(FileCatalogSource::new(&path)),
            store.clone(),
            SyncOptions::default(),
        );

        let first = runner.run(RunMode::Apply).await;
        assert!(first.success, "{:?}", first.error);
        assert_eq!(first.created, 3);

        let second = runner.run(RunMode::Apply).await;
        assert!(second.success);
        assert_eq!(second.created + second.updated, 0);
        assert_eq!(second.unchanged, 3);
        assert_eq!(store.count_items().await.unwrap(), 3);
    }
}
