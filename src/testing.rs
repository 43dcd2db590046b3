// Test doubles shared by the in-crate test modules

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::source::CatalogSource;
use crate::store::{CatalogStore, StoreIndex, StoredItem};
use crate::sync::error::SyncError;
use crate::sync::item::CatalogItem;

/// Catalog source returning a fixed outcome, optionally after a delay.
pub struct ScriptedSource {
    pub outcome: Mutex<Result<Vec<CatalogItem>, SyncError>>,
    pub delay: Duration,
    pub calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn items(items: Vec<CatalogItem>) -> Self {
        Self {
            outcome: Mutex::new(Ok(items)),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(err: SyncError) -> Self {
        Self {
            outcome: Mutex::new(Err(err)),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set_items(&self, items: Vec<CatalogItem>) {
        *self.outcome.lock().unwrap() = Ok(items);
    }
}

#[async_trait]
impl CatalogSource for ScriptedSource {
    fn describe(&self) -> String {
        "scripted".into()
    }

    async fn fetch_items(&self) -> Result<Vec<CatalogItem>, SyncError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.outcome.lock().unwrap().clone()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemoryRecord {
    pub id: String,
    pub item: CatalogItem,
    pub content_hash: Option<String>,
    pub active: bool,
}

/// In-memory store with per-SKU and global fault injection.
#[derive(Default)]
pub struct MemoryStore {
    pub records: Mutex<Vec<MemoryRecord>>,
    pub fail_index: Mutex<bool>,
    pub fail_writes: Mutex<bool>,
    pub fail_skus: Mutex<HashSet<String>>,
    /// SKUs whose writes stall for `stall`.
    pub slow_skus: Mutex<HashSet<String>>,
    /// Delay applied to every write (or only `slow_skus`, when non-empty).
    pub stall: Mutex<Duration>,
    pub index_stall: Mutex<Duration>,
    pub writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn get(&self, sku: &str) -> Option<MemoryRecord> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.item.sku == sku)
            .cloned()
    }

    /// Insert a record as if another tool had written it (no content hash).
    pub fn seed_foreign(&self, item: CatalogItem) {
        let mut records = self.records.lock().unwrap();
        let id = format!("rec{}", records.len() + 1);
        records.push(MemoryRecord {
            id,
            item,
            content_hash: None,
            active: true,
        });
    }

    async fn pause(&self, sku: &str) {
        let delay = *self.stall.lock().unwrap();
        let targeted = {
            let slow = self.slow_skus.lock().unwrap();
            slow.is_empty() || slow.contains(sku)
        };
        if !delay.is_zero() && targeted {
            tokio::time::sleep(delay).await;
        }
    }

    fn check_write(&self, sku: &str) -> Result<(), SyncError> {
        if *self.fail_writes.lock().unwrap() || self.fail_skus.lock().unwrap().contains(sku) {
            return Err(SyncError::Persistence(format!("write rejected for {sku}")));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    fn describe(&self) -> String {
        "memory".into()
    }

    async fn load_index(&self) -> Result<StoreIndex, SyncError> {
        let delay = *self.index_stall.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if *self.fail_index.lock().unwrap() {
            return Err(SyncError::Persistence("store unreachable".into()));
        }
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .map(|r| {
                (
                    r.item.sku.clone(),
                    StoredItem {
                        id: r.id.clone(),
                        sku: r.item.sku.clone(),
                        content_hash: r.content_hash.clone(),
                        active: r.active,
                    },
                )
            })
            .collect())
    }

    async fn create(&self, item: &CatalogItem, content_hash: &str) -> Result<(), SyncError> {
        self.pause(&item.sku).await;
        self.check_write(&item.sku)?;
        let mut records = self.records.lock().unwrap();
        if let Some(existing) = records.iter_mut().find(|r| r.item.sku == item.sku) {
            existing.item = item.clone();
            existing.content_hash = Some(content_hash.to_string());
            existing.active = item.active;
            return Ok(());
        }
        let id = format!("rec{}", records.len() + 1);
        records.push(MemoryRecord {
            id,
            item: item.clone(),
            content_hash: Some(content_hash.to_string()),
            active: item.active,
        });
        Ok(())
    }

    async fn update(
        &self,
        existing: &StoredItem,
        item: &CatalogItem,
        content_hash: &str,
    ) -> Result<(), SyncError> {
        self.pause(&item.sku).await;
        self.check_write(&item.sku)?;
        let mut records = self.records.lock().unwrap();
        let rec = records
            .iter_mut()
            .find(|r| r.id == existing.id)
            .ok_or_else(|| SyncError::Persistence(format!("record {} not found", existing.id)))?;
        rec.item = item.clone();
        rec.content_hash = Some(content_hash.to_string());
        rec.active = item.active;
        Ok(())
    }

    async fn deactivate(&self, existing: &StoredItem) -> Result<(), SyncError> {
        self.pause(&existing.sku).await;
        self.check_write(&existing.sku)?;
        let mut records = self.records.lock().unwrap();
        if let Some(rec) = records.iter_mut().find(|r| r.id == existing.id) {
            rec.active = false;
        }
        Ok(())
    }
}

/// Serve canned HTTP responses, one per connection, in order. Resolves to the
/// raw requests received (head and body).
pub async fn serve_script(responses: Vec<(u16, String)>) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let mut seen = Vec::with_capacity(responses.len());
        for (status, body) in responses {
            let (mut sock, _) = listener.accept().await.unwrap();
            seen.push(read_request(&mut sock).await);
            let reply = format!(
                "HTTP/1.1 {status} Canned\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            sock.write_all(reply.as_bytes()).await.unwrap();
            let _ = sock.shutdown().await;
        }
        seen
    });
    (format!("http://{addr}"), handle)
}

pub async fn serve_once(status: u16, body: &str) -> (String, JoinHandle<String>) {
    let (url, all) = serve_script(vec![(status, body.to_string())]).await;
    let one = tokio::spawn(async move { all.await.unwrap().remove(0) });
    (url, one)
}

async fn read_request(sock: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = sock.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(head_end) = find(&buf, b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..head_end]).to_ascii_lowercase();
            let len = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= head_end + 4 + len {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn find(hay: &[u8], needle: &[u8]) -> Option<usize> {
    hay.windows(needle.len()).position(|w| w == needle)
}
