// Process configuration, read once from the environment at startup.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::sidecar::{HttpHealthProbe, ProcessLauncher, SidecarSupervisor, SupervisorSettings};
use crate::source::{CatalogSource, FileCatalogSource, HttpCatalogSource, HttpSourceConfig};
use crate::store::{CatalogStore, PocketBaseAuth, PocketBaseConfig, PocketBaseStore, SqliteStore};
use crate::sync::{SyncOptions, SyncRunner};
use crate::util::env::{env_flag, env_opt, env_parse, env_secs};

/// Keys worth echoing at startup (values are redacted by `log_snapshot`).
pub const SNAPSHOT_KEYS: &[&str] = &[
    "API_HOST",
    "API_PORT",
    "API_SECRET",
    "CATALOG_URL",
    "CATALOG_FILE",
    "CATALOG_TOKEN",
    "STORE_BACKEND",
    "POCKETBASE_URL",
    "POCKETBASE_COLLECTION",
    "POCKETBASE_EMAIL",
    "SQLITE_URL",
    "SYNC_DEACTIVATE_MISSING",
    "SYNC_INTERVAL_SECS",
    "SIDECAR_PROGRAM",
    "SIDECAR_HEALTH_URL",
];

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Unset disables bearer auth.
    pub api_secret: Option<String>,
    pub allowed_origins: String,
}

#[derive(Debug, Clone)]
pub enum SourceConfig {
    Http(HttpSourceConfig),
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub enum StoreConfig {
    PocketBase(PocketBaseConfig),
    Sqlite { url: String, max_connections: u32 },
}

#[derive(Debug, Clone)]
pub struct SidecarConfig {
    pub name: String,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub health_url: Url,
    pub probe_timeout: Duration,
    pub settings: SupervisorSettings,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub source: SourceConfig,
    pub store: StoreConfig,
    pub sync: SyncOptions,
    /// `None` when `SYNC_INTERVAL_SECS` is 0.
    pub interval: Option<Duration>,
    pub sidecar: Option<SidecarConfig>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        crate::util::env::init_env();

        let sync = SyncOptions {
            fetch_timeout: env_secs("SYNC_FETCH_TIMEOUT_SECS", 30)?,
            store_timeout: env_secs("SYNC_STORE_TIMEOUT_SECS", 15)?,
            deactivate_missing: env_flag("SYNC_DEACTIVATE_MISSING", false),
        };
        let interval = Some(env_secs("SYNC_INTERVAL_SECS", 0)?).filter(|d| !d.is_zero());

        Ok(Self {
            server: server_from_env()?,
            source: source_from_env(&sync)?,
            store: store_from_env(&sync)?,
            sync,
            interval,
            sidecar: sidecar_from_env()?,
        })
    }

    pub fn build_source(&self) -> Result<Arc<dyn CatalogSource>> {
        Ok(match &self.source {
            SourceConfig::Http(cfg) => Arc::new(HttpCatalogSource::new(cfg.clone())?),
            SourceConfig::File(path) => Arc::new(FileCatalogSource::new(path.clone())),
        })
    }

    pub async fn build_store(&self) -> Result<Arc<dyn CatalogStore>> {
        Ok(match &self.store {
            StoreConfig::PocketBase(cfg) => Arc::new(PocketBaseStore::new(cfg.clone())?),
            StoreConfig::Sqlite { url, .. } if is_sqlite_memory(url) => Arc::new(
                SqliteStore::in_memory()
                    .await
                    .context("failed to open in-memory sqlite store")?,
            ),
            StoreConfig::Sqlite {
                url,
                max_connections,
            } => Arc::new(
                SqliteStore::connect(url, *max_connections)
                    .await
                    .with_context(|| format!("failed to open sqlite store at {url}"))?,
            ),
        })
    }

    /// Source, store and runner in one step.
    pub async fn build_runner(&self) -> Result<Arc<SyncRunner>> {
        let source = self.build_source()?;
        let store = self.build_store().await?;
        Ok(Arc::new(SyncRunner::new(source, store, self.sync.clone())))
    }

    pub fn build_sidecar(&self) -> Result<Option<Arc<SidecarSupervisor>>> {
        let Some(cfg) = &self.sidecar else {
            return Ok(None);
        };
        let launcher = ProcessLauncher {
            name: cfg.name.clone(),
            program: cfg.program.clone(),
            args: cfg.args.clone(),
        };
        let probe = HttpHealthProbe::new(cfg.health_url.clone(), cfg.probe_timeout)?;
        Ok(Some(Arc::new(SidecarSupervisor::new(
            cfg.name.clone(),
            Arc::new(launcher),
            Arc::new(probe),
            cfg.settings.clone(),
        ))))
    }
}

fn server_from_env() -> Result<ServerConfig> {
    Ok(ServerConfig {
        host: env_opt("API_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
        port: env_parse("API_PORT", 8787u16)?,
        api_secret: env_opt("API_SECRET"),
        allowed_origins: env_opt("ALLOWED_ORIGINS")
            .unwrap_or_else(|| "http://localhost:3000".to_string()),
    })
}

fn source_from_env(sync: &SyncOptions) -> Result<SourceConfig> {
    match (env_opt("CATALOG_URL"), env_opt("CATALOG_FILE")) {
        (Some(raw), _) => {
            let url = Url::parse(raw.trim()).context("invalid CATALOG_URL")?;
            Ok(SourceConfig::Http(HttpSourceConfig {
                url,
                token: env_opt("CATALOG_TOKEN"),
                timeout: sync.fetch_timeout,
            }))
        }
        (None, Some(path)) => Ok(SourceConfig::File(PathBuf::from(path.trim()))),
        (None, None) => bail!("either CATALOG_URL or CATALOG_FILE must be set"),
    }
}

fn store_from_env(sync: &SyncOptions) -> Result<StoreConfig> {
    let backend = env_opt("STORE_BACKEND").unwrap_or_else(|| "pocketbase".to_string());
    match backend.trim().to_ascii_lowercase().as_str() {
        "pocketbase" => {
            let raw =
                env_opt("POCKETBASE_URL").unwrap_or_else(|| "http://127.0.0.1:8090".to_string());
            let base_url = Url::parse(raw.trim()).context("invalid POCKETBASE_URL")?;
            let auth = match (
                env_opt("POCKETBASE_TOKEN"),
                env_opt("POCKETBASE_EMAIL"),
                env_opt("POCKETBASE_PASSWORD"),
            ) {
                (Some(token), _, _) => PocketBaseAuth::Token(token),
                (None, Some(identity), Some(password)) => PocketBaseAuth::Password {
                    collection: "_superusers".to_string(),
                    identity,
                    password,
                },
                (None, Some(_), None) => bail!("POCKETBASE_EMAIL is set but POCKETBASE_PASSWORD is not"),
                _ => PocketBaseAuth::None,
            };
            Ok(StoreConfig::PocketBase(PocketBaseConfig {
                base_url,
                collection: env_opt("POCKETBASE_COLLECTION")
                    .unwrap_or_else(|| "products".to_string()),
                auth,
                timeout: sync.store_timeout,
            }))
        }
        "sqlite" => Ok(StoreConfig::Sqlite {
            url: env_opt("SQLITE_URL")
                .unwrap_or_else(|| "sqlite://catalog.db?mode=rwc".to_string()),
            max_connections: env_parse("SQLITE_MAX_CONNS", 4u32)?,
        }),
        other => bail!("unknown STORE_BACKEND {other:?} (expected pocketbase or sqlite)"),
    }
}

/// Each connection to an in-memory database is a separate database.
fn is_sqlite_memory(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

fn sidecar_from_env() -> Result<Option<SidecarConfig>> {
    let Some(program) = env_opt("SIDECAR_PROGRAM") else {
        return Ok(None);
    };
    let raw = env_opt("SIDECAR_HEALTH_URL")
        .unwrap_or_else(|| "http://127.0.0.1:21465/health".to_string());
    let defaults = SupervisorSettings::default();
    let settings = SupervisorSettings {
        check_interval: env_secs("SIDECAR_CHECK_INTERVAL_SECS", defaults.check_interval.as_secs())?,
        failure_threshold: env_parse("SIDECAR_FAILURE_THRESHOLD", defaults.failure_threshold)?,
        restart_delay: defaults.restart_delay,
    };
    if settings.failure_threshold == 0 {
        bail!("SIDECAR_FAILURE_THRESHOLD must be at least 1");
    }
    if settings.check_interval.is_zero() {
        bail!("SIDECAR_CHECK_INTERVAL_SECS must be at least 1");
    }
    Ok(Some(SidecarConfig {
        name: env_opt("SIDECAR_NAME").unwrap_or_else(|| "wppconnect-server".to_string()),
        program: PathBuf::from(program.trim()),
        args: env_opt("SIDECAR_ARGS")
            .map(|a| a.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default(),
        health_url: Url::parse(raw.trim()).context("invalid SIDECAR_HEALTH_URL")?,
        probe_timeout: Duration::from_secs(3),
        settings,
    }))
}
