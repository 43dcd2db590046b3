//! Environment helpers: centralized dotenv loading and ergonomic getters.
//! Call `init_env()` once early in each binary (or rely on lazy Once).
use std::str::FromStr;
use std::sync::Once;
use std::time::Duration;
use tracing::info;

static INIT: Once = Once::new();

/// Load .env exactly once. Safe to call many times.
pub fn init_env() {
    INIT.call_once(|| {
        if dotenv::dotenv().is_err() {
            // Fallback to the crate root so `cargo run` from a subdirectory still
            // picks up the developer's .env.
            let candidate = format!("{}/.env", env!("CARGO_MANIFEST_DIR"));
            let _ = dotenv::from_filename(candidate);
        }
    });
}

/// Get optional env var (None if unset or empty).
pub fn env_opt(key: &str) -> Option<String> {
    init_env();
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Parse an env var, falling back to `default` when unset.
pub fn env_parse<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_opt(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid value for {key}: {e}")),
        None => Ok(default),
    }
}

/// Boolean flag: 1/true/yes/on (case-insensitive) is true.
pub fn env_flag(key: &str, default: bool) -> bool {
    match env_opt(key) {
        Some(raw) => matches!(
            raw.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        None => default,
    }
}

/// Whole seconds as a Duration.
pub fn env_secs(key: &str, default_secs: u64) -> anyhow::Result<Duration> {
    env_parse(key, default_secs).map(Duration::from_secs)
}

/// Log a consolidated, redacted snapshot of configuration.
pub fn log_snapshot(title: &str, keys: &[&str]) {
    let snapshot: Vec<(String, String)> = keys
        .iter()
        .map(|&k| {
            let v = env_opt(k).unwrap_or_default();
            (k.to_string(), redact_value(k, &v))
        })
        .collect();
    info!(target: "preflight", title, snapshot = ?snapshot, "configuration snapshot");
}

pub fn redact_value(key: &str, val: &str) -> String {
    let k = key.to_ascii_uppercase();
    if k.contains("PASSWORD") || k.contains("SECRET") || k.contains("TOKEN") || k.contains("KEY")
    {
        return if val.is_empty() { String::new() } else { "***".to_string() };
    }

    let val_trim = val.trim();

    // URLs may embed credentials (user:pass@host) or keys in the query string.
    if let Ok(mut u) = url::Url::parse(val_trim) {
        if u.has_host() {
            if !u.username().is_empty() {
                let _ = u.set_username("***");
            }
            if u.password().is_some() {
                let _ = u.set_password(Some("***"));
            }
            if u.query().is_some() {
                u.set_query(Some("***"));
            }
            return u.to_string();
        }
    }

    val_trim.to_string()
}
