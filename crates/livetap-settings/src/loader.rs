//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`LivetapSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `LIVETAP_*` environment overrides (highest priority)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::LivetapSettings;

fn home_dir() -> PathBuf {
    PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string()))
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        home_dir()
    } else if let Some(rest) = path.strip_prefix("~/") {
        home_dir().join(rest)
    } else {
        PathBuf::from(path)
    }
}

/// Default settings file (`~/.livetap/settings.json`).
pub fn settings_path() -> PathBuf {
    home_dir().join(".livetap").join("settings.json")
}

/// Load settings from the default path with env overrides.
pub fn load_settings() -> Result<LivetapSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env overrides.
///
/// A missing file yields defaults; a malformed file is an error.
pub fn load_settings_from_path(path: &Path) -> Result<LivetapSettings> {
    let defaults = serde_json::to_value(LivetapSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: LivetapSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// Objects merge per key; arrays and primitives are replaced; nulls in
/// `source` leave `target` untouched.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply overrides from the process environment.
pub fn apply_env_overrides(settings: &mut LivetapSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Empty values are ignored. Numeric values outside their range are ignored
/// with a warning.
pub fn apply_overrides_from<F>(settings: &mut LivetapSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("LIVETAP_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u64_in("LIVETAP_PORT", 1, 65_535) {
        settings.server.port = u16::try_from(v).unwrap_or(settings.server.port);
    }

    // ── Storage ─────────────────────────────────────────────────────
    if let Some(v) = env.string("LIVETAP_REDIS_URL") {
        settings.redis.url = v;
    }
    if let Some(v) = env.string("LIVETAP_ARCHIVE_DB") {
        settings.archive.db_path = v;
    }

    // ── Supervisor ──────────────────────────────────────────────────
    if let Some(v) = env.string("LIVETAP_HANDLE_DIR") {
        settings.supervisor.handle_dir = v;
    }
    if let Some(v) = env.string("LIVETAP_LOG_DIR") {
        settings.supervisor.log_dir = v;
    }

    // ── Collector / source ──────────────────────────────────────────
    if let Some(v) = env.u64_in("LIVETAP_COLLECTOR_MAX_RETRIES", 0, 100) {
        settings.collector.max_retries = u32::try_from(v).unwrap_or(settings.collector.max_retries);
    }
    if let Some(v) = env.u64_in("LIVETAP_COLLECTOR_RETRY_DELAY_MS", 0, 600_000) {
        settings.collector.retry_delay_ms = v;
    }
    if let Some(v) = env.string("LIVETAP_SOURCE_WS_URL") {
        settings.source.ws_url_template = v;
    }
    if let Some(v) = env.string("LIVETAP_SOURCE_API_URL") {
        settings.source.api_base_url = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("LIVETAP_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

/// Parse a string as a `u64` within an inclusive range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn u64_in(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = self.string(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid numeric env var, ignoring");
        }
        result
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
