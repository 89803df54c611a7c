//! Collector configuration loading.
//!
//! TOML file with CLI overrides applied by `main`. Every field has a
//! default, so a missing config file is fine; a malformed one is fatal
//! at startup.
//!
//! ```toml
//! listen = "0.0.0.0:34917"
//! min_severity = "info"
//!
//! [sinks]
//! tree = true
//! db = true
//!
//! [db]
//! url = "postgresql://eagilog@localhost/eagilog"
//! batch_size = 1000
//! ```

use logtree_core::Severity;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_DB_URL: &str = "postgresql://eagilog@localhost/eagilog";

// ---------------------------------------------------------------------------
// Validated config types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// TCP listen address; `None` reads standard input.
    pub listen: Option<String>,
    /// Messages below this level are not forwarded to sinks.
    pub min_severity: Option<Severity>,
    pub sinks: SinkSelection,
    pub db: DbConfig,
    pub tty: TtyConfig,
}

#[derive(Debug, Clone, Default)]
pub struct SinkSelection {
    pub tree: bool,
    pub text: bool,
    pub null: bool,
    pub db: bool,
}

impl SinkSelection {
    pub fn any(&self) -> bool {
        self.tree || self.text || self.null || self.db
    }
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub batch_size: u64,
    pub default_hit_interval: Duration,
    pub reconnect_initial: Duration,
    pub reconnect_cap: Duration,
}

#[derive(Debug, Clone)]
pub struct TtyConfig {
    pub batch_size: u64,
    pub default_hit_interval: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        DbConfig {
            url: DEFAULT_DB_URL.to_owned(),
            batch_size: 1000,
            default_hit_interval: Duration::from_secs(120),
            reconnect_initial: Duration::from_secs(1),
            reconnect_cap: Duration::from_secs(60),
        }
    }
}

impl Default for TtyConfig {
    fn default() -> Self {
        TtyConfig {
            batch_size: 10,
            default_hit_interval: Duration::from_secs(120),
        }
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        CollectorConfig {
            listen: None,
            min_severity: None,
            sinks: SinkSelection::default(),
            db: DbConfig::default(),
            tty: TtyConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Raw TOML deserialization types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawConfig {
    listen: Option<String>,
    min_severity: Option<String>,
    sinks: Option<RawSinks>,
    db: Option<RawDb>,
    tty: Option<RawTty>,
}

#[derive(Debug, Deserialize)]
struct RawSinks {
    tree: Option<bool>,
    text: Option<bool>,
    null: Option<bool>,
    db: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RawDb {
    url: Option<String>,
    batch_size: Option<u64>,
    default_hit_interval_secs: Option<u64>,
    reconnect_initial_ms: Option<u64>,
    reconnect_cap_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawTty {
    batch_size: Option<u64>,
    default_hit_interval_secs: Option<u64>,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config file: {0}")]
    Io(String),
    #[error("parsing config: {0}")]
    Parse(String),
    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

pub fn load_config_from_path(path: &Path) -> Result<CollectorConfig, ConfigError> {
    let toml_str = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("'{}': {}", path.display(), e)))?;
    load_config_from_str(&toml_str)
}

pub fn load_config_from_str(toml_str: &str) -> Result<CollectorConfig, ConfigError> {
    let raw: RawConfig = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;
    let defaults = CollectorConfig::default();

    let min_severity = match raw.min_severity {
        None => None,
        Some(name) => Some(name.parse::<Severity>().map_err(|_| {
            ConfigError::InvalidValue(format!("min_severity '{name}' is not a severity name"))
        })?),
    };

    let sinks = match raw.sinks {
        Some(s) => SinkSelection {
            tree: s.tree.unwrap_or(false),
            text: s.text.unwrap_or(false),
            null: s.null.unwrap_or(false),
            db: s.db.unwrap_or(false),
        },
        None => SinkSelection::default(),
    };

    let db = match raw.db {
        Some(d) => DbConfig {
            url: d.url.unwrap_or_else(|| DEFAULT_DB_URL.to_owned()),
            batch_size: d.batch_size.unwrap_or(defaults.db.batch_size).max(1),
            default_hit_interval: d
                .default_hit_interval_secs
                .map_or(defaults.db.default_hit_interval, Duration::from_secs),
            reconnect_initial: d
                .reconnect_initial_ms
                .map_or(defaults.db.reconnect_initial, Duration::from_millis),
            reconnect_cap: d
                .reconnect_cap_ms
                .map_or(defaults.db.reconnect_cap, Duration::from_millis),
        },
        None => defaults.db.clone(),
    };

    let tty = match raw.tty {
        Some(t) => TtyConfig {
            batch_size: t.batch_size.unwrap_or(defaults.tty.batch_size).max(1),
            default_hit_interval: t
                .default_hit_interval_secs
                .map_or(defaults.tty.default_hit_interval, Duration::from_secs),
        },
        None => defaults.tty.clone(),
    };

    Ok(CollectorConfig {
        listen: raw.listen,
        min_severity,
        sinks,
        db,
        tty,
    })
}
