//! Configuration loading and validation.
//!
//! The configuration file is a JSON document with three sections: general
//! settings (checkpoint path, poll cadence), network settings (collector
//! addresses and TLS material), and an ordered list of file groups (path
//! patterns, static event fields, dead time).
//!
//! Loading separates the wire shape ([`RawConfig`], mirroring the JSON
//! document including its space-containing keys) from the resolved runtime
//! shape ([`Config`], with `Duration` fields), converted by one explicit
//! validation step. This avoids a single mutable struct mixing serialized
//! and derived fields.
//!
//! # Fail-fast
//!
//! All validation errors are fatal to startup. In particular the checkpoint
//! path is probed for writability during load: an agent that cannot persist
//! offsets must not start, since it would silently re-ship or lose data.
//! The probe may leave an empty checkpoint file behind if none existed.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::checkpoint;

/// Hard safety ceiling on configuration file size.
const MAX_CONFIG_BYTES: u64 = 10 << 20;

/// Default checkpoint dotfile, used when `"sincedb path"` is unset.
const DEFAULT_SINCEDB_PATH: &str = ".logship";

/// Default discovery poll cadence in seconds.
const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

/// Default checkpoint persist cadence in seconds.
const DEFAULT_PERSIST_INTERVAL_SECS: u64 = 5;

/// Default network timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Default reconnect interval in seconds.
const DEFAULT_RECONNECT_SECS: u64 = 1;

/// Default per-group dead time.
const DEFAULT_DEAD_TIME: &str = "24h";

/// Errors that can occur while loading configuration.
///
/// Every variant names the offending path, field, or value so an operator
/// can diagnose the failure from the startup log alone. None are retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be opened or read.
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The configuration file exceeds the safety ceiling.
    #[error("config file '{path}' is {size} bytes, over the {limit} byte limit")]
    TooLarge { path: PathBuf, size: u64, limit: u64 },

    /// The file contents are not valid JSON for the expected shape.
    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The checkpoint path cannot be opened read-write-or-create.
    #[error("sincedb path '{path}' is not writable: {source}")]
    SincedbUnwritable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A file group's dead time is not a valid duration string.
    #[error("file group {group}: failed to parse dead time '{value}': {source}")]
    DeadTimeParse {
        group: usize,
        value: String,
        #[source]
        source: humantime::DurationError,
    },

    /// A file group's dead time is below the floor derived from the poll
    /// interval.
    #[error(
        "file group {group}: dead time '{value}' is below the minimum of {floor} \
         (3x the poll interval); resurrection detection would be unreliable"
    )]
    DeadTimeTooShort {
        group: usize,
        value: String,
        floor: String,
    },
}

/// Result type for configuration loading.
pub type Result<T> = std::result::Result<T, ConfigError>;

// ─── Wire shape ───

/// The configuration document as written on disk.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfig {
    #[serde(default)]
    pub general: RawGeneral,
    #[serde(default)]
    pub network: RawNetwork,
    #[serde(default)]
    pub files: Vec<RawFileGroup>,
}

/// The `general` section as written on disk.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawGeneral {
    /// Checkpoint file path. Empty means the default dotfile.
    #[serde(rename = "sincedb path", default)]
    pub sincedb_path: String,

    /// Discovery poll cadence in seconds. Zero means the default.
    #[serde(rename = "poll interval", default)]
    pub poll_interval: u64,

    /// Checkpoint persist cadence in seconds. Zero means the default.
    #[serde(rename = "persist interval", default)]
    pub persist_interval: u64,
}

/// The `network` section as written on disk.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawNetwork {
    /// Collector addresses (`host:port`).
    #[serde(default)]
    pub servers: Vec<String>,

    #[serde(rename = "ssl certificate", default)]
    pub ssl_certificate: Option<String>,

    #[serde(rename = "ssl key", default)]
    pub ssl_key: Option<String>,

    #[serde(rename = "ssl ca", default)]
    pub ssl_ca: Option<String>,

    /// Send timeout in seconds. Zero means the default.
    #[serde(default)]
    pub timeout: u64,

    /// Reconnect interval in seconds. Zero means the default.
    #[serde(default)]
    pub reconnect: u64,
}

/// One entry of the `files` list as written on disk.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawFileGroup {
    /// Path patterns to discover (glob syntax, expanded by discovery).
    #[serde(default)]
    pub paths: Vec<String>,

    /// Static fields attached to every event from this group.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,

    /// Dead time as a duration string, e.g. `"24h"`. Empty means the
    /// default.
    #[serde(rename = "dead time", default)]
    pub dead_time: String,
}

// ─── Resolved shape ───

/// Validated configuration, immutable after load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Checkpoint file path (probed writable during load).
    pub sincedb_path: PathBuf,

    /// Discovery poll cadence. The dead-time floor is three times this.
    pub poll_interval: Duration,

    /// Checkpoint persist cadence.
    pub persist_interval: Duration,

    pub network: NetworkSettings,
    pub files: Vec<FileGroupSettings>,
}

/// Resolved network settings for the collector transport.
///
/// Timeout and reconnect are carried both as the raw integer seconds from
/// the document and as resolved `Duration`s, so the transport never
/// re-derives them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSettings {
    pub servers: Vec<String>,
    pub ssl_certificate: Option<PathBuf>,
    pub ssl_key: Option<PathBuf>,
    pub ssl_ca: Option<PathBuf>,
    pub timeout_secs: u64,
    pub timeout: Duration,
    pub reconnect_secs: u64,
    pub reconnect: Duration,
}

/// Resolved settings for one file group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileGroupSettings {
    pub paths: Vec<String>,
    pub fields: BTreeMap<String, String>,

    /// How long a deleted file's state is retained for resurrection
    /// detection.
    pub dead_time: Duration,
}

/// Loads and validates configuration from a file.
///
/// Applies defaults for absent/zero fields, probes the checkpoint path for
/// writability, and enforces the dead-time floor of three poll intervals
/// for every file group.
///
/// # Errors
///
/// All failures are fatal to startup; see [`ConfigError`].
pub fn load(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    let raw = read_raw(path)?;
    resolve(raw)
}

/// Reads and parses the on-disk document, enforcing the size ceiling.
fn read_raw(path: &Path) -> Result<RawConfig> {
    let mut file = fs::File::open(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let size = file
        .metadata()
        .map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?
        .len();
    if size > MAX_CONFIG_BYTES {
        return Err(ConfigError::TooLarge {
            path: path.to_path_buf(),
            size,
            limit: MAX_CONFIG_BYTES,
        });
    }

    let mut contents = String::with_capacity(size as usize);
    file.read_to_string(&mut contents)
        .map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Converts the wire shape into the resolved shape, applying defaults and
/// cross-field validation.
fn resolve(raw: RawConfig) -> Result<Config> {
    let sincedb_path = if raw.general.sincedb_path.is_empty() {
        PathBuf::from(DEFAULT_SINCEDB_PATH)
    } else {
        PathBuf::from(raw.general.sincedb_path)
    };

    // Fail fast on an unwritable checkpoint path.
    checkpoint::probe_writable(&sincedb_path).map_err(|source| {
        ConfigError::SincedbUnwritable {
            path: sincedb_path.clone(),
            source,
        }
    })?;

    // Zero means "absent" on the wire, so a resolved poll interval is
    // always positive and the dead-time floor below is well defined.
    let poll_interval = Duration::from_secs(default_if_zero(
        raw.general.poll_interval,
        DEFAULT_POLL_INTERVAL_SECS,
    ));

    let persist_interval = Duration::from_secs(default_if_zero(
        raw.general.persist_interval,
        DEFAULT_PERSIST_INTERVAL_SECS,
    ));

    let timeout_secs = default_if_zero(raw.network.timeout, DEFAULT_TIMEOUT_SECS);
    let reconnect_secs = default_if_zero(raw.network.reconnect, DEFAULT_RECONNECT_SECS);
    let network = NetworkSettings {
        servers: raw.network.servers,
        ssl_certificate: raw.network.ssl_certificate.map(PathBuf::from),
        ssl_key: raw.network.ssl_key.map(PathBuf::from),
        ssl_ca: raw.network.ssl_ca.map(PathBuf::from),
        timeout_secs,
        timeout: Duration::from_secs(timeout_secs),
        reconnect_secs,
        reconnect: Duration::from_secs(reconnect_secs),
    };

    // Discovery only rescans every poll interval, so a deleted file's
    // state must outlive several poll cycles or resurrection detection
    // becomes unreliable.
    let floor = poll_interval * 3;

    let mut files = Vec::with_capacity(raw.files.len());
    for (group, raw_group) in raw.files.into_iter().enumerate() {
        let dead_time_str = if raw_group.dead_time.is_empty() {
            DEFAULT_DEAD_TIME.to_string()
        } else {
            raw_group.dead_time
        };

        let dead_time = humantime::parse_duration(&dead_time_str).map_err(|source| {
            ConfigError::DeadTimeParse {
                group,
                value: dead_time_str.clone(),
                source,
            }
        })?;

        if dead_time < floor {
            return Err(ConfigError::DeadTimeTooShort {
                group,
                value: dead_time_str,
                floor: humantime::format_duration(floor).to_string(),
            });
        }

        files.push(FileGroupSettings {
            paths: raw_group.paths,
            fields: raw_group.fields,
            dead_time,
        });
    }

    Ok(Config {
        sincedb_path,
        poll_interval,
        persist_interval,
        network,
        files,
    })
}

fn default_if_zero(value: u64, default: u64) -> u64 {
    if value == 0 { default } else { value }
}
