use std::collections::{BTreeMap, HashMap};

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::types::EntityKind;

pub const DEFAULT_FULL_SCAN_INTERVAL_MINS: u64 = 14 * 24 * 60;
pub const DEFAULT_ONBOARDING_SPAN_DAYS: u64 = 14;
pub const DEFAULT_BACKWARD_CHUNK_MINS: u64 = 5 * 24 * 60;
pub const DEFAULT_TICK_SECS: u64 = 30;

/// Top-level config (scanline.toml + SCANLINE_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanlineConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    /// Scan cadence applied to every trigger unless a connector or the
    /// trigger itself overrides it.
    #[serde(default)]
    pub defaults: ScanSettings,
    /// Per-connector overrides keyed by connector name (`"jira"`, `"github"`, ...).
    #[serde(default)]
    pub connectors: HashMap<String, ScanOverrides>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// How often the firing loop wakes up to look for due triggers.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            tick_secs: DEFAULT_TICK_SECS,
        }
    }
}

/// Scan cadence in operator-friendly units.
///
/// This is the untyped, unvalidated form. `scanline-scheduler` turns it into
/// a `TriggerConfig` and rejects nonsense (zero chunks, half-configured
/// historical mode) at construction time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSettings {
    /// Minimum time between two FULL scans.
    #[serde(default = "default_full_scan_interval_mins")]
    pub full_scan_interval_mins: u64,
    /// How far before trigger creation onboarding reaches.
    #[serde(default = "default_onboarding_span_days")]
    pub onboarding_span_days: u64,
    /// Max width of one backward sub-job.
    #[serde(default = "default_backward_chunk_mins")]
    pub backward_chunk_mins: u64,
    #[serde(default)]
    pub historical_span_days: Option<u64>,
    #[serde(default)]
    pub historical_chunk_mins: Option<u64>,
    #[serde(default)]
    pub historical_max_runs: Option<u32>,
    /// Refresh cadence per auxiliary entity kind. Kinds absent here are never refreshed.
    #[serde(default)]
    pub auxiliary_refresh_mins: BTreeMap<EntityKind, u64>,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            full_scan_interval_mins: DEFAULT_FULL_SCAN_INTERVAL_MINS,
            onboarding_span_days: DEFAULT_ONBOARDING_SPAN_DAYS,
            backward_chunk_mins: DEFAULT_BACKWARD_CHUNK_MINS,
            historical_span_days: None,
            historical_chunk_mins: None,
            historical_max_runs: None,
            auxiliary_refresh_mins: BTreeMap::new(),
        }
    }
}

/// Partial [`ScanSettings`]: every `Some` field replaces the base value.
///
/// Used for connector sections of the config file and for per-trigger
/// overrides stored on the trigger record (e.g. a tenant that wants a
/// longer onboarding span).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_scan_interval_mins: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onboarding_span_days: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backward_chunk_mins: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub historical_span_days: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub historical_chunk_mins: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub historical_max_runs: Option<u32>,
    /// Merged entry-by-entry into the base map.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub auxiliary_refresh_mins: BTreeMap<EntityKind, u64>,
}

impl ScanSettings {
    /// Return a copy of `self` with `overrides` layered on top.
    pub fn with_overrides(&self, overrides: &ScanOverrides) -> ScanSettings {
        let mut merged = self.clone();
        if let Some(v) = overrides.full_scan_interval_mins {
            merged.full_scan_interval_mins = v;
        }
        if let Some(v) = overrides.onboarding_span_days {
            merged.onboarding_span_days = v;
        }
        if let Some(v) = overrides.backward_chunk_mins {
            merged.backward_chunk_mins = v;
        }
        if overrides.historical_span_days.is_some() {
            merged.historical_span_days = overrides.historical_span_days;
        }
        if overrides.historical_chunk_mins.is_some() {
            merged.historical_chunk_mins = overrides.historical_chunk_mins;
        }
        if overrides.historical_max_runs.is_some() {
            merged.historical_max_runs = overrides.historical_max_runs;
        }
        for (kind, mins) in &overrides.auxiliary_refresh_mins {
            merged.auxiliary_refresh_mins.insert(kind.clone(), *mins);
        }
        merged
    }
}

fn default_full_scan_interval_mins() -> u64 {
    DEFAULT_FULL_SCAN_INTERVAL_MINS
}
fn default_onboarding_span_days() -> u64 {
    DEFAULT_ONBOARDING_SPAN_DAYS
}
fn default_backward_chunk_mins() -> u64 {
    DEFAULT_BACKWARD_CHUNK_MINS
}
fn default_tick_secs() -> u64 {
    DEFAULT_TICK_SECS
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.scanline/scanline.db", home)
}

impl ScanlineConfig {
    /// Load config from a TOML file with SCANLINE_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.scanline/scanline.toml
    ///
    /// A missing file is not an error; every section has defaults.
    /// Nested keys use a double underscore:
    /// `SCANLINE_DEFAULTS__ONBOARDING_SPAN_DAYS=30`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        Self::extract(
            Figment::new()
                .merge(Toml::file(&path))
                .merge(Env::prefixed("SCANLINE_").split("__")),
        )
    }

    /// Parse config from an in-memory TOML document (no env overrides).
    pub fn from_toml_str(toml: &str) -> crate::error::Result<Self> {
        Self::extract(Figment::new().merge(Toml::string(toml)))
    }

    fn extract(figment: Figment) -> crate::error::Result<Self> {
        figment
            .extract()
            .map_err(|e| crate::error::ScanlineError::Config(e.to_string()))
    }

    /// Effective settings for a trigger of `connector`:
    /// defaults, then the connector section, then the trigger's own overrides.
    pub fn settings_for(&self, connector: &str, trigger: &ScanOverrides) -> ScanSettings {
        let base = match self.connectors.get(connector) {
            Some(section) => self.defaults.with_overrides(section),
            None => self.defaults.clone(),
        };
        base.with_overrides(trigger)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.scanline/scanline.toml", home)
}
