use chrono::{DateTime, Utc};
use dashmap::DashMap;
use scanline_core::{ScanOverrides, TriggerId};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, RunnerError};

/// Default firing frequency for newly registered triggers.
pub const DEFAULT_FREQUENCY_MINS: u64 = 60;

/// A configured connector instance that is fired periodically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerRecord {
    pub id: TriggerId,
    /// Connector name (`"jira"`, `"github"`, ...); selects the config section.
    pub connector: String,
    /// The integration this trigger ingests for.
    pub integration_id: String,
    /// Anchors the onboarding horizon.
    pub created_at: DateTime<Utc>,
    /// Minutes between firings. `0` means paused.
    pub frequency_mins: u64,
    #[serde(default)]
    pub overrides: ScanOverrides,
}

impl TriggerRecord {
    pub fn new(
        connector: impl Into<String>,
        integration_id: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TriggerId::new(),
            connector: connector.into(),
            integration_id: integration_id.into(),
            created_at,
            frequency_mins: DEFAULT_FREQUENCY_MINS,
            overrides: ScanOverrides::default(),
        }
    }

    pub fn with_id(mut self, id: impl Into<TriggerId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_frequency(mut self, mins: u64) -> Self {
        self.frequency_mins = mins;
        self
    }

    pub fn with_overrides(mut self, overrides: ScanOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn is_paused(&self) -> bool {
        self.frequency_mins == 0
    }
}

/// Where the firing loop finds the triggers it should consider.
pub trait TriggerSource: Send + Sync {
    fn triggers(&self) -> Result<Vec<TriggerRecord>>;
}

/// In-process trigger registry.
#[derive(Default)]
pub struct TriggerRegistry {
    triggers: DashMap<TriggerId, TriggerRecord>,
}

impl TriggerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a trigger.
    pub fn register(&self, trigger: TriggerRecord) {
        info!(trigger_id = %trigger.id, connector = %trigger.connector, "trigger registered");
        self.triggers.insert(trigger.id.clone(), trigger);
    }

    pub fn get(&self, id: &TriggerId) -> Option<TriggerRecord> {
        self.triggers.get(id).map(|t| t.value().clone())
    }

    pub fn remove(&self, id: &TriggerId) -> Result<TriggerRecord> {
        self.triggers
            .remove(id)
            .map(|(_, t)| t)
            .ok_or_else(|| not_found(id))
    }

    /// Stop firing without forgetting the trigger.
    pub fn pause(&self, id: &TriggerId) -> Result<()> {
        self.set_frequency(id, 0)?;
        info!(trigger_id = %id, "trigger paused");
        Ok(())
    }

    pub fn resume(&self, id: &TriggerId, frequency_mins: u64) -> Result<()> {
        self.set_frequency(id, frequency_mins.max(1))?;
        info!(trigger_id = %id, frequency_mins, "trigger resumed");
        Ok(())
    }

    fn set_frequency(&self, id: &TriggerId, mins: u64) -> Result<()> {
        let mut entry = self.triggers.get_mut(id).ok_or_else(|| not_found(id))?;
        entry.frequency_mins = mins;
        Ok(())
    }
}

impl TriggerSource for TriggerRegistry {
    fn triggers(&self) -> Result<Vec<TriggerRecord>> {
        let mut all: Vec<TriggerRecord> = self.triggers.iter().map(|t| t.value().clone()).collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }
}

fn not_found(id: &TriggerId) -> RunnerError {
    RunnerError::TriggerNotFound { id: id.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(id: &str) -> TriggerRecord {
        TriggerRecord::new("jira", "int-7", Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
            .with_id(id)
    }

    #[test]
    fn pause_and_resume() {
        let registry = TriggerRegistry::new();
        registry.register(record("a"));
        let id = TriggerId::from("a");

        registry.pause(&id).unwrap();
        assert!(registry.get(&id).unwrap().is_paused());

        registry.resume(&id, 0).unwrap();
        assert_eq!(registry.get(&id).unwrap().frequency_mins, 1);
    }

    #[test]
    fn unknown_trigger_is_reported() {
        let registry = TriggerRegistry::new();
        let err = registry.pause(&TriggerId::from("ghost")).unwrap_err();
        assert!(matches!(err, RunnerError::TriggerNotFound { ref id } if id == "ghost"));
        assert!(registry.remove(&TriggerId::from("ghost")).is_err());
    }

    #[test]
    fn listing_is_ordered_by_id() {
        let registry = TriggerRegistry::new();
        registry.register(record("b"));
        registry.register(record("a"));
        let ids: Vec<String> = registry
            .triggers()
            .unwrap()
            .into_iter()
            .map(|t| t.id.to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
