use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use scanline_core::EntityKind;

use crate::{config::TriggerConfig, state::ScanCursorState, window::elapsed_at_least};

/// Periodic refresh check for auxiliary entity kinds.
///
/// Auxiliary entities ride along with whatever main window is dispatched but
/// are refreshed wholesale on their own cadence; nothing here influences the
/// main cursor decision.
#[derive(Debug, Clone, Copy)]
pub struct AuxiliaryGate<'a> {
    config: &'a TriggerConfig,
}

impl<'a> AuxiliaryGate<'a> {
    pub fn new(config: &'a TriggerConfig) -> Self {
        Self { config }
    }

    /// Whether `kind` should be requested in this invocation's job.
    pub fn due(&self, kind: &EntityKind, last_scan_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        is_due(last_scan_at, self.config.refresh_interval(kind), now)
    }

    /// Evaluate every configured kind against `state`.
    pub fn plan(&self, state: &ScanCursorState, now: DateTime<Utc>) -> AuxiliaryPlan {
        let due = self
            .config
            .auxiliary_refresh
            .keys()
            .filter(|kind| self.due(kind, state.last_auxiliary_scan_at.get(*kind).copied(), now))
            .cloned()
            .collect();
        AuxiliaryPlan {
            configured: self.config.auxiliary_refresh.keys().cloned().collect(),
            due,
        }
    }
}

/// The bare threshold check.
///
/// Never scanned ⇒ due. No refresh interval ⇒ never due. A timestamp in
/// the future is distrusted and treated as due.
pub fn is_due(
    last_scan_at: Option<DateTime<Utc>>,
    refresh_interval: Option<Duration>,
    now: DateTime<Utc>,
) -> bool {
    let Some(interval) = refresh_interval else {
        return false;
    };
    match last_scan_at {
        None => true,
        Some(at) if at > now => true,
        Some(at) => elapsed_at_least(at, now, interval),
    }
}

/// Which auxiliary kinds fire in this invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuxiliaryPlan {
    configured: BTreeSet<EntityKind>,
    due: BTreeSet<EntityKind>,
}

impl AuxiliaryPlan {
    pub fn is_due(&self, kind: &EntityKind) -> bool {
        self.due.contains(kind)
    }

    pub fn due(&self) -> impl Iterator<Item = &EntityKind> {
        self.due.iter()
    }

    /// Every kind the trigger refreshes, due or not.
    pub fn configured(&self) -> impl Iterator<Item = &EntityKind> {
        self.configured.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.due.is_empty()
    }

    /// Stamp `now` for every kind that fired; other entries are left untouched.
    pub fn apply(&self, state: &ScanCursorState, now: DateTime<Utc>) -> ScanCursorState {
        let mut next = state.clone();
        for kind in &self.due {
            next.last_auxiliary_scan_at.insert(kind.clone(), now);
        }
        next
    }
}
