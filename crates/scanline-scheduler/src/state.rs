use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use scanline_core::EntityKind;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::window::ScanType;

/// Keys owned by the scheduler. Everything else in a metadata blob belongs
/// to the runner and is carried through untouched.
pub const KNOWN_KEYS: [&str; 10] = [
    "forward_cursor",
    "backward_cursor",
    "onboarding_complete",
    "last_scan_type",
    "last_full_scan_at",
    "last_auxiliary_scan_at",
    "historical_mode",
    "historical_forward_cursor",
    "historical_backward_cursor",
    "historical_consecutive_count",
];

/// Escalation state machine: `off → armed → active → off`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoricalMode {
    #[default]
    Off,
    /// Start historical backfill on the next invocation.
    Armed,
    /// Currently backfilling.
    Active,
}

/// The entire persisted scheduling metadata for one trigger.
///
/// Produced fresh by every decision; never patched field by field.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScanCursorState {
    /// Newest instant already scanned going forward. `None` ⇒ never run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forward_cursor: Option<DateTime<Utc>>,
    /// Oldest instant already reached going backward.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backward_cursor: Option<DateTime<Utc>>,
    /// Set once onboarding backfill has reached the onboarding horizon.
    /// Later FULL scans move the backward cursor but never reopen backfill.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub onboarding_complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_scan_type: Option<ScanType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_full_scan_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub last_auxiliary_scan_at: BTreeMap<EntityKind, DateTime<Utc>>,
    #[serde(default)]
    pub historical_mode: HistoricalMode,
    /// Activation instant of the current historical sweep.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub historical_forward_cursor: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub historical_backward_cursor: Option<DateTime<Utc>>,
    #[serde(default)]
    pub historical_consecutive_count: u32,
    /// Runner-specific fields, passed through verbatim.
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

/// Result of decoding a persisted blob.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub state: ScanCursorState,
    /// The blob could not be read; `state` is a cold start that still
    /// carries the blob's unknown keys.
    pub malformed: bool,
}

/// A correction applied to persisted state before deciding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateRepair {
    /// A cursor pointed past `now`.
    CursorInFuture,
    /// The backward cursor was newer than the forward cursor.
    BackwardAheadOfForward,
    /// Only part of the cursor pair was present.
    IncompleteCursorPair,
    /// `last_full_scan_at` pointed past `now`.
    FullScanInFuture,
    /// An auxiliary timestamp pointed past `now`; the entry was dropped.
    AuxiliaryInFuture(EntityKind),
    /// Historical mode was set on a trigger without historical configuration.
    HistoricalUnconfigured,
    /// The active historical cursor pair was missing or inconsistent.
    HistoricalReseeded,
}

impl std::fmt::Display for StateRepair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateRepair::CursorInFuture => write!(f, "cursor in the future; cold start"),
            StateRepair::BackwardAheadOfForward => {
                write!(f, "backward cursor ahead of forward cursor; cold start")
            }
            StateRepair::IncompleteCursorPair => write!(f, "incomplete cursor pair; cold start"),
            StateRepair::FullScanInFuture => write!(f, "last full scan in the future; cold start"),
            StateRepair::AuxiliaryInFuture(kind) => {
                write!(f, "auxiliary `{kind}` scanned in the future; refreshing")
            }
            StateRepair::HistoricalUnconfigured => {
                write!(f, "historical mode set without historical config; disabled")
            }
            StateRepair::HistoricalReseeded => {
                write!(f, "historical cursors inconsistent; reseeded")
            }
        }
    }
}

impl ScanCursorState {
    /// Decode an opaque metadata map. Never fails: an unreadable blob is a
    /// cold start (flagged via [`Decoded::malformed`]).
    pub fn decode(map: &Map<String, Value>) -> Decoded {
        match serde_json::from_value::<ScanCursorState>(Value::Object(map.clone())) {
            Ok(state) => Decoded {
                state,
                malformed: false,
            },
            Err(_) => {
                let extensions = map
                    .iter()
                    .filter(|(k, _)| !KNOWN_KEYS.contains(&k.as_str()))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                Decoded {
                    state: ScanCursorState {
                        extensions,
                        ..Default::default()
                    },
                    malformed: true,
                }
            }
        }
    }

    /// Encode into the flat map the metadata store persists.
    pub fn encode(&self) -> serde_json::Result<Map<String, Value>> {
        serde_json::to_value(self).and_then(serde_json::from_value)
    }

    pub fn is_cold(&self) -> bool {
        self.forward_cursor.is_none()
    }

    /// Copy with the historical sub-state dropped back to `off`.
    pub(crate) fn without_historical(&self) -> ScanCursorState {
        ScanCursorState {
            historical_mode: HistoricalMode::Off,
            historical_forward_cursor: None,
            historical_backward_cursor: None,
            historical_consecutive_count: 0,
            ..self.clone()
        }
    }

    /// Clamp malformed fields to safe defaults relative to `now`.
    ///
    /// A broken ordinary cursor pair becomes a cold start; a broken
    /// historical pair is reseeded; future auxiliary stamps are dropped.
    pub(crate) fn sanitized(
        &self,
        now: DateTime<Utc>,
        historical_configured: bool,
    ) -> (ScanCursorState, Vec<StateRepair>) {
        let mut state = self.clone();
        let mut repairs = Vec::new();

        if let Some(repair) = ordinary_defect(&state, now) {
            state.forward_cursor = None;
            state.backward_cursor = None;
            state.onboarding_complete = false;
            state.last_scan_type = None;
            state.last_full_scan_at = None;
            repairs.push(repair);
        }

        let stale: Vec<EntityKind> = state
            .last_auxiliary_scan_at
            .iter()
            .filter(|(_, at)| **at > now)
            .map(|(kind, _)| kind.clone())
            .collect();
        for kind in stale {
            state.last_auxiliary_scan_at.remove(&kind);
            repairs.push(StateRepair::AuxiliaryInFuture(kind));
        }

        match state.historical_mode {
            HistoricalMode::Off => {
                // Leftovers from an interrupted sweep carry no meaning once off.
                state = state.without_historical();
            }
            HistoricalMode::Armed | HistoricalMode::Active if !historical_configured => {
                state = state.without_historical();
                repairs.push(StateRepair::HistoricalUnconfigured);
            }
            HistoricalMode::Armed => {}
            HistoricalMode::Active => {
                let consistent = matches!(
                    (state.historical_forward_cursor, state.historical_backward_cursor),
                    (Some(f), Some(b)) if b <= f && f <= now
                );
                if !consistent {
                    state.historical_forward_cursor = None;
                    state.historical_backward_cursor = None;
                    repairs.push(StateRepair::HistoricalReseeded);
                }
            }
        }

        (state, repairs)
    }
}

fn ordinary_defect(state: &ScanCursorState, now: DateTime<Utc>) -> Option<StateRepair> {
    match (state.forward_cursor, state.backward_cursor) {
        (Some(f), _) if f > now => Some(StateRepair::CursorInFuture),
        (_, Some(b)) if b > now => Some(StateRepair::CursorInFuture),
        (Some(f), Some(b)) if b > f => Some(StateRepair::BackwardAheadOfForward),
        (Some(_), None) | (None, Some(_)) => Some(StateRepair::IncompleteCursorPair),
        (None, None)
            if state.last_full_scan_at.is_some()
                || state.last_scan_type.is_some()
                || state.onboarding_complete =>
        {
            Some(StateRepair::IncompleteCursorPair)
        }
        _ => match state.last_full_scan_at {
            Some(at) if at > now => Some(StateRepair::FullScanInFuture),
            _ => None,
        },
    }
}
