use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Half-open time range `[from, to)` handed to a connector query builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl ScanWindow {
    /// Build a window; `from` is clamped so the window is never inverted.
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            from: from.min(to),
            to,
        }
    }

    /// Zero-width window at `at`: the "nothing to do" signal.
    pub fn empty_at(at: DateTime<Utc>) -> Self {
        Self { from: at, to: at }
    }

    pub fn is_empty(&self) -> bool {
        self.from >= self.to
    }

    pub fn width(&self) -> Duration {
        self.to.signed_duration_since(self.from)
    }
}

/// Coarse scan classification persisted as `last_scan_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanType {
    Full,
    Partial,
}

impl std::fmt::Display for ScanType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ScanType::Full => "full",
            ScanType::Partial => "partial",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ScanType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "full" => Ok(ScanType::Full),
            "partial" => Ok(ScanType::Partial),
            other => Err(format!("unknown scan type: {other}")),
        }
    }
}

/// Why a window was chosen. Attached to the dispatched job for routing and
/// observability only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanClass {
    /// Reconciliation pass over the bounded recent horizon (cold start or due).
    Full,
    /// Incremental catch-up from the forward cursor to now.
    Forward,
    /// One chunk of onboarding backfill.
    Backward,
    /// One chunk of escalated deep backfill.
    Historical,
}

impl ScanClass {
    pub fn scan_type(&self) -> ScanType {
        match self {
            ScanClass::Full => ScanType::Full,
            _ => ScanType::Partial,
        }
    }

    pub fn is_partial(&self) -> bool {
        self.scan_type() == ScanType::Partial
    }

    /// Freeform labels for the job dispatcher.
    pub fn tags(&self) -> BTreeSet<String> {
        let labels: &[&str] = match self {
            ScanClass::Full => &["full"],
            ScanClass::Forward => &["partial", "forward"],
            ScanClass::Backward => &["partial", "backward"],
            ScanClass::Historical => &["partial", "backward", "historical"],
        };
        labels.iter().map(|s| s.to_string()).collect()
    }
}

impl std::fmt::Display for ScanClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ScanClass::Full => "full",
            ScanClass::Forward => "forward",
            ScanClass::Backward => "backward",
            ScanClass::Historical => "historical",
        };
        write!(f, "{s}")
    }
}

// --- time helpers ------------------------------------------------------------

/// `at - span`, pinned to the earliest representable instant instead of panicking.
pub(crate) fn saturating_back(at: DateTime<Utc>, span: Duration) -> DateTime<Utc> {
    at.checked_sub_signed(span)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// True once at least `interval` has passed between `since` and `now`.
pub(crate) fn elapsed_at_least(since: DateTime<Utc>, now: DateTime<Utc>, interval: Duration) -> bool {
    now.signed_duration_since(since) >= interval
}

/// The chunk directly below `cursor`, at most `chunk` wide, never below `floor`.
pub(crate) fn chunk_below(cursor: DateTime<Utc>, floor: DateTime<Utc>, chunk: Duration) -> ScanWindow {
    ScanWindow::new(saturating_back(cursor, chunk).max(floor), cursor)
}
