use std::collections::BTreeMap;

use chrono::Duration;
use scanline_core::{EntityKind, ScanSettings};

use crate::error::{Result, SchedulerError};

/// Upper bound for any configured span: a hundred years of history is
/// already far beyond what any external system retains.
pub const MAX_SPAN_DAYS: i64 = 36_500;

/// Typed, validated scan cadence for one trigger.
///
/// Built either directly (tests, embedders) or from the operator-facing
/// [`ScanSettings`]; [`crate::CursorScheduler::new`] validates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerConfig {
    /// Minimum time between two FULL scans.
    pub full_scan_interval: Duration,
    /// How far back the first scan reaches.
    pub onboarding_span: Duration,
    /// Max width of one backward sub-job.
    pub backward_chunk_span: Duration,
    /// Deep-backfill parameters. `None` disables escalation for the trigger.
    pub historical: Option<HistoricalConfig>,
    /// Independent refresh cadence per auxiliary entity kind.
    pub auxiliary_refresh: BTreeMap<EntityKind, Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoricalConfig {
    /// Total depth of the historical sweep, measured from the activation instant.
    pub span: Duration,
    /// Max width of one historical sub-job.
    pub chunk_span: Duration,
    /// Safety valve: consecutive active invocations before escalation gives up.
    pub max_consecutive_runs: u32,
}

impl TriggerConfig {
    pub fn new(
        full_scan_interval: Duration,
        onboarding_span: Duration,
        backward_chunk_span: Duration,
    ) -> Self {
        Self {
            full_scan_interval,
            onboarding_span,
            backward_chunk_span,
            historical: None,
            auxiliary_refresh: BTreeMap::new(),
        }
    }

    pub fn with_historical(mut self, historical: HistoricalConfig) -> Self {
        self.historical = Some(historical);
        self
    }

    pub fn with_auxiliary(mut self, kind: EntityKind, refresh_interval: Duration) -> Self {
        self.auxiliary_refresh.insert(kind, refresh_interval);
        self
    }

    /// Refresh interval for `kind`, if the trigger refreshes it at all.
    pub fn refresh_interval(&self, kind: &EntityKind) -> Option<Duration> {
        self.auxiliary_refresh.get(kind).copied()
    }

    /// Convert operator-facing settings (minutes / days) into a typed config.
    ///
    /// The historical trio must be configured together: a span without a
    /// chunk size (or a run cap) cannot be driven safely.
    pub fn from_settings(settings: &ScanSettings) -> Result<Self> {
        let mut config = TriggerConfig::new(
            minutes("full_scan_interval_mins", settings.full_scan_interval_mins)?,
            days("onboarding_span_days", settings.onboarding_span_days)?,
            minutes("backward_chunk_mins", settings.backward_chunk_mins)?,
        );

        config.historical = match (
            settings.historical_span_days,
            settings.historical_chunk_mins,
            settings.historical_max_runs,
        ) {
            (None, None, None) => None,
            (Some(span), Some(chunk), Some(max_runs)) => Some(HistoricalConfig {
                span: days("historical_span_days", span)?,
                chunk_span: minutes("historical_chunk_mins", chunk)?,
                max_consecutive_runs: max_runs,
            }),
            _ => {
                return Err(SchedulerError::invalid(
                    "historical",
                    "historical_span_days, historical_chunk_mins and historical_max_runs \
                     must be set together",
                ))
            }
        };

        for (kind, mins) in &settings.auxiliary_refresh_mins {
            config
                .auxiliary_refresh
                .insert(kind.clone(), minutes("auxiliary_refresh_mins", *mins)?);
        }

        Ok(config)
    }

    /// Reject configurations the scheduler cannot honour.
    pub fn validate(&self) -> Result<()> {
        check_span("full_scan_interval", self.full_scan_interval)?;
        check_span("onboarding_span", self.onboarding_span)?;
        check_span("backward_chunk_span", self.backward_chunk_span)?;

        if let Some(historical) = &self.historical {
            check_span("historical_span", historical.span)?;
            check_span("historical_chunk_span", historical.chunk_span)?;
            if historical.max_consecutive_runs == 0 {
                return Err(SchedulerError::invalid(
                    "historical_max_consecutive_runs",
                    "must be at least 1",
                ));
            }
        }

        for (kind, interval) in &self.auxiliary_refresh {
            if *interval <= Duration::zero() {
                return Err(SchedulerError::invalid(
                    "auxiliary_refresh",
                    format!("refresh interval for `{kind}` must be positive"),
                ));
            }
        }
        Ok(())
    }
}

fn check_span(field: &'static str, span: Duration) -> Result<()> {
    if span <= Duration::zero() {
        return Err(SchedulerError::invalid(field, "must be positive"));
    }
    if span > Duration::days(MAX_SPAN_DAYS) {
        return Err(SchedulerError::invalid(
            field,
            format!("must not exceed {MAX_SPAN_DAYS} days"),
        ));
    }
    Ok(())
}

fn minutes(field: &'static str, value: u64) -> Result<Duration> {
    i64::try_from(value)
        .ok()
        .and_then(Duration::try_minutes)
        .ok_or_else(|| SchedulerError::invalid(field, format!("{value} minutes is out of range")))
}

fn days(field: &'static str, value: u64) -> Result<Duration> {
    i64::try_from(value)
        .ok()
        .and_then(Duration::try_days)
        .ok_or_else(|| SchedulerError::invalid(field, format!("{value} days is out of range")))
}
