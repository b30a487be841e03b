use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};

use crate::{
    config::TriggerConfig,
    error::Result,
    historical::{Escalation, HistoricalBackfillEscalation},
    state::{ScanCursorState, StateRepair},
    window::{chunk_below, elapsed_at_least, saturating_back, ScanClass, ScanType, ScanWindow},
};

/// Outcome of one scheduling decision.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    /// Time bounds for the connector query.
    pub window: ScanWindow,
    pub class: ScanClass,
    /// State to persist once the job has been dispatched.
    pub state: ScanCursorState,
    /// Corrections applied to the incoming state, for the caller to log.
    pub repairs: Vec<StateRepair>,
}

impl Decision {
    /// Nothing new to scan: the runner must skip dispatch entirely.
    pub fn is_noop(&self) -> bool {
        self.class.is_partial() && self.window.is_empty()
    }

    pub fn is_partial(&self) -> bool {
        self.class.is_partial()
    }

    pub fn tags(&self) -> BTreeSet<String> {
        self.class.tags()
    }
}

/// Parameters for one instance of the cursor algorithm.
///
/// The ordinary scheduler and the historical escalation are two instances
/// with different spans; the escalation never schedules FULL scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CursorPass {
    pub span: Duration,
    pub chunk: Duration,
    /// `None` means a FULL scan is never due.
    pub full_interval: Option<Duration>,
}

impl CursorPass {
    /// Oldest instant this pass ever reaches when anchored at `anchor`.
    pub fn horizon(&self, anchor: DateTime<Utc>) -> DateTime<Utc> {
        saturating_back(anchor, self.span)
    }

    pub fn full_due(&self, last_full_scan_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match (self.full_interval, last_full_scan_at) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(interval), Some(at)) => elapsed_at_least(at, now, interval),
        }
    }

    /// `[max(horizon, now - span), now]`
    pub fn full_window(&self, now: DateTime<Utc>, horizon: DateTime<Utc>) -> ScanWindow {
        ScanWindow::new(saturating_back(now, self.span).max(horizon), now)
    }

    /// Next backward chunk below `backward`, or `None` once `horizon` is reached.
    pub fn backward_chunk(&self, backward: DateTime<Utc>, horizon: DateTime<Utc>) -> Option<ScanWindow> {
        (backward > horizon).then(|| chunk_below(backward, horizon, self.chunk))
    }
}

/// Pure decision function over persisted cursor state.
///
/// Holds only immutable configuration; safe to share across threads and to
/// call for any number of triggers concurrently.
#[derive(Debug, Clone)]
pub struct CursorScheduler {
    config: TriggerConfig,
    ordinary: CursorPass,
    escalation: Option<HistoricalBackfillEscalation>,
}

impl CursorScheduler {
    /// Validate `config` and build a scheduler. This is the only fallible step.
    pub fn new(config: TriggerConfig) -> Result<Self> {
        config.validate()?;
        let ordinary = CursorPass {
            span: config.onboarding_span,
            chunk: config.backward_chunk_span,
            full_interval: Some(config.full_scan_interval),
        };
        let escalation = config.historical.as_ref().map(HistoricalBackfillEscalation::new);
        Ok(Self {
            config,
            ordinary,
            escalation,
        })
    }

    pub fn config(&self) -> &TriggerConfig {
        &self.config
    }

    /// Oldest instant ordinary scans reach: `onboarding_span` before the
    /// trigger was created. A creation time in the future counts as `now`.
    pub fn onboarding_horizon(
        &self,
        trigger_created_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> DateTime<Utc> {
        self.ordinary.horizon(trigger_created_at.min(now))
    }

    /// Decide the next window for a trigger.
    ///
    /// Priority: cold start, due FULL scan, active historical chunk, onboarding
    /// backfill, forward catch-up. A zero-width forward window means there is
    /// nothing to do; its state equals the (sanitized) input.
    pub fn next(
        &self,
        state: &ScanCursorState,
        now: DateTime<Utc>,
        trigger_created_at: DateTime<Utc>,
    ) -> Decision {
        let horizon = self.onboarding_horizon(trigger_created_at, now);
        let (mut state, repairs) = state.sanitized(now, self.escalation.is_some());

        if let Some(escalation) = &self.escalation {
            let ordinary_first =
                state.is_cold() || self.ordinary.full_due(state.last_full_scan_at, now);
            match escalation.advance(&state, now, horizon, ordinary_first) {
                Escalation::Chunk { window, state } => {
                    return Decision {
                        window,
                        class: ScanClass::Historical,
                        state,
                        repairs,
                    };
                }
                Escalation::Idle(next) => state = next,
            }
        }

        let (window, class, state) = self.ordinary_step(state, now, horizon);
        Decision {
            window,
            class,
            state,
            repairs,
        }
    }

    fn ordinary_step(
        &self,
        state: ScanCursorState,
        now: DateTime<Utc>,
        horizon: DateTime<Utc>,
    ) -> (ScanWindow, ScanClass, ScanCursorState) {
        let Some(forward) = state.forward_cursor else {
            return self.full_scan(state, now, horizon);
        };

        // Reconciliation subsumes both backfill and catch-up.
        if self.ordinary.full_due(state.last_full_scan_at, now) {
            return self.full_scan(state, now, horizon);
        }

        // Onboarding backfill runs once per trigger. The forward cursor stays
        // put meanwhile so the first forward window closes the gap.
        let pending = (!state.onboarding_complete)
            .then_some(state.backward_cursor)
            .flatten()
            .and_then(|backward| self.ordinary.backward_chunk(backward, horizon));
        if let Some(window) = pending {
            let next = ScanCursorState {
                backward_cursor: Some(window.from),
                onboarding_complete: window.from <= horizon,
                last_scan_type: Some(ScanType::Partial),
                ..state
            };
            return (window, ScanClass::Backward, next);
        }

        let window = ScanWindow::new(forward, now);
        if window.is_empty() {
            return (window, ScanClass::Forward, state);
        }
        let next = ScanCursorState {
            forward_cursor: Some(now),
            onboarding_complete: true,
            last_scan_type: Some(ScanType::Partial),
            ..state
        };
        (window, ScanClass::Forward, next)
    }

    fn full_scan(
        &self,
        state: ScanCursorState,
        now: DateTime<Utc>,
        horizon: DateTime<Utc>,
    ) -> (ScanWindow, ScanClass, ScanCursorState) {
        let window = self.ordinary.full_window(now, horizon);
        let next = ScanCursorState {
            forward_cursor: Some(now),
            backward_cursor: Some(window.from),
            onboarding_complete: state.onboarding_complete || window.from <= horizon,
            last_scan_type: Some(ScanType::Full),
            last_full_scan_at: Some(now),
            ..state
        };
        (window, ScanClass::Full, next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::HistoricalConfig, state::HistoricalMode};
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap()
    }

    fn scheduler() -> CursorScheduler {
        CursorScheduler::new(TriggerConfig::new(
            Duration::days(14),
            Duration::days(14),
            Duration::days(5),
        ))
        .expect("valid config")
    }

    #[test]
    fn invalid_config_is_rejected_at_construction() {
        let config = TriggerConfig::new(Duration::days(14), Duration::days(14), Duration::zero());
        assert!(CursorScheduler::new(config).is_err());
    }

    #[test]
    fn first_call_onboards_the_full_span() {
        let s = scheduler();
        let d = s.next(&ScanCursorState::default(), t0(), t0());

        assert_eq!(d.class, ScanClass::Full);
        assert_eq!(d.window, ScanWindow::new(t0() - Duration::days(14), t0()));
        assert_eq!(d.state.forward_cursor, Some(t0()));
        assert_eq!(d.state.backward_cursor, Some(t0() - Duration::days(14)));
        assert_eq!(d.state.last_full_scan_at, Some(t0()));
        assert_eq!(d.state.last_scan_type, Some(ScanType::Full));
        assert!(d.repairs.is_empty());
    }

    #[test]
    fn second_call_scans_forward_only() {
        let s = scheduler();
        let first = s.next(&ScanCursorState::default(), t0(), t0());
        let later = t0() + Duration::hours(1);
        let d = s.next(&first.state, later, t0());

        assert_eq!(d.class, ScanClass::Forward);
        assert_eq!(d.window, ScanWindow::new(t0(), later));
        assert_eq!(d.state.forward_cursor, Some(later));
        assert_eq!(d.state.backward_cursor, first.state.backward_cursor);
        assert_eq!(d.state.last_full_scan_at, Some(t0()));
    }

    #[test]
    fn unchanged_clock_is_a_noop() {
        let s = scheduler();
        let first = s.next(&ScanCursorState::default(), t0(), t0());
        let d = s.next(&first.state, t0(), t0());

        assert!(d.is_noop());
        assert!(d.window.is_empty());
        assert_eq!(d.state, first.state);
    }

    #[test]
    fn late_first_run_backfills_towards_the_horizon() {
        let s = scheduler();
        let created = t0();
        let now = created + Duration::days(10);
        let first = s.next(&ScanCursorState::default(), now, created);
        assert_eq!(first.window.from, now - Duration::days(14));

        let later = now + Duration::minutes(30);
        let d = s.next(&first.state, later, created);
        assert_eq!(d.class, ScanClass::Backward);
        assert_eq!(
            d.window,
            ScanWindow::new(now - Duration::days(19), now - Duration::days(14))
        );
        assert_eq!(d.state.backward_cursor, Some(now - Duration::days(19)));
        assert_eq!(d.state.forward_cursor, Some(now));
        assert!(!d.state.onboarding_complete);
        assert!(d.is_partial());
    }

    #[test]
    fn last_backfill_chunk_is_clamped_at_horizon() {
        let s = scheduler();
        let created = t0();
        let horizon = created - Duration::days(14);
        let state = ScanCursorState {
            forward_cursor: Some(created),
            backward_cursor: Some(horizon + Duration::days(2)),
            last_full_scan_at: Some(created),
            last_scan_type: Some(ScanType::Partial),
            ..Default::default()
        };
        let d = s.next(&state, created + Duration::hours(2), created);
        assert_eq!(d.class, ScanClass::Backward);
        assert_eq!(d.window.from, horizon);
        assert_eq!(d.window.width(), Duration::days(2));
    }

    #[test]
    fn due_full_scan_beats_pending_backfill() {
        let s = scheduler();
        let created = t0();
        let now = created + Duration::days(30);
        let state = ScanCursorState {
            forward_cursor: Some(now - Duration::hours(1)),
            backward_cursor: Some(created),
            last_full_scan_at: Some(now - Duration::days(14)),
            last_scan_type: Some(ScanType::Partial),
            ..Default::default()
        };
        let d = s.next(&state, now, created);
        assert_eq!(d.class, ScanClass::Full);
        assert_eq!(d.window, ScanWindow::new(now - Duration::days(14), now));
        assert_eq!(d.state.backward_cursor, Some(now - Duration::days(14)));
        assert_eq!(d.state.last_full_scan_at, Some(now));
    }

    #[test]
    fn full_scan_after_onboarding_does_not_reopen_backfill() {
        let s = scheduler();
        let created = t0();
        let first = s.next(&ScanCursorState::default(), created, created);
        assert!(first.state.onboarding_complete);

        let later = created + Duration::days(40);
        let full = s.next(&first.state, later, created);
        assert_eq!(full.class, ScanClass::Full);
        assert_eq!(full.state.backward_cursor, Some(later - Duration::days(14)));
        assert!(full.state.onboarding_complete);

        let d = s.next(&full.state, later + Duration::hours(1), created);
        assert_eq!(d.class, ScanClass::Forward);
        assert_eq!(d.window, ScanWindow::new(later, later + Duration::hours(1)));
    }

    #[test]
    fn backfill_keeps_forward_cursor_until_onboarded() {
        let s = scheduler();
        let created = t0();
        let first_run = created + Duration::days(6);
        let mut d = s.next(&ScanCursorState::default(), first_run, created);
        let mut now = first_run;
        while !d.state.onboarding_complete {
            now += Duration::hours(1);
            d = s.next(&d.state, now, created);
            assert_eq!(d.class, ScanClass::Backward);
            assert_eq!(d.state.forward_cursor, Some(first_run));
        }
        now += Duration::hours(1);
        let d = s.next(&d.state, now, created);
        assert_eq!(d.class, ScanClass::Forward);
        assert_eq!(d.window.from, first_run);
    }

    #[test]
    fn due_full_scan_on_last_historical_run_ends_escalation() {
        let s = CursorScheduler::new(
            TriggerConfig::new(Duration::days(14), Duration::days(14), Duration::days(5))
                .with_historical(HistoricalConfig {
                    span: Duration::days(365),
                    chunk_span: Duration::days(7),
                    max_consecutive_runs: 3,
                }),
        )
        .expect("valid config");
        let created = t0() - Duration::days(60);
        let now = t0();
        let state = ScanCursorState {
            forward_cursor: Some(now - Duration::hours(1)),
            backward_cursor: Some(created - Duration::days(14)),
            onboarding_complete: true,
            last_full_scan_at: Some(now - Duration::days(14)),
            last_scan_type: Some(ScanType::Partial),
            historical_mode: HistoricalMode::Active,
            historical_forward_cursor: Some(now - Duration::days(1)),
            historical_backward_cursor: Some(now - Duration::days(120)),
            historical_consecutive_count: 2,
            ..Default::default()
        };

        let d = s.next(&state, now, created);
        assert_eq!(d.class, ScanClass::Full);
        assert_eq!(d.state.historical_mode, HistoricalMode::Off);
        assert_eq!(d.state.historical_consecutive_count, 0);
        assert!(d.state.historical_forward_cursor.is_none());
        assert!(d.state.historical_backward_cursor.is_none());
    }

    #[test]
    fn missing_last_full_scan_forces_full() {
        let s = scheduler();
        let state = ScanCursorState {
            forward_cursor: Some(t0()),
            backward_cursor: Some(t0() - Duration::days(14)),
            ..Default::default()
        };
        let d = s.next(&state, t0() + Duration::hours(1), t0());
        assert_eq!(d.class, ScanClass::Full);
    }

    #[test]
    fn malformed_state_is_treated_as_cold_start() {
        let s = scheduler();
        let state = ScanCursorState {
            forward_cursor: Some(t0() + Duration::days(3)),
            backward_cursor: Some(t0() + Duration::days(2)),
            last_full_scan_at: Some(t0()),
            ..Default::default()
        };
        let d = s.next(&state, t0(), t0());
        assert_eq!(d.class, ScanClass::Full);
        assert_eq!(d.state.forward_cursor, Some(t0()));
        assert_eq!(d.repairs, vec![StateRepair::CursorInFuture]);
    }

    #[test]
    fn creation_in_the_future_counts_as_now() {
        let s = scheduler();
        let d = s.next(&ScanCursorState::default(), t0(), t0() + Duration::days(2));
        assert_eq!(d.window, ScanWindow::new(t0() - Duration::days(14), t0()));
    }

    #[test]
    fn extensions_are_carried_into_the_new_state() {
        let s = scheduler();
        let mut state = ScanCursorState::default();
        state
            .extensions
            .insert("cursor_hint".into(), serde_json::json!("abc"));
        let d = s.next(&state, t0(), t0());
        assert_eq!(d.state.extensions["cursor_hint"], serde_json::json!("abc"));
    }
}
