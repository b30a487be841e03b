//! Escalated deep backfill.
//!
//! A second instance of the cursor algorithm, driven with the historical span
//! and chunk size and with FULL scans switched off. It sweeps backward from
//! the point ordinary scans already cover (the onboarding horizon) down to
//! `activation - historical span`, one chunk per invocation, and hands
//! control back to the ordinary scheduler when the sweep is exhausted or the
//! consecutive-run cap is hit. Its cursor pair is discarded on exit and never
//! merged into the ordinary pair.

use chrono::{DateTime, Utc};

use crate::{
    config::HistoricalConfig,
    engine::CursorPass,
    state::{HistoricalMode, ScanCursorState},
    window::ScanWindow,
};

/// What the escalation did with one invocation.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Escalation {
    /// No historical chunk this time; the ordinary scheduler decides on this state.
    Idle(ScanCursorState),
    /// Dispatch this historical chunk.
    Chunk {
        window: ScanWindow,
        state: ScanCursorState,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoricalBackfillEscalation {
    pass: CursorPass,
    max_consecutive_runs: u32,
}

impl HistoricalBackfillEscalation {
    pub fn new(config: &HistoricalConfig) -> Self {
        Self {
            pass: CursorPass {
                span: config.span,
                chunk: config.chunk_span,
                full_interval: None,
            },
            max_consecutive_runs: config.max_consecutive_runs,
        }
    }

    /// Operator request: start a deep backfill on the next invocation.
    ///
    /// Arming an already armed or active trigger is a no-op.
    pub fn arm(state: &ScanCursorState) -> ScanCursorState {
        match state.historical_mode {
            HistoricalMode::Off => ScanCursorState {
                historical_mode: HistoricalMode::Armed,
                ..state.without_historical()
            },
            HistoricalMode::Armed | HistoricalMode::Active => state.clone(),
        }
    }

    /// Operator request: abandon any pending or running deep backfill.
    pub fn disarm(state: &ScanCursorState) -> ScanCursorState {
        state.without_historical()
    }

    /// Drive one invocation.
    ///
    /// `ordinary_horizon` is the oldest instant ordinary scans cover; the
    /// sweep starts there. When `ordinary_first` is set (cold start or due
    /// FULL scan) the ordinary scheduler keeps priority: the historical pair
    /// is left alone but the invocation still counts toward the cap, so
    /// escalation always ends within `max_consecutive_runs` invocations.
    pub(crate) fn advance(
        &self,
        state: &ScanCursorState,
        now: DateTime<Utc>,
        ordinary_horizon: DateTime<Utc>,
        ordinary_first: bool,
    ) -> Escalation {
        let mut state = match state.historical_mode {
            HistoricalMode::Off => return Escalation::Idle(state.clone()),
            HistoricalMode::Armed => ScanCursorState {
                historical_mode: HistoricalMode::Active,
                ..state.without_historical()
            },
            HistoricalMode::Active => state.clone(),
        };

        let (anchor, backward) = match (
            state.historical_forward_cursor,
            state.historical_backward_cursor,
        ) {
            (Some(anchor), Some(backward)) => (anchor, backward),
            _ => {
                let seed = ordinary_horizon.min(now);
                state.historical_forward_cursor = Some(now);
                state.historical_backward_cursor = Some(seed);
                (now, seed)
            }
        };

        let floor = self.pass.horizon(anchor);
        if backward <= floor || state.historical_consecutive_count >= self.max_consecutive_runs {
            return Escalation::Idle(state.without_historical());
        }

        state.historical_consecutive_count = state.historical_consecutive_count.saturating_add(1);
        let exhausted_runs = state.historical_consecutive_count >= self.max_consecutive_runs;

        if ordinary_first {
            if exhausted_runs {
                state = state.without_historical();
            }
            return Escalation::Idle(state);
        }

        let Some(window) = self.pass.backward_chunk(backward, floor) else {
            return Escalation::Idle(state.without_historical());
        };
        state.historical_backward_cursor = Some(window.from);
        if window.from <= floor || exhausted_runs {
            state = state.without_historical();
        }
        Escalation::Chunk { window, state }
    }
}
