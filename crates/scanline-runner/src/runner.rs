use std::{path::Path, sync::Arc};

use chrono::{DateTime, Utc};
use scanline_core::{EntityKind, ScanlineConfig, ScanlineError, TriggerId};
use scanline_scheduler::{
    AuxiliaryGate, CursorScheduler, HistoricalBackfillEscalation, ScanClass, ScanCursorState,
    ScanWindow, TriggerConfig,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dispatch::{DispatchRequest, JobDispatcher},
    error::{Result, RunnerError},
    query::{ConnectorQueryBuilder, ScanPlan},
    store::{MetadataStore, SqliteMetadataStore},
    trigger::TriggerRecord,
};

/// What one firing did.
#[derive(Debug, Clone, PartialEq)]
pub enum FireOutcome {
    /// A job was accepted and the new cursor state persisted.
    Dispatched {
        iteration_id: Uuid,
        window: ScanWindow,
        class: ScanClass,
        auxiliary: Vec<EntityKind>,
    },
    /// Nothing new to scan; no job, no write.
    Skipped,
}

/// Drives a trigger from persisted metadata to a dispatched job.
///
/// Callers must not fire the same trigger concurrently; [`crate::FiringLoop`]
/// fires sequentially.
pub struct TriggerRunner {
    config: ScanlineConfig,
    store: Arc<dyn MetadataStore>,
    dispatcher: Arc<dyn JobDispatcher>,
    queries: Arc<dyn ConnectorQueryBuilder>,
}

impl TriggerRunner {
    pub fn new(
        config: ScanlineConfig,
        store: Arc<dyn MetadataStore>,
        dispatcher: Arc<dyn JobDispatcher>,
        queries: Arc<dyn ConnectorQueryBuilder>,
    ) -> Self {
        Self {
            config,
            store,
            dispatcher,
            queries,
        }
    }

    /// Load configuration from `config_path` (plus `SCANLINE_` env overrides)
    /// and open the SQLite metadata store it names.
    pub fn open(
        config_path: Option<&str>,
        dispatcher: Arc<dyn JobDispatcher>,
        queries: Arc<dyn ConnectorQueryBuilder>,
    ) -> Result<Self> {
        let config = ScanlineConfig::load(config_path)?;
        let db_path = Path::new(&config.database.path);
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(ScanlineError::from)?;
        }
        let store = SqliteMetadataStore::open(&config.database.path)?;
        info!(db = %config.database.path, "metadata store opened");
        Ok(Self::new(config, Arc::new(store), dispatcher, queries))
    }

    pub fn config(&self) -> &ScanlineConfig {
        &self.config
    }

    /// Typed, validated scan configuration for `trigger`.
    pub fn trigger_config(&self, trigger: &TriggerRecord) -> Result<TriggerConfig> {
        let settings = self.config.settings_for(&trigger.connector, &trigger.overrides);
        Ok(TriggerConfig::from_settings(&settings)?)
    }

    /// Run one invocation of `trigger` as of `now`.
    pub async fn fire(&self, trigger: &TriggerRecord, now: DateTime<Utc>) -> Result<FireOutcome> {
        let scheduler = CursorScheduler::new(self.trigger_config(trigger)?)?;
        let state = self.load_state(&trigger.id)?;

        let decision = scheduler.next(&state, now, trigger.created_at);
        for repair in &decision.repairs {
            warn!(trigger_id = %trigger.id, %repair, "scan state repaired");
        }
        if decision.is_noop() {
            debug!(trigger_id = %trigger.id, "no new window; skipping");
            return Ok(FireOutcome::Skipped);
        }

        let plan = ScanPlan {
            window: decision.window,
            class: decision.class,
            auxiliary: AuxiliaryGate::new(scheduler.config()).plan(&decision.state, now),
        };
        let query = self
            .queries
            .build(trigger, &plan)
            .map_err(|e| RunnerError::Query {
                connector: trigger.connector.clone(),
                reason: e.to_string(),
            })?;

        let request = DispatchRequest::new(trigger.id.clone(), now, &plan, query);
        if let Err(e) = self.dispatcher.dispatch(&request).await {
            debug!(trigger_id = %trigger.id, class = %plan.class, "dispatch failed: {e}");
            return Err(RunnerError::Dispatch {
                trigger_id: trigger.id.to_string(),
                reason: e.to_string(),
            });
        }

        let next = plan.auxiliary.apply(&decision.state, now);
        self.store.store(&trigger.id, &next.encode()?)?;

        let auxiliary: Vec<EntityKind> = plan.auxiliary.due().cloned().collect();
        info!(
            trigger_id = %trigger.id,
            iteration_id = %request.iteration_id,
            class = %plan.class,
            from = %plan.window.from,
            to = %plan.window.to,
            auxiliary = auxiliary.len(),
            "scan dispatched"
        );
        Ok(FireOutcome::Dispatched {
            iteration_id: request.iteration_id,
            window: plan.window,
            class: plan.class,
            auxiliary,
        })
    }

    /// Request a deep historical backfill starting with the next firing.
    pub fn arm_historical(&self, id: &TriggerId) -> Result<ScanCursorState> {
        let armed = HistoricalBackfillEscalation::arm(&self.load_state(id)?);
        self.store.store(id, &armed.encode()?)?;
        info!(trigger_id = %id, mode = ?armed.historical_mode, "historical backfill armed");
        Ok(armed)
    }

    pub fn disarm_historical(&self, id: &TriggerId) -> Result<ScanCursorState> {
        let off = HistoricalBackfillEscalation::disarm(&self.load_state(id)?);
        self.store.store(id, &off.encode()?)?;
        info!(trigger_id = %id, "historical backfill disarmed");
        Ok(off)
    }

    /// Forget all scheduling metadata; the next firing is a cold start.
    pub fn reset(&self, id: &TriggerId) -> Result<()> {
        if !self.store.remove(id)? {
            return Err(RunnerError::TriggerNotFound { id: id.to_string() });
        }
        info!(trigger_id = %id, "scan state reset");
        Ok(())
    }

    /// Current persisted state, as the scheduler would read it.
    pub fn inspect(&self, id: &TriggerId) -> Result<ScanCursorState> {
        self.load_state(id)
    }

    fn load_state(&self, id: &TriggerId) -> Result<ScanCursorState> {
        let blob = self.store.load(id)?.unwrap_or_default();
        let decoded = ScanCursorState::decode(&blob);
        if decoded.malformed {
            warn!(trigger_id = %id, "unreadable scan metadata; treating as cold start");
        }
        Ok(decoded.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{dispatch::ChannelDispatcher, query::IterativeScanQueryBuilder, store::MemoryMetadataStore};
    use chrono::{Duration, TimeZone};
    use scanline_scheduler::HistoricalMode;
    use tokio::sync::mpsc;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 20, 12, 0, 0).unwrap()
    }

    fn runner(tx: mpsc::Sender<DispatchRequest>) -> (TriggerRunner, Arc<MemoryMetadataStore>) {
        let store = Arc::new(MemoryMetadataStore::new());
        let runner = TriggerRunner::new(
            ScanlineConfig::default(),
            store.clone(),
            Arc::new(ChannelDispatcher::new(tx)),
            Arc::new(IterativeScanQueryBuilder),
        );
        (runner, store)
    }

    #[tokio::test]
    async fn first_fire_dispatches_full_scan() {
        let (tx, mut rx) = mpsc::channel(8);
        let (runner, store) = runner(tx);
        let trigger = TriggerRecord::new("jira", "int-1", now()).with_id("t-1");

        let outcome = runner.fire(&trigger, now()).await.unwrap();
        let FireOutcome::Dispatched { class, window, .. } = outcome else {
            panic!("expected a dispatch");
        };
        assert_eq!(class, ScanClass::Full);
        assert_eq!(window, ScanWindow::new(now() - Duration::days(14), now()));

        let request = rx.recv().await.unwrap();
        assert!(!request.partial);
        assert_eq!(request.query["partial"], serde_json::json!(false));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn arm_then_disarm() {
        let (tx, _rx) = mpsc::channel(8);
        let (runner, _) = runner(tx);
        let id = TriggerId::from("t-2");

        assert_eq!(runner.arm_historical(&id).unwrap().historical_mode, HistoricalMode::Armed);
        assert_eq!(runner.inspect(&id).unwrap().historical_mode, HistoricalMode::Armed);
        assert_eq!(runner.disarm_historical(&id).unwrap().historical_mode, HistoricalMode::Off);
    }

    #[test]
    fn reset_of_unknown_trigger_fails() {
        let (tx, _rx) = mpsc::channel(1);
        let (runner, _) = runner(tx);
        assert!(matches!(
            runner.reset(&TriggerId::from("nope")),
            Err(RunnerError::TriggerNotFound { .. })
        ));
    }
}
