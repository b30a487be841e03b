use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration as StdDuration,
};

use chrono::{DateTime, Duration, Utc};
use scanline_core::TriggerId;
use tokio::sync::watch;
use tracing::{error, info};

use crate::{
    error::Result,
    runner::{FireOutcome, TriggerRunner},
    trigger::{TriggerRecord, TriggerSource},
};

/// Periodically fires every due trigger.
///
/// Triggers are fired one after another, so a trigger never has two
/// invocations in flight. Fire times are remembered per process only: after a
/// restart every active trigger fires on the first tick, which the scheduler
/// handles as an ordinary (possibly zero-width) invocation.
pub struct FiringLoop {
    runner: Arc<TriggerRunner>,
    source: Arc<dyn TriggerSource>,
    tick: StdDuration,
    last_fired: HashMap<TriggerId, DateTime<Utc>>,
}

impl FiringLoop {
    pub fn new(runner: Arc<TriggerRunner>, source: Arc<dyn TriggerSource>) -> Self {
        let tick_secs = runner.config().runner.tick_secs.max(1);
        Self {
            runner,
            source,
            tick: StdDuration::from_secs(tick_secs),
            last_fired: HashMap::new(),
        }
    }

    /// Main event loop. Ticks until `shutdown` broadcasts `true`.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(tick_secs = self.tick.as_secs(), "firing loop started");

        let mut interval = tokio::time::interval(self.tick);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick(Utc::now()).await {
                        error!("firing loop tick error: {e}");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("firing loop shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Fire every trigger due at `now`. Returns how many jobs were dispatched.
    ///
    /// A failing trigger is logged and retried on its next due tick; it never
    /// stops the others.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Result<usize> {
        let triggers = self.source.triggers()?;
        let listed: HashSet<&TriggerId> = triggers.iter().map(|t| &t.id).collect();
        self.last_fired.retain(|id, _| listed.contains(id));

        let mut dispatched = 0;
        for trigger in &triggers {
            if !is_due(trigger, self.last_fired.get(&trigger.id).copied(), now) {
                continue;
            }
            self.last_fired.insert(trigger.id.clone(), now);
            match self.runner.fire(trigger, now).await {
                Ok(FireOutcome::Dispatched { .. }) => dispatched += 1,
                Ok(FireOutcome::Skipped) => {}
                Err(e) => error!(trigger_id = %trigger.id, "trigger fire failed: {e}"),
            }
        }
        Ok(dispatched)
    }
}

fn is_due(trigger: &TriggerRecord, last_fired: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    if trigger.is_paused() {
        return false;
    }
    let Some(last) = last_fired else {
        return true;
    };
    let frequency = i64::try_from(trigger.frequency_mins)
        .ok()
        .and_then(Duration::try_minutes);
    match frequency {
        Some(frequency) => now.signed_duration_since(last) >= frequency,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dispatch::ChannelDispatcher, query::IterativeScanQueryBuilder, store::MemoryMetadataStore,
        trigger::TriggerRegistry,
    };
    use chrono::TimeZone;

    fn record(frequency_mins: u64) -> TriggerRecord {
        TriggerRecord::new("jira", "int", Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
            .with_frequency(frequency_mins)
    }

    #[tokio::test]
    async fn removed_triggers_are_forgotten() {
        let (tx, _rx) = tokio::sync::mpsc::channel(4);
        let runner = Arc::new(TriggerRunner::new(
            scanline_core::ScanlineConfig::default(),
            Arc::new(MemoryMetadataStore::new()),
            Arc::new(ChannelDispatcher::new(tx)),
            Arc::new(IterativeScanQueryBuilder),
        ));
        let registry = Arc::new(TriggerRegistry::new());
        registry.register(record(15).with_id("gone"));
        registry.register(record(15).with_id("kept"));

        let mut firing = FiringLoop::new(runner, registry.clone());
        let now = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        assert_eq!(firing.tick(now).await.unwrap(), 2);
        assert_eq!(firing.last_fired.len(), 2);

        registry.remove(&TriggerId::from("gone")).unwrap();
        firing.tick(now + Duration::minutes(1)).await.unwrap();
        assert_eq!(firing.last_fired.len(), 1);
        assert!(firing.last_fired.contains_key(&TriggerId::from("kept")));
    }

    #[test]
    fn due_rules() {
        let now = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        assert!(is_due(&record(15), None, now));
        assert!(!is_due(&record(0), None, now));
        assert!(!is_due(&record(15), Some(now - Duration::minutes(14)), now));
        assert!(is_due(&record(15), Some(now - Duration::minutes(15)), now));
        assert!(!is_due(&record(u64::MAX), Some(now - Duration::days(365)), now));
    }
}
