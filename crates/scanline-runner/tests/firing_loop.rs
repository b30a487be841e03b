use std::{sync::Arc, time::Duration as StdDuration};

use chrono::{Duration, TimeZone, Utc};
use scanline_core::{ScanlineConfig, TriggerId};
use scanline_runner::{
    ChannelDispatcher, DispatchRequest, FiringLoop, IterativeScanQueryBuilder, MemoryMetadataStore,
    TriggerRecord, TriggerRegistry, TriggerRunner,
};
use tokio::sync::{mpsc, watch};

fn setup(
    capacity: usize,
) -> (
    Arc<TriggerRunner>,
    Arc<TriggerRegistry>,
    mpsc::Receiver<DispatchRequest>,
) {
    let (tx, rx) = mpsc::channel(capacity);
    let runner = Arc::new(TriggerRunner::new(
        ScanlineConfig::default(),
        Arc::new(MemoryMetadataStore::new()),
        Arc::new(ChannelDispatcher::new(tx)),
        Arc::new(IterativeScanQueryBuilder),
    ));
    (runner, Arc::new(TriggerRegistry::new()), rx)
}

#[tokio::test]
async fn tick_fires_due_triggers_once_per_frequency() {
    let (runner, registry, mut rx) = setup(16);
    let created = Utc.with_ymd_and_hms(2024, 8, 1, 0, 0, 0).unwrap();
    registry.register(TriggerRecord::new("jira", "i-1", created).with_id("a").with_frequency(30));
    registry.register(TriggerRecord::new("github", "i-2", created).with_id("b").with_frequency(60));
    registry.register(TriggerRecord::new("github", "i-3", created).with_id("paused").with_frequency(0));

    let mut firing = FiringLoop::new(runner, registry.clone());
    let now = created + Duration::days(1);

    assert_eq!(firing.tick(now).await.unwrap(), 2);
    assert_eq!(firing.tick(now + Duration::minutes(10)).await.unwrap(), 0);
    assert_eq!(firing.tick(now + Duration::minutes(30)).await.unwrap(), 1);

    let mut fired = Vec::new();
    while let Ok(request) = rx.try_recv() {
        fired.push(request.trigger_id);
    }
    assert_eq!(
        fired,
        vec![TriggerId::from("a"), TriggerId::from("b"), TriggerId::from("a")]
    );
}

#[tokio::test]
async fn one_failing_trigger_does_not_block_the_rest() {
    // Capacity 1: the second dispatch in the tick finds the channel full.
    let (runner, registry, mut rx) = setup(1);
    let created = Utc.with_ymd_and_hms(2024, 8, 1, 0, 0, 0).unwrap();
    registry.register(TriggerRecord::new("jira", "i-1", created).with_id("a"));
    registry.register(TriggerRecord::new("jira", "i-2", created).with_id("b"));

    let mut firing = FiringLoop::new(runner.clone(), registry);
    let now = created + Duration::hours(1);
    assert_eq!(firing.tick(now).await.unwrap(), 1);

    assert_eq!(rx.recv().await.unwrap().trigger_id, TriggerId::from("a"));
    assert!(runner.inspect(&TriggerId::from("b")).unwrap().is_cold());
}

#[tokio::test]
async fn loop_stops_on_shutdown() {
    let (runner, registry, _rx) = setup(4);
    let firing = FiringLoop::new(runner, registry);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn(firing.run(shutdown_rx));
    shutdown_tx.send(true).unwrap();

    tokio::time::timeout(StdDuration::from_secs(5), handle)
        .await
        .expect("loop did not stop")
        .unwrap();
}
