use std::collections::BTreeMap;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use datadam_core::{Backend, DmlParams, OpKind, Row, Value};
use datadam_dispatch::{DispatchError, Dispatcher, DispatcherSettings, LaneRole, Lanes};
use datadam_generate::{AppliedOp, MemoryBackend, MemoryStore};

const MINUTE: Duration = Duration::from_secs(60);

fn keys(id: i64) -> Row {
    BTreeMap::from([("id".to_string(), Value::Int(id))])
}

fn insert(id: i64) -> DmlParams {
    let mut values = keys(id);
    values.insert("note".to_string(), Value::from("new"));
    DmlParams::insert("dam", "orders", keys(id), values)
}

fn update(id: i64, note: &str) -> DmlParams {
    let values = BTreeMap::from([("note".to_string(), Value::from(note))]);
    DmlParams::update("dam", "orders", keys(id), values)
}

fn ddl() -> DmlParams {
    DmlParams::ddl("dam", "orders", "ALTER TABLE `dam`.`orders` COMMENT = 'datadam test'")
}

fn backends(store: &MemoryStore, count: usize) -> Vec<Box<dyn Backend>> {
    (0..count)
        .map(|seed| Box::new(MemoryBackend::seeded(store.clone(), seed as u64)) as Box<dyn Backend>)
        .collect()
}

fn pool(
    store: &MemoryStore,
    workers: usize,
    batch_size: usize,
    flush_interval: Duration,
) -> (Dispatcher, Lanes) {
    let settings = DispatcherSettings {
        workers,
        batch_size,
        flush_interval,
    };
    Dispatcher::new(settings, backends(store, workers + 1), CancellationToken::new()).unwrap()
}

fn ids(applied: &[AppliedOp]) -> Vec<(OpKind, Option<i64>)> {
    applied
        .iter()
        .map(|op| (op.kind, op.keys.get("id").and_then(Value::as_i64)))
        .collect()
}

#[tokio::test]
async fn same_key_operations_apply_in_submission_order() {
    let store = MemoryStore::with_sample_schema(&["dam"]);
    let (dispatcher, lanes) = pool(&store, 4, 3, MINUTE);
    let running = tokio::spawn(lanes.run());

    for id in 1..=6 {
        dispatcher.submit(insert(id)).await.unwrap();
    }
    for round in 0..5 {
        for id in 1..=6 {
            dispatcher.submit(update(id, &format!("{id}-{round}"))).await.unwrap();
        }
    }
    dispatcher.shutdown().await.unwrap();
    let reports = running.await.unwrap();

    assert_eq!(reports.len(), 5);
    assert_eq!(reports.iter().map(|report| report.executed).sum::<u64>(), 36);
    assert_eq!(dispatcher.in_flight(), 0);

    let applied = store.applied();
    for id in 1..=6 {
        let notes: Vec<String> = applied
            .iter()
            .filter(|op| op.keys.get("id") == Some(&Value::Int(id)))
            .map(|op| op.values.get("note").map(ToString::to_string).unwrap_or_default())
            .collect();
        let mut expected = vec!["new".to_string()];
        expected.extend((0..5).map(|round| format!("{id}-{round}")));
        assert_eq!(notes, expected, "row {id} saw its operations out of order");

        let row = store.row("dam", "orders", id).unwrap();
        assert_eq!(row.get("note"), Some(&Value::Text(format!("{id}-4"))));
    }
}

#[tokio::test(start_paused = true)]
async fn partial_batches_wait_for_the_idle_interval() {
    let store = MemoryStore::with_sample_schema(&["dam"]);
    let (dispatcher, lanes) = pool(&store, 2, 3, MINUTE);
    let running = tokio::spawn(lanes.run());

    let first = insert(1);
    let second = insert(2);
    let third = update(1, "again");
    assert_ne!(dispatcher.route(&first), dispatcher.route(&second));
    assert_eq!(dispatcher.route(&first), dispatcher.route(&third));

    for params in [first, second, third] {
        dispatcher.submit(params).await.unwrap();
    }
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(store.applied().is_empty());
    assert_eq!(dispatcher.in_flight(), 3);

    tokio::time::sleep(MINUTE).await;
    let applied = ids(&store.applied());
    assert_eq!(applied.len(), 3);
    let key_one: Vec<_> = applied.iter().filter(|(_, id)| *id == Some(1)).collect();
    assert_eq!(key_one, vec![&(OpKind::Insert, Some(1)), &(OpKind::Update, Some(1))]);
    assert_eq!(dispatcher.in_flight(), 0);

    dispatcher.shutdown().await.unwrap();
    running.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn full_batches_execute_without_waiting() {
    let store = MemoryStore::with_sample_schema(&["dam"]);
    let (dispatcher, lanes) = pool(&store, 1, 2, MINUTE);
    let running = tokio::spawn(lanes.run());

    dispatcher.submit(insert(1)).await.unwrap();
    dispatcher.submit(insert(2)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(store.row_count("dam", "orders"), 2);

    dispatcher.shutdown().await.unwrap();
    running.await.unwrap();
}

#[tokio::test]
async fn ddl_runs_after_every_earlier_job() {
    let store = MemoryStore::with_sample_schema(&["dam"]);
    let (dispatcher, lanes) = pool(&store, 2, 100, Duration::from_secs(3600));
    let running = tokio::spawn(lanes.run());

    for id in 1..=6 {
        dispatcher.submit(insert(id)).await.unwrap();
    }
    dispatcher.submit(ddl()).await.unwrap();

    let applied = store.applied();
    assert_eq!(applied.len(), 7);
    assert!(applied[..6].iter().all(|op| op.kind == OpKind::Insert));
    assert_eq!(applied[6].kind, OpKind::Ddl);
    assert!(applied[6].statement.as_deref().is_some_and(|sql| sql.contains("COMMENT")));
    assert_eq!(dispatcher.in_flight(), 0);

    dispatcher.shutdown().await.unwrap();
    let reports = running.await.unwrap();
    let ddl_lane = reports.iter().find(|report| report.role == LaneRole::Ddl).unwrap();
    assert_eq!(ddl_lane.lane, 2);
    assert_eq!(ddl_lane.executed, 1);
}

#[tokio::test(start_paused = true)]
async fn jobs_submitted_during_ddl_wait_for_it() {
    let store = MemoryStore::with_sample_schema(&["dam"]);
    let mut lane_backends = backends(&store, 2);
    lane_backends.push(Box::new(
        MemoryBackend::seeded(store.clone(), 9).with_latency(Duration::from_millis(50)),
    ));
    let settings = DispatcherSettings {
        workers: 2,
        batch_size: 100,
        flush_interval: Duration::from_secs(3600),
    };
    let (dispatcher, lanes) =
        Dispatcher::new(settings, lane_backends, CancellationToken::new()).unwrap();
    let running = tokio::spawn(lanes.run());

    dispatcher.submit(insert(1)).await.unwrap();
    let barrier = tokio::spawn({
        let dispatcher = dispatcher.clone();
        async move { dispatcher.submit(ddl()).await }
    });
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }

    dispatcher.submit(insert(2)).await.unwrap();
    dispatcher.submit(insert(3)).await.unwrap();
    barrier.await.unwrap().unwrap();
    dispatcher.flush().await.unwrap();

    let applied = ids(&store.applied());
    assert_eq!(
        applied,
        vec![
            (OpKind::Insert, Some(1)),
            (OpKind::Ddl, None),
            (OpKind::Insert, Some(2)),
            (OpKind::Insert, Some(3)),
        ]
    );

    dispatcher.shutdown().await.unwrap();
    running.await.unwrap();
}

#[tokio::test]
async fn failed_batch_is_dropped_and_lane_keeps_going() {
    let store = MemoryStore::with_sample_schema(&["dam"]);
    store.seed_row("dam", "orders", keys(1)).unwrap();
    let (dispatcher, lanes) = pool(&store, 1, 2, MINUTE);
    let running = tokio::spawn(lanes.run());

    dispatcher.submit(insert(1)).await.unwrap();
    dispatcher.submit(insert(100)).await.unwrap();
    dispatcher.submit(insert(200)).await.unwrap();
    dispatcher.submit(insert(201)).await.unwrap();
    dispatcher.shutdown().await.unwrap();
    let reports = running.await.unwrap();

    assert_eq!(
        ids(&store.applied()),
        vec![(OpKind::Insert, Some(200)), (OpKind::Insert, Some(201))]
    );
    assert!(store.row("dam", "orders", 100).is_none());

    let lane = &reports[0];
    assert_eq!(lane.role, LaneRole::Regular);
    assert_eq!(lane.failed_batches, 1);
    assert_eq!(lane.dropped, 1);
    assert_eq!(lane.executed, 2);
    assert_eq!(dispatcher.in_flight(), 0);
}

#[tokio::test]
async fn shutdown_flushes_pending_batches() {
    let store = MemoryStore::with_sample_schema(&["dam"]);
    let (dispatcher, lanes) = pool(&store, 3, 100, Duration::from_secs(3600));
    let running = tokio::spawn(lanes.run());

    for id in 1..=5 {
        dispatcher.submit(insert(id)).await.unwrap();
    }
    assert!(store.applied().is_empty());

    dispatcher.shutdown().await.unwrap();
    let reports = running.await.unwrap();
    assert_eq!(store.row_count("dam", "orders"), 5);
    assert_eq!(reports.len(), 4);
}

#[tokio::test]
async fn cancelled_dispatcher_rejects_submits() {
    let store = MemoryStore::with_sample_schema(&["dam"]);
    let cancel = CancellationToken::new();
    let settings = DispatcherSettings {
        workers: 1,
        batch_size: 1,
        flush_interval: MINUTE,
    };
    let (dispatcher, lanes) =
        Dispatcher::new(settings, backends(&store, 2), cancel.clone()).unwrap();
    cancel.cancel();

    assert!(matches!(
        dispatcher.submit(insert(1)).await,
        Err(DispatchError::Cancelled)
    ));
    assert!(matches!(
        dispatcher.submit(ddl()).await,
        Err(DispatchError::Cancelled)
    ));
    assert_eq!(dispatcher.in_flight(), 0);

    let reports = lanes.run().await;
    assert_eq!(reports.len(), 2);
    assert!(store.applied().is_empty());
}

#[tokio::test(start_paused = true)]
async fn abort_abandons_a_stuck_lane() {
    let store = MemoryStore::with_sample_schema(&["dam"]);
    let lane_backends: Vec<Box<dyn Backend>> = vec![
        Box::new(MemoryBackend::seeded(store.clone(), 1).with_latency(Duration::from_secs(30))),
        Box::new(MemoryBackend::seeded(store.clone(), 2)),
    ];
    let settings = DispatcherSettings {
        workers: 1,
        batch_size: 1,
        flush_interval: MINUTE,
    };
    let (dispatcher, lanes) =
        Dispatcher::new(settings, lane_backends, CancellationToken::new()).unwrap();
    let running = tokio::spawn(lanes.run());

    for id in 1..=3 {
        dispatcher.submit(insert(id)).await.unwrap();
    }
    let blocked = tokio::time::timeout(Duration::from_secs(1), dispatcher.submit(insert(4))).await;
    assert!(blocked.is_err());
    assert_eq!(dispatcher.in_flight(), 3);

    dispatcher.abort();
    let reports = running.await.unwrap();
    assert!(store.applied().is_empty());
    assert_eq!(reports[0].executed, 0);
    assert_eq!(reports[0].dropped, 3);
    assert_eq!(dispatcher.in_flight(), 0);
}

#[test]
fn pool_shape_is_validated() {
    let store = MemoryStore::new();
    let settings = DispatcherSettings {
        workers: 2,
        batch_size: 10,
        flush_interval: MINUTE,
    };

    let wrong_count =
        Dispatcher::new(settings.clone(), backends(&store, 2), CancellationToken::new());
    assert!(matches!(wrong_count, Err(DispatchError::Config(_))));

    let no_workers = DispatcherSettings {
        workers: 0,
        ..settings
    };
    let result = Dispatcher::new(no_workers, backends(&store, 1), CancellationToken::new());
    assert!(matches!(result, Err(DispatchError::Config(_))));
}
