//! Integration tests for window claims and releases against the in-memory backend.

use servq::engine::{LifecycleConfig, WorkerLifecycle};
use servq::error::Error;
use servq::gate::FixedHours;
use servq::inmem::MemoryStore;
use servq::model::*;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const WORK: StatusId = StatusId(1);
const BREAK: StatusId = StatusId(2);
const NOT_WORK: StatusId = StatusId(3);

const PURPOSE_A: PurposeId = PurposeId(100);
const PURPOSE_B: PurposeId = PurposeId(200);

async fn desk(open: bool, config: LifecycleConfig) -> (MemoryStore, WorkerLifecycle) {
    let store = MemoryStore::new();
    let lifecycle = WorkerLifecycle::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(FixedHours(open)),
        config,
    )
    .await
    .expect("statuses are seeded");
    (store, lifecycle)
}

/// Worker at window 5 with two waiting tickets: [T1, T2].
async fn seated_worker_with_queue(
    store: &MemoryStore,
    lifecycle: &WorkerLifecycle,
) -> (Worker, TicketId, TicketId) {
    let worker = store.add_worker(UserId(42)).unwrap();
    let worker = lifecycle
        .claim_window(worker.user_id, WindowId(5))
        .await
        .unwrap();
    let t1 = store.add_ticket(Some(worker.id), PURPOSE_A, TicketStatus::Waiting);
    let t2 = store.add_ticket(Some(worker.id), PURPOSE_B, TicketStatus::Waiting);
    (worker, t1, t2)
}

fn assert_consistent(lifecycle: &WorkerLifecycle, worker: &Worker) {
    assert!(
        lifecycle.statuses().is_consistent(worker),
        "window bound iff working violated: {worker:?}"
    );
}

// ---------------------------------------------------------------------------
// Claiming a window
// ---------------------------------------------------------------------------

#[tokio::test]
async fn claim_window_seats_worker_in_work_status() {
    let (store, lifecycle) = desk(true, LifecycleConfig::default()).await;
    let worker = store.add_worker(UserId(7)).unwrap();
    assert_eq!(worker.status_id, NOT_WORK);

    let seated = lifecycle
        .claim_window(UserId(7), WindowId(3))
        .await
        .unwrap();

    assert_eq!(seated.id, worker.id);
    assert_eq!(seated.status_id, WORK);
    assert_eq!(seated.window_id, Some(WindowId(3)));
    assert_eq!(lifecycle.statuses().state_of(&seated), WorkerState::Working);
    assert_consistent(&lifecycle, &seated);
}

#[tokio::test]
async fn claim_window_outside_hours_changes_nothing() {
    let (store, lifecycle) = desk(false, LifecycleConfig::default()).await;
    let worker = store.add_worker(UserId(7)).unwrap();

    let err = lifecycle
        .claim_window(UserId(7), WindowId(3))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::OutOfHours), "got {err:?}");
    assert!(err.is_user_correctable());
    assert_eq!(store.worker(worker.id), Some(worker));
}

#[tokio::test]
async fn claim_window_for_unknown_user_is_not_found() {
    let (_store, lifecycle) = desk(true, LifecycleConfig::default()).await;
    let err = lifecycle
        .claim_window(UserId(999), WindowId(1))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)), "got {err:?}");
}

#[tokio::test]
async fn missing_status_reference_data_is_a_config_error() {
    let store = MemoryStore::with_statuses(vec![
        StatusRecord {
            id: StatusId(1),
            name: "work".into(),
        },
        StatusRecord {
            id: StatusId(3),
            name: "not work".into(),
        },
    ]);
    let result = WorkerLifecycle::new(
        Arc::new(store.clone()),
        Arc::new(store),
        Arc::new(FixedHours(true)),
        LifecycleConfig::default(),
    )
    .await;

    match result {
        Err(Error::Config(msg)) => assert!(msg.contains("break"), "message: {msg}"),
        Err(other) => panic!("expected Config error, got {other:?}"),
        Ok(_) => panic!("expected Config error, got a lifecycle"),
    }
}

// ---------------------------------------------------------------------------
// Releasing: happy paths
// ---------------------------------------------------------------------------

#[tokio::test]
async fn go_on_break_requeues_every_waiting_ticket() {
    let (store, lifecycle) = desk(true, LifecycleConfig::default()).await;
    let (worker, t1, t2) = seated_worker_with_queue(&store, &lifecycle).await;

    let released = lifecycle.go_on_break(worker.id).await.unwrap();

    assert_eq!(released.status_id, BREAK);
    assert_eq!(released.window_id, None);
    assert_eq!(lifecycle.statuses().state_of(&released), WorkerState::OnBreak);
    assert_consistent(&lifecycle, &released);
    assert_eq!(store.worker(worker.id), Some(released));

    assert_eq!(store.ticket(t1).unwrap().worker_id, None);
    assert_eq!(store.ticket(t2).unwrap().worker_id, None);

    let requeues = store.requeues();
    assert_eq!(
        requeues.iter().map(|r| r.ticket).collect::<Vec<_>>(),
        vec![t1, t2],
        "requeued in queue order"
    );
    assert_eq!(requeues[0].purpose, PURPOSE_A);
    assert_eq!(requeues[1].purpose, PURPOSE_B);
    assert!(requeues.iter().all(|r| !r.notify));
}

#[tokio::test]
async fn finish_shift_with_empty_queue_only_changes_status() {
    let (store, lifecycle) = desk(true, LifecycleConfig::default()).await;
    let worker = store.add_worker(UserId(8)).unwrap();
    lifecycle
        .claim_window(UserId(8), WindowId(2))
        .await
        .unwrap();

    let released = lifecycle.finish_shift(worker.id).await.unwrap();

    assert_eq!(released.status_id, NOT_WORK);
    assert_eq!(released.window_id, None);
    assert_eq!(lifecycle.statuses().state_of(&released), WorkerState::OffShift);
    assert!(store.requeues().is_empty());
}

#[tokio::test]
async fn release_leaves_other_workers_tickets_alone() {
    let (store, lifecycle) = desk(true, LifecycleConfig::default()).await;
    let (worker, _, _) = seated_worker_with_queue(&store, &lifecycle).await;
    let other = store.add_worker(UserId(43)).unwrap();
    lifecycle
        .claim_window(UserId(43), WindowId(6))
        .await
        .unwrap();
    let theirs = store.add_ticket(Some(other.id), PURPOSE_A, TicketStatus::Waiting);

    lifecycle.go_on_break(worker.id).await.unwrap();

    assert_eq!(store.ticket(theirs).unwrap().worker_id, Some(other.id));
}

// ---------------------------------------------------------------------------
// Releasing: refused
// ---------------------------------------------------------------------------

#[tokio::test]
async fn release_while_serving_is_refused_without_changes() {
    let (store, lifecycle) = desk(true, LifecycleConfig::default()).await;
    let (worker, t1, t2) = seated_worker_with_queue(&store, &lifecycle).await;
    let serving = store.add_ticket(Some(worker.id), PURPOSE_A, TicketStatus::Serving);

    let err = lifecycle.go_on_break(worker.id).await.unwrap_err();

    match err {
        Error::BusyWorker {
            worker_id,
            ref in_progress,
        } => {
            assert_eq!(worker_id, worker.id);
            assert_eq!(in_progress, &vec![serving]);
        }
        ref other => panic!("expected BusyWorker, got {other:?}"),
    }
    assert_eq!(store.worker(worker.id), Some(worker.clone()));
    assert_eq!(store.ticket(t1).unwrap().worker_id, Some(worker.id));
    assert_eq!(store.ticket(t2).unwrap().worker_id, Some(worker.id));
    assert!(store.requeues().is_empty());
}

#[tokio::test]
async fn release_with_a_called_ticket_is_refused() {
    let (store, lifecycle) = desk(true, LifecycleConfig::default()).await;
    let (worker, _, _) = seated_worker_with_queue(&store, &lifecycle).await;
    store.add_ticket(Some(worker.id), PURPOSE_B, TicketStatus::Called);

    let err = lifecycle.finish_shift(worker.id).await.unwrap_err();

    assert!(matches!(err, Error::BusyWorker { .. }), "got {err:?}");
    assert_eq!(store.worker(worker.id), Some(worker));
}

#[tokio::test]
async fn served_tickets_do_not_block_release() {
    let (store, lifecycle) = desk(true, LifecycleConfig::default()).await;
    let worker = store.add_worker(UserId(9)).unwrap();
    lifecycle
        .claim_window(UserId(9), WindowId(1))
        .await
        .unwrap();
    store.add_ticket(Some(worker.id), PURPOSE_A, TicketStatus::Served);

    let released = lifecycle.go_on_break(worker.id).await.unwrap();
    assert_eq!(released.status_id, BREAK);
}

#[tokio::test]
async fn release_of_a_worker_not_at_a_window_is_an_invalid_transition() {
    let (store, lifecycle) = desk(true, LifecycleConfig::default()).await;
    let worker = store.add_worker(UserId(10)).unwrap();

    let err = lifecycle.go_on_break(worker.id).await.unwrap_err();

    match err {
        Error::InvalidTransition { from, to, .. } => {
            assert_eq!(from, WorkerState::OffShift);
            assert_eq!(to, WorkerState::OnBreak);
        }
        other => panic!("expected InvalidTransition, got {other:?}"),
    }
    assert_eq!(store.worker(worker.id), Some(worker));
}

#[tokio::test]
async fn release_of_unknown_worker_is_not_found() {
    let (_store, lifecycle) = desk(true, LifecycleConfig::default()).await;
    let err = lifecycle.go_on_break(WorkerId(404)).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)), "got {err:?}");
}

// ---------------------------------------------------------------------------
// Releasing: compensation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_requeue_restores_worker_but_keeps_earlier_requeues() {
    let (store, lifecycle) = desk(true, LifecycleConfig::default()).await;
    let (worker, t1, t2) = seated_worker_with_queue(&store, &lifecycle).await;
    store.fail_requeue(t2);

    let err = lifecycle.go_on_break(worker.id).await.unwrap_err();

    match err {
        Error::Requeue { ticket_id, .. } => assert_eq!(ticket_id, t2),
        ref other => panic!("expected Requeue, got {other:?}"),
    }

    let restored = store.worker(worker.id).unwrap();
    assert_eq!(restored.status_id, WORK);
    assert_eq!(restored.window_id, Some(WindowId(5)));
    assert_consistent(&lifecycle, &restored);

    // T1 went back to its purpose queue before T2 failed and stays there.
    assert_eq!(store.ticket(t1).unwrap().worker_id, None);
    assert_eq!(store.ticket(t2).unwrap().worker_id, Some(worker.id));
}

#[tokio::test]
async fn first_ticket_failing_requeues_nothing() {
    let (store, lifecycle) = desk(true, LifecycleConfig::default()).await;
    let (worker, t1, t2) = seated_worker_with_queue(&store, &lifecycle).await;
    store.fail_requeue(t1);

    let err = lifecycle.finish_shift(worker.id).await.unwrap_err();

    assert!(matches!(err, Error::Requeue { ticket_id, .. } if ticket_id == t1));
    assert_eq!(store.worker(worker.id), Some(worker.clone()));
    assert_eq!(store.ticket(t2).unwrap().worker_id, Some(worker.id));
    assert!(store.requeues().is_empty());
}

#[tokio::test]
async fn requeue_error_keeps_the_queue_failure_as_source() {
    let (store, lifecycle) = desk(true, LifecycleConfig::default()).await;
    let (worker, _, t2) = seated_worker_with_queue(&store, &lifecycle).await;
    store.fail_requeue(t2);

    let err = lifecycle.go_on_break(worker.id).await.unwrap_err();

    let source = std::error::Error::source(&err).expect("requeue error has a source");
    assert!(
        source.to_string().contains(&t2.to_string()),
        "source: {source}"
    );
    assert!(!err.is_user_correctable());
}

/// Log sink for asserting on emitted events.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn failed_restore_is_logged_and_the_requeue_error_still_returned() {
    let logs = CapturedLogs::default();
    let sink = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || sink.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::WARN)
        .finish();
    // Current-thread runtime: the spawned release task sees this default.
    let _default = tracing::subscriber::set_default(subscriber);

    let (store, lifecycle) = desk(true, LifecycleConfig::default()).await;
    let (worker, t1, t2) = seated_worker_with_queue(&store, &lifecycle).await;
    store.fail_requeue(t2);
    // The status commit goes through, the restore does not.
    store.fail_worker_updates_after(1);

    let err = lifecycle.go_on_break(worker.id).await.unwrap_err();

    match err {
        Error::Requeue { ticket_id, ref source } => {
            assert_eq!(ticket_id, t2);
            assert!(source.to_string().contains(&t2.to_string()), "source: {source}");
        }
        ref other => panic!("expected Requeue, got {other:?}"),
    }

    // Left released, still consistent.
    let stranded = store.worker(worker.id).unwrap();
    assert_eq!(stranded.status_id, BREAK);
    assert_eq!(stranded.window_id, None);
    assert_consistent(&lifecycle, &stranded);
    assert_eq!(store.ticket(t1).unwrap().worker_id, None);
    assert_eq!(store.ticket(t2).unwrap().worker_id, Some(worker.id));

    let output = logs.contents();
    assert!(output.contains("ERROR"), "logs: {output}");
    assert!(
        output.contains("release rollback failed, worker left in released state"),
        "logs: {output}"
    );
}

#[tokio::test]
async fn slow_requeue_times_out_and_is_compensated() {
    let config = LifecycleConfig {
        requeue_timeout: Some(Duration::from_millis(20)),
    };
    let (store, lifecycle) = desk(true, config).await;
    let (worker, t1, _) = seated_worker_with_queue(&store, &lifecycle).await;
    store.delay_requeue(Duration::from_millis(500));

    let err = lifecycle.go_on_break(worker.id).await.unwrap_err();

    match err {
        Error::Requeue { ticket_id, source } => {
            assert_eq!(ticket_id, t1);
            assert!(matches!(*source, Error::Timeout(_)), "source: {source:?}");
        }
        other => panic!("expected Requeue, got {other:?}"),
    }
    let restored = store.worker(worker.id).unwrap();
    assert_eq!(restored.status_id, WORK);
    assert_eq!(restored.window_id, Some(WindowId(5)));
}

#[tokio::test]
async fn worker_can_leave_again_after_a_compensated_release() {
    let (store, lifecycle) = desk(true, LifecycleConfig::default()).await;
    let (worker, _, t2) = seated_worker_with_queue(&store, &lifecycle).await;
    store.fail_requeue(t2);
    lifecycle.go_on_break(worker.id).await.unwrap_err();

    // The operator calls and serves the stuck ticket, then leaves.
    store.set_ticket_status(t2, TicketStatus::Served);
    let released = lifecycle.go_on_break(worker.id).await.unwrap();

    assert_eq!(released.status_id, BREAK);
    assert_eq!(released.window_id, None);
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dropping_the_caller_does_not_abandon_a_committed_release() {
    let (store, lifecycle) = desk(true, LifecycleConfig::default()).await;
    let (worker, t1, t2) = seated_worker_with_queue(&store, &lifecycle).await;
    store.delay_requeue(Duration::from_millis(50));

    let abandoned =
        tokio::time::timeout(Duration::from_millis(10), lifecycle.go_on_break(worker.id)).await;
    assert!(abandoned.is_err(), "release should still be requeueing");

    tokio::time::sleep(Duration::from_millis(400)).await;

    let released = store.worker(worker.id).unwrap();
    assert_eq!(released.status_id, BREAK);
    assert_eq!(released.window_id, None);
    assert_eq!(store.ticket(t1).unwrap().worker_id, None);
    assert_eq!(store.ticket(t2).unwrap().worker_id, None);
}
