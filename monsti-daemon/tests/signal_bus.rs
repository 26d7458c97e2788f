use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio_test::{assert_pending, assert_ready};

use monsti_daemon::{DaemonError, SignalBus};

fn bus() -> Arc<SignalBus> {
    Arc::new(SignalBus::new(Duration::from_secs(1), Duration::from_secs(30)))
}

/// Answers one signal on `subscriber` with `reply` and reports what it saw.
fn answer_once(
    bus: &Arc<SignalBus>,
    subscriber: &'static str,
    reply: Result<Value, String>,
) -> tokio::task::JoinHandle<Result<(String, Value), DaemonError>> {
    let bus = bus.clone();
    tokio::spawn(async move {
        let received = bus.wait(subscriber).await?;
        bus.finish(subscriber, Some(received.ticket), reply).await?;
        Ok((received.name, received.args))
    })
}

#[tokio::test]
async fn fan_out_collects_results_in_subscription_order() {
    let bus = bus();
    for id in ["s1", "s2", "s3"] {
        bus.connect(id, "node.saved").await;
    }
    let handlers = vec![
        answer_once(&bus, "s1", Ok(json!("one"))),
        answer_once(&bus, "s2", Ok(json!({"two": 2}))),
        answer_once(&bus, "s3", Ok(json!(3))),
    ];

    let results = bus
        .emit("node.saved", json!({"Path": "/about"}))
        .await
        .expect("emit");
    assert_eq!(results, vec![json!("one"), json!({"two": 2}), json!(3)]);

    for handler in handlers {
        let (name, args) = handler.await.expect("join").expect("handler");
        assert_eq!(name, "node.saved");
        assert_eq!(args, json!({"Path": "/about"}));
    }
}

#[tokio::test]
async fn first_error_short_circuits_emission() {
    let bus = bus();
    for id in ["s1", "s2", "s3"] {
        bus.connect(id, "x").await;
    }
    let s1 = answer_once(&bus, "s1", Ok(json!(1)));
    let s2 = answer_once(&bus, "s2", Err("boom".to_string()));
    let s3 = answer_once(&bus, "s3", Ok(json!(3)));

    let err = bus.emit("x", json!(null)).await.unwrap_err();
    match err {
        DaemonError::SignalFailed {
            subscriber,
            message,
            ..
        } => {
            assert_eq!(subscriber, "s2");
            assert_eq!(message, "boom");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    s1.await.expect("join").expect("s1");
    s2.await.expect("join").expect("s2");

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!s3.is_finished(), "s3 must never receive the signal");
    s3.abort();
}

#[tokio::test(start_paused = true)]
async fn emit_blocks_until_wait_and_finish() {
    let bus = bus();
    bus.connect("s1", "x").await;

    let mut emit = tokio_test::task::spawn(bus.emit("x", json!([1, 2])));
    assert_pending!(emit.poll());

    // An hour passes without a waiter; the emitter is still parked.
    tokio::time::advance(Duration::from_secs(3600)).await;
    assert_pending!(emit.poll());

    let received = bus.wait("s1").await.expect("wait");
    assert_eq!(received.name, "x");
    assert_eq!(received.args, json!([1, 2]));
    assert_pending!(emit.poll());

    bus.finish("s1", None, Ok(json!("ok"))).await.expect("finish");
    let results = assert_ready!(emit.poll()).expect("emit");
    assert_eq!(results, vec![json!("ok")]);
}

#[tokio::test(start_paused = true)]
async fn waiter_blocks_until_emission() {
    let bus = bus();
    bus.connect("s1", "x").await;

    let waited = tokio::time::timeout(Duration::from_secs(60), bus.wait("s1")).await;
    assert!(waited.is_err(), "wait must not return without an emission");
}

#[tokio::test]
async fn stale_ticket_is_rejected_and_pending_kept() {
    let bus = bus();
    bus.connect("s1", "x").await;

    let emitter = {
        let bus = bus.clone();
        tokio::spawn(async move { bus.emit("x", json!(null)).await })
    };
    let received = bus.wait("s1").await.expect("wait");

    let err = bus
        .finish("s1", Some(received.ticket + 100), Ok(json!("late")))
        .await
        .unwrap_err();
    assert!(matches!(err, DaemonError::StaleSignalTicket { .. }));

    bus.finish("s1", Some(received.ticket), Ok(json!("right")))
        .await
        .expect("finish");
    let results = emitter.await.expect("join").expect("emit");
    assert_eq!(results, vec![json!("right")]);
}

#[tokio::test]
async fn waiting_again_abandons_unfinished_signal() {
    let bus = bus();
    bus.connect("s1", "x").await;

    let first = {
        let bus = bus.clone();
        tokio::spawn(async move { bus.emit("x", json!(1)).await })
    };
    let taken = bus.wait("s1").await.expect("first wait");
    assert_eq!(taken.args, json!(1));

    let second = {
        let bus = bus.clone();
        tokio::spawn(async move { bus.emit("x", json!(2)).await })
    };
    let retaken = bus.wait("s1").await.expect("second wait");
    assert_eq!(retaken.args, json!(2));
    assert!(retaken.ticket > taken.ticket);

    let err = first.await.expect("join").unwrap_err();
    assert!(matches!(err, DaemonError::SignalAbandoned { .. }));

    bus.finish("s1", None, Ok(json!("second"))).await.expect("finish");
    let results = second.await.expect("join").expect("emit");
    assert_eq!(results, vec![json!("second")]);
}

#[tokio::test]
async fn busy_subscriber_serves_emissions_one_at_a_time() {
    let bus = bus();
    bus.connect("s1", "x").await;

    let emitters: Vec<_> = (0..3)
        .map(|n| {
            let bus = bus.clone();
            tokio::spawn(async move { bus.emit("x", json!(n)).await })
        })
        .collect();

    let mut seen = Vec::new();
    for _ in 0..3 {
        let received = bus.wait("s1").await.expect("wait");
        seen.push(received.args.clone());
        bus.finish("s1", Some(received.ticket), Ok(received.args))
            .await
            .expect("finish");
    }
    seen.sort_by_key(|v| v.as_i64());
    assert_eq!(seen, vec![json!(0), json!(1), json!(2)]);

    for emitter in emitters {
        let results = emitter.await.expect("join").expect("emit");
        assert_eq!(results.len(), 1);
    }
}

#[tokio::test]
async fn signal_from_departed_emitter_is_skipped() {
    let bus = bus();
    bus.connect("s1", "x").await;

    // Queue a delivery, then drop its emitter before anyone waits.
    let mut departed = tokio_test::task::spawn(bus.emit("x", json!("departed")));
    assert_pending!(departed.poll());
    drop(departed);

    let live = {
        let bus = bus.clone();
        tokio::spawn(async move { bus.emit("x", json!("live")).await })
    };

    let received = bus.wait("s1").await.expect("wait");
    assert_eq!(received.args, json!("live"));
    bus.finish("s1", Some(received.ticket), Ok(json!("answered")))
        .await
        .expect("finish");

    let results = tokio::time::timeout(Duration::from_secs(5), live)
        .await
        .expect("live emitter finishes after one answer")
        .expect("join")
        .expect("emit");
    assert_eq!(results, vec![json!("answered")]);
}

/// Collects formatted log output for assertions.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn lines_containing(&self, needle: &str) -> Vec<String> {
        let buf = self.0.lock().expect("log buffer");
        String::from_utf8_lossy(&buf)
            .lines()
            .filter(|line| line.contains(needle))
            .map(str::to_owned)
            .collect()
    }
}

impl std::io::Write for CapturedLogs {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        self.0.lock().expect("log buffer").extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn watchdog_reports_outstanding_signal_until_answered() {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_max_level(tracing::Level::WARN)
        .with_ansi(false)
        .without_time()
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);
    let still_waiting = || logs.lines_containing("waiting for signal response");

    let bus = bus();
    bus.connect("s1", "contact.submitted").await;
    let mut emit = tokio_test::task::spawn(bus.emit("contact.submitted", json!(null)));
    assert_pending!(emit.poll());

    tokio::time::advance(Duration::from_millis(900)).await;
    settle().await;
    assert!(still_waiting().is_empty(), "quiet during the grace period");

    tokio::time::advance(Duration::from_millis(200)).await;
    settle().await;
    let records = still_waiting();
    assert_eq!(records.len(), 1, "{records:?}");
    assert!(records[0].contains("signal=contact.submitted"), "{}", records[0]);
    assert!(records[0].contains("subscriber=s1"), "{}", records[0]);
    assert!(records[0].contains("wait"), "{}", records[0]);

    tokio::time::advance(Duration::from_secs(30)).await;
    settle().await;
    assert_eq!(still_waiting().len(), 2);

    let received = bus.wait("s1").await.expect("wait");
    bus.finish("s1", Some(received.ticket), Ok(json!(null)))
        .await
        .expect("finish");
    assert_ready!(emit.poll()).expect("emit");

    tokio::time::advance(Duration::from_secs(120)).await;
    settle().await;
    assert_eq!(still_waiting().len(), 2, "no records once the emit resolved");
}
