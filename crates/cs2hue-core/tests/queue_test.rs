#![allow(clippy::unwrap_used)]
// Per-device queue behaviour against the recording fake gateway.

mod common;

use std::time::Duration;

use pretty_assertions::assert_eq;

use common::{FakeGateway, queues, settle};
use cs2hue_core::{Intent, LightId, WriteOptions, WriteOutcome};

fn light(id: &str) -> LightId {
    LightId::new(id)
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_enqueue_writes_once() {
    let gw = FakeGateway::with_lights(&["1"]);
    let q = queues(&gw);

    let first = q.enqueue(&light("1"), Intent::on_at(120), WriteOptions::default());
    let second = q.enqueue(&light("1"), Intent::on_at(120), WriteOptions::default());

    assert_eq!(first.outcome().await, WriteOutcome::Applied);
    assert_eq!(second.outcome().await, WriteOutcome::Deduplicated);
    assert_eq!(gw.writes_for("1"), vec![Intent::on_at(120)]);
}

#[tokio::test(start_paused = true)]
async fn test_forced_write_bypasses_dedup() {
    let gw = FakeGateway::with_lights(&["1"]);
    let q = queues(&gw);

    q.enqueue(&light("1"), Intent::on_at(120), WriteOptions::default());
    let forced = q.enqueue(&light("1"), Intent::on_at(120), WriteOptions::forced());

    assert_eq!(forced.outcome().await, WriteOutcome::Applied);
    assert_eq!(gw.writes_for("1").len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_stale_write_never_reaches_transport() {
    let gw = FakeGateway::with_lights(&["1"]);
    let q = queues(&gw);

    let ticket = q.enqueue(&light("1"), Intent::off(), WriteOptions::forced());
    q.epoch().advance();

    assert_eq!(ticket.outcome().await, WriteOutcome::Stale);
    assert!(gw.writes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_writes_apply_in_enqueue_order() {
    let gw = FakeGateway::with_lights(&["1", "2"]);
    let q = queues(&gw);

    for bri in [10, 20, 30, 40] {
        q.enqueue(&light("1"), Intent::on_at(bri), WriteOptions::default());
        q.enqueue(&light("2"), Intent::on_at(bri + 1), WriteOptions::forced());
    }
    let last = q.enqueue(&light("1"), Intent::off(), WriteOptions::default());
    last.outcome().await;
    settle(Duration::from_secs(1)).await;

    assert_eq!(
        gw.writes_for("1"),
        vec![
            Intent::on_at(10),
            Intent::on_at(20),
            Intent::on_at(30),
            Intent::on_at(40),
            Intent::off(),
        ]
    );
    assert_eq!(
        gw.writes_for("2"),
        vec![
            Intent::on_at(11),
            Intent::on_at(21),
            Intent::on_at(31),
            Intent::on_at(41),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_non_forced_writes_are_throttled() {
    let gw = FakeGateway::with_lights(&["1"]);
    let q = queues(&gw);

    let start = tokio::time::Instant::now();
    q.enqueue(&light("1"), Intent::on_at(10), WriteOptions::default());
    q.enqueue(&light("1"), Intent::on_at(20), WriteOptions::default())
        .outcome()
        .await;

    let second_write = q.last_write_at(&light("1")).unwrap();
    assert!(second_write.duration_since(start) >= Duration::from_millis(100));
}

#[tokio::test(start_paused = true)]
async fn test_verified_write_confirms_on_first_read() {
    let gw = FakeGateway::with_lights(&["1"]);
    let q = queues(&gw);

    let outcome = q
        .enqueue(&light("1"), Intent::on_at(77), WriteOptions::verified(2))
        .outcome()
        .await;

    assert_eq!(outcome, WriteOutcome::Applied);
    assert_eq!(gw.writes_for("1").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_verify_resends_until_retries_exhausted() {
    let gw = FakeGateway::with_lights(&["1"]);
    gw.ignore_writes("1");
    let q = queues(&gw);

    let outcome = q
        .enqueue(&light("1"), Intent::on_at(77), WriteOptions::verified(2))
        .outcome()
        .await;

    assert_eq!(outcome, WriteOutcome::Unverified);
    assert_eq!(gw.writes_for("1"), vec![Intent::on_at(77); 3]);
}

#[tokio::test(start_paused = true)]
async fn test_gateway_failure_is_reported_not_raised() {
    let gw = FakeGateway::with_lights(&["1"]);
    gw.set_failing(true);
    let q = queues(&gw);

    let outcome = q
        .enqueue(&light("1"), Intent::on_at(50), WriteOptions::forced())
        .outcome()
        .await;

    assert_eq!(outcome, WriteOutcome::Failed);
    assert!(q.last_intent(&light("1")).is_none());

    gw.set_failing(false);
    let retry = q
        .enqueue(&light("1"), Intent::on_at(50), WriteOptions::default())
        .outcome()
        .await;
    assert_eq!(retry, WriteOutcome::Applied);
    assert_eq!(q.last_intent(&light("1")), Some(Intent::on_at(50)));
}

#[tokio::test(start_paused = true)]
async fn test_clear_caches_allows_repeat_write() {
    let gw = FakeGateway::with_lights(&["1"]);
    let q = queues(&gw);

    q.enqueue(&light("1"), Intent::on_at(90), WriteOptions::default())
        .outcome()
        .await;
    q.clear_caches();
    let again = q
        .enqueue(&light("1"), Intent::on_at(90), WriteOptions::default())
        .outcome()
        .await;

    assert_eq!(again, WriteOutcome::Applied);
    assert_eq!(gw.writes_for("1").len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_resolves_new_work_as_stale() {
    let gw = FakeGateway::with_lights(&["1"]);
    let q = queues(&gw);
    q.shutdown();

    let outcome = q
        .enqueue(&light("1"), Intent::on_at(90), WriteOptions::forced())
        .outcome()
        .await;

    assert_eq!(outcome, WriteOutcome::Stale);
    assert!(gw.writes().is_empty());
}
