//! Dispatch behaviour under the scenarios the messaging layer must survive:
//! ordering, single admission under notify storms, failure recovery and
//! mail for workers nobody is driving yet.

mod common;

use common::{received_count, RecordingWorker};
use parley_core::{
    ConversationDriver, DriverSettings, Hub, Message, NotifyOutcome, SendMessageRequest,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

fn bodies(messages: &[Message]) -> Vec<String> {
    messages.iter().map(|m| m.body.clone()).collect()
}

#[tokio::test]
async fn test_single_drain_returns_every_send_in_order() {
    let hub = Hub::new(4);
    let alice = hub.sender("Alice");

    let sent: Vec<String> = (0..50).map(|i| format!("m{}", i)).collect();
    for body in &sent {
        assert!(alice.send(&SendMessageRequest::new("Bob", body.clone())).success);
    }

    let drained = hub.mailboxes().drain_all("Bob").unwrap();
    assert_eq!(bodies(&drained), sent);
    assert!(drained.iter().all(|m| m.sender == "Alice"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_notify_storm_admits_one_run_at_a_time() {
    let hub = Hub::new(4);
    let bob = Arc::new(RecordingWorker::with_delay(Duration::from_millis(15)));
    hub.workers().register("Bob", bob.clone()).unwrap();

    let mut senders = Vec::new();
    for s in 0..8 {
        let sender = hub.sender(&format!("sender{}", s));
        senders.push(tokio::spawn(async move {
            for i in 0..25 {
                let response = sender.send(&SendMessageRequest::new("Bob", i.to_string()));
                assert!(response.success);
                tokio::task::yield_now().await;
            }
        }));
    }
    for handle in senders {
        handle.await.unwrap();
    }
    hub.dispatcher().wait_idle().await;

    assert_eq!(bob.max_active(), 1);
    let delivered: usize = bob
        .delivered()
        .iter()
        .map(|text| received_count(text).unwrap())
        .sum();
    assert_eq!(delivered, 200);
    assert!(!hub.mailboxes().has_pending("Bob"));
    assert!(!hub.workers().is_busy("Bob"));
}

#[tokio::test]
async fn test_idle_recipient_sees_message_in_next_run() {
    let hub = Hub::new(4);
    let bob = Arc::new(RecordingWorker::default());
    hub.workers().register("Bob", bob.clone()).unwrap();

    hub.sender("Alice")
        .send(&SendMessageRequest::new("Bob", "are you there?"));
    hub.dispatcher().wait_idle().await;

    assert_eq!(bob.runs(), 1);
    assert!(bob.delivered()[0].contains("[From Alice]: are you there?"));
}

#[test]
fn test_concurrent_drains_partition_pending_mail() {
    let hub = Hub::new(4);
    for i in 0..1000 {
        hub.mailboxes()
            .enqueue("Bob", Message::new("Alice", i.to_string()))
            .unwrap();
    }

    let drains: Vec<_> = (0..2)
        .map(|_| {
            let mailboxes = hub.mailboxes().clone();
            std::thread::spawn(move || mailboxes.drain_all("Bob").unwrap())
        })
        .collect();
    let results: Vec<Vec<Message>> = drains.into_iter().map(|h| h.join().unwrap()).collect();

    let ids: HashSet<String> = results.iter().flatten().map(|m| m.id.clone()).collect();
    assert_eq!(results[0].len() + results[1].len(), 1000);
    assert_eq!(ids.len(), 1000);
}

#[tokio::test]
async fn test_failed_run_releases_busy_flag() {
    let hub = Hub::new(4);
    let bob = Arc::new(RecordingWorker::default());
    bob.fail_next.store(true, std::sync::atomic::Ordering::SeqCst);
    hub.workers().register("Bob", bob.clone()).unwrap();

    let alice = hub.sender("Alice");
    assert!(alice.send(&SendMessageRequest::new("Bob", "first")).success);
    hub.dispatcher().wait_idle().await;

    assert!(!hub.workers().is_busy("Bob"));
    assert_eq!(hub.dispatcher().stats().failures, 1);

    hub.mailboxes()
        .enqueue("Bob", Message::new("Alice", "second"))
        .unwrap();
    assert_eq!(
        hub.dispatcher().notify("Bob").unwrap(),
        NotifyOutcome::Admitted
    );
    hub.dispatcher().wait_idle().await;

    assert_eq!(bob.runs(), 2);
    assert!(bob.delivered()[1].contains("second"));
}

#[tokio::test]
async fn test_panicking_run_releases_busy_flag() {
    let hub = Hub::new(4);
    let bob = Arc::new(RecordingWorker::default());
    bob.panic_next.store(true, std::sync::atomic::Ordering::SeqCst);
    hub.workers().register("Bob", bob.clone()).unwrap();

    hub.sender("Alice")
        .send(&SendMessageRequest::new("Bob", "boom"));
    hub.dispatcher().wait_idle().await;

    assert!(!hub.workers().is_busy("Bob"));
    assert_eq!(hub.dispatcher().stats().failures, 1);

    let response = hub
        .sender("Alice")
        .send(&SendMessageRequest::new("Bob", "still there?"));
    assert!(response.success);
    hub.dispatcher().wait_idle().await;
    assert_eq!(bob.runs(), 2);
}

#[tokio::test]
async fn test_panicking_delivery_is_counted_and_releases_busy_flag() {
    let hub = Hub::new(4);
    let bob = Arc::new(RecordingWorker::default());
    bob.panic_on_deliver.store(true, std::sync::atomic::Ordering::SeqCst);
    hub.workers().register("Bob", bob.clone()).unwrap();

    hub.sender("Alice")
        .send(&SendMessageRequest::new("Bob", "unreadable"));
    hub.dispatcher().wait_idle().await;

    assert!(!hub.workers().is_busy("Bob"));
    assert_eq!(hub.dispatcher().stats().failures, 1);
    assert_eq!(bob.runs(), 0);

    hub.sender("Alice")
        .send(&SendMessageRequest::new("Bob", "try again"));
    hub.dispatcher().wait_idle().await;
    assert_eq!(bob.runs(), 1);
    assert!(bob.delivered()[0].contains("[From Alice]: try again"));
}

#[tokio::test]
async fn test_mail_for_unregistered_worker_is_not_replayed() {
    let hub = Hub::new(4);
    let response = hub.sender("Alice").send(&SendMessageRequest::new("Bob", "hi"));
    assert!(response.success);
    assert_eq!(hub.dispatcher().stats().unregistered, 1);

    // Bob starts later on his own initiative
    let bob = Arc::new(RecordingWorker::default());
    let mut driver =
        ConversationDriver::new("Bob", bob.clone(), hub.clone(), DriverSettings::default());
    driver.start("You are Bob.").await.unwrap();
    hub.dispatcher().wait_idle().await;

    assert_eq!(bob.delivered(), vec!["You are Bob."]);
    let drained = hub.mailboxes().drain_all("Bob").unwrap();
    assert_eq!(bodies(&drained), vec!["hi"]);
}

#[tokio::test]
async fn test_burst_during_slow_run_is_one_admission() {
    let hub = Hub::new(4);
    let bob = Arc::new(RecordingWorker::with_delay(Duration::from_millis(500)));
    hub.workers().register("Bob", bob.clone()).unwrap();

    let alice = hub.sender("Alice");
    for body in ["one", "two", "three"] {
        assert!(alice.send(&SendMessageRequest::new("Bob", body)).success);
    }
    hub.dispatcher().wait_idle().await;

    let stats = hub.dispatcher().stats();
    assert_eq!(stats.admitted, 1);
    assert_eq!(stats.deduplicated, 2);
    assert_eq!(stats.runs, 1);

    let delivered = bob.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(
        delivered[0],
        "You have received 3 message(s):\n• [From Alice]: one\n• [From Alice]: two\n• [From Alice]: three"
    );
}

#[tokio::test]
async fn test_mail_arriving_mid_run_is_delivered_next() {
    let hub = Hub::new(4);
    let bob = Arc::new(RecordingWorker::with_delay(Duration::from_millis(200)));
    hub.workers().register("Bob", bob.clone()).unwrap();

    let alice = hub.sender("Alice");
    alice.send(&SendMessageRequest::new("Bob", "first"));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(hub.workers().is_busy("Bob"));

    alice.send(&SendMessageRequest::new("Bob", "second"));
    hub.dispatcher().wait_idle().await;

    let delivered = bob.delivered();
    assert_eq!(delivered.len(), 2);
    assert!(delivered[0].contains("first"));
    assert!(delivered[1].contains("second"));
    assert_eq!(bob.max_active(), 1);
    assert_eq!(hub.dispatcher().stats().admitted, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dispatch_concurrency_is_bounded() {
    let hub = Hub::new(1);
    let workers: Vec<Arc<RecordingWorker>> = (0..3)
        .map(|_| Arc::new(RecordingWorker::with_delay(Duration::from_millis(30))))
        .collect();
    for (i, worker) in workers.iter().enumerate() {
        hub.workers()
            .register(&format!("w{}", i), worker.clone())
            .unwrap();
    }

    let started = std::time::Instant::now();
    let alice = hub.sender("Alice");
    for i in 0..3 {
        alice.send(&SendMessageRequest::new(format!("w{}", i), "go"));
    }
    hub.dispatcher().wait_idle().await;

    // One permit: the three runs happen back to back
    assert!(started.elapsed() >= Duration::from_millis(90));
    assert!(workers.iter().all(|w| w.runs() == 1));
}
