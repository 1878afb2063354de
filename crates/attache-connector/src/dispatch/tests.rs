//! Unit tests for the asynchronous delivery thread.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::*;
use crate::listener::{ConnectorListener, MessageEvent};
use crate::pending::lock_unpoisoned;

struct Collecting {
    lines: Arc<Mutex<Vec<String>>>,
}

impl ConnectorListener for Collecting {
    fn message_received(&self, event: &MessageEvent) {
        lock_unpoisoned(&self.lines).push(event.message().to_owned());
    }
}

fn wait_for(lines: &Arc<Mutex<Vec<String>>>, expected: usize) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while lock_unpoisoned(lines).len() < expected {
        assert!(Instant::now() < deadline, "delivery did not happen in time");
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn delivers_in_arrival_order() {
    let registry = Arc::new(ListenerRegistry::new());
    let lines = Arc::new(Mutex::new(Vec::new()));
    registry.add(
        Arc::new(Collecting {
            lines: Arc::clone(&lines),
        }),
        DeliveryMode::Asynchronous,
    );
    let delivery = DeliveryThread::spawn(Arc::clone(&registry)).expect("spawn delivery");

    for n in 0..3 {
        delivery.enqueue(ConnectorEvent::Received(format!("CHAT {n} ACTIVITY")));
    }
    wait_for(&lines, 3);

    let seen = lock_unpoisoned(&lines).clone();
    assert_eq!(
        seen,
        vec!["CHAT 0 ACTIVITY", "CHAT 1 ACTIVITY", "CHAT 2 ACTIVITY"]
    );
}

#[test]
fn shutdown_drains_queued_events_then_joins() {
    let registry = Arc::new(ListenerRegistry::new());
    let lines = Arc::new(Mutex::new(Vec::new()));
    registry.add(
        Arc::new(Collecting {
            lines: Arc::clone(&lines),
        }),
        DeliveryMode::Asynchronous,
    );
    let mut delivery = DeliveryThread::spawn(Arc::clone(&registry)).expect("spawn delivery");

    delivery.enqueue(ConnectorEvent::Received("VOICEMAIL 7 STATUS PLAYED".into()));
    delivery.shutdown();

    assert_eq!(lock_unpoisoned(&lines).len(), 1, "queued event delivered");
}

#[test]
fn enqueue_after_shutdown_is_dropped_silently() {
    let registry = Arc::new(ListenerRegistry::new());
    let lines = Arc::new(Mutex::new(Vec::new()));
    registry.add(
        Arc::new(Collecting {
            lines: Arc::clone(&lines),
        }),
        DeliveryMode::Asynchronous,
    );
    let mut delivery = DeliveryThread::spawn(Arc::clone(&registry)).expect("spawn delivery");

    delivery.shutdown();
    delivery.enqueue(ConnectorEvent::Received("IGNORED".into()));

    assert!(lock_unpoisoned(&lines).is_empty());
}
