//! Registry and fan-out behaviour of the hub, driven without sockets.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chathub_server::db::store::{ParticipantLookup, StoreError};
use chathub_server::ws::{
    ChatId, Connection, ConnectionState, Envelope, Hub, UserId, DEFAULT_QUEUE_CAPACITY,
};
use common::hub_with_chats;

/// Membership lookup whose first answer is delayed.
struct SlowFirstLookup {
    answered: AtomicBool,
    members: Vec<UserId>,
}

#[async_trait]
impl ParticipantLookup for SlowFirstLookup {
    async fn members(&self, _chat_id: ChatId) -> Result<Vec<UserId>, StoreError> {
        if !self.answered.swap(true, Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        Ok(self.members.clone())
    }
}

#[tokio::test]
async fn broadcast_reaches_members_but_not_sender() {
    let hub = hub_with_chats(vec![(42, vec![1, 2, 3])]);
    let (u1, mut rx1) = Connection::new(1, DEFAULT_QUEUE_CAPACITY);
    let (u2, mut rx2) = Connection::new(2, DEFAULT_QUEUE_CAPACITY);
    let (u3_phone, mut rx3a) = Connection::new(3, DEFAULT_QUEUE_CAPACITY);
    let (u3_laptop, mut rx3b) = Connection::new(3, DEFAULT_QUEUE_CAPACITY);
    for conn in [&u1, &u2, &u3_phone, &u3_laptop] {
        hub.register(conn);
    }

    let report = hub
        .broadcast(Envelope::message("hi", 42, 1))
        .await
        .unwrap();
    assert_eq!(report.recipients, 2);
    assert_eq!(report.delivered, 3);
    assert_eq!(report.evicted, 0);

    let got = rx2.try_recv().unwrap();
    assert_eq!(got.content(), "hi");
    assert_eq!(got.chat_id(), 42);
    assert_eq!(got.user_id(), 1);
    assert!(rx2.try_recv().is_err(), "exactly one envelope");
    assert!(rx3a.try_recv().is_ok());
    assert!(rx3b.try_recv().is_ok());
    assert!(rx1.try_recv().is_err(), "sender never receives its own message");
}

#[tokio::test]
async fn non_members_receive_nothing() {
    let hub = hub_with_chats(vec![(42, vec![1, 2])]);
    let (u2, mut rx2) = Connection::new(2, 8);
    let (u3, mut rx3) = Connection::new(3, 8);
    hub.register(&u2);
    hub.register(&u3);

    hub.broadcast(Envelope::message("hi", 42, 1)).await.unwrap();

    assert!(rx2.try_recv().is_ok());
    assert!(rx3.try_recv().is_err());
}

#[tokio::test]
async fn offline_members_are_skipped() {
    let hub = hub_with_chats(vec![(7, vec![1, 2, 3])]);
    let (u2, mut rx2) = Connection::new(2, 8);
    hub.register(&u2);

    let report = hub.broadcast(Envelope::message("x", 7, 1)).await.unwrap();
    assert_eq!(report.recipients, 2);
    assert_eq!(report.delivered, 1);
    assert!(rx2.try_recv().is_ok());
    assert!(!hub.is_online(3));
}

#[tokio::test]
async fn full_queue_evicts_only_the_slow_consumer() {
    let hub = hub_with_chats(vec![(42, vec![1, 2, 3])]);
    let (slow, _slow_rx) = Connection::new(2, DEFAULT_QUEUE_CAPACITY);
    let (healthy, mut healthy_rx) = Connection::new(3, DEFAULT_QUEUE_CAPACITY);
    hub.register(&slow);
    hub.register(&healthy);

    for i in 0..DEFAULT_QUEUE_CAPACITY {
        slow.try_enqueue(Envelope::message(format!("backlog {i}"), 42, 1))
            .unwrap();
    }

    let report = hub.broadcast(Envelope::message("hi", 42, 1)).await.unwrap();
    assert_eq!(report.evicted, 1);
    assert_eq!(report.delivered, 1);

    assert!(!hub.is_online(2));
    assert_eq!(slow.state(), ConnectionState::Closed);
    tokio::time::timeout(Duration::from_secs(1), slow.closed())
        .await
        .expect("evicted connection is signalled closed");

    assert_eq!(healthy_rx.try_recv().unwrap().content(), "hi");
    assert!(hub.is_online(3));
}

#[tokio::test]
async fn unregister_keeps_user_while_other_connections_remain() {
    let hub = hub_with_chats(vec![]);
    let (a, _rx_a) = Connection::new(5, 8);
    let (b, _rx_b) = Connection::new(5, 8);
    hub.register(&a);
    hub.register(&b);

    hub.unregister(&a);
    assert!(hub.is_online(5));
    assert_eq!(hub.connection_count(5), 1);

    hub.unregister(&b);
    assert!(!hub.is_online(5));
    assert_eq!(hub.online_user_count(), 0);
}

#[tokio::test]
async fn send_to_user_targets_every_device() {
    let hub = hub_with_chats(vec![]);
    let (a, mut rx_a) = Connection::new(9, 8);
    let (b, mut rx_b) = Connection::new(9, 8);
    hub.register(&a);
    hub.register(&b);

    let delivered = hub.send_to_user(9, &Envelope::new("presence", "online", 0, 1));
    assert_eq!(delivered, 2);
    assert_eq!(rx_a.try_recv().unwrap().kind(), "presence");
    assert_eq!(rx_b.try_recv().unwrap().kind(), "presence");
    assert_eq!(hub.send_to_user(10, &Envelope::message("x", 0, 1)), 0);
}

#[tokio::test]
async fn conversation_order_is_preserved() {
    let hub = hub_with_chats(vec![(1, vec![1, 2])]);
    let (u2, mut rx2) = Connection::new(2, DEFAULT_QUEUE_CAPACITY);
    hub.register(&u2);

    for i in 0..100 {
        hub.broadcast(Envelope::message(i.to_string(), 1, 1))
            .await
            .unwrap();
    }
    for i in 0..100 {
        assert_eq!(rx2.try_recv().unwrap().content(), i.to_string());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn slow_lookup_does_not_reorder_a_conversation() {
    let hub = Hub::new(Arc::new(SlowFirstLookup {
        answered: AtomicBool::new(false),
        members: vec![1, 2],
    }));
    let (u2, mut rx2) = Connection::new(2, 8);
    hub.register(&u2);

    let first = tokio::spawn({
        let hub = hub.clone();
        async move { hub.broadcast(Envelope::message("first", 1, 1)).await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    let second = tokio::spawn({
        let hub = hub.clone();
        async move { hub.broadcast(Envelope::message("second", 1, 1)).await }
    });

    second.await.unwrap().unwrap();
    first.await.unwrap().unwrap();

    assert_eq!(rx2.try_recv().unwrap().content(), "first");
    assert_eq!(rx2.try_recv().unwrap().content(), "second");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_churn_leaves_no_empty_sets() {
    let members: Vec<i64> = (1..=8).collect();
    let hub = Arc::new(hub_with_chats(vec![(1, members)]));

    let mut tasks = Vec::new();
    for worker in 0..32i64 {
        let hub = hub.clone();
        tasks.push(tokio::spawn(async move {
            let user_id = worker % 8 + 1;
            for round in 0..50 {
                let (conn, mut rx) = Connection::new(user_id, 4);
                hub.register(&conn);
                hub.broadcast(Envelope::message(format!("{worker}:{round}"), 1, user_id))
                    .await
                    .unwrap();
                while rx.try_recv().is_ok() {}
                hub.unregister(&conn);
                tokio::task::yield_now().await;
            }
        }));
    }
    for task in tasks {
        task.await.expect("worker panicked");
    }

    assert!(!hub.has_empty_entries());
    assert_eq!(hub.online_user_count(), 0);
}
