//! Fan-out ordering and slow-consumer behavior of the hub.

use interaction_service::websocket::{ClientHandle, Hub, CLIENT_QUEUE_CAPACITY};
use uuid::Uuid;

fn client(user: &str) -> (ClientHandle, tokio::sync::mpsc::Receiver<String>) {
    ClientHandle::new(Uuid::new_v4(), user.to_string(), user.to_string())
}

#[tokio::test]
async fn fanout_is_fifo_and_slow_consumers_are_evicted() {
    let hub = Hub::new();

    // Healthy consumer, drained as the broadcast proceeds.
    let (c1, mut rx1) = client("u1");
    let id1 = c1.id;
    // Blocked consumer, its queue never drained.
    let (c2, _rx2) = client("u2");
    let id2 = c2.id;

    hub.register(c1).await;
    hub.register(c2).await;
    hub.join_room(id1, "r1").await;
    hub.join_room(id2, "r1").await;
    assert_eq!(hub.client_count().await, 2);

    let total = CLIENT_QUEUE_CAPACITY + 1;
    let mut received = Vec::with_capacity(total);
    for i in 0..total {
        hub.broadcast_room("r1", &format!("m{i}")).await;
        received.push(rx1.recv().await.expect("healthy client keeps receiving"));
    }

    // Every message arrived, in publish order.
    let expected: Vec<String> = (0..total).map(|i| format!("m{i}")).collect();
    assert_eq!(received, expected);

    // The blocked client hit capacity on message 257 and was dropped from
    // the hub and the room without ever blocking the publisher.
    assert!(hub.is_registered(id1).await);
    assert!(!hub.is_registered(id2).await);
    assert_eq!(hub.room_members("r1").await, 1);
    assert_eq!(hub.client_count().await, 1);
}

#[tokio::test]
async fn eviction_closes_the_send_queue() {
    let hub = Hub::new();
    let (c2, mut rx2) = client("u2");
    let id2 = c2.id;
    hub.register(c2).await;
    hub.join_room(id2, "r1").await;

    for i in 0..=CLIENT_QUEUE_CAPACITY {
        hub.broadcast_room("r1", &format!("m{i}")).await;
    }
    assert!(!hub.is_registered(id2).await);

    // The writer task drains what was queued, then sees the channel close.
    let mut drained = 0;
    while rx2.recv().await.is_some() {
        drained += 1;
    }
    assert_eq!(drained, CLIENT_QUEUE_CAPACITY);
}

#[tokio::test]
async fn broadcast_all_reaches_every_client() {
    let hub = Hub::new();
    let (c1, mut rx1) = client("u1");
    let (c2, mut rx2) = client("u2");
    hub.register(c1).await;
    hub.register(c2).await;

    hub.broadcast_all("announcement").await;
    assert_eq!(rx1.recv().await.unwrap(), "announcement");
    assert_eq!(rx2.recv().await.unwrap(), "announcement");
}

#[tokio::test]
async fn send_to_user_targets_all_connections_of_that_user() {
    let hub = Hub::new();
    let (c1a, mut rx1a) = client("u1");
    let (c1b, mut rx1b) = client("u1");
    let (c2, mut rx2) = client("u2");
    hub.register(c1a).await;
    hub.register(c1b).await;
    hub.register(c2).await;

    hub.send_to_user("u1", "direct").await;
    assert_eq!(rx1a.recv().await.unwrap(), "direct");
    assert_eq!(rx1b.recv().await.unwrap(), "direct");
    assert!(rx2.try_recv().is_err());
}
