//! Inbound and outbound pumps driven through in-memory channels in place of a socket.

mod common;

use std::time::Duration;

use axum::extract::ws::Message;
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::StreamExt;

use chathub_server::ws::actor::{outbound_pump, serve_connection};
use chathub_server::ws::protocol::decode_batch;
use chathub_server::ws::{Connection, ConnectionState, Envelope, DEFAULT_QUEUE_CAPACITY};
use common::hub_with_chats;

type Inbound = UnboundedSender<Result<Message, std::io::Error>>;

async fn next_frame(rx: &mut UnboundedReceiver<Message>) -> Message {
    tokio::time::timeout(Duration::from_secs(2), rx.next())
        .await
        .expect("frame within timeout")
        .expect("sink still open")
}

fn send_text(tx: &Inbound, text: &str) {
    tx.unbounded_send(Ok(Message::Text(text.into())))
        .expect("inbound pump alive");
}

#[tokio::test]
async fn malformed_payload_does_not_end_the_session() {
    let hub = hub_with_chats(vec![(42, vec![1, 2])]);
    let (peer, mut peer_rx) = Connection::new(2, DEFAULT_QUEUE_CAPACITY);
    hub.register(&peer);

    let (conn, rx) = Connection::new(1, DEFAULT_QUEUE_CAPACITY);
    let (in_tx, in_rx) = unbounded::<Result<Message, std::io::Error>>();
    let (out_tx, _out_rx) = unbounded::<Message>();
    let session = tokio::spawn(serve_connection(out_tx, in_rx, hub.clone(), conn.clone(), rx));

    send_text(&in_tx, "{not json");
    in_tx
        .unbounded_send(Ok(Message::Binary(vec![0xff, 0x00].into())))
        .unwrap();
    send_text(
        &in_tx,
        r#"{"type":"message","content":"hi","chat_id":42,"user_id":999}"#,
    );

    let got = tokio::time::timeout(Duration::from_secs(2), peer_rx.recv())
        .await
        .expect("delivered within timeout")
        .expect("queue open");
    assert_eq!(got.content(), "hi");
    assert_eq!(got.user_id(), 1, "sender identity comes from the connection");
    assert_eq!(conn.state(), ConnectionState::Active);

    drop(in_tx);
    tokio::time::timeout(Duration::from_secs(2), session)
        .await
        .expect("session ends when the peer goes away")
        .unwrap();
    assert!(!hub.is_online(1));
    assert_eq!(conn.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn close_frame_from_peer_unregisters() {
    let hub = hub_with_chats(vec![]);
    let (conn, rx) = Connection::new(1, 8);
    let (in_tx, in_rx) = unbounded::<Result<Message, std::io::Error>>();
    let (out_tx, mut out_rx) = unbounded::<Message>();
    let session = tokio::spawn(serve_connection(out_tx, in_rx, hub.clone(), conn.clone(), rx));

    in_tx.unbounded_send(Ok(Message::Close(None))).unwrap();
    tokio::time::timeout(Duration::from_secs(2), session)
        .await
        .unwrap()
        .unwrap();

    assert!(!hub.is_online(1));
    assert!(matches!(next_frame(&mut out_rx).await, Message::Close(_)));
}

#[tokio::test]
async fn queued_envelopes_are_batched_into_one_frame() {
    let hub = hub_with_chats(vec![]);
    let (conn, rx) = Connection::new(4, 8);
    hub.register(&conn);
    for text in ["a", "b", "c"] {
        conn.try_enqueue(Envelope::message(text, 1, 2)).unwrap();
    }

    let (out_tx, mut out_rx) = unbounded::<Message>();
    let pump = tokio::spawn(outbound_pump(out_tx, rx, hub.clone(), conn.clone()));

    let Message::Text(frame) = next_frame(&mut out_rx).await else {
        panic!("expected a text frame");
    };
    let contents: Vec<String> = decode_batch(frame.as_str())
        .unwrap()
        .iter()
        .map(|e| e.content().to_string())
        .collect();
    assert_eq!(contents, vec!["a", "b", "c"]);

    hub.unregister(&conn);
    assert!(matches!(next_frame(&mut out_rx).await, Message::Close(_)));
    pump.await.unwrap();
}

#[tokio::test]
async fn write_failure_tears_down_both_pumps() {
    let hub = hub_with_chats(vec![(3, vec![1, 2])]);
    let (conn, rx) = Connection::new(2, 8);
    let (_in_tx, in_rx) = unbounded::<Result<Message, std::io::Error>>();
    let (out_tx, out_rx) = unbounded::<Message>();
    drop(out_rx);

    let session = tokio::spawn(serve_connection(out_tx, in_rx, hub.clone(), conn.clone(), rx));
    tokio::time::timeout(Duration::from_secs(2), async {
        while !hub.is_online(2) {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("connection registered");

    hub.broadcast(Envelope::message("boom", 3, 1)).await.unwrap();

    tokio::time::timeout(Duration::from_secs(2), session)
        .await
        .expect("inbound pump stops after the writer fails")
        .unwrap();
    assert!(!hub.is_online(2));
    assert_eq!(conn.state(), ConnectionState::Closed);
}
