//! Integration tests for the realtime session hub: room membership, typing
//! relay, message fan-out, and the presence grace period.

use actix::prelude::*;
use huddle::app_config::ChatConfig;
use huddle::web::chat::message::{self, ChatMessage, ChatRef, LocationPing, Reply, UserRef};
use huddle::web::chat::server::ChatServer;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Records every event the hub pushes at one connection.
struct Recorder {
    log: Arc<Mutex<Vec<String>>>,
}

impl Actor for Recorder {
    type Context = Context<Self>;
}

impl Handler<Reply> for Recorder {
    type Result = ();

    fn handle(&mut self, msg: Reply, _: &mut Context<Self>) {
        self.log.lock().unwrap().push(msg.0);
    }
}

/// Mailbox barrier: awaiting this guarantees all earlier pushes are logged.
struct Flush;

impl Message for Flush {
    type Result = ();
}

impl Handler<Flush> for Recorder {
    type Result = ();

    fn handle(&mut self, _: Flush, _: &mut Context<Self>) {}
}

fn recorder() -> (Addr<Recorder>, Arc<Mutex<Vec<String>>>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let addr = Recorder { log: log.clone() }.start();
    (addr, log)
}

fn hub(grace_ms: u64) -> Addr<ChatServer> {
    ChatServer::new(ChatConfig {
        presence_grace_ms: grace_ms,
    })
    .start()
}

async fn connect(hub: &Addr<ChatServer>, rec: &Addr<Recorder>) -> usize {
    hub.send(message::Connect {
        addr: rec.clone().recipient(),
    })
    .await
    .unwrap()
}

async fn setup(hub: &Addr<ChatServer>, id: usize, user_id: &str, name: &str) {
    hub.send(message::Setup {
        id,
        user: UserRef {
            id: user_id.to_string(),
            name: name.to_string(),
        },
    })
    .await
    .unwrap();
}

async fn flush(rec: &Addr<Recorder>) {
    rec.send(Flush).await.unwrap();
}

/// Data payloads of every logged event with the given wire name.
fn events_named(log: &Arc<Mutex<Vec<String>>>, name: &str) -> Vec<Value> {
    log.lock()
        .unwrap()
        .iter()
        .filter_map(|s| serde_json::from_str::<Value>(s).ok())
        .filter(|v| v["event"] == name)
        .map(|v| v["data"].clone())
        .collect()
}

fn test_message(id: &str, chat_id: &str, sender: &str, users: Option<Vec<&str>>) -> ChatMessage {
    ChatMessage {
        id: id.to_string(),
        content: "hello there".to_string(),
        sender: UserRef {
            id: sender.to_string(),
            name: sender.to_string(),
        },
        chat: ChatRef {
            id: chat_id.to_string(),
            name: Some("room".to_string()),
            is_group: true,
            users: users.map(|ids| {
                ids.into_iter()
                    .map(|id| UserRef {
                        id: id.to_string(),
                        name: id.to_string(),
                    })
                    .collect()
            }),
        },
    }
}

#[actix_rt::test]
async fn setup_acknowledges_on_that_connection_only() {
    let hub = hub(5000);
    let (rec_a, log_a) = recorder();
    let (rec_b, log_b) = recorder();

    let ca = connect(&hub, &rec_a).await;
    let cb = connect(&hub, &rec_b).await;
    setup(&hub, ca, "A", "Alice").await;
    flush(&rec_a).await;
    flush(&rec_b).await;

    assert_eq!(events_named(&log_a, "connected").len(), 1);
    assert!(events_named(&log_b, "connected").is_empty());

    setup(&hub, cb, "B", "Bob").await;
    flush(&rec_b).await;
    assert_eq!(events_named(&log_b, "connected").len(), 1);
}

#[actix_rt::test]
async fn typing_reaches_other_members_but_not_emitter() {
    let hub = hub(5000);
    let (rec_a, log_a) = recorder();
    let (rec_b, log_b) = recorder();

    let ca = connect(&hub, &rec_a).await;
    let cb = connect(&hub, &rec_b).await;
    setup(&hub, ca, "A", "Alice").await;
    setup(&hub, cb, "B", "Bob").await;
    hub.send(message::JoinChat {
        id: ca,
        chat_id: "chat123".to_string(),
    })
    .await
    .unwrap();
    hub.send(message::JoinChat {
        id: cb,
        chat_id: "chat123".to_string(),
    })
    .await
    .unwrap();

    hub.send(message::Typing {
        id: ca,
        chat_id: "chat123".to_string(),
        started: true,
    })
    .await
    .unwrap();
    hub.send(message::Typing {
        id: ca,
        chat_id: "chat123".to_string(),
        started: false,
    })
    .await
    .unwrap();
    flush(&rec_a).await;
    flush(&rec_b).await;

    assert_eq!(events_named(&log_b, "typing"), vec![Value::from("chat123")]);
    assert_eq!(
        events_named(&log_b, "stop typing"),
        vec![Value::from("chat123")]
    );
    assert!(
        events_named(&log_a, "typing").is_empty(),
        "emitter must not hear its own typing event"
    );
}

#[actix_rt::test]
async fn join_chat_twice_delivers_once() {
    let hub = hub(5000);
    let (rec_a, log_a) = recorder();
    let (rec_b, _) = recorder();

    let ca = connect(&hub, &rec_a).await;
    let cb = connect(&hub, &rec_b).await;
    setup(&hub, ca, "A", "Alice").await;
    setup(&hub, cb, "B", "Bob").await;

    // Room membership is a set, not a multiset.
    for _ in 0..2 {
        hub.send(message::JoinChat {
            id: ca,
            chat_id: "chat123".to_string(),
        })
        .await
        .unwrap();
    }
    hub.send(message::JoinChat {
        id: cb,
        chat_id: "chat123".to_string(),
    })
    .await
    .unwrap();

    hub.send(message::Typing {
        id: cb,
        chat_id: "chat123".to_string(),
        started: true,
    })
    .await
    .unwrap();
    flush(&rec_a).await;

    assert_eq!(
        events_named(&log_a, "typing").len(),
        1,
        "duplicate join must not duplicate delivery"
    );
}

#[actix_rt::test]
async fn relay_reaches_participants_user_rooms_not_sender() {
    let hub = hub(5000);
    let (rec_a, log_a) = recorder();
    let (rec_b1, log_b1) = recorder();
    let (rec_b2, log_b2) = recorder();

    let ca = connect(&hub, &rec_a).await;
    let cb1 = connect(&hub, &rec_b1).await;
    let cb2 = connect(&hub, &rec_b2).await;
    setup(&hub, ca, "A", "Alice").await;
    setup(&hub, cb1, "B", "Bob").await;
    setup(&hub, cb2, "B", "Bob").await;

    let msg = test_message("m1", "chat123", "A", Some(vec!["A", "B"]));
    hub.send(message::RelayMessage {
        id: ca,
        message: msg,
    })
    .await
    .unwrap();
    flush(&rec_a).await;
    flush(&rec_b1).await;
    flush(&rec_b2).await;

    // Every one of B's connections hears it; the sender hears nothing.
    for log in [&log_b1, &log_b2] {
        let received = events_named(log, "message received");
        assert_eq!(received.len(), 1);
        assert_eq!(received[0]["id"], "m1");
        assert_eq!(received[0]["content"], "hello there");
        assert_eq!(received[0]["sender"]["id"], "A");
    }
    assert!(events_named(&log_a, "message received").is_empty());
}

#[actix_rt::test]
async fn relay_skipped_when_participant_list_missing() {
    let hub = hub(5000);
    let (rec_a, _) = recorder();
    let (rec_b, log_b) = recorder();

    let ca = connect(&hub, &rec_a).await;
    let cb = connect(&hub, &rec_b).await;
    setup(&hub, ca, "A", "Alice").await;
    setup(&hub, cb, "B", "Bob").await;

    let msg = test_message("m1", "chat123", "A", None);
    hub.send(message::RelayMessage {
        id: ca,
        message: msg,
    })
    .await
    .unwrap();
    flush(&rec_b).await;

    assert!(events_named(&log_b, "message received").is_empty());
}

#[actix_rt::test]
async fn location_update_broadcasts_to_others_with_server_timestamp() {
    let hub = hub(5000);
    let (rec_x, log_x) = recorder();
    let (rec_b, log_b) = recorder();

    let cx = connect(&hub, &rec_x).await;
    let cb = connect(&hub, &rec_b).await;
    setup(&hub, cx, "X", "Xavier").await;
    setup(&hub, cb, "B", "Bob").await;

    hub.send(message::LocationUpdate {
        id: cx,
        ping: LocationPing {
            lat: 12.9,
            lng: 77.6,
            accuracy: 5.0,
        },
    })
    .await
    .unwrap();
    flush(&rec_x).await;
    flush(&rec_b).await;

    let updates = events_named(&log_b, "location-update");
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0]["user_id"], "X");
    assert_eq!(updates[0]["user_name"], "Xavier");
    assert_eq!(updates[0]["lat"], 12.9);
    assert_eq!(updates[0]["lng"], 77.6);
    assert_eq!(updates[0]["accuracy"], 5.0);
    assert!(updates[0]["timestamp"].as_i64().unwrap() > 0);

    assert!(
        events_named(&log_x, "location-update").is_empty(),
        "origin must not receive its own sample"
    );
}

#[actix_rt::test]
async fn initial_locations_includes_existing_samples() {
    let hub = hub(5000);
    let (rec_x, _) = recorder();
    let (rec_y, log_y) = recorder();

    let cx = connect(&hub, &rec_x).await;
    setup(&hub, cx, "X", "Xavier").await;
    hub.send(message::LocationUpdate {
        id: cx,
        ping: LocationPing {
            lat: 12.9,
            lng: 77.6,
            accuracy: 5.0,
        },
    })
    .await
    .unwrap();

    // Y connects afterwards and gets the snapshot.
    let cy = connect(&hub, &rec_y).await;
    setup(&hub, cy, "Y", "Yara").await;
    flush(&rec_y).await;

    let snapshots = events_named(&log_y, "initial-locations");
    assert_eq!(snapshots.len(), 1);
    let samples = snapshots[0].as_array().unwrap();
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0]["user_id"], "X");
    assert_eq!(samples[0]["lat"], 12.9);
}

#[actix_rt::test]
async fn grace_rejoin_keeps_presence() {
    let hub = hub(100);
    let (rec_x, _) = recorder();
    let (rec_b, log_b) = recorder();

    let cx = connect(&hub, &rec_x).await;
    let cb = connect(&hub, &rec_b).await;
    setup(&hub, cx, "X", "Xavier").await;
    setup(&hub, cb, "B", "Bob").await;
    hub.send(message::LocationUpdate {
        id: cx,
        ping: LocationPing {
            lat: 1.0,
            lng: 2.0,
            accuracy: 3.0,
        },
    })
    .await
    .unwrap();

    hub.send(message::Disconnect { id: cx }).await.unwrap();

    // Reconnect inside the grace window.
    let (rec_x2, _) = recorder();
    let cx2 = connect(&hub, &rec_x2).await;
    setup(&hub, cx2, "X", "Xavier").await;

    actix_rt::time::sleep(Duration::from_millis(250)).await;
    flush(&rec_b).await;

    assert!(
        events_named(&log_b, "user-disconnected").is_empty(),
        "rejoin within the grace window must suppress the departure broadcast"
    );

    // The sample survived: a late joiner still sees it.
    let (rec_y, log_y) = recorder();
    let cy = connect(&hub, &rec_y).await;
    setup(&hub, cy, "Y", "Yara").await;
    flush(&rec_y).await;
    let snapshots = events_named(&log_y, "initial-locations");
    assert_eq!(snapshots[0].as_array().unwrap().len(), 1);
}

#[actix_rt::test]
async fn grace_expiry_evicts_and_announces() {
    let hub = hub(100);
    let (rec_x, _) = recorder();
    let (rec_b, log_b) = recorder();

    let cx = connect(&hub, &rec_x).await;
    let cb = connect(&hub, &rec_b).await;
    setup(&hub, cx, "X", "Xavier").await;
    setup(&hub, cb, "B", "Bob").await;
    hub.send(message::LocationUpdate {
        id: cx,
        ping: LocationPing {
            lat: 1.0,
            lng: 2.0,
            accuracy: 3.0,
        },
    })
    .await
    .unwrap();

    hub.send(message::Disconnect { id: cx }).await.unwrap();
    actix_rt::time::sleep(Duration::from_millis(250)).await;
    flush(&rec_b).await;

    assert_eq!(
        events_named(&log_b, "user-disconnected"),
        vec![Value::from("X")]
    );

    // Eviction removed the sample from later snapshots.
    let (rec_y, log_y) = recorder();
    let cy = connect(&hub, &rec_y).await;
    setup(&hub, cy, "Y", "Yara").await;
    flush(&rec_y).await;
    let snapshots = events_named(&log_y, "initial-locations");
    assert!(snapshots[0].as_array().unwrap().is_empty());
}

#[actix_rt::test]
async fn disconnect_after_grace_rejoin_still_evicts() {
    let hub = hub(100);
    let (rec_x, _) = recorder();
    let (rec_b, log_b) = recorder();

    let cx = connect(&hub, &rec_x).await;
    let cb = connect(&hub, &rec_b).await;
    setup(&hub, cx, "X", "Xavier").await;
    setup(&hub, cb, "B", "Bob").await;
    hub.send(message::LocationUpdate {
        id: cx,
        ping: LocationPing {
            lat: 1.0,
            lng: 2.0,
            accuracy: 3.0,
        },
    })
    .await
    .unwrap();

    hub.send(message::Disconnect { id: cx }).await.unwrap();

    // Rejoin inside the window: the new connection adopts the sample.
    let (rec_x2, _) = recorder();
    let cx2 = connect(&hub, &rec_x2).await;
    setup(&hub, cx2, "X", "Xavier").await;
    actix_rt::time::sleep(Duration::from_millis(250)).await;

    // The second disconnect must still arm the eviction timer.
    hub.send(message::Disconnect { id: cx2 }).await.unwrap();
    actix_rt::time::sleep(Duration::from_millis(250)).await;
    flush(&rec_b).await;

    assert_eq!(
        events_named(&log_b, "user-disconnected"),
        vec![Value::from("X")]
    );

    let (rec_y, log_y) = recorder();
    let cy = connect(&hub, &rec_y).await;
    setup(&hub, cy, "Y", "Yara").await;
    flush(&rec_y).await;
    let snapshots = events_named(&log_y, "initial-locations");
    assert!(snapshots[0].as_array().unwrap().is_empty());
}

#[actix_rt::test]
async fn resetup_leaves_prior_user_room() {
    let hub = hub(5000);
    let (rec_a, log_a) = recorder();
    let (rec_s, _) = recorder();

    let ca = connect(&hub, &rec_a).await;
    let cs = connect(&hub, &rec_s).await;
    setup(&hub, ca, "A", "Alice").await;
    setup(&hub, cs, "S", "Sender").await;

    // Last setup wins; the connection no longer belongs to room "A".
    setup(&hub, ca, "A2", "Alice").await;

    let to_old = test_message("m1", "chat1", "S", Some(vec!["S", "A"]));
    let to_new = test_message("m2", "chat1", "S", Some(vec!["S", "A2"]));
    hub.send(message::RelayMessage {
        id: cs,
        message: to_old,
    })
    .await
    .unwrap();
    hub.send(message::RelayMessage {
        id: cs,
        message: to_new,
    })
    .await
    .unwrap();
    flush(&rec_a).await;

    let received = events_named(&log_a, "message received");
    assert_eq!(received.len(), 1);
    assert_eq!(received[0]["id"], "m2");
}
