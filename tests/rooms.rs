mod support;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::{Value, json};

use quillspace::application::ports::note_cache::NoteCache;
use quillspace::application::ports::spreadsheet_cache::SpreadsheetCache;
use quillspace::application::ports::view_cache::ViewCache;
use quillspace::application::ports::whiteboard_cache::WhiteboardCache;
use quillspace::infrastructure::realtime::{
    Inbound, NoteRoom, RoomHandle, SpreadsheetRoom, WhiteboardRoom, YjsRoom,
};

use support::{
    MemDocumentStore, MemNoteCache, MemSpreadsheetCache, MemViewCache, MemWhiteboardCache,
    assert_no_frame, join, recv_frame,
};

fn parse(frame: &[u8]) -> Value {
    serde_json::from_slice(frame).expect("frame is not valid JSON")
}

async fn send(room: &RoomHandle, sender: u64, payload: Value) {
    room.broadcast(Inbound {
        sender,
        data: serde_json::to_vec(&payload).unwrap(),
    })
    .await;
}

// --------------------------------------------------------------------------
// Whiteboard
// --------------------------------------------------------------------------

#[tokio::test]
async fn whiteboard_mutation_reaches_peer_and_cache() {
    let cache = Arc::new(MemWhiteboardCache::default());
    let store = Arc::new(MemDocumentStore::default());
    let room = WhiteboardRoom::spawn("W1".into(), cache.clone(), store);

    let mut rx_a = join(&room, 1, "alice", false).await;
    let mut rx_b = join(&room, 2, "bob", false).await;
    assert_eq!(parse(&recv_frame(&mut rx_a).await)["type"], "init");
    assert_eq!(parse(&recv_frame(&mut rx_b).await)["type"], "init");

    let frame = json!({
        "type": "add_canvas_object",
        "object": {"id": "o1", "type": "stroke", "data": {"points": [[0, 0]]}}
    });
    send(&room, 1, frame.clone()).await;

    // The peer receives the exact frame; the sender does not.
    let received = parse(&recv_frame(&mut rx_b).await);
    assert_eq!(received, frame);
    assert_no_frame(&mut rx_a).await;

    let objects = cache.canvas_objects("W1").await.unwrap();
    let stored = objects.get("o1").expect("o1 missing from cache");
    assert_eq!(stored.kind, "stroke");
}

#[tokio::test]
async fn whiteboard_cache_replay_equals_applied_mutations() {
    let cache = Arc::new(MemWhiteboardCache::default());
    let store = Arc::new(MemDocumentStore::default());
    let room = WhiteboardRoom::spawn("W2".into(), cache.clone(), store);

    let mut rx_a = join(&room, 1, "alice", false).await;
    let mut rx_b = join(&room, 2, "bob", false).await;
    recv_frame(&mut rx_a).await;
    recv_frame(&mut rx_b).await;

    let object = |id: &str, data: Value| json!({"id": id, "type": "shape", "data": data});
    send(&room, 1, json!({"type": "add_canvas_object", "object": object("o1", json!(1))})).await;
    send(&room, 1, json!({"type": "add_canvas_object", "object": object("o2", json!(2))})).await;
    send(&room, 1, json!({"type": "update_canvas_object", "object": object("o1", json!(3))})).await;
    send(&room, 1, json!({"type": "delete_canvas_object", "id": "o2"})).await;
    send(&room, 1, json!({"type": "add_view_object",
        "object": {"id": "v1", "type": "note", "name": "n", "data": json!({})}})).await;

    // Five frames at the peer mean the room has processed all five.
    for _ in 0..5 {
        recv_frame(&mut rx_b).await;
    }

    let canvas = cache.canvas_objects("W2").await.unwrap();
    assert_eq!(canvas.len(), 1);
    assert_eq!(canvas["o1"].data, json!(3));
    let views = cache.view_objects("W2").await.unwrap();
    assert_eq!(views.len(), 1);
    assert!(views.contains_key("v1"));

    send(&room, 1, json!({"type": "clear_all"})).await;
    recv_frame(&mut rx_b).await;
    assert!(cache.canvas_objects("W2").await.unwrap().is_empty());
    assert!(cache.view_objects("W2").await.unwrap().is_empty());
}

#[tokio::test]
async fn whiteboard_hydrates_cache_from_durable_record_once() {
    let id = uuid::Uuid::new_v4();
    let cache = Arc::new(MemWhiteboardCache::default());
    let store = Arc::new(MemDocumentStore::default());
    let mut record = support::view_record(id, quillspace::domain::documents::DocumentKind::Whiteboard);
    record.data = Some(
        r#"{"canvas_objects":{"o1":{"id":"o1","type":"stroke","data":{}}},"view_objects":{}}"#
            .to_string(),
    );
    record.yjs_state = Some(vec![9, 9, 9]);
    store.views.lock().unwrap().insert(id.to_string(), record);

    let room = WhiteboardRoom::spawn(id.to_string(), cache.clone(), store);
    let mut rx = join(&room, 1, "alice", false).await;

    let init = parse(&recv_frame(&mut rx).await);
    assert_eq!(init["type"], "init");
    assert_eq!(init["canvas_objects"]["o1"]["type"], "stroke");

    assert!(cache.canvas_objects(&id.to_string()).await.unwrap().contains_key("o1"));
    assert_eq!(
        cache.yjs_state(&id.to_string()).await.unwrap(),
        Some(vec![9, 9, 9])
    );
    // The init lock was taken for the one-shot bootstrap and released.
    assert!(cache.locks.lock().unwrap().is_empty());
}

#[tokio::test]
async fn whiteboard_read_only_client_mutations_are_dropped() {
    let cache = Arc::new(MemWhiteboardCache::default());
    let store = Arc::new(MemDocumentStore::default());
    let room = WhiteboardRoom::spawn("W3".into(), cache.clone(), store);

    let mut rx_a = join(&room, 1, "alice", false).await;
    let mut rx_b = join(&room, 2, "spectator", true).await;
    recv_frame(&mut rx_a).await;
    recv_frame(&mut rx_b).await;

    send(&room, 2, json!({
        "type": "add_canvas_object",
        "object": {"id": "o1", "type": "stroke", "data": {}}
    }))
    .await;

    // No cache write, no peer broadcast.
    assert_no_frame(&mut rx_a).await;
    assert!(cache.canvas_objects("W3").await.unwrap().is_empty());
}

#[tokio::test]
async fn whiteboard_malformed_frame_does_not_break_the_room() {
    let cache = Arc::new(MemWhiteboardCache::default());
    let store = Arc::new(MemDocumentStore::default());
    let room = WhiteboardRoom::spawn("W4".into(), cache.clone(), store);

    let mut rx_a = join(&room, 1, "alice", false).await;
    let mut rx_b = join(&room, 2, "bob", false).await;
    recv_frame(&mut rx_a).await;
    recv_frame(&mut rx_b).await;

    room.broadcast(Inbound {
        sender: 1,
        data: b"{not json".to_vec(),
    })
    .await;
    send(&room, 1, json!({"type": "no_such_tag", "x": 1})).await;
    assert_no_frame(&mut rx_b).await;

    // The room still serves well-formed traffic afterwards.
    send(&room, 1, json!({
        "type": "add_canvas_object",
        "object": {"id": "o1", "type": "stroke", "data": {}}
    }))
    .await;
    assert_eq!(parse(&recv_frame(&mut rx_b).await)["type"], "add_canvas_object");
}

// --------------------------------------------------------------------------
// Y.js
// --------------------------------------------------------------------------

#[tokio::test]
async fn yjs_replay_sends_state_then_updates_in_order() {
    let cache = Arc::new(MemViewCache::default());
    cache.set_yjs_state("V1", b"S").await.unwrap();
    cache.append_yjs_update("V1", b"U1").await.unwrap();
    cache.append_yjs_update("V1", b"U2").await.unwrap();

    let room = YjsRoom::spawn("V1".into(), cache);
    let mut rx = join(&room, 1, "carol", false).await;

    assert_eq!(recv_frame(&mut rx).await, b"S");
    assert_eq!(recv_frame(&mut rx).await, b"U1");
    assert_eq!(recv_frame(&mut rx).await, b"U2");
}

#[tokio::test]
async fn yjs_broadcast_appends_to_cache_and_fans_out() {
    let cache = Arc::new(MemViewCache::default());
    let room = YjsRoom::spawn("V2".into(), cache.clone());

    let _rx_a = join(&room, 1, "alice", false).await;
    let mut rx_b = join(&room, 2, "bob", false).await;

    room.broadcast(Inbound {
        sender: 1,
        data: vec![1, 2, 3],
    })
    .await;

    assert_eq!(recv_frame(&mut rx_b).await, vec![1, 2, 3]);
    assert_eq!(cache.yjs_updates("V2").await.unwrap(), vec![vec![1, 2, 3]]);
}

#[tokio::test]
async fn yjs_read_only_client_frames_are_discarded() {
    let cache = Arc::new(MemViewCache::default());
    let room = YjsRoom::spawn("V3".into(), cache.clone());

    let _rx_ro = join(&room, 1, "spectator", true).await;
    let mut rx_b = join(&room, 2, "bob", false).await;

    room.broadcast(Inbound {
        sender: 1,
        data: vec![9, 9],
    })
    .await;

    assert_no_frame(&mut rx_b).await;
    assert!(cache.yjs_updates("V3").await.unwrap().is_empty());
}

#[tokio::test]
async fn slow_client_is_evicted_while_others_keep_receiving() {
    let cache = Arc::new(MemViewCache::default());
    let room = YjsRoom::spawn("V4".into(), cache);

    let _rx_a = join(&room, 1, "alice", false).await;
    // D never drains its queue.
    let _rx_d = join(&room, 2, "dormant", false).await;
    let mut rx_e = join(&room, 3, "eve", false).await;

    let received = Arc::new(AtomicUsize::new(0));
    let counter = received.clone();
    tokio::spawn(async move {
        let mut expected: usize = 0;
        while let Some(frame) = rx_e.recv().await {
            // Per-room FIFO: frames arrive in send order.
            assert_eq!(frame, expected.to_string().into_bytes());
            expected += 1;
            counter.store(expected, Ordering::Relaxed);
        }
    });

    for i in 0..300usize {
        room.broadcast(Inbound {
            sender: 1,
            data: i.to_string().into_bytes(),
        })
        .await;
        tokio::task::yield_now().await;
    }

    // D's queue (256 deep) overflows and D is evicted; A and E survive.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while room.client_count() != 2 {
        assert!(tokio::time::Instant::now() < deadline, "slow client never evicted");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    while received.load(Ordering::Relaxed) < 300 {
        assert!(tokio::time::Instant::now() < deadline, "healthy client lost frames");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// --------------------------------------------------------------------------
// Spreadsheet
// --------------------------------------------------------------------------

#[tokio::test]
async fn spreadsheet_init_race_has_exactly_one_winner() {
    let cache = Arc::new(MemSpreadsheetCache::default());
    let room = SpreadsheetRoom::spawn("S1".into(), cache.clone());

    let mut rx_a = join(&room, 1, "alice", false).await;
    let mut rx_b = join(&room, 2, "bob", false).await;

    let init_a = parse(&recv_frame(&mut rx_a).await);
    assert_eq!(init_a["type"], "init");
    assert_eq!(init_a["initialized"], false);
    recv_frame(&mut rx_b).await;

    send(&room, 1, json!({"type": "acquire_lock"})).await;
    send(&room, 2, json!({"type": "acquire_lock"})).await;

    let reply_a = parse(&recv_frame(&mut rx_a).await);
    let reply_b = parse(&recv_frame(&mut rx_b).await);
    assert_eq!(reply_a["type"], "lock_acquired");
    assert_eq!(reply_b["type"], "lock_acquired");
    let winners = [&reply_a, &reply_b]
        .iter()
        .filter(|r| r["lock_acquired"] == true)
        .count();
    assert_eq!(winners, 1, "exactly one client may win the init lock");

    // The winner (A, registered first) seeds the document.
    send(&room, 1, json!({"type": "initialize_data", "sheets": {"sheet1": {}}})).await;

    let seen_by_b = parse(&recv_frame(&mut rx_b).await);
    assert_eq!(seen_by_b["type"], "initialize_data");
    assert_eq!(
        cache.sheets("S1").await.unwrap().as_deref(),
        Some(r#"{"sheet1":{}}"#)
    );
    assert!(cache.locks.lock().unwrap().is_empty(), "init lock must be released");
}

#[tokio::test]
async fn spreadsheet_read_only_lock_request_is_answered_false() {
    let cache = Arc::new(MemSpreadsheetCache::default());
    let room = SpreadsheetRoom::spawn("S2".into(), cache.clone());

    let mut rx = join(&room, 1, "spectator", true).await;
    recv_frame(&mut rx).await;

    send(&room, 1, json!({"type": "acquire_lock"})).await;
    let reply = parse(&recv_frame(&mut rx).await);
    assert_eq!(reply["type"], "lock_acquired");
    assert_eq!(reply["lock_acquired"], false);
    assert!(cache.locks.lock().unwrap().is_empty());
}

#[tokio::test]
async fn spreadsheet_ops_are_buffered_and_sync_clears_them() {
    let cache = Arc::new(MemSpreadsheetCache::default());
    let room = SpreadsheetRoom::spawn("S3".into(), cache.clone());

    let mut rx_a = join(&room, 1, "alice", false).await;
    let mut rx_b = join(&room, 2, "bob", false).await;
    recv_frame(&mut rx_a).await;
    recv_frame(&mut rx_b).await;

    send(&room, 1, json!({"type": "op", "ops": [{"cell": "A1", "v": 5}]})).await;
    assert_eq!(parse(&recv_frame(&mut rx_b).await)["type"], "op");
    assert_eq!(cache.ops("S3").await.unwrap().len(), 1);

    send(&room, 1, json!({"type": "sync", "sheets": {"sheet1": {"A1": 5}}})).await;
    assert_eq!(parse(&recv_frame(&mut rx_b).await)["type"], "sync");
    assert!(cache.ops("S3").await.unwrap().is_empty());
    assert!(cache.sheets("S3").await.unwrap().is_some());
}

#[tokio::test]
async fn spreadsheet_initialize_without_lock_leaves_foreign_lock_alone() {
    let cache = Arc::new(MemSpreadsheetCache::default());
    cache
        .locks
        .lock()
        .unwrap()
        .insert("S4".to_string(), "someone-else".to_string());
    let room = SpreadsheetRoom::spawn("S4".into(), cache.clone());

    let mut rx_a = join(&room, 1, "alice", false).await;
    let mut rx_b = join(&room, 2, "bob", false).await;
    recv_frame(&mut rx_a).await;
    recv_frame(&mut rx_b).await;

    send(&room, 1, json!({"type": "initialize_data", "sheets": {}})).await;
    recv_frame(&mut rx_b).await;

    // This room never acquired the lock, so it must not release it.
    assert_eq!(
        cache.locks.lock().unwrap().get("S4").map(String::as_str),
        Some("someone-else")
    );
}

// --------------------------------------------------------------------------
// Note
// --------------------------------------------------------------------------

#[tokio::test]
async fn note_partial_updates_touch_only_their_field() {
    let cache = Arc::new(MemNoteCache::default());
    cache
        .set_note_data(
            "N1",
            &quillspace::domain::documents::NoteData {
                title: "old title".into(),
                content: "body".into(),
                updated_at: "2025-01-01T00:00:00Z".into(),
                updated_by: "someone".into(),
            },
        )
        .await
        .unwrap();

    let room = NoteRoom::spawn("N1".into(), cache.clone());
    let mut rx_a = join(&room, 1, "alice", false).await;
    let mut rx_b = join(&room, 2, "bob", false).await;

    let init = parse(&recv_frame(&mut rx_a).await);
    assert_eq!(init["type"], "init");
    assert_eq!(init["note"]["title"], "old title");
    recv_frame(&mut rx_b).await;

    send(&room, 1, json!({"type": "update_title", "title": "new title"})).await;
    assert_eq!(parse(&recv_frame(&mut rx_b).await)["type"], "update_title");

    let data = cache.note_data("N1").await.unwrap().unwrap();
    assert_eq!(data.title, "new title");
    assert_eq!(data.content, "body");
    assert_eq!(data.updated_by, "alice");
}

#[tokio::test]
async fn note_snapshot_handshake_stores_and_unlocks() {
    let cache = Arc::new(MemNoteCache::default());
    cache.append_yjs_update("N2", &[7, 7]).await.unwrap();

    let room = NoteRoom::spawn("N2".into(), cache.clone());
    let mut rx_a = join(&room, 1, "alice", false).await;
    let mut rx_b = join(&room, 2, "bob", false).await;
    recv_frame(&mut rx_a).await;
    recv_frame(&mut rx_b).await;

    send(&room, 1, json!({"type": "acquire_lock"})).await;
    let reply = parse(&recv_frame(&mut rx_a).await);
    assert_eq!(reply["lock_acquired"], true);

    // base64 of [1, 2, 3]
    send(&room, 1, json!({"type": "snapshot", "snapshot": "AQID"})).await;
    let seen_by_b = parse(&recv_frame(&mut rx_b).await);
    assert_eq!(seen_by_b["type"], "snapshot");

    assert_eq!(cache.yjs_snapshot("N2").await.unwrap(), Some(vec![1, 2, 3]));
    assert!(cache.yjs_updates("N2").await.unwrap().is_empty());
    assert!(cache.locks.lock().unwrap().is_empty(), "snapshot lock must be released");
}

#[tokio::test]
async fn note_read_only_client_cannot_mutate_but_may_ask_for_lock() {
    let cache = Arc::new(MemNoteCache::default());
    let room = NoteRoom::spawn("N3".into(), cache.clone());

    let mut rx_ro = join(&room, 1, "spectator", true).await;
    let mut rx_b = join(&room, 2, "bob", false).await;
    recv_frame(&mut rx_ro).await;
    recv_frame(&mut rx_b).await;

    send(&room, 1, json!({"type": "update_content", "content": "hijack"})).await;
    assert_no_frame(&mut rx_b).await;
    assert!(cache.note_data("N3").await.unwrap().is_none());

    send(&room, 1, json!({"type": "acquire_lock"})).await;
    let reply = parse(&recv_frame(&mut rx_ro).await);
    assert_eq!(reply["type"], "lock_acquired");
    assert_eq!(reply["lock_acquired"], false);
}
