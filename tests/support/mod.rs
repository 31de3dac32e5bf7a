#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use quillspace::application::ports::document_store::DocumentStore;
use quillspace::application::ports::note_cache::NoteCache;
use quillspace::application::ports::spreadsheet_cache::SpreadsheetCache;
use quillspace::application::ports::view_cache::ViewCache;
use quillspace::application::ports::whiteboard_cache::WhiteboardCache;
use quillspace::domain::documents::{
    CanvasObject, NoteData, NoteRecord, ViewObject, ViewRecord,
};
use quillspace::infrastructure::realtime::{ClientHandle, RoomHandle, SEND_QUEUE_CAPACITY};

/// Registers a fake client with a room; the returned receiver stands in
/// for the socket's write pump.
pub async fn join(
    room: &RoomHandle,
    id: u64,
    user: &str,
    read_only: bool,
) -> mpsc::Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel(SEND_QUEUE_CAPACITY);
    room.register(ClientHandle {
        id,
        user_id: user.to_string(),
        user_name: user.to_string(),
        read_only,
        tx,
    })
    .await;
    rx
}

pub async fn recv_frame(rx: &mut mpsc::Receiver<Vec<u8>>) -> Vec<u8> {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for frame")
        .expect("channel closed while waiting for frame")
}

pub async fn assert_no_frame(rx: &mut mpsc::Receiver<Vec<u8>>) {
    let outcome = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
    assert!(outcome.is_err(), "expected silence, got a frame");
}

fn fake_acquire(locks: &Mutex<HashMap<String, String>>, id: &str, owner: &str) -> bool {
    let mut locks = locks.lock().unwrap();
    if locks.contains_key(id) {
        false
    } else {
        locks.insert(id.to_string(), owner.to_string());
        true
    }
}

fn fake_release(locks: &Mutex<HashMap<String, String>>, id: &str, owner: &str) {
    let mut locks = locks.lock().unwrap();
    if locks.get(id).map(String::as_str) == Some(owner) {
        locks.remove(id);
    }
}

// ---------------------------------------------------------------------------
// View cache fake
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemViewCache {
    pub states: Mutex<HashMap<String, Vec<u8>>>,
    pub updates: Mutex<HashMap<String, Vec<Vec<u8>>>>,
    pub locks: Mutex<HashMap<String, String>>,
    pub ttl_refreshes: Mutex<usize>,
}

#[async_trait]
impl ViewCache for MemViewCache {
    async fn yjs_state(&self, view_id: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.states.lock().unwrap().get(view_id).cloned())
    }

    async fn set_yjs_state(&self, view_id: &str, state: &[u8]) -> anyhow::Result<()> {
        self.states
            .lock()
            .unwrap()
            .insert(view_id.to_string(), state.to_vec());
        Ok(())
    }

    async fn yjs_updates(&self, view_id: &str) -> anyhow::Result<Vec<Vec<u8>>> {
        Ok(self
            .updates
            .lock()
            .unwrap()
            .get(view_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn append_yjs_update(&self, view_id: &str, update: &[u8]) -> anyhow::Result<()> {
        self.updates
            .lock()
            .unwrap()
            .entry(view_id.to_string())
            .or_default()
            .push(update.to_vec());
        Ok(())
    }

    async fn trim_yjs_updates(&self, view_id: &str, count: usize) -> anyhow::Result<()> {
        let mut updates = self.updates.lock().unwrap();
        if let Some(list) = updates.get_mut(view_id) {
            list.drain(..count.min(list.len()));
        }
        Ok(())
    }

    async fn acquire_init_lock(&self, view_id: &str, owner: &str) -> anyhow::Result<bool> {
        Ok(fake_acquire(&self.locks, view_id, owner))
    }

    async fn release_init_lock(&self, view_id: &str, owner: &str) -> anyhow::Result<()> {
        fake_release(&self.locks, view_id, owner);
        Ok(())
    }

    async fn refresh_ttl(&self, _view_id: &str) -> anyhow::Result<()> {
        *self.ttl_refreshes.lock().unwrap() += 1;
        Ok(())
    }

    async fn list_active(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.updates.lock().unwrap().keys().cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// Whiteboard cache fake
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemWhiteboardCache {
    pub canvas: Mutex<HashMap<String, HashMap<String, CanvasObject>>>,
    pub view_objects: Mutex<HashMap<String, HashMap<String, ViewObject>>>,
    pub yjs_states: Mutex<HashMap<String, Vec<u8>>>,
    pub initialized: Mutex<HashMap<String, bool>>,
    pub locks: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl WhiteboardCache for MemWhiteboardCache {
    async fn canvas_objects(
        &self,
        view_id: &str,
    ) -> anyhow::Result<HashMap<String, CanvasObject>> {
        Ok(self
            .canvas
            .lock()
            .unwrap()
            .get(view_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_canvas_object(
        &self,
        view_id: &str,
        object: &CanvasObject,
    ) -> anyhow::Result<()> {
        self.canvas
            .lock()
            .unwrap()
            .entry(view_id.to_string())
            .or_default()
            .insert(object.id.clone(), object.clone());
        Ok(())
    }

    async fn delete_canvas_object(&self, view_id: &str, object_id: &str) -> anyhow::Result<()> {
        if let Some(objects) = self.canvas.lock().unwrap().get_mut(view_id) {
            objects.remove(object_id);
        }
        Ok(())
    }

    async fn clear_canvas_objects(&self, view_id: &str) -> anyhow::Result<()> {
        self.canvas.lock().unwrap().remove(view_id);
        Ok(())
    }

    async fn view_objects(&self, view_id: &str) -> anyhow::Result<HashMap<String, ViewObject>> {
        Ok(self
            .view_objects
            .lock()
            .unwrap()
            .get(view_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_view_object(&self, view_id: &str, object: &ViewObject) -> anyhow::Result<()> {
        self.view_objects
            .lock()
            .unwrap()
            .entry(view_id.to_string())
            .or_default()
            .insert(object.id.clone(), object.clone());
        Ok(())
    }

    async fn delete_view_object(&self, view_id: &str, object_id: &str) -> anyhow::Result<()> {
        if let Some(objects) = self.view_objects.lock().unwrap().get_mut(view_id) {
            objects.remove(object_id);
        }
        Ok(())
    }

    async fn clear_view_objects(&self, view_id: &str) -> anyhow::Result<()> {
        self.view_objects.lock().unwrap().remove(view_id);
        Ok(())
    }

    async fn yjs_state(&self, view_id: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.yjs_states.lock().unwrap().get(view_id).cloned())
    }

    async fn set_yjs_state(&self, view_id: &str, state: &[u8]) -> anyhow::Result<()> {
        self.yjs_states
            .lock()
            .unwrap()
            .insert(view_id.to_string(), state.to_vec());
        Ok(())
    }

    async fn is_initialized(&self, view_id: &str) -> anyhow::Result<bool> {
        let marked = *self.initialized.lock().unwrap().get(view_id).unwrap_or(&false);
        Ok(marked
            || self.canvas.lock().unwrap().contains_key(view_id)
            || self.view_objects.lock().unwrap().contains_key(view_id))
    }

    async fn mark_initialized(&self, view_id: &str) -> anyhow::Result<()> {
        self.initialized
            .lock()
            .unwrap()
            .insert(view_id.to_string(), true);
        Ok(())
    }

    async fn acquire_init_lock(&self, view_id: &str, owner: &str) -> anyhow::Result<bool> {
        Ok(fake_acquire(&self.locks, view_id, owner))
    }

    async fn release_init_lock(&self, view_id: &str, owner: &str) -> anyhow::Result<()> {
        fake_release(&self.locks, view_id, owner);
        Ok(())
    }

    async fn refresh_ttl(&self, _view_id: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn list_active(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.canvas.lock().unwrap().keys().cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// Spreadsheet cache fake
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemSpreadsheetCache {
    pub sheets: Mutex<HashMap<String, String>>,
    pub ops: Mutex<HashMap<String, Vec<String>>>,
    pub locks: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl SpreadsheetCache for MemSpreadsheetCache {
    async fn sheets(&self, view_id: &str) -> anyhow::Result<Option<String>> {
        Ok(self.sheets.lock().unwrap().get(view_id).cloned())
    }

    async fn set_sheets(&self, view_id: &str, sheets: &str) -> anyhow::Result<()> {
        self.sheets
            .lock()
            .unwrap()
            .insert(view_id.to_string(), sheets.to_string());
        Ok(())
    }

    async fn sheets_exist(&self, view_id: &str) -> anyhow::Result<bool> {
        Ok(self.sheets.lock().unwrap().contains_key(view_id))
    }

    async fn append_ops(&self, view_id: &str, ops: &str) -> anyhow::Result<()> {
        self.ops
            .lock()
            .unwrap()
            .entry(view_id.to_string())
            .or_default()
            .push(ops.to_string());
        Ok(())
    }

    async fn ops(&self, view_id: &str) -> anyhow::Result<Vec<String>> {
        Ok(self
            .ops
            .lock()
            .unwrap()
            .get(view_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn clear_ops(&self, view_id: &str) -> anyhow::Result<()> {
        self.ops.lock().unwrap().remove(view_id);
        Ok(())
    }

    async fn acquire_init_lock(&self, view_id: &str, owner: &str) -> anyhow::Result<bool> {
        Ok(fake_acquire(&self.locks, view_id, owner))
    }

    async fn release_init_lock(&self, view_id: &str, owner: &str) -> anyhow::Result<()> {
        fake_release(&self.locks, view_id, owner);
        Ok(())
    }

    async fn refresh_ttl(&self, _view_id: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn list_active(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.sheets.lock().unwrap().keys().cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// Note cache fake
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemNoteCache {
    pub data: Mutex<HashMap<String, NoteData>>,
    pub snapshots: Mutex<HashMap<String, Vec<u8>>>,
    pub updates: Mutex<HashMap<String, Vec<Vec<u8>>>>,
    pub locks: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl NoteCache for MemNoteCache {
    async fn note_data(&self, note_id: &str) -> anyhow::Result<Option<NoteData>> {
        Ok(self.data.lock().unwrap().get(note_id).cloned())
    }

    async fn set_note_data(&self, note_id: &str, data: &NoteData) -> anyhow::Result<()> {
        self.data
            .lock()
            .unwrap()
            .insert(note_id.to_string(), data.clone());
        Ok(())
    }

    async fn update_title(
        &self,
        note_id: &str,
        title: &str,
        updated_by: &str,
    ) -> anyhow::Result<()> {
        let mut data = self.data.lock().unwrap();
        let entry = data.entry(note_id.to_string()).or_default();
        entry.title = title.to_string();
        entry.updated_by = updated_by.to_string();
        entry.updated_at = "2026-01-01T00:00:00Z".to_string();
        Ok(())
    }

    async fn update_content(
        &self,
        note_id: &str,
        content: &str,
        updated_by: &str,
    ) -> anyhow::Result<()> {
        let mut data = self.data.lock().unwrap();
        let entry = data.entry(note_id.to_string()).or_default();
        entry.content = content.to_string();
        entry.updated_by = updated_by.to_string();
        entry.updated_at = "2026-01-01T00:00:00Z".to_string();
        Ok(())
    }

    async fn yjs_snapshot(&self, note_id: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.snapshots.lock().unwrap().get(note_id).cloned())
    }

    async fn set_yjs_snapshot(&self, note_id: &str, snapshot: &[u8]) -> anyhow::Result<()> {
        self.snapshots
            .lock()
            .unwrap()
            .insert(note_id.to_string(), snapshot.to_vec());
        Ok(())
    }

    async fn has_yjs_snapshot(&self, note_id: &str) -> anyhow::Result<bool> {
        Ok(self.snapshots.lock().unwrap().contains_key(note_id))
    }

    async fn yjs_updates(&self, note_id: &str) -> anyhow::Result<Vec<Vec<u8>>> {
        Ok(self
            .updates
            .lock()
            .unwrap()
            .get(note_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn append_yjs_update(&self, note_id: &str, update: &[u8]) -> anyhow::Result<()> {
        self.updates
            .lock()
            .unwrap()
            .entry(note_id.to_string())
            .or_default()
            .push(update.to_vec());
        Ok(())
    }

    async fn clear_yjs_updates(&self, note_id: &str) -> anyhow::Result<()> {
        self.updates.lock().unwrap().remove(note_id);
        Ok(())
    }

    async fn acquire_snapshot_lock(&self, note_id: &str, owner: &str) -> anyhow::Result<bool> {
        Ok(fake_acquire(&self.locks, note_id, owner))
    }

    async fn release_snapshot_lock(&self, note_id: &str, owner: &str) -> anyhow::Result<()> {
        fake_release(&self.locks, note_id, owner);
        Ok(())
    }

    async fn refresh_ttl(&self, _note_id: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn list_active(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.data.lock().unwrap().keys().cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// Document store fake
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemDocumentStore {
    pub views: Mutex<HashMap<String, ViewRecord>>,
    pub notes: Mutex<HashMap<String, NoteRecord>>,
    /// Every `update_view_data` call, in order.
    pub data_writes: Mutex<Vec<(String, String)>>,
    pub yjs_writes: Mutex<Vec<(String, Vec<u8>)>>,
    pub note_writes: Mutex<Vec<(String, NoteData)>>,
}

#[async_trait]
impl DocumentStore for MemDocumentStore {
    async fn find_view(&self, view_id: &str) -> anyhow::Result<Option<ViewRecord>> {
        Ok(self.views.lock().unwrap().get(view_id).cloned())
    }

    async fn update_view_data(&self, view_id: &str, data: &str) -> anyhow::Result<()> {
        if let Some(view) = self.views.lock().unwrap().get_mut(view_id) {
            view.data = Some(data.to_string());
        }
        self.data_writes
            .lock()
            .unwrap()
            .push((view_id.to_string(), data.to_string()));
        Ok(())
    }

    async fn update_view_yjs_state(&self, view_id: &str, state: &[u8]) -> anyhow::Result<()> {
        self.yjs_writes
            .lock()
            .unwrap()
            .push((view_id.to_string(), state.to_vec()));
        Ok(())
    }

    async fn find_note(&self, note_id: &str) -> anyhow::Result<Option<NoteRecord>> {
        Ok(self.notes.lock().unwrap().get(note_id).cloned())
    }

    async fn update_note_fields(&self, note_id: &str, data: &NoteData) -> anyhow::Result<()> {
        self.note_writes
            .lock()
            .unwrap()
            .push((note_id.to_string(), data.clone()));
        Ok(())
    }
}

pub fn view_record(id: uuid::Uuid, kind: quillspace::domain::documents::DocumentKind) -> ViewRecord {
    ViewRecord {
        id,
        kind,
        data: None,
        yjs_state: None,
        is_public: false,
        updated_at: chrono::Utc::now(),
    }
}

pub fn note_record(id: uuid::Uuid) -> NoteRecord {
    NoteRecord {
        id,
        title: String::new(),
        content: String::new(),
        updated_by: None,
        updated_at: chrono::Utc::now(),
    }
}
