use std::sync::Arc;
use std::time::Duration;

use crate::application::ports::document_store::DocumentStore;
use crate::application::ports::note_cache::NoteCache;

use super::{PERSIST_ALL_TIMEOUT, PersistReport, PersisterTask, spawn_interval};

/// Copies cached note fields (title, content, updated_at, updated_by) over
/// the durable note record.
pub struct NotePersister {
    cache: Arc<dyn NoteCache>,
    store: Arc<dyn DocumentStore>,
}

impl NotePersister {
    pub fn new(cache: Arc<dyn NoteCache>, store: Arc<dyn DocumentStore>) -> Self {
        Self { cache, store }
    }

    pub fn start(self: &Arc<Self>, every: Duration) -> PersisterTask {
        let persister = self.clone();
        tracing::info!(interval = ?every, "note_persister_started");
        spawn_interval(every, move || {
            let persister = persister.clone();
            async move {
                if let Err(e) = persister.persist_all().await {
                    tracing::error!(error = ?e, "note_persist_sweep_failed");
                }
            }
        })
    }

    pub async fn persist_all(&self) -> anyhow::Result<PersistReport> {
        match tokio::time::timeout(PERSIST_ALL_TIMEOUT, self.persist_all_inner()).await {
            Ok(report) => report,
            Err(_) => anyhow::bail!("note persist sweep exceeded {PERSIST_ALL_TIMEOUT:?}"),
        }
    }

    async fn persist_all_inner(&self) -> anyhow::Result<PersistReport> {
        let note_ids = self.cache.list_active().await?;
        let mut report = PersistReport::default();
        for note_id in note_ids {
            match self.persist_one(&note_id).await {
                Ok(()) => report.succeeded += 1,
                Err(e) => {
                    tracing::warn!(document_id = %note_id, error = ?e, "persist_note_failed");
                    report.failed += 1;
                }
            }
        }
        tracing::info!(
            succeeded = report.succeeded,
            failed = report.failed,
            "note_persist_sweep_complete"
        );
        Ok(report)
    }

    pub async fn persist_one(&self, note_id: &str) -> anyhow::Result<()> {
        let Some(data) = self.cache.note_data(note_id).await? else {
            return Ok(());
        };
        let Some(_note) = self.store.find_note(note_id).await? else {
            anyhow::bail!("note record missing");
        };
        self.store.update_note_fields(note_id, &data).await?;
        tracing::debug!(document_id = %note_id, "persisted_note");
        Ok(())
    }

    pub async fn force_persist(&self) -> anyhow::Result<PersistReport> {
        self.persist_all().await
    }
}
