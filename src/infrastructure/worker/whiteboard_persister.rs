use std::sync::Arc;
use std::time::Duration;

use crate::application::ports::document_store::DocumentStore;
use crate::application::ports::whiteboard_cache::WhiteboardCache;
use crate::domain::documents::DocumentKind;
use crate::infrastructure::realtime::WhiteboardState;

use super::{PERSIST_ALL_TIMEOUT, PersistReport, PersisterTask, spawn_interval};

/// Copies the cached whiteboard object maps into `view.data` as one JSON
/// document (full replace, idempotent).
pub struct WhiteboardPersister {
    cache: Arc<dyn WhiteboardCache>,
    store: Arc<dyn DocumentStore>,
}

impl WhiteboardPersister {
    pub fn new(cache: Arc<dyn WhiteboardCache>, store: Arc<dyn DocumentStore>) -> Self {
        Self { cache, store }
    }

    pub fn start(self: &Arc<Self>, every: Duration) -> PersisterTask {
        let persister = self.clone();
        tracing::info!(interval = ?every, "whiteboard_persister_started");
        spawn_interval(every, move || {
            let persister = persister.clone();
            async move {
                if let Err(e) = persister.persist_all().await {
                    tracing::error!(error = ?e, "whiteboard_persist_sweep_failed");
                }
            }
        })
    }

    pub async fn persist_all(&self) -> anyhow::Result<PersistReport> {
        match tokio::time::timeout(PERSIST_ALL_TIMEOUT, self.persist_all_inner()).await {
            Ok(report) => report,
            Err(_) => anyhow::bail!("whiteboard persist sweep exceeded {PERSIST_ALL_TIMEOUT:?}"),
        }
    }

    async fn persist_all_inner(&self) -> anyhow::Result<PersistReport> {
        let view_ids = self.cache.list_active().await?;
        let mut report = PersistReport::default();
        for view_id in view_ids {
            match self.persist_one(&view_id).await {
                Ok(()) => report.succeeded += 1,
                Err(e) => {
                    tracing::warn!(document_id = %view_id, error = ?e, "persist_whiteboard_failed");
                    report.failed += 1;
                }
            }
        }
        tracing::info!(
            succeeded = report.succeeded,
            failed = report.failed,
            "whiteboard_persist_sweep_complete"
        );
        Ok(report)
    }

    pub async fn persist_one(&self, view_id: &str) -> anyhow::Result<()> {
        let canvas_objects = self.cache.canvas_objects(view_id).await?;
        let view_objects = self.cache.view_objects(view_id).await?;
        let yjs_state = self.cache.yjs_state(view_id).await?;
        if canvas_objects.is_empty() && view_objects.is_empty() && yjs_state.is_none() {
            return Ok(());
        }
        let Some(view) = self.store.find_view(view_id).await? else {
            anyhow::bail!("view record missing");
        };
        if view.kind != DocumentKind::Whiteboard {
            return Ok(());
        }
        let state = WhiteboardState {
            canvas_objects,
            view_objects,
        };
        self.store
            .update_view_data(view_id, &serde_json::to_string(&state)?)
            .await?;
        if let Some(yjs_state) = yjs_state.as_deref() {
            self.store.update_view_yjs_state(view_id, yjs_state).await?;
        }
        tracing::debug!(document_id = %view_id, "persisted_whiteboard");
        Ok(())
    }

    pub async fn force_persist(&self) -> anyhow::Result<PersistReport> {
        self.persist_all().await
    }
}
