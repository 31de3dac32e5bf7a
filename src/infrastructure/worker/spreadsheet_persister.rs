use std::sync::Arc;
use std::time::Duration;

use crate::application::ports::document_store::DocumentStore;
use crate::application::ports::spreadsheet_cache::SpreadsheetCache;
use crate::domain::documents::DocumentKind;

use super::{PERSIST_ALL_TIMEOUT, PersistReport, PersisterTask, spawn_interval};

/// Copies cached spreadsheet state into the durable store. The write is a
/// full replace of `view.data`, so repeated runs are idempotent.
pub struct SpreadsheetPersister {
    cache: Arc<dyn SpreadsheetCache>,
    store: Arc<dyn DocumentStore>,
}

impl SpreadsheetPersister {
    pub fn new(cache: Arc<dyn SpreadsheetCache>, store: Arc<dyn DocumentStore>) -> Self {
        Self { cache, store }
    }

    pub fn start(self: &Arc<Self>, every: Duration) -> PersisterTask {
        let persister = self.clone();
        tracing::info!(interval = ?every, "spreadsheet_persister_started");
        spawn_interval(every, move || {
            let persister = persister.clone();
            async move {
                if let Err(e) = persister.persist_all().await {
                    tracing::error!(error = ?e, "spreadsheet_persist_sweep_failed");
                }
            }
        })
    }

    pub async fn persist_all(&self) -> anyhow::Result<PersistReport> {
        match tokio::time::timeout(PERSIST_ALL_TIMEOUT, self.persist_all_inner()).await {
            Ok(report) => report,
            Err(_) => anyhow::bail!("spreadsheet persist sweep exceeded {PERSIST_ALL_TIMEOUT:?}"),
        }
    }

    async fn persist_all_inner(&self) -> anyhow::Result<PersistReport> {
        let view_ids = self.cache.list_active().await?;
        let mut report = PersistReport::default();
        for view_id in view_ids {
            match self.persist_one(&view_id).await {
                Ok(()) => report.succeeded += 1,
                Err(e) => {
                    tracing::warn!(document_id = %view_id, error = ?e, "persist_spreadsheet_failed");
                    report.failed += 1;
                }
            }
        }
        tracing::info!(
            succeeded = report.succeeded,
            failed = report.failed,
            "spreadsheet_persist_sweep_complete"
        );
        Ok(report)
    }

    pub async fn persist_one(&self, view_id: &str) -> anyhow::Result<()> {
        let Some(sheets) = self.cache.sheets(view_id).await? else {
            return Ok(());
        };
        let Some(view) = self.store.find_view(view_id).await? else {
            anyhow::bail!("view record missing");
        };
        if view.kind != DocumentKind::Spreadsheet {
            return Ok(());
        }
        self.store.update_view_data(view_id, &sheets).await?;
        tracing::debug!(document_id = %view_id, "persisted_spreadsheet");
        Ok(())
    }

    /// Synchronous sweep for shutdown; independent of the scheduler.
    pub async fn force_persist(&self) -> anyhow::Result<PersistReport> {
        self.persist_all().await
    }
}
