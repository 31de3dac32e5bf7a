use std::sync::Arc;
use std::time::Duration;

use yrs::updates::decoder::Decode;
use yrs::{Doc, ReadTxn, StateVector, Transact, Update};

use crate::application::ports::document_store::DocumentStore;
use crate::application::ports::view_cache::ViewCache;
use crate::domain::documents::DocumentKind;

use super::{PERSIST_ALL_TIMEOUT, PersistReport, PersisterTask, spawn_interval};

/// Once this many updates are pending, the consolidated state is written
/// back to the cache and the folded entries dropped.
const COMPACTION_THRESHOLD: usize = 128;

/// Consolidates pending Y.js updates into a single state update and writes
/// it to the durable store; compacts the cache when the backlog grows.
pub struct ViewPersister {
    cache: Arc<dyn ViewCache>,
    store: Arc<dyn DocumentStore>,
}

impl ViewPersister {
    pub fn new(cache: Arc<dyn ViewCache>, store: Arc<dyn DocumentStore>) -> Self {
        Self { cache, store }
    }

    pub fn start(self: &Arc<Self>, every: Duration) -> PersisterTask {
        let persister = self.clone();
        tracing::info!(interval = ?every, "view_persister_started");
        spawn_interval(every, move || {
            let persister = persister.clone();
            async move {
                if let Err(e) = persister.persist_all().await {
                    tracing::error!(error = ?e, "view_persist_sweep_failed");
                }
            }
        })
    }

    pub async fn persist_all(&self) -> anyhow::Result<PersistReport> {
        match tokio::time::timeout(PERSIST_ALL_TIMEOUT, self.persist_all_inner()).await {
            Ok(report) => report,
            Err(_) => anyhow::bail!("view persist sweep exceeded {PERSIST_ALL_TIMEOUT:?}"),
        }
    }

    async fn persist_all_inner(&self) -> anyhow::Result<PersistReport> {
        let view_ids = self.cache.list_active().await?;
        let mut report = PersistReport::default();
        for view_id in view_ids {
            match self.persist_one(&view_id).await {
                Ok(()) => report.succeeded += 1,
                Err(e) => {
                    tracing::warn!(document_id = %view_id, error = ?e, "persist_view_failed");
                    report.failed += 1;
                }
            }
        }
        tracing::info!(
            succeeded = report.succeeded,
            failed = report.failed,
            "view_persist_sweep_complete"
        );
        Ok(report)
    }

    pub async fn persist_one(&self, view_id: &str) -> anyhow::Result<()> {
        let snapshot = self.cache.yjs_state(view_id).await?;
        let updates = self.cache.yjs_updates(view_id).await?;
        if snapshot.is_none() && updates.is_empty() {
            return Ok(());
        }

        let Some(view) = self.store.find_view(view_id).await? else {
            anyhow::bail!("view record missing");
        };
        if view.kind != DocumentKind::Yjs {
            return Ok(());
        }

        let state = consolidate(view_id, snapshot.as_deref(), &updates);
        self.store.update_view_yjs_state(view_id, &state).await?;

        // Compaction: cut the new state over to the cache and drop exactly
        // the entries that were folded in, so concurrent appends survive.
        if updates.len() >= COMPACTION_THRESHOLD {
            self.cache.set_yjs_state(view_id, &state).await?;
            self.cache.trim_yjs_updates(view_id, updates.len()).await?;
            tracing::debug!(
                document_id = %view_id,
                folded = updates.len(),
                "compacted_yjs_updates"
            );
        }
        tracing::debug!(document_id = %view_id, "persisted_view");
        Ok(())
    }

    pub async fn force_persist(&self) -> anyhow::Result<PersistReport> {
        self.persist_all().await
    }
}

/// Applies the snapshot and every pending update to a fresh document, then
/// encodes the merged state. Undecodable entries are skipped so one bad
/// frame cannot wedge persistence for the whole document.
fn consolidate(view_id: &str, snapshot: Option<&[u8]>, updates: &[Vec<u8>]) -> Vec<u8> {
    let doc = Doc::new();
    {
        let mut txn = doc.transact_mut();
        let mut apply = |bytes: &[u8]| match Update::decode_v1(bytes) {
            Ok(update) => {
                if let Err(e) = txn.apply_update(update) {
                    tracing::debug!(document_id = %view_id, error = ?e, "apply_update_failed");
                }
            }
            Err(e) => {
                tracing::debug!(document_id = %view_id, error = ?e, "decode_update_failed");
            }
        };
        if let Some(bytes) = snapshot {
            apply(bytes);
        }
        for bytes in updates {
            apply(bytes);
        }
    }
    let txn = doc.transact();
    txn.encode_state_as_update_v1(&StateVector::default())
}
