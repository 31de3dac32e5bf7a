use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

mod note_persister;
mod spreadsheet_persister;
mod view_persister;
mod whiteboard_persister;

pub use note_persister::*;
pub use spreadsheet_persister::*;
pub use view_persister::*;
pub use whiteboard_persister::*;

/// Ceiling for one full persistence sweep.
pub(crate) const PERSIST_ALL_TIMEOUT: Duration = Duration::from_secs(2 * 60);

pub const YJS_PERSIST_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const WHITEBOARD_PERSIST_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const SPREADSHEET_PERSIST_INTERVAL: Duration = Duration::from_secs(30);
pub const NOTE_PERSIST_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PersistReport {
    pub succeeded: usize,
    pub failed: usize,
}

/// A running scheduled persister. `stop` waits for the in-flight tick, so
/// callers should `force_persist` first when shutting down.
pub struct PersisterTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl PersisterTask {
    pub async fn stop(self) {
        self.cancel.cancel();
        let _ = self.handle.await;
        tracing::info!("persister_stopped");
    }
}

pub(crate) fn spawn_interval<F, Fut>(interval: Duration, tick: F) -> PersisterTask
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let cancel = CancellationToken::new();
    let child = cancel.clone();
    let handle = tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        loop {
            tokio::select! {
                _ = child.cancelled() => return,
                // The tick body runs to completion before cancellation is
                // observed again, so stop() never cuts a sweep short.
                _ = ticker.tick() => tick().await,
            }
        }
    });
    PersisterTask { cancel, handle }
}
