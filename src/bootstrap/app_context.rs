use std::sync::Arc;

use crate::application::ports::document_store::DocumentStore;
use crate::bootstrap::config::Config;
use crate::infrastructure::realtime::Hub;

#[derive(Clone)]
pub struct AppContext {
    pub cfg: Config,
    services: Arc<AppServices>,
}

pub struct AppServices {
    hub: Hub,
    document_store: Arc<dyn DocumentStore>,
}

impl AppServices {
    pub fn new(hub: Hub, document_store: Arc<dyn DocumentStore>) -> Self {
        Self {
            hub,
            document_store,
        }
    }
}

impl AppContext {
    pub fn new(cfg: Config, services: AppServices) -> Self {
        Self {
            cfg,
            services: Arc::new(services),
        }
    }

    pub fn hub(&self) -> &Hub {
        &self.services.hub
    }

    pub fn document_store(&self) -> Arc<dyn DocumentStore> {
        self.services.document_store.clone()
    }
}
