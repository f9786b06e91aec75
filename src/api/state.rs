use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use crate::config::Config;
use crate::services::Services;

#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    pub config: Arc<Config>,
    pub ws_connections: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(services: Services, config: Arc<Config>) -> Self {
        AppState {
            services,
            config,
            ws_connections: Arc::new(AtomicUsize::new(0)),
        }
    }
}
