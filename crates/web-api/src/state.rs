use std::sync::Arc;

use application::{HistoryService, HubHandle};

#[derive(Clone)]
pub struct AppState {
    pub hub: HubHandle,
    pub history: Arc<HistoryService>,
}

impl AppState {
    pub fn new(hub: HubHandle, history: Arc<HistoryService>) -> Self {
        Self { hub, history }
    }
}
