use std::sync::Arc;

use bazaar_gateway::Gateway;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub gateway: Gateway,
}

impl AppStateInner {
    pub fn new(gateway: Gateway) -> AppState {
        Arc::new(Self { gateway })
    }
}
