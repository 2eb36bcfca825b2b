use crate::backend::{BackendRegistry, BackendResolver};
use crate::config::ProxyConfig;
use crate::status::StatusAggregator;
use std::sync::Arc;

/// Process-wide state shared by every connection.
pub struct ProxyState {
    pub config: ProxyConfig,
    pub backends: Arc<BackendRegistry>,
    pub aggregator: StatusAggregator,
}

impl ProxyState {
    pub fn new(config: ProxyConfig, backends: Arc<BackendRegistry>) -> Self {
        let resolver: Arc<dyn BackendResolver> = backends.clone();
        Self {
            config,
            backends,
            aggregator: StatusAggregator::new(resolver),
        }
    }
}
