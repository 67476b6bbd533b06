use std::sync::Arc;

use crate::storage::AudioStore;
use crate::transport::Transport;

/// Shared application state for relay handlers
#[derive(Clone)]
pub struct RelayState {
    pub transport: Arc<Transport>,
    pub store: Arc<dyn AudioStore>,
}

impl RelayState {
    pub fn new(transport: Arc<Transport>, store: Arc<dyn AudioStore>) -> Self {
        Self { transport, store }
    }
}
