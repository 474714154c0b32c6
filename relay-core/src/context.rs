use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::store::Store;

/// Shared handles threaded through every component. The store is an explicit
/// value here rather than a process global, so handlers and tests receive it
/// from whoever owns the lifecycle.
#[derive(Clone)]
pub struct RelayContext {
    pub config: Arc<Config>,
    pub store: Arc<Store>,
}

impl RelayContext {
    pub fn new(config: Config) -> Result<Self> {
        let store = Store::open(&config.store.db_path)?;

        Ok(RelayContext {
            config: Arc::new(config),
            store: Arc::new(store),
        })
    }
}
