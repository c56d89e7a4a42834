//! Keeps the identity map in step with redirection chains.

use std::sync::Arc;

use log::debug;

use crate::engine::{ChainEvent, ChainHandler, HookEngine, Platform};
use crate::error::HookError;
use crate::map::IdentityMap;
use crate::types::ChainSnapshot;

/// Records `end of chain -> original` every time a chain is refreshed.
pub struct ChainObserver {
    map: Arc<IdentityMap>,
    platform: Arc<dyn Platform>,
}

impl ChainObserver {
    pub fn new(map: Arc<IdentityMap>, platform: Arc<dyn Platform>) -> Self {
        Self { map, platform }
    }

    /// Handle one chain refresh. A chain without links leaves the map alone.
    pub fn on_chain_changed(&self, chain: &ChainSnapshot) {
        let Some(end) = chain.end_of_chain else {
            debug!("Chain for {} has no links, nothing to record", chain.original);
            return;
        };
        self.map.update(|w| {
            let from = self.platform.identity_of(end);
            let to = self.platform.identity_of(chain.original);
            w.put(from, to);
        });
    }

    /// Register for both chain events; they route to the same update.
    pub fn subscribe(self: &Arc<Self>, engine: &dyn HookEngine) -> Result<(), HookError> {
        for event in [ChainEvent::Applied, ChainEvent::Undone] {
            let observer = Arc::clone(self);
            let handler: ChainHandler =
                Arc::new(move |chain: &ChainSnapshot| observer.on_chain_changed(chain));
            engine.subscribe(event, handler)?;
        }
        Ok(())
    }
}
