//! Location table from body identity to its current endpoint

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::body::BodyEndpoint;
use crate::types::{ActiveError, BodyId, Result};

/// Location table: where each body can currently be reached
#[derive(Default)]
pub struct Directory {
    entries: RwLock<HashMap<BodyId, Arc<dyn BodyEndpoint>>>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an endpoint under its body id, replacing any previous location
    pub fn register(&self, endpoint: Arc<dyn BodyEndpoint>) {
        self.entries.write().insert(endpoint.body_id(), endpoint);
    }

    /// Look up the current endpoint of a body
    pub fn lookup(&self, id: BodyId) -> Result<Arc<dyn BodyEndpoint>> {
        self.entries
            .read()
            .get(&id)
            .cloned()
            .ok_or(ActiveError::BodyNotFound(id))
    }

    pub fn remove(&self, id: BodyId) -> Option<Arc<dyn BodyEndpoint>> {
        self.entries.write().remove(&id)
    }

    pub fn contains(&self, id: BodyId) -> bool {
        self.entries.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn ids(&self) -> Vec<BodyId> {
        self.entries.read().keys().copied().collect()
    }
}
