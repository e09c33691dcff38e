//! Stage Registry: one stage per `StageId`
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::SocflowError;
use crate::phase::StageId;
use crate::stage::Stage;

#[derive(Clone, Default)]
pub struct StageRegistry {
    stages: BTreeMap<StageId, Arc<dyn Stage>>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a stage under its own id, replacing any previous one
    pub fn register(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages.insert(stage.id(), stage);
        self
    }

    pub fn get(&self, id: StageId) -> Option<Arc<dyn Stage>> {
        self.stages.get(&id).cloned()
    }

    pub fn contains(&self, id: StageId) -> bool {
        self.stages.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn ids(&self) -> Vec<StageId> {
        self.stages.keys().copied().collect()
    }

    /// Error unless every stage the router can reach is registered
    pub fn ensure_complete(&self) -> Result<(), SocflowError> {
        let missing: Vec<&str> = StageId::ALL
            .iter()
            .filter(|id| !self.contains(**id))
            .map(|id| id.as_str())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(SocflowError::Registry(format!("missing stages: {}", missing.join(", "))))
        }
    }
}

impl std::fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("StageRegistry").field("stages", &self.ids()).finish()
    }
}
