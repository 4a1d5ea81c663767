use crate::domain::value_objects::{EntityId, EntityType, OptimisticUpdateId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
    Custom,
}

/// pending → success、または pending → failed → rolled_back
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UpdateStatus {
    Pending,
    Success,
    Failed { error: String },
    RolledBack { error: String },
}

impl UpdateStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, UpdateStatus::Pending)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, UpdateStatus::Success | UpdateStatus::RolledBack { .. })
    }
}

/// 購読者へ渡されるスナップショット
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimisticUpdate {
    pub id: OptimisticUpdateId,
    pub kind: OperationKind,
    pub entity_type: EntityType,
    pub entity_id: Option<EntityId>,
    pub optimistic_data: Value,
    pub previous_data: Option<Value>,
    pub status: UpdateStatus,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl OptimisticUpdate {
    pub fn targets(&self, entity_type: &EntityType, entity_id: Option<&EntityId>) -> bool {
        if &self.entity_type != entity_type {
            return false;
        }
        match entity_id {
            Some(id) => self.entity_id.as_ref() == Some(id),
            None => true,
        }
    }
}

/// 失敗時に呼ばれるロールバック処理。一度だけ実行される
pub type RollbackAction = Box<dyn FnOnce(&OptimisticUpdate) + Send + 'static>;

pub struct OptimisticUpdateDraft {
    pub id: Option<OptimisticUpdateId>,
    pub kind: OperationKind,
    pub entity_type: EntityType,
    pub entity_id: Option<EntityId>,
    pub optimistic_data: Value,
    pub previous_data: Option<Value>,
    pub rollback: Option<RollbackAction>,
}

impl OptimisticUpdateDraft {
    pub fn new(kind: OperationKind, entity_type: EntityType, optimistic_data: Value) -> Self {
        Self {
            id: None,
            kind,
            entity_type,
            entity_id: None,
            optimistic_data,
            previous_data: None,
            rollback: None,
        }
    }

    pub fn with_id(mut self, id: OptimisticUpdateId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_entity_id(mut self, entity_id: EntityId) -> Self {
        self.entity_id = Some(entity_id);
        self
    }

    pub fn with_previous_data(mut self, previous_data: Value) -> Self {
        self.previous_data = Some(previous_data);
        self
    }

    pub fn with_rollback<F>(mut self, rollback: F) -> Self
    where
        F: FnOnce(&OptimisticUpdate) + Send + 'static,
    {
        self.rollback = Some(Box::new(rollback));
        self
    }
}

impl fmt::Debug for OptimisticUpdateDraft {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptimisticUpdateDraft")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("entity_type", &self.entity_type)
            .field("entity_id", &self.entity_id)
            .field("has_rollback", &self.rollback.is_some())
            .finish()
    }
}
