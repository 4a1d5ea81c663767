use crate::domain::constants::JOB_ENTITY_TYPE;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 楽観的更新の対象となるエンティティ種別（"job", "application" など）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityType(String);

impl EntityType {
    pub fn new(value: String) -> Result<Self, String> {
        Self::validate(&value)?;
        Ok(Self(value))
    }

    pub fn job() -> Self {
        Self(JOB_ENTITY_TYPE.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(value: &str) -> Result<(), String> {
        if value.trim().is_empty() {
            return Err("Entity type cannot be empty".to_string());
        }
        Ok(())
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<EntityType> for String {
    fn from(value: EntityType) -> Self {
        value.0
    }
}
