//! Entity repository boundary
//!
//! The entity reference parameter factory resolves `{type, uuid}` pairs
//! through an [`EntityRepository`]. Storage is an external collaborator; this
//! module only fixes the interface and the loaded entity shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::error::RepositoryError;

/// Snapshot of a domain object loaded by type and identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Entity type name (e.g. `thing`)
    #[serde(rename = "type")]
    pub entity_type: String,

    /// Unique identifier
    pub uuid: Uuid,

    /// Type-specific attributes
    #[serde(default)]
    pub attributes: Value,
}

impl Entity {
    /// Create a new entity snapshot.
    pub fn new(entity_type: impl Into<String>, uuid: Uuid, attributes: Value) -> Self {
        Self {
            entity_type: entity_type.into(),
            uuid,
            attributes,
        }
    }

    /// Cache tag identifying this entity (`<type>:<uuid>`).
    pub fn cache_tag(&self) -> String {
        format!("{}:{}", self.entity_type, self.uuid)
    }
}

/// Loads domain objects for entity reference parameters.
pub trait EntityRepository: Send + Sync {
    /// Load an entity. `Ok(None)` means the type is supported but nothing
    /// matches `uuid`.
    fn load_by_type_and_id(
        &self,
        entity_type: &str,
        uuid: &Uuid,
    ) -> Result<Option<Entity>, RepositoryError>;
}

/// Repository that supports no entity types.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullRepository;

impl EntityRepository for NullRepository {
    fn load_by_type_and_id(
        &self,
        entity_type: &str,
        _uuid: &Uuid,
    ) -> Result<Option<Entity>, RepositoryError> {
        Err(RepositoryError::UnsupportedType(entity_type.to_string()))
    }
}
