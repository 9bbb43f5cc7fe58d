// ============================================================================
// Persistence Contract
// ============================================================================

pub mod memory;

use crate::core::{Result, Value};
use crate::resource::Record;
use async_trait::async_trait;
use std::fmt;

/// Parsed primary key of an entity: ordered `(field, value)` components.
///
/// Composite ids arrive as a single string and are split on `,`, zipped
/// against `primary_key_fields()`. A component-count mismatch produces no key
/// at all, so a malformed id never reaches the persistence layer.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityKey {
    components: Vec<(String, Value)>,
}

impl EntityKey {
    pub fn single(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            components: vec![(field.into(), value.into())],
        }
    }

    pub fn parse(id: &str, key_fields: &[String]) -> Option<Self> {
        match key_fields {
            [] => None,
            [field] => Some(Self::single(field.clone(), id)),
            fields => {
                let parts: Vec<&str> = id.split(',').collect();
                if parts.len() != fields.len() {
                    return None;
                }
                Some(Self {
                    components: fields
                        .iter()
                        .cloned()
                        .zip(parts.into_iter().map(Value::from))
                        .collect(),
                })
            }
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.components
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }

    pub fn components(&self) -> &[(String, Value)] {
        &self.components
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (_, value)) in self.components.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", value)?;
        }
        Ok(())
    }
}

/// One page of a listing, the result handle `query` returns.
#[derive(Debug, Clone)]
pub struct Page<E> {
    pub entities: Vec<E>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
}

impl<E> Page<E> {
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Narrow contract the lifecycle consumes from the storage layer.
///
/// `save`/`delete` report validation failure as `Ok(false)`; raised errors
/// are reserved for real faults. Transactions are per invocation, never
/// nested: the lifecycle opens at most one and settles it exactly once.
#[async_trait]
pub trait Persistence: Send + Sync {
    type Entity: Record + Send + Sync;
    type Query: Send + Sync;

    /// Ordered primary-key field names, used to parse single vs. composite
    /// id strings.
    fn primary_key_fields(&self) -> Vec<String>;

    /// Listing handle over all entities of the bound type.
    async fn find_all(&self) -> Result<Self::Query>;

    async fn find_by_key(&self, key: &EntityKey) -> Result<Option<Self::Entity>>;

    /// Factory for a new, empty, unsaved entity.
    async fn new_entity(&self) -> Result<Self::Entity>;

    async fn save(&self, entity: &mut Self::Entity) -> Result<bool>;

    async fn delete(&self, entity: &mut Self::Entity) -> Result<bool>;

    /// Re-read the entity's state from the store, picking up generated keys
    /// and defaults.
    async fn refresh(&self, entity: &mut Self::Entity) -> Result<()>;

    async fn begin_transaction(&self) -> Result<()>;

    async fn commit(&self) -> Result<()>;

    async fn rollback(&self) -> Result<()>;
}
