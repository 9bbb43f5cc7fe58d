// ============================================================================
// In-Memory Backend
// ============================================================================
//
// Reference persistence implementation: a row store with snapshot
// transactions, generated integer keys and configurable save/delete
// validation. Used by the integration tests and as a lightweight store for
// applications that do not bring their own engine.

use super::{EntityKey, Page, Persistence};
use crate::core::{RestError, Result, Value};
use crate::resource::{FieldMap, Record};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

type Row = BTreeMap<String, Value>;

/// Per-entity-type field exposure: persisted definitions plus computed extra
/// fields, shared by every entity the backend hands out.
pub struct EntitySpec {
    fields: FieldMap<DynamicEntity>,
    extra_fields: FieldMap<DynamicEntity>,
}

impl Default for EntitySpec {
    fn default() -> Self {
        Self::new()
    }
}

impl EntitySpec {
    pub fn new() -> Self {
        Self {
            fields: FieldMap::new(),
            extra_fields: FieldMap::new(),
        }
    }

    /// Expose `name` as the persisted attribute `attr`.
    pub fn field(mut self, name: impl Into<String>, attr: impl Into<String>) -> Self {
        self.fields = self.fields.attribute(name, attr);
        self
    }

    /// Expose `name` as a computed, read-only extra field.
    pub fn computed<F>(mut self, name: impl Into<String>, accessor: F) -> Self
    where
        F: Fn(&DynamicEntity, &str) -> Value + Send + Sync + 'static,
    {
        self.extra_fields = self.extra_fields.computed(name, accessor);
        self
    }
}

/// Schemaless entity backed by an attribute map.
///
/// Keeps the attribute state captured at load/refresh time as the baseline
/// for dirty tracking; unknown attribute names are adopted on `set`.
#[derive(Clone)]
pub struct DynamicEntity {
    attributes: Row,
    baseline: Row,
    spec: Arc<EntitySpec>,
    persisted: bool,
}

impl DynamicEntity {
    pub fn new(spec: Arc<EntitySpec>) -> Self {
        Self {
            attributes: Row::new(),
            baseline: Row::new(),
            spec,
            persisted: false,
        }
    }

    fn from_row(spec: Arc<EntitySpec>, row: Row) -> Self {
        Self {
            attributes: row.clone(),
            baseline: row,
            spec,
            persisted: true,
        }
    }

    fn reset_from_row(&mut self, row: Row) {
        self.attributes = row.clone();
        self.baseline = row;
        self.persisted = true;
    }

    pub fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }

    pub fn is_persisted(&self) -> bool {
        self.persisted
    }
}

impl fmt::Debug for DynamicEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicEntity")
            .field("attributes", &self.attributes)
            .field("persisted", &self.persisted)
            .finish()
    }
}

impl Record for DynamicEntity {
    fn get(&self, attr: &str) -> Value {
        self.attributes.get(attr).cloned().unwrap_or(Value::Null)
    }

    fn set(&mut self, attr: &str, value: Value) {
        self.attributes.insert(attr.to_string(), value);
    }

    fn fields(&self) -> FieldMap<Self> {
        self.spec.fields.clone()
    }

    fn extra_fields(&self) -> FieldMap<Self> {
        self.spec.extra_fields.clone()
    }

    fn dirty_attributes(&self) -> BTreeMap<String, Value> {
        self.attributes
            .iter()
            .filter(|(name, value)| self.baseline.get(*name) != Some(*value))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    fn old_attributes(&self) -> BTreeMap<String, Value> {
        self.attributes
            .iter()
            .filter(|(name, value)| self.baseline.get(*name) != Some(*value))
            .map(|(name, _)| {
                (
                    name.clone(),
                    self.baseline.get(name).cloned().unwrap_or(Value::Null),
                )
            })
            .collect()
    }
}

/// Operation counters, mirrored by the integration tests to assert the
/// exactly-once transaction discipline.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryStats {
    pub lookups: usize,
    pub saves: usize,
    pub deletes: usize,
    pub begun: usize,
    pub committed: usize,
    pub rolled_back: usize,
}

type Validator = Box<dyn Fn(&DynamicEntity) -> bool + Send + Sync>;

pub struct MemoryPersistence {
    spec: Arc<EntitySpec>,
    primary_key: Vec<String>,
    rows: Mutex<Vec<Row>>,
    tx_snapshot: Mutex<Option<Vec<Row>>>,
    next_id: AtomicI64,
    page_size: usize,
    save_validator: Option<Validator>,
    delete_guard: Option<Validator>,
    stats: Mutex<MemoryStats>,
}

impl MemoryPersistence {
    pub fn new(primary_key: &[&str], spec: EntitySpec) -> Self {
        Self {
            spec: Arc::new(spec),
            primary_key: primary_key.iter().map(|s| s.to_string()).collect(),
            rows: Mutex::new(Vec::new()),
            tx_snapshot: Mutex::new(None),
            next_id: AtomicI64::new(1),
            page_size: 20,
            save_validator: None,
            delete_guard: None,
            stats: Mutex::new(MemoryStats::default()),
        }
    }

    /// Reject saves for which `validator` returns false; `save` then reports
    /// a validation failure instead of persisting.
    pub fn with_save_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&DynamicEntity) -> bool + Send + Sync + 'static,
    {
        self.save_validator = Some(Box::new(validator));
        self
    }

    /// Veto deletes for which `guard` returns false.
    pub fn with_delete_guard<F>(mut self, guard: F) -> Self
    where
        F: Fn(&DynamicEntity) -> bool + Send + Sync + 'static,
    {
        self.delete_guard = Some(Box::new(guard));
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Insert a row directly, bypassing the lifecycle. Test/bootstrap helper.
    pub fn seed(&self, pairs: &[(&str, Value)]) -> Result<()> {
        let row: Row = pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();
        self.rows.lock()?.push(row);
        Ok(())
    }

    pub fn stats(&self) -> Result<MemoryStats> {
        Ok(*self.stats.lock()?)
    }

    pub fn row_count(&self) -> Result<usize> {
        Ok(self.rows.lock()?.len())
    }

    /// Raw stored row for a key, independent of any in-memory entity state.
    pub fn stored_row(&self, key: &EntityKey) -> Result<Option<BTreeMap<String, Value>>> {
        let rows = self.rows.lock()?;
        Ok(rows.iter().find(|row| row_matches(row, key)).cloned())
    }

    fn entity_key_values(&self, entity: &DynamicEntity) -> Vec<(String, Value)> {
        self.primary_key
            .iter()
            .map(|field| (field.clone(), entity.get(field)))
            .collect()
    }

    fn position_by_pk(&self, rows: &[Row], pk: &[(String, Value)]) -> Option<usize> {
        rows.iter().position(|row| {
            pk.iter().all(|(field, value)| {
                row.get(field).is_some_and(|stored| values_match(stored, value))
            })
        })
    }
}

// Id strings arrive as text; stored keys are often integers. Compare by
// value first, then by display form.
fn values_match(stored: &Value, key: &Value) -> bool {
    stored == key || stored.to_string() == key.to_string()
}

fn row_matches(row: &Row, key: &EntityKey) -> bool {
    key.components().iter().all(|(field, value)| {
        row.get(field).is_some_and(|stored| values_match(stored, value))
    })
}

#[async_trait]
impl Persistence for MemoryPersistence {
    type Entity = DynamicEntity;
    type Query = Page<DynamicEntity>;

    fn primary_key_fields(&self) -> Vec<String> {
        self.primary_key.clone()
    }

    async fn find_all(&self) -> Result<Self::Query> {
        let rows = self.rows.lock()?;
        let entities = rows
            .iter()
            .take(self.page_size)
            .map(|row| DynamicEntity::from_row(self.spec.clone(), row.clone()))
            .collect();
        Ok(Page {
            entities,
            total: rows.len(),
            page: 1,
            page_size: self.page_size,
        })
    }

    async fn find_by_key(&self, key: &EntityKey) -> Result<Option<Self::Entity>> {
        self.stats.lock()?.lookups += 1;
        let rows = self.rows.lock()?;
        Ok(rows
            .iter()
            .find(|row| row_matches(row, key))
            .map(|row| DynamicEntity::from_row(self.spec.clone(), row.clone())))
    }

    async fn new_entity(&self) -> Result<Self::Entity> {
        Ok(DynamicEntity::new(self.spec.clone()))
    }

    async fn save(&self, entity: &mut Self::Entity) -> Result<bool> {
        self.stats.lock()?.saves += 1;
        if let Some(validator) = &self.save_validator {
            if !validator(entity) {
                return Ok(false);
            }
        }

        // Generated key: single integer primary key left unset by the caller.
        if let [pk_field] = self.primary_key.as_slice() {
            if entity.get(pk_field).is_null() {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                entity.set(pk_field, Value::Integer(id));
            }
        }

        let pk = self.entity_key_values(entity);
        let mut rows = self.rows.lock()?;
        let row = entity.attributes().clone();
        match self.position_by_pk(&rows, &pk) {
            Some(index) => rows[index] = row,
            None => rows.push(row),
        }
        entity.persisted = true;
        Ok(true)
    }

    async fn delete(&self, entity: &mut Self::Entity) -> Result<bool> {
        self.stats.lock()?.deletes += 1;
        if let Some(guard) = &self.delete_guard {
            if !guard(entity) {
                return Ok(false);
            }
        }
        let pk = self.entity_key_values(entity);
        let mut rows = self.rows.lock()?;
        match self.position_by_pk(&rows, &pk) {
            Some(index) => {
                rows.remove(index);
                entity.persisted = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn refresh(&self, entity: &mut Self::Entity) -> Result<()> {
        let pk = self.entity_key_values(entity);
        let rows = self.rows.lock()?;
        match self.position_by_pk(&rows, &pk) {
            Some(index) => {
                let row = rows[index].clone();
                drop(rows);
                entity.reset_from_row(row);
                Ok(())
            }
            None => Err(RestError::Persistence(
                "cannot refresh an entity that is not stored".into(),
            )),
        }
    }

    async fn begin_transaction(&self) -> Result<()> {
        // Lock order: snapshot before rows, same as rollback.
        let mut snapshot = self.tx_snapshot.lock()?;
        if snapshot.is_some() {
            return Err(RestError::Persistence("transaction already active".into()));
        }
        *snapshot = Some(self.rows.lock()?.clone());
        self.stats.lock()?.begun += 1;
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        let mut snapshot = self.tx_snapshot.lock()?;
        if snapshot.take().is_none() {
            return Err(RestError::Persistence("no active transaction".into()));
        }
        self.stats.lock()?.committed += 1;
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        let mut snapshot = self.tx_snapshot.lock()?;
        let Some(rows) = snapshot.take() else {
            return Err(RestError::Persistence("no active transaction".into()));
        };
        *self.rows.lock()? = rows;
        self.stats.lock()?.rolled_back += 1;
        Ok(())
    }
}
