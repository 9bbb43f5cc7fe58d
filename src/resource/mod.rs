// ============================================================================
// Resource Model
// ============================================================================

pub mod fields;
pub mod patch;

use crate::core::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Accessor for a computed (read-only) field. Invoked with the entity and the
/// exposed field name.
pub type ComputedAccessor<E> = Arc<dyn Fn(&E, &str) -> Value + Send + Sync>;

/// One entry of an entity's field-definition map: either a plain persisted
/// attribute name, or a computed accessor.
pub enum FieldDef<E> {
    Attribute(String),
    Computed(ComputedAccessor<E>),
}

// Manual impls: deriving would demand `E: Clone`/`E: Debug` for no reason.
impl<E> Clone for FieldDef<E> {
    fn clone(&self) -> Self {
        match self {
            Self::Attribute(name) => Self::Attribute(name.clone()),
            Self::Computed(accessor) => Self::Computed(accessor.clone()),
        }
    }
}

impl<E> fmt::Debug for FieldDef<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Attribute(name) => write!(f, "Attribute({:?})", name),
            Self::Computed(_) => write!(f, "Computed(..)"),
        }
    }
}

/// Ordered field-definition map.
///
/// Insertion order is preserved and merges are first-wins, so the merged map
/// built from `fields()` then `extra_fields()` resolves a name collision to
/// the persisted definition.
pub struct FieldMap<E> {
    entries: Vec<(String, FieldDef<E>)>,
}

impl<E> Clone for FieldMap<E> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<E> Default for FieldMap<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> FieldMap<E> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Expose `name` as the persisted attribute `attr`.
    pub fn attribute(mut self, name: impl Into<String>, attr: impl Into<String>) -> Self {
        self.insert(name.into(), FieldDef::Attribute(attr.into()));
        self
    }

    /// Expose `name` as a computed accessor.
    pub fn computed<F>(mut self, name: impl Into<String>, accessor: F) -> Self
    where
        F: Fn(&E, &str) -> Value + Send + Sync + 'static,
    {
        self.insert(name.into(), FieldDef::Computed(Arc::new(accessor)));
        self
    }

    fn insert(&mut self, name: String, def: FieldDef<E>) {
        if !self.contains(&name) {
            self.entries.push((name, def));
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldDef<E>> {
        self.entries
            .iter()
            .find(|(entry_name, _)| entry_name == name)
            .map(|(_, def)| def)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(entry_name, _)| entry_name == name)
    }

    /// True when some plain definition targets the attribute `attr`, i.e. the
    /// caller passed a raw attribute name rather than its exposed alias.
    pub fn has_attribute(&self, attr: &str) -> bool {
        self.entries.iter().any(|(_, def)| match def {
            FieldDef::Attribute(target) => target == attr,
            FieldDef::Computed(_) => false,
        })
    }

    /// Merge with `other`, keeping existing definitions on name collision.
    pub fn merged(&self, other: &FieldMap<E>) -> FieldMap<E> {
        let mut merged = self.clone();
        for (name, def) in &other.entries {
            merged.insert(name.clone(), def.clone());
        }
        merged
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldDef<E>)> {
        self.entries
            .iter()
            .map(|(name, def)| (name.as_str(), def))
    }
}

/// Capability contract an entity type implements to take part in the
/// lifecycle: dynamic attribute access by name, whole-object assignment, the
/// field-definition maps, and dirty tracking since load.
pub trait Record {
    /// Current value of `attr`; `Value::Null` for an attribute never set.
    fn get(&self, attr: &str) -> Value;

    /// Assign `attr` in place. Unknown names are either adopted (dynamic
    /// models) or rejected later by persistence; no schema check here.
    fn set(&mut self, attr: &str, value: Value);

    /// Whole-object assignment used by create/update.
    fn load(&mut self, input: &BTreeMap<String, Value>) {
        for (name, value) in input {
            self.set(name, value.clone());
        }
    }

    /// Persisted field definitions.
    fn fields(&self) -> FieldMap<Self>
    where
        Self: Sized;

    /// Computed, read-only field definitions.
    fn extra_fields(&self) -> FieldMap<Self>
    where
        Self: Sized,
    {
        FieldMap::new()
    }

    /// Attributes changed since load, name to new value.
    fn dirty_attributes(&self) -> BTreeMap<String, Value>;

    /// Pre-change values of the changed attributes.
    fn old_attributes(&self) -> BTreeMap<String, Value>;
}
