// ============================================================================
// Field Resolver
// ============================================================================

use super::{FieldDef, Record};
use crate::core::{RestError, Result, Value};

/// Resolve a requested field name against the entity's merged
/// field-definition map.
///
/// Consumers may ask for a field either by its exposed alias or by the raw
/// attribute name a plain definition points at; both resolve uniformly. A
/// name present in neither form fails with `UnknownField`.
pub fn resolve_field<E: Record>(entity: &E, name: &str) -> Result<Value> {
    let definitions = entity.fields().merged(&entity.extra_fields());

    if let Some(def) = definitions.get(name) {
        return Ok(match def {
            FieldDef::Attribute(attr) => entity.get(attr),
            FieldDef::Computed(accessor) => accessor(entity, name),
        });
    }

    // The caller passed the underlying attribute name rather than its alias.
    if definitions.has_attribute(name) {
        return Ok(entity.get(name));
    }

    Err(RestError::UnknownField(name.to_string()))
}
