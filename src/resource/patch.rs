// ============================================================================
// Patch Interpreter
// ============================================================================

use super::Record;
use crate::core::{RestError, Result, Value};
use serde::{Deserialize, Serialize};

/// Operation kind of a patch instruction. `replace` when absent from the
/// decoded batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOpKind {
    #[default]
    Replace,
    Remove,
    Move,
    Copy,
}

impl PatchOpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Replace => "replace",
            Self::Remove => "remove",
            Self::Move => "move",
            Self::Copy => "copy",
        }
    }
}

/// One instruction of a JSON-Patch-like batch.
///
/// `field` is required for every op, `from` for `move`/`copy`, `value` for
/// `replace`. A `replace` without a value is rejected as malformed rather
/// than treated as an implicit unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchOp {
    #[serde(default)]
    pub op: PatchOpKind,
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

impl PatchOp {
    pub fn replace(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            op: PatchOpKind::Replace,
            field: field.into(),
            value: Some(value.into()),
            from: None,
        }
    }

    pub fn remove(field: impl Into<String>) -> Self {
        Self {
            op: PatchOpKind::Remove,
            field: field.into(),
            value: None,
            from: None,
        }
    }

    pub fn move_from(field: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            op: PatchOpKind::Move,
            field: field.into(),
            value: None,
            from: Some(from.into()),
        }
    }

    pub fn copy_from(field: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            op: PatchOpKind::Copy,
            field: field.into(),
            value: None,
            from: Some(from.into()),
        }
    }

    fn required_from(&self) -> Result<&str> {
        self.from.as_deref().ok_or_else(|| {
            RestError::MalformedPatch(format!(
                "{} on '{}' requires a source field",
                self.op.as_str(),
                self.field
            ))
        })
    }
}

/// Apply one patch op to the entity, in place.
///
/// Pure apart from the entity mutation; field names are not validated against
/// any schema here. Safe to call in sequence over a batch.
pub fn apply<E: Record>(entity: &mut E, op: &PatchOp) -> Result<()> {
    match op.op {
        PatchOpKind::Replace => {
            let value = op.value.clone().ok_or_else(|| {
                RestError::MalformedPatch(format!("replace on '{}' requires a value", op.field))
            })?;
            entity.set(&op.field, value);
        }
        PatchOpKind::Remove => {
            entity.set(&op.field, Value::Null);
        }
        PatchOpKind::Move => {
            let from = op.required_from()?;
            let value = entity.get(from);
            entity.set(&op.field, value);
            entity.set(from, Value::Null);
        }
        PatchOpKind::Copy => {
            let from = op.required_from()?;
            let value = entity.get(from);
            entity.set(&op.field, value);
        }
    }
    Ok(())
}
