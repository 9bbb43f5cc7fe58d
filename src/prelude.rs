//! Recommended API entrypoints grouped by abstraction level.
//!
//! `dx` is the stable default for wiring resources into a routing layer.
//! `advanced` is an explicit escape hatch for persistence internals.

pub mod dx {
    //! Stable high-level surface: the lifecycle, its options, the hook bus
    //! and the types that cross the operation-facing boundary.
    pub use crate::{
        Hook, HookBus, HookPayload, LifecycleOptions, Mutation, PatchOp, PatchOpKind, Persistence,
        Record, ResourceLifecycle, RestError, Result, SaveOutcome, Value, Viewed,
    };
}

pub mod advanced {
    //! Escape hatch for persistence internals and the in-memory backend.
    pub use crate::persist::memory::{DynamicEntity, EntitySpec, MemoryPersistence, MemoryStats};
    pub use crate::persist::{EntityKey, Page};
    pub use crate::resource::fields::resolve_field;
    pub use crate::resource::patch::apply as apply_patch;
    pub use crate::resource::{ComputedAccessor, FieldDef, FieldMap};
}
