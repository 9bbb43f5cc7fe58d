// ============================================================================
// RestCycle Library
// ============================================================================

//! Model-agnostic resource lifecycle: CRUD and patch over persisted entities.
//!
//! Given any entity type with a primary-key lookup and a save/delete contract
//! (the [`Persistence`] trait), [`ResourceLifecycle`] provides a uniform set
//! of operations (query, view with optional field expansion, create,
//! update, patch, delete) wrapped in transactional guarantees and an
//! extensible [`HookBus`] that lets application code observe or veto each
//! lifecycle stage.
//!
//! # Examples
//!
//! ```
//! use restcycle::{EntitySpec, MemoryPersistence, Record, ResourceLifecycle, Value};
//! use std::collections::BTreeMap;
//!
//! tokio_test::block_on(async {
//!     let spec = EntitySpec::new().field("name", "name");
//!     let store = MemoryPersistence::new(&["id"], spec);
//!     let resources = ResourceLifecycle::new(store);
//!
//!     let mut input = BTreeMap::new();
//!     input.insert("name".to_string(), Value::from("Alice"));
//!
//!     let outcome = resources.create(&input).await.unwrap();
//!     assert!(outcome.saved);
//!
//!     // Save assigned a generated key; view resolves it back.
//!     let id = outcome.entity.get("id").to_string();
//!     let entity = resources.view(&id).await.unwrap();
//!     assert_eq!(entity.get("name"), Value::from("Alice"));
//! });
//! ```

pub mod core;
pub mod hooks;
pub mod lifecycle;
pub mod persist;
pub mod prelude;
pub mod resource;

// Re-export main types for convenience
pub use core::{RestError, Result, Value};
pub use hooks::{Hook, HookBus, HookPayload, Mutation};
pub use lifecycle::{LifecycleOptions, ResourceLifecycle, SaveOutcome, Viewed};
pub use persist::memory::{DynamicEntity, EntitySpec, MemoryPersistence, MemoryStats};
pub use persist::{EntityKey, Page, Persistence};
pub use resource::patch::{PatchOp, PatchOpKind};
pub use resource::{FieldDef, FieldMap, Record};
