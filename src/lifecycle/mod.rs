// ============================================================================
// Resource Lifecycle
// ============================================================================
//
// Orchestrates the six operations over one bound entity type. Every mutating
// operation runs resolve -> before-hook -> mutate -> stage-hook -> persist ->
// done-hook inside a transaction, with the error hook wrapping everything
// after resolution. Exactly one of commit/rollback settles the transaction
// before the operation returns or raises.

use crate::core::{RestError, Result, Value};
use crate::hooks::{Hook, HookBus, HookPayload, Mutation};
use crate::persist::{EntityKey, Persistence};
use crate::resource::Record;
use crate::resource::fields::resolve_field;
use crate::resource::patch::{self, PatchOp};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Behavior toggles distinguishing the two historical controller flavors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleOptions {
    /// Include the dirty/old snapshot in the `patch`/`patched` hook payload.
    pub patch_snapshot_in_hooks: bool,
    /// Honor the expand argument of [`ResourceLifecycle::view_expanded`].
    pub expand_field_on_view: bool,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            patch_snapshot_in_hooks: true,
            expand_field_on_view: true,
        }
    }
}

/// Result of create/update/patch. `saved == false` is a reported validation
/// failure: the transaction was rolled back and `entity` is the in-memory,
/// unsaved instance for the caller to inspect.
#[derive(Debug)]
pub struct SaveOutcome<E> {
    pub entity: E,
    pub saved: bool,
}

/// What a view-with-expansion returned.
#[derive(Debug)]
pub enum Viewed<E> {
    Entity(E),
    Field(Value),
}

/// Uniform CRUD + patch lifecycle over one persisted entity type.
pub struct ResourceLifecycle<P: Persistence> {
    persistence: P,
    hooks: HookBus<P::Entity, P::Query>,
    options: LifecycleOptions,
}

impl<P: Persistence> ResourceLifecycle<P> {
    pub fn new(persistence: P) -> Self {
        Self {
            persistence,
            hooks: HookBus::new(),
            options: LifecycleOptions::default(),
        }
    }

    pub fn with_options(mut self, options: LifecycleOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_hooks(mut self, hooks: HookBus<P::Entity, P::Query>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Listener registration point; wire hooks here during setup.
    pub fn hooks_mut(&mut self) -> &mut HookBus<P::Entity, P::Query> {
        &mut self.hooks
    }

    pub fn persistence(&self) -> &P {
        &self.persistence
    }

    pub fn options(&self) -> &LifecycleOptions {
        &self.options
    }

    // ------------------------------------------------------------------
    // Read operations (no transaction)
    // ------------------------------------------------------------------

    /// Listing handle over all entities of the bound type.
    pub async fn query(&self) -> Result<P::Query> {
        debug!("query");
        let handle = self.persistence.find_all().await?;
        self.hooks.fire(Hook::Query, HookPayload::Query(&handle))?;
        Ok(handle)
    }

    /// Resolve one entity by id.
    pub async fn view(&self, id: &str) -> Result<P::Entity> {
        debug!("view '{}'", id);
        let entity = self.resolve(id).await?;
        self.hooks.fire(Hook::View, HookPayload::Entity(&entity))?;
        Ok(entity)
    }

    /// Resolve one field of an entity, by exposed alias or raw attribute
    /// name. An unresolvable field reports not-found, like a missing entity,
    /// to keep the routing layer's 404 contract uniform.
    pub async fn view_detail(&self, id: &str, field: &str) -> Result<Value> {
        debug!("viewDetail '{}'/'{}'", id, field);
        let entity = self.resolve(id).await?;
        self.hooks
            .fire(Hook::ViewDetail, HookPayload::Entity(&entity))?;
        match resolve_field(&entity, field) {
            Ok(value) => Ok(value),
            Err(RestError::UnknownField(_)) => Err(RestError::DetailNotFound(
                id.to_string(),
                field.to_string(),
            )),
            Err(err) => Err(err),
        }
    }

    /// View with optional field expansion, the query-parameter flavor of
    /// [`Self::view_detail`]. The expand argument is ignored unless
    /// [`LifecycleOptions::expand_field_on_view`] is set.
    pub async fn view_expanded(&self, id: &str, expand: Option<&str>) -> Result<Viewed<P::Entity>> {
        if self.options.expand_field_on_view {
            if let Some(field) = expand {
                return Ok(Viewed::Field(self.view_detail(id, field).await?));
            }
        }
        Ok(Viewed::Entity(self.view(id).await?))
    }

    // ------------------------------------------------------------------
    // Mutating operations (one transaction each)
    // ------------------------------------------------------------------

    /// Build a new entity from the factory, load the input onto it and save.
    pub async fn create(&self, input: &BTreeMap<String, Value>) -> Result<SaveOutcome<P::Entity>> {
        debug!("create");
        self.persistence.begin_transaction().await?;
        let mut entity = match self.persistence.new_entity().await {
            Ok(entity) => entity,
            Err(err) => return Err(self.abandon(err).await),
        };
        let mut settled = false;
        let outcome = self
            .assign_and_save(&mut entity, Mutation::Create, input, &mut settled)
            .await;
        self.settle(entity, outcome, Mutation::Create, settled).await
    }

    /// Resolve an existing entity, load the input onto it and save.
    pub async fn update(
        &self,
        id: &str,
        input: &BTreeMap<String, Value>,
    ) -> Result<SaveOutcome<P::Entity>> {
        debug!("update '{}'", id);
        self.persistence.begin_transaction().await?;
        let mut entity = self.resolve_in_tx(id).await?;
        let mut settled = false;
        let outcome = self
            .assign_and_save(&mut entity, Mutation::Update, input, &mut settled)
            .await;
        self.settle(entity, outcome, Mutation::Update, settled).await
    }

    /// Apply a patch batch to an existing entity and save.
    ///
    /// Ops apply in input order and are not atomic per-op in memory: a later
    /// op's failure leaves earlier ops applied to the in-memory entity, but
    /// nothing reaches the store until save.
    pub async fn patch(&self, id: &str, ops: &[PatchOp]) -> Result<SaveOutcome<P::Entity>> {
        debug!("patch '{}' ({} ops)", id, ops.len());
        self.persistence.begin_transaction().await?;
        let mut entity = self.resolve_in_tx(id).await?;
        let mut settled = false;
        let outcome = self.patch_inner(&mut entity, ops, &mut settled).await;
        self.settle(entity, outcome, Mutation::Patch, settled).await
    }

    /// Delete an existing entity. Returns whether persistence accepted the
    /// delete; a vetoed delete rolls back and reports `false`.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        debug!("delete '{}'", id);
        self.persistence.begin_transaction().await?;
        let mut entity = self.resolve_in_tx(id).await?;
        let mut settled = false;
        match self.delete_inner(&mut entity, &mut settled).await {
            Ok(deleted) => Ok(deleted),
            Err(err) => Err(self.fail(&entity, err, Mutation::Delete, settled).await),
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn resolve(&self, id: &str) -> Result<P::Entity> {
        let key_fields = self.persistence.primary_key_fields();
        let Some(key) = EntityKey::parse(id, &key_fields) else {
            return Err(RestError::NotFound(id.to_string()));
        };
        match self.persistence.find_by_key(&key).await? {
            Some(entity) => Ok(entity),
            None => Err(RestError::NotFound(id.to_string())),
        }
    }

    /// Resolution inside an open transaction; lookup failures settle the
    /// transaction but stay outside the error-hook wrapping.
    async fn resolve_in_tx(&self, id: &str) -> Result<P::Entity> {
        match self.resolve(id).await {
            Ok(entity) => Ok(entity),
            Err(err) => Err(self.abandon(err).await),
        }
    }

    async fn abandon(&self, err: RestError) -> RestError {
        if let Err(rollback_err) = self.persistence.rollback().await {
            warn!("rollback of an abandoned operation did not complete: {}", rollback_err);
        }
        err
    }

    async fn assign_and_save(
        &self,
        entity: &mut P::Entity,
        mutation: Mutation,
        input: &BTreeMap<String, Value>,
        settled: &mut bool,
    ) -> Result<bool> {
        self.hooks
            .fire(Hook::Before(mutation), HookPayload::Entity(&*entity))?;
        entity.load(input);
        self.hooks
            .fire(Hook::Stage(mutation), HookPayload::Entity(&*entity))?;
        self.save_tail(entity, mutation, None, None, settled).await
    }

    async fn patch_inner(
        &self,
        entity: &mut P::Entity,
        ops: &[PatchOp],
        settled: &mut bool,
    ) -> Result<bool> {
        self.hooks
            .fire(Hook::Before(Mutation::Patch), HookPayload::Entity(&*entity))?;
        for op in ops {
            patch::apply(&mut *entity, op)?;
        }
        let dirty = entity.dirty_attributes();
        let old = entity.old_attributes();
        let (dirty_ref, old_ref) = if self.options.patch_snapshot_in_hooks {
            (Some(&dirty), Some(&old))
        } else {
            (None, None)
        };
        self.hooks.fire(
            Hook::Stage(Mutation::Patch),
            HookPayload::Patch {
                entity: &*entity,
                dirty: dirty_ref,
                old: old_ref,
            },
        )?;
        self.save_tail(entity, Mutation::Patch, dirty_ref, old_ref, settled)
            .await
    }

    /// Common save/commit/refresh tail of create, update and patch.
    async fn save_tail(
        &self,
        entity: &mut P::Entity,
        mutation: Mutation,
        dirty: Option<&BTreeMap<String, Value>>,
        old: Option<&BTreeMap<String, Value>>,
        settled: &mut bool,
    ) -> Result<bool> {
        if self.persistence.save(entity).await? {
            let payload = if mutation == Mutation::Patch {
                HookPayload::Patch {
                    entity: &*entity,
                    dirty,
                    old,
                }
            } else {
                HookPayload::Entity(&*entity)
            };
            self.hooks.fire(Hook::Done(mutation), payload)?;
            self.persistence.commit().await?;
            *settled = true;
            self.persistence.refresh(entity).await?;
            Ok(true)
        } else {
            // Reported validation failure, not an error.
            self.hooks
                .fire(Hook::Rollback(mutation), HookPayload::Entity(&*entity))?;
            self.persistence.rollback().await?;
            *settled = true;
            Ok(false)
        }
    }

    async fn delete_inner(&self, entity: &mut P::Entity, settled: &mut bool) -> Result<bool> {
        self.hooks
            .fire(Hook::Before(Mutation::Delete), HookPayload::Entity(&*entity))?;
        if self.persistence.delete(entity).await? {
            self.hooks
                .fire(Hook::Done(Mutation::Delete), HookPayload::Entity(&*entity))?;
            self.persistence.commit().await?;
            *settled = true;
            Ok(true)
        } else {
            self.hooks
                .fire(Hook::Rollback(Mutation::Delete), HookPayload::Entity(&*entity))?;
            self.persistence.rollback().await?;
            *settled = true;
            Ok(false)
        }
    }

    async fn settle(
        &self,
        entity: P::Entity,
        outcome: Result<bool>,
        mutation: Mutation,
        settled: bool,
    ) -> Result<SaveOutcome<P::Entity>> {
        match outcome {
            Ok(saved) => Ok(SaveOutcome { entity, saved }),
            Err(err) => Err(self.fail(&entity, err, mutation, settled).await),
        }
    }

    /// Failure path of a mutating operation: notify the error hook, roll back
    /// unless the transaction is already settled, and hand the original error
    /// back unchanged.
    async fn fail(
        &self,
        entity: &P::Entity,
        err: RestError,
        mutation: Mutation,
        settled: bool,
    ) -> RestError {
        let error_hook = Hook::Error(mutation);
        if let Err(hook_err) = self
            .hooks
            .fire(error_hook, HookPayload::EntityError(entity, &err))
        {
            warn!("'{}' listener failed: {}", error_hook, hook_err);
        }
        if !settled {
            if let Err(rollback_err) = self.persistence.rollback().await {
                warn!(
                    "rollback after failed {} did not complete: {}",
                    mutation.as_str(),
                    rollback_err
                );
            }
        }
        err
    }
}
