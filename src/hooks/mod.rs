// ============================================================================
// Hook Bus
// ============================================================================
//
// Explicit registry of named listener lists. Firing a hook is a synchronous,
// ordered broadcast in registration order; a listener failure short-circuits
// the remaining listeners and becomes the operation's failure. Registration
// is expected to happen during setup, not concurrently with firing.

use crate::core::{Result, Value};
use log::debug;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// The four mutating operations hooks are keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mutation {
    Create,
    Update,
    Patch,
    Delete,
}

impl Mutation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Patch => "patch",
            Self::Delete => "delete",
        }
    }
}

/// Typed hook name.
///
/// `Stage` is the mid-operation hook that fires after the entity has been
/// mutated but before save; delete has no such stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    Query,
    View,
    ViewDetail,
    Before(Mutation),
    Stage(Mutation),
    Done(Mutation),
    Rollback(Mutation),
    Error(Mutation),
}

impl Hook {
    /// Wire-style hook name, e.g. `beforeCreate`, `patched`, `errorDelete`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::View => "view",
            Self::ViewDetail => "viewDetail",
            Self::Before(m) => match m {
                Mutation::Create => "beforeCreate",
                Mutation::Update => "beforeUpdate",
                Mutation::Patch => "beforePatch",
                Mutation::Delete => "beforeDelete",
            },
            Self::Stage(m) => m.as_str(),
            Self::Done(m) => match m {
                Mutation::Create => "created",
                Mutation::Update => "updated",
                Mutation::Patch => "patched",
                Mutation::Delete => "deleted",
            },
            Self::Rollback(m) => match m {
                Mutation::Create => "rollbackCreate",
                Mutation::Update => "rollbackUpdate",
                Mutation::Patch => "rollbackPatch",
                Mutation::Delete => "rollbackDelete",
            },
            Self::Error(m) => match m {
                Mutation::Create => "errorCreate",
                Mutation::Update => "errorUpdate",
                Mutation::Patch => "errorPatch",
                Mutation::Delete => "errorDelete",
            },
        }
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Borrowed arguments handed to listeners.
pub enum HookPayload<'a, E, Q> {
    /// `query` carries the result handle.
    Query(&'a Q),
    /// Most lifecycle hooks carry the entity.
    Entity(&'a E),
    /// `error*` hooks carry the entity and the failure.
    EntityError(&'a E, &'a crate::core::RestError),
    /// `patch`/`patched` carry the entity plus the dirty/old snapshot when
    /// the lifecycle is configured to include it.
    Patch {
        entity: &'a E,
        dirty: Option<&'a BTreeMap<String, Value>>,
        old: Option<&'a BTreeMap<String, Value>>,
    },
}

impl<E, Q> Clone for HookPayload<'_, E, Q> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E, Q> Copy for HookPayload<'_, E, Q> {}

type Listener<E, Q> = Box<dyn for<'a> Fn(HookPayload<'a, E, Q>) -> Result<()> + Send + Sync>;

/// Registry of hook listeners for one lifecycle.
pub struct HookBus<E, Q> {
    listeners: HashMap<Hook, Vec<Listener<E, Q>>>,
}

impl<E, Q> Default for HookBus<E, Q> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E, Q> HookBus<E, Q> {
    pub fn new() -> Self {
        Self {
            listeners: HashMap::new(),
        }
    }

    /// Append a listener to the hook's broadcast list.
    pub fn register<F>(&mut self, hook: Hook, listener: F)
    where
        F: for<'a> Fn(HookPayload<'a, E, Q>) -> Result<()> + Send + Sync + 'static,
    {
        self.listeners.entry(hook).or_default().push(Box::new(listener));
    }

    pub fn listener_count(&self, hook: Hook) -> usize {
        self.listeners.get(&hook).map_or(0, Vec::len)
    }

    /// Broadcast to all listeners in registration order. The first failing
    /// listener aborts the broadcast.
    pub fn fire(&self, hook: Hook, payload: HookPayload<'_, E, Q>) -> Result<()> {
        let Some(list) = self.listeners.get(&hook) else {
            return Ok(());
        };
        debug!("firing '{}' to {} listener(s)", hook, list.len());
        for listener in list {
            listener(payload)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RestError;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_hook_names() {
        assert_eq!(Hook::Before(Mutation::Create).name(), "beforeCreate");
        assert_eq!(Hook::Stage(Mutation::Update).name(), "update");
        assert_eq!(Hook::Done(Mutation::Patch).name(), "patched");
        assert_eq!(Hook::Rollback(Mutation::Delete).name(), "rollbackDelete");
        assert_eq!(Hook::Error(Mutation::Update).name(), "errorUpdate");
        assert_eq!(Hook::ViewDetail.name(), "viewDetail");
    }

    #[test]
    fn test_listeners_fire_in_registration_order() {
        let mut bus: HookBus<(), ()> = HookBus::new();
        // Listener closures must be 'static.
        let order_ref: &'static Mutex<Vec<u8>> = Box::leak(Box::new(Mutex::new(Vec::new())));

        bus.register(Hook::View, move |_| {
            order_ref.lock().unwrap().push(1);
            Ok(())
        });
        bus.register(Hook::View, move |_| {
            order_ref.lock().unwrap().push(2);
            Ok(())
        });

        bus.fire(Hook::View, HookPayload::Entity(&())).unwrap();
        assert_eq!(*order_ref.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_failure_short_circuits_remaining_listeners() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        let mut bus: HookBus<(), ()> = HookBus::new();

        bus.register(Hook::View, |_| {
            Err(RestError::Hook("view".into(), "vetoed".into()))
        });
        bus.register(Hook::View, |_| {
            CALLS.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let err = bus.fire(Hook::View, HookPayload::Entity(&())).unwrap_err();
        assert!(matches!(err, RestError::Hook(_, _)));
        assert_eq!(CALLS.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_firing_without_listeners_is_a_no_op() {
        let bus: HookBus<(), ()> = HookBus::new();
        bus.fire(Hook::Query, HookPayload::Query(&())).unwrap();
        assert_eq!(bus.listener_count(Hook::Query), 0);
    }
}
