/// Lifecycle tests
///
/// End-to-end coverage of the six operations against the in-memory backend:
/// hook firing, reported validation failures and the exactly-once
/// commit/rollback discipline.
/// Run with: cargo test --test lifecycle_tests
use restcycle::prelude::advanced::*;
use restcycle::prelude::dx::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn person_spec() -> EntitySpec {
    EntitySpec::new().field("id", "id").field("name", "name")
}

fn store_with_alice() -> MemoryPersistence {
    let store = MemoryPersistence::new(&["id"], person_spec());
    store
        .seed(&[("id", Value::Integer(1)), ("name", Value::from("Alice"))])
        .unwrap();
    store
}

fn input(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

fn counter(
    resources: &mut ResourceLifecycle<MemoryPersistence>,
    hook: Hook,
) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let seen = count.clone();
    resources.hooks_mut().register(hook, move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    count
}

#[tokio::test]
async fn test_view_returns_the_resolved_entity() {
    let resources = ResourceLifecycle::new(store_with_alice());
    let entity = resources.view("1").await.unwrap();
    assert_eq!(entity.get("name"), Value::from("Alice"));
}

#[tokio::test]
async fn test_view_missing_entity_reports_not_found() {
    let resources = ResourceLifecycle::new(store_with_alice());
    let err = resources.view("9").await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.to_string(), "Object not found: '9'");
}

#[tokio::test]
async fn test_composite_key_resolves_by_field_order() {
    let store = MemoryPersistence::new(
        &["a", "b"],
        EntitySpec::new().field("name", "name"),
    );
    store
        .seed(&[
            ("a", Value::Integer(1)),
            ("b", Value::Integer(2)),
            ("name", Value::from("pair")),
        ])
        .unwrap();
    let resources = ResourceLifecycle::new(store);

    let entity = resources.view("1,2").await.unwrap();
    assert_eq!(entity.get("name"), Value::from("pair"));
    assert_eq!(resources.persistence().stats().unwrap().lookups, 1);
}

#[tokio::test]
async fn test_composite_key_component_mismatch_never_reaches_persistence() {
    let store = MemoryPersistence::new(&["a", "b"], EntitySpec::new());
    let resources = ResourceLifecycle::new(store);

    let err = resources.view("1").await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(resources.persistence().stats().unwrap().lookups, 0);
}

#[tokio::test]
async fn test_query_fires_hook_with_the_result_handle() {
    let mut resources = ResourceLifecycle::new(store_with_alice());
    let seen_total = Arc::new(AtomicUsize::new(0));
    let total = seen_total.clone();
    resources.hooks_mut().register(Hook::Query, move |payload| {
        if let HookPayload::Query(page) = payload {
            total.store(page.total, Ordering::SeqCst);
        }
        Ok(())
    });

    let page = resources.query().await.unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(seen_total.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_view_hook_failure_aborts_the_read() {
    let mut resources = ResourceLifecycle::new(store_with_alice());
    resources.hooks_mut().register(Hook::View, |_| {
        Err(RestError::Hook("view".into(), "vetoed".into()))
    });

    let err = resources.view("1").await.unwrap_err();
    assert!(matches!(err, RestError::Hook(_, _)));
}

#[tokio::test]
async fn test_create_saves_commits_and_refreshes() {
    let mut resources = ResourceLifecycle::new(MemoryPersistence::new(&["id"], person_spec()));
    let before = counter(&mut resources, Hook::Before(Mutation::Create));
    let created = counter(&mut resources, Hook::Done(Mutation::Create));

    let outcome = resources
        .create(&input(&[("name", Value::from("Bob"))]))
        .await
        .unwrap();

    assert!(outcome.saved);
    assert_eq!(outcome.entity.get("id"), Value::Integer(1));
    assert_eq!(before.load(Ordering::SeqCst), 1);
    assert_eq!(created.load(Ordering::SeqCst), 1);

    let stats = resources.persistence().stats().unwrap();
    assert_eq!(stats.begun, 1);
    assert_eq!(stats.committed, 1);
    assert_eq!(stats.rolled_back, 0);
    assert_eq!(resources.persistence().row_count().unwrap(), 1);
}

#[tokio::test]
async fn test_create_validation_failure_rolls_back_once_and_returns_the_unsaved_entity() {
    let store = MemoryPersistence::new(&["id"], person_spec())
        .with_save_validator(|entity| !entity.get("name").is_null());
    let mut resources = ResourceLifecycle::new(store);
    let rollback_hook = counter(&mut resources, Hook::Rollback(Mutation::Create));
    let error_hook = counter(&mut resources, Hook::Error(Mutation::Create));

    let outcome = resources
        .create(&input(&[("age", Value::Integer(30))]))
        .await
        .unwrap();

    assert!(!outcome.saved);
    assert_eq!(outcome.entity.get("age"), Value::Integer(30));
    assert!(!outcome.entity.is_persisted());
    assert_eq!(rollback_hook.load(Ordering::SeqCst), 1);
    assert_eq!(error_hook.load(Ordering::SeqCst), 0);

    let stats = resources.persistence().stats().unwrap();
    assert_eq!(stats.rolled_back, 1);
    assert_eq!(stats.committed, 0);
    assert_eq!(resources.persistence().row_count().unwrap(), 0);
}

#[tokio::test]
async fn test_update_loads_input_and_persists() {
    let resources = ResourceLifecycle::new(store_with_alice());
    let outcome = resources
        .update("1", &input(&[("name", Value::from("Alicia"))]))
        .await
        .unwrap();

    assert!(outcome.saved);
    let stored = resources
        .persistence()
        .stored_row(&EntityKey::single("id", "1"))
        .unwrap()
        .unwrap();
    assert_eq!(stored.get("name"), Some(&Value::Text("Alicia".into())));
}

#[tokio::test]
async fn test_update_hook_failure_fires_error_hook_and_preserves_the_error() {
    let mut resources = ResourceLifecycle::new(store_with_alice());
    resources.hooks_mut().register(Hook::Stage(Mutation::Update), |_| {
        Err(RestError::Hook("update".into(), "boom".into()))
    });
    let error_hook = counter(&mut resources, Hook::Error(Mutation::Update));

    let err = resources
        .update("1", &input(&[("name", Value::from("Mallory"))]))
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "Hook 'update' failed: boom");
    assert_eq!(error_hook.load(Ordering::SeqCst), 1);

    let stats = resources.persistence().stats().unwrap();
    assert_eq!(stats.rolled_back, 1);
    assert_eq!(stats.committed, 0);
    assert_eq!(stats.saves, 0);

    // The store never saw the mutation.
    let stored = resources
        .persistence()
        .stored_row(&EntityKey::single("id", "1"))
        .unwrap()
        .unwrap();
    assert_eq!(stored.get("name"), Some(&Value::Text("Alice".into())));
}

#[tokio::test]
async fn test_update_missing_entity_settles_the_transaction() {
    let resources = ResourceLifecycle::new(store_with_alice());
    let err = resources
        .update("9", &input(&[("name", Value::from("Nobody"))]))
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    let stats = resources.persistence().stats().unwrap();
    assert_eq!(stats.begun, 1);
    assert_eq!(stats.rolled_back, 1);
}

#[tokio::test]
async fn test_delete_success_returns_true_and_commits() {
    let mut resources = ResourceLifecycle::new(store_with_alice());
    let deleted_hook = counter(&mut resources, Hook::Done(Mutation::Delete));

    assert!(resources.delete("1").await.unwrap());
    assert_eq!(deleted_hook.load(Ordering::SeqCst), 1);
    assert_eq!(resources.persistence().row_count().unwrap(), 0);
    assert_eq!(resources.persistence().stats().unwrap().committed, 1);
}

#[tokio::test]
async fn test_vetoed_delete_returns_false_and_rolls_back() {
    let store = MemoryPersistence::new(&["id"], person_spec()).with_delete_guard(|_| false);
    store
        .seed(&[("id", Value::Integer(1)), ("name", Value::from("Alice"))])
        .unwrap();
    let mut resources = ResourceLifecycle::new(store);
    let rollback_hook = counter(&mut resources, Hook::Rollback(Mutation::Delete));

    assert!(!resources.delete("1").await.unwrap());
    assert_eq!(rollback_hook.load(Ordering::SeqCst), 1);
    assert_eq!(resources.persistence().row_count().unwrap(), 1);

    let stats = resources.persistence().stats().unwrap();
    assert_eq!(stats.rolled_back, 1);
    assert_eq!(stats.committed, 0);
}

#[tokio::test]
async fn test_before_delete_hook_failure_re_raises_after_rollback() {
    let mut resources = ResourceLifecycle::new(store_with_alice());
    resources
        .hooks_mut()
        .register(Hook::Before(Mutation::Delete), |_| {
            Err(RestError::Hook("beforeDelete".into(), "keep it".into()))
        });
    let error_hook = counter(&mut resources, Hook::Error(Mutation::Delete));

    let err = resources.delete("1").await.unwrap_err();
    assert!(matches!(err, RestError::Hook(_, _)));
    assert_eq!(error_hook.load(Ordering::SeqCst), 1);
    assert_eq!(resources.persistence().row_count().unwrap(), 1);
    assert_eq!(resources.persistence().stats().unwrap().rolled_back, 1);
}

#[tokio::test]
async fn test_listeners_fire_in_registration_order_across_an_operation() {
    let mut resources = ResourceLifecycle::new(store_with_alice());
    let order = Arc::new(std::sync::Mutex::new(Vec::new()));

    for tag in ["first", "second"] {
        let order = order.clone();
        resources.hooks_mut().register(Hook::View, move |_| {
            order.lock().unwrap().push(tag);
            Ok(())
        });
    }

    resources.view("1").await.unwrap();
    assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
}
