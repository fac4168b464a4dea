//! Nested and reentrant invocation tests

#[path = "testutils/mod.rs"]
mod testutils;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use demarcate::context::{self, ContextListener, InvocationContext};
use demarcate::{
    BusinessFault, ComponentInstance, FaultKind, InvocationError, TransactionAttribute,
    TransactionManager, TransactionStatus,
};
use testutils::container_fixture::ContainerFixture;

#[derive(Default)]
struct CountingListener {
    entered: AtomicUsize,
    exited: AtomicUsize,
}

impl ContextListener for CountingListener {
    fn context_entered(&self, _parent: Option<&InvocationContext>, _entered: &InvocationContext) {
        self.entered.fetch_add(1, Ordering::SeqCst);
    }

    fn context_exited(&self, _exited: &InvocationContext, _restored: Option<&InvocationContext>) {
        self.exited.fetch_add(1, Ordering::SeqCst);
    }
}

fn active_attribute() -> Option<TransactionAttribute> {
    context::active_policy().map(|policy| policy.attribute())
}

#[test]
fn test_nested_call_sees_its_own_policy() {
    let fixture = ContainerFixture::new();
    let order = ComponentInstance::stateless("Order", "1");
    let audit = ComponentInstance::stateless("Audit", "1");

    let (outer_txn, inner_txn) = fixture
        .invoke(&order, TransactionAttribute::Required, |scope| {
            let outer_txn = scope.current_transaction();
            assert_eq!(active_attribute(), Some(TransactionAttribute::Required));

            let inner_txn = scope
                .driver()
                .invoke(&audit, "record", TransactionAttribute::RequiresNew, |inner| {
                    assert_eq!(active_attribute(), Some(TransactionAttribute::RequiresNew));
                    assert_eq!(
                        inner.caller_policy().map(|policy| policy.attribute()),
                        Some(TransactionAttribute::Required)
                    );
                    Ok(inner.current_transaction())
                })
                .map_err(|e| BusinessFault::system(e))?;

            // back at the outer depth
            assert_eq!(active_attribute(), Some(TransactionAttribute::Required));
            assert_eq!(fixture.ambient(), outer_txn);
            Ok((outer_txn.unwrap(), inner_txn.unwrap()))
        })
        .unwrap();

    assert_ne!(outer_txn, inner_txn);
    assert_eq!(fixture.manager.status(outer_txn), TransactionStatus::Committed);
    assert_eq!(fixture.manager.status(inner_txn), TransactionStatus::Committed);
    assert!(context::current().is_none());
    assert!(active_attribute().is_none());
}

#[test]
fn test_reentrant_call_joins_transaction() {
    let fixture = ContainerFixture::new();
    let account = ComponentInstance::stateless("Account", "9");

    let (outer, inner) = fixture
        .invoke(&account, TransactionAttribute::Required, |scope| {
            let inner = scope
                .driver()
                .invoke(scope.instance(), "audit", TransactionAttribute::Supports, |inner| {
                    Ok(inner.current_transaction())
                })
                .map_err(|e| BusinessFault::system(e))?;
            Ok((scope.current_transaction(), inner))
        })
        .unwrap();

    assert!(outer.is_some());
    assert_eq!(outer, inner);
}

#[test]
fn test_nested_system_fault_invalidates_outer_transaction() {
    let fixture = ContainerFixture::new();
    let order = ComponentInstance::stateless("Order", "2");
    let stock = ComponentInstance::stateless("Stock", "2");
    let mut outer_txn = None;

    let error = fixture
        .invoke(&order, TransactionAttribute::Required, |scope| -> Result<(), _> {
            outer_txn = scope.current_transaction();
            let nested: Result<(), InvocationError> = scope.driver().invoke(
                &stock,
                "reserve",
                TransactionAttribute::Required,
                |_| Err(BusinessFault::system("negative stock")),
            );
            let nested = nested.unwrap_err();
            assert_eq!(nested.kind(), FaultKind::TransactionRolledBack);
            Err(BusinessFault::application(nested))
        })
        .unwrap_err();

    assert_eq!(error.kind(), FaultKind::Application);
    assert_eq!(
        fixture.manager.status(outer_txn.unwrap()),
        TransactionStatus::RolledBack
    );
    assert!(fixture.is_discarded(&stock));
    assert!(!fixture.is_discarded(&order));
}

#[test]
fn test_listeners_see_every_context() {
    let mut fixture = ContainerFixture::new();
    let listener = Arc::new(CountingListener::default());
    fixture.driver.add_context_listener(listener.clone());
    let outer = ComponentInstance::stateless("Order", "3");
    let inner = ComponentInstance::stateless("Audit", "3");

    fixture
        .invoke(&outer, TransactionAttribute::Supports, |scope| {
            scope
                .driver()
                .invoke(&inner, "record", TransactionAttribute::Never, |_| Ok(()))
                .map_err(|e| BusinessFault::system(e))
        })
        .unwrap();

    assert_eq!(listener.entered.load(Ordering::SeqCst), 2);
    assert_eq!(listener.exited.load(Ordering::SeqCst), 2);
}

#[test]
fn test_rejected_call_restores_context() {
    let fixture = ContainerFixture::new();
    let outer = ComponentInstance::stateless("Order", "4");
    let inner = ComponentInstance::stateless("Audit", "4");

    fixture
        .invoke(&outer, TransactionAttribute::Required, |scope| {
            let rejected = scope
                .driver()
                .invoke(&inner, "record", TransactionAttribute::Never, |_| Ok(()));
            assert!(rejected.is_err());
            assert_eq!(active_attribute(), Some(TransactionAttribute::Required));
            Ok(())
        })
        .unwrap();
    assert!(context::current().is_none());
}
