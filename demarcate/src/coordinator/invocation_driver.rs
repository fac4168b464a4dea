// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Invocation Driver - runs one business method under its transaction policy
//!
//! The driver owns the order of operations around a component method:
//! enter the thread's invocation context, build the policy (which applies
//! its begin-time effects), run the method, classify its fault, complete the
//! policy and restore the caller's context.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::ContainerConfig;
use crate::context::{
    self, ContextListener, ContextListeners, InvocationContext, InvocationPhase,
    PolicyPropagationListener,
};
use crate::error::{BusinessFault, InvocationError, InvocationResult, SystemFaultKind};
use crate::instance::{ComponentInstance, InstanceLifecycle};
use crate::policy::{
    CallerPolicy, PolicyFactory, ResourceBag, TransactionAttribute, TransactionPolicy,
    UserTransaction,
};
use crate::txn::{Synchronization, TransactionId, TransactionManager, XaResource};

/// Invocation Driver - the entry point for calling component methods
///
/// One driver serves every thread of the container. It handles:
/// - Policy construction from the declared attribute
/// - Ambient context save and restore for nested calls
/// - Fault classification and completion ordering
/// - Parking of bean-managed transactions on stateful instances
pub struct InvocationDriver {
    manager: Arc<dyn TransactionManager>,
    factory: PolicyFactory,
    listeners: ContextListeners,
}

impl InvocationDriver {
    /// Create a driver whose contexts propagate the active policy to nested calls
    pub fn new(
        manager: Arc<dyn TransactionManager>,
        lifecycle: Arc<dyn InstanceLifecycle>,
        config: &ContainerConfig,
    ) -> Self {
        let mut listeners = ContextListeners::new();
        listeners.add(Arc::new(PolicyPropagationListener));

        Self {
            factory: PolicyFactory::new(manager.clone(), lifecycle, config),
            manager,
            listeners,
        }
    }

    pub fn add_context_listener(&mut self, listener: Arc<dyn ContextListener>) {
        self.listeners.add(listener);
    }

    pub fn manager(&self) -> &Arc<dyn TransactionManager> {
        &self.manager
    }

    pub fn factory(&self) -> &PolicyFactory {
        &self.factory
    }

    /// Run `target` on `instance` under the policy for `attribute`
    ///
    /// # Arguments
    /// * `instance` - The component instance being called
    /// * `method` - Method name, used for diagnostics
    /// * `attribute` - The method's declared transaction attribute
    /// * `target` - The business method; it receives an `InvocationScope`
    ///
    /// # Returns
    /// * `Ok(R)` - The method's result, after the policy completed cleanly
    /// * `Err(InvocationError)` - A policy violation, the method's application
    ///   fault, a classified system fault or a completion failure
    ///
    /// A panic in `target` is treated as a system fault.
    pub fn invoke<R, F>(
        &self,
        instance: &ComponentInstance,
        method: &str,
        attribute: TransactionAttribute,
        target: F,
    ) -> InvocationResult<R>
    where
        F: FnOnce(&InvocationScope<'_>) -> Result<R, BusinessFault>,
    {
        let context = Arc::new(InvocationContext::new(
            instance.id().clone(),
            method,
            attribute,
        ));
        let guard = context::enter(context.clone(), &self.listeners);

        // Idle -> PolicyActive
        let policy = self.factory.create_policy(attribute, instance.id())?;
        let caller_policy = context.replace_active_policy(Some(policy.clone()));
        policy
            .core()
            .local_resources()
            .lock()
            .put(Arc::new(CallerPolicy(caller_policy)));
        context.set_phase(InvocationPhase::PolicyActive);
        log::debug!("Invoking {}.{} ({})", instance.id(), method, attribute);

        if let Err(e) = self.resume_bean_transaction(instance, policy.as_ref()) {
            context.set_phase(InvocationPhase::Completing);
            if let Err(completion) = policy.after_invoke(instance.id()) {
                log::warn!("Completion after failed resume also failed: {}", completion);
            }
            drop(guard);
            return Err(e);
        }

        let outcome = {
            let scope = InvocationScope {
                driver: self,
                policy: &policy,
                context: &context,
                instance,
            };
            panic::catch_unwind(AssertUnwindSafe(|| target(&scope))).unwrap_or_else(|payload| {
                Err(BusinessFault::System(
                    format!("{}.{} panicked: {}", instance.id(), method, panic_message(payload))
                        .into(),
                ))
            })
        };

        // PolicyActive -> Completing
        context.set_phase(InvocationPhase::Completing);
        let mut system_fault = false;
        let result = match outcome {
            Ok(value) => Ok(value),
            Err(BusinessFault::Application { error, rollback }) => {
                Err(policy.handle_application_exception(error, rollback))
            }
            Err(BusinessFault::System(error)) => {
                system_fault = true;
                Err(policy.handle_system_exception(error, instance.id()))
            }
        };

        self.park_bean_transaction(instance, policy.as_ref());
        let completion = policy.after_invoke(instance.id());

        // Completing -> Idle, caller's context back in place
        drop(guard);

        match (result, completion) {
            (result, Ok(())) => result,
            (Ok(_), Err(completion)) => Err(completion),
            (Err(fault), Err(completion)) if system_fault => {
                log::warn!(
                    "Completion of {}.{} failed after system fault: {}",
                    instance.id(),
                    method,
                    completion
                );
                Err(fault)
            }
            (Err(fault), Err(completion)) => {
                log::warn!(
                    "Fault from {}.{} superseded by completion failure: {}",
                    instance.id(),
                    method,
                    fault
                );
                Err(completion)
            }
        }
    }

    /// Same as `invoke` with the attribute given by its descriptor name
    pub fn invoke_named<R, F>(
        &self,
        instance: &ComponentInstance,
        method: &str,
        attribute: &str,
        target: F,
    ) -> InvocationResult<R>
    where
        F: FnOnce(&InvocationScope<'_>) -> Result<R, BusinessFault>,
    {
        let attribute = PolicyFactory::resolve_attribute(attribute, instance.id())?;
        self.invoke(instance, method, attribute, target)
    }

    fn resume_bean_transaction(
        &self,
        instance: &ComponentInstance,
        policy: &dyn TransactionPolicy,
    ) -> InvocationResult<()> {
        let Some(bean) = policy.as_bean_managed() else {
            return Ok(());
        };
        match instance.take_bean_transaction() {
            Some(token) => bean.resume_user_transaction(token),
            None => Ok(()),
        }
    }

    /// Keep a stateful instance's open bean-managed transaction for its next
    /// call instead of letting `after_invoke` treat it as dangling
    fn park_bean_transaction(&self, instance: &ComponentInstance, policy: &dyn TransactionPolicy) {
        if !instance.is_stateful() || policy.record().instance_discard_requested() {
            return;
        }
        let Some(bean) = policy.as_bean_managed() else {
            return;
        };

        match bean.suspend_user_transaction() {
            Ok(Some(token)) => {
                log::debug!("Parking {:?} on {}", token.transaction(), instance.id());
                instance.set_bean_transaction(Some(token));
            }
            Ok(None) => {}
            Err(e) => log::error!(
                "Could not park bean transaction of {}: {}",
                instance.id(),
                e
            ),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// What a business method can see of its invocation
pub struct InvocationScope<'a> {
    driver: &'a InvocationDriver,
    policy: &'a Arc<dyn TransactionPolicy>,
    context: &'a InvocationContext,
    instance: &'a ComponentInstance,
}

impl<'a> InvocationScope<'a> {
    /// The driver, for nested calls to other components
    pub fn driver(&self) -> &InvocationDriver {
        self.driver
    }

    pub fn policy(&self) -> &Arc<dyn TransactionPolicy> {
        self.policy
    }

    pub fn instance(&self) -> &ComponentInstance {
        self.instance
    }

    pub fn method(&self) -> &str {
        self.context.method()
    }

    pub fn phase(&self) -> InvocationPhase {
        self.context.phase()
    }

    pub fn current_transaction(&self) -> Option<TransactionId> {
        self.policy.current_transaction()
    }

    /// Only bean-managed methods demarcate their own transactions
    pub fn user_transaction(&self) -> InvocationResult<UserTransaction> {
        self.policy
            .as_bean_managed()
            .map(|bean| bean.user_transaction())
            .ok_or_else(|| {
                InvocationError::system(
                    SystemFaultKind::IllegalState,
                    format!(
                        "{} is container-managed ({})",
                        self.instance.id(),
                        self.policy.attribute()
                    ),
                )
            })
    }

    /// Bean-managed methods mark their transaction through `UserTransaction`
    pub fn set_rollback_only(&self, reason: &str) -> InvocationResult<()> {
        if self.policy.as_bean_managed().is_some() {
            return Err(InvocationError::system(
                SystemFaultKind::IllegalState,
                "bean-managed methods use UserTransaction::set_rollback_only",
            ));
        }
        self.policy.set_rollback_only(reason)
    }

    pub fn is_rollback_only(&self) -> bool {
        self.policy.is_rollback_only()
    }

    pub fn register_synchronization(
        &self,
        synchronization: Arc<dyn Synchronization>,
    ) -> InvocationResult<()> {
        self.policy.register_synchronization(synchronization)
    }

    pub fn enlist_resource(&self, resource: Arc<dyn XaResource>) -> InvocationResult<()> {
        self.policy.enlist_resource(resource)
    }

    pub fn resources(&self) -> Arc<Mutex<ResourceBag>> {
        self.policy.resources()
    }

    /// Policy that was active on this thread when the invocation started
    pub fn caller_policy(&self) -> Option<Arc<dyn TransactionPolicy>> {
        self.policy
            .core()
            .local_resources()
            .lock()
            .get::<CallerPolicy>()
            .and_then(|caller| caller.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::DiscardRegistry;
    use crate::txn::InMemoryTransactionManager;

    fn driver() -> (Arc<InMemoryTransactionManager>, InvocationDriver) {
        let manager = Arc::new(InMemoryTransactionManager::new());
        let driver = InvocationDriver::new(
            manager.clone(),
            Arc::new(DiscardRegistry::new()),
            &ContainerConfig::default(),
        );
        (manager, driver)
    }

    #[test]
    fn test_phase_during_method() {
        let (_, driver) = driver();
        let instance = ComponentInstance::stateless("Teller", "1");

        let phase = driver
            .invoke(&instance, "balance", TransactionAttribute::Supports, |scope| {
                Ok(scope.phase())
            })
            .unwrap();
        assert_eq!(phase, InvocationPhase::PolicyActive);
        assert!(context::current().is_none());
    }

    #[test]
    fn test_panic_becomes_remote_fault() {
        let (manager, driver) = driver();
        let instance = ComponentInstance::stateless("Teller", "1");

        let result: InvocationResult<()> =
            driver.invoke(&instance, "explode", TransactionAttribute::Required, |_| {
                panic!("index out of bounds")
            });

        assert!(result.unwrap_err().invalidates_reference());
        assert_eq!(manager.get_transaction(), None);
        assert!(context::current().is_none());
    }

    #[test]
    fn test_user_transaction_is_bean_managed_only() {
        let (_, driver) = driver();
        let instance = ComponentInstance::stateless("Teller", "1");

        let error = driver
            .invoke(&instance, "peek", TransactionAttribute::Required, |scope| {
                Ok(scope.user_transaction().is_err())
            })
            .unwrap();
        assert!(error);
    }
}
