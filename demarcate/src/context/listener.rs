// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Context lifecycle listeners

use std::sync::Arc;

use super::InvocationContext;

/// Notified when an invocation context is entered or left on a thread
pub trait ContextListener: Send + Sync {
    fn context_entered(&self, parent: Option<&InvocationContext>, entered: &InvocationContext);

    fn context_exited(&self, exited: &InvocationContext, restored: Option<&InvocationContext>);
}

/// Ordered set of listeners shared by every context a driver enters
#[derive(Clone, Default)]
pub struct ContextListeners {
    listeners: Vec<Arc<dyn ContextListener>>,
}

impl ContextListeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, listener: Arc<dyn ContextListener>) {
        self.listeners.push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub(crate) fn entered(&self, parent: Option<&InvocationContext>, entered: &InvocationContext) {
        for listener in &self.listeners {
            listener.context_entered(parent, entered);
        }
    }

    /// Exit notifications run innermost-registered first
    pub(crate) fn exited(&self, exited: &InvocationContext, restored: Option<&InvocationContext>) {
        for listener in self.listeners.iter().rev() {
            listener.context_exited(exited, restored);
        }
    }
}

/// A freshly entered context inherits its parent's active policy until the
/// invocation installs its own
#[derive(Debug, Default)]
pub struct PolicyPropagationListener;

impl ContextListener for PolicyPropagationListener {
    fn context_entered(&self, parent: Option<&InvocationContext>, entered: &InvocationContext) {
        if let Some(policy) = parent.and_then(|parent| parent.active_policy()) {
            log::trace!(
                "{} inherits the {} policy of its caller",
                entered.instance(),
                policy.attribute()
            );
            entered.set_active_policy(Some(policy));
        }
    }

    fn context_exited(&self, _exited: &InvocationContext, _restored: Option<&InvocationContext>) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ContainerConfig;
    use crate::context::{active_policy, enter};
    use crate::instance::{DiscardRegistry, InstanceId};
    use crate::policy::{PolicyFactory, TransactionAttribute};
    use crate::txn::InMemoryTransactionManager;

    #[test]
    fn test_nested_context_inherits_parent_policy() {
        let factory = PolicyFactory::new(
            Arc::new(InMemoryTransactionManager::new()),
            Arc::new(DiscardRegistry::new()),
            &ContainerConfig::default(),
        );
        let mut listeners = ContextListeners::new();
        listeners.add(Arc::new(PolicyPropagationListener));

        let outer = Arc::new(InvocationContext::new(
            InstanceId::new("Teller", "1"),
            "transfer",
            TransactionAttribute::Supports,
        ));
        let _outer_guard = enter(outer.clone(), &listeners);
        outer.set_active_policy(Some(factory.build(TransactionAttribute::Supports)));

        let inner = Arc::new(InvocationContext::new(
            InstanceId::new("Ledger", "1"),
            "post",
            TransactionAttribute::Never,
        ));
        {
            let _inner_guard = enter(inner.clone(), &listeners);
            assert_eq!(
                active_policy().map(|policy| policy.attribute()),
                Some(TransactionAttribute::Supports)
            );
        }
        assert_eq!(
            active_policy().map(|policy| policy.attribute()),
            Some(TransactionAttribute::Supports)
        );
    }
}
