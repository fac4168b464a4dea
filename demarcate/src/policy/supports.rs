// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//

use crate::error::{BoxError, InvocationError, InvocationResult};
use crate::instance::InstanceId;

use super::attribute::TransactionAttribute;
use super::base::{PolicyCore, PolicyEnvironment};
use super::TransactionPolicy;

/// Joins the caller's transaction when there is one, never begins one
pub struct SupportsPolicy {
    core: PolicyCore,
}

impl SupportsPolicy {
    pub fn new(env: &PolicyEnvironment) -> Self {
        Self {
            core: PolicyCore::new(TransactionAttribute::Supports, env),
        }
    }
}

impl TransactionPolicy for SupportsPolicy {
    fn attribute(&self) -> TransactionAttribute {
        TransactionAttribute::Supports
    }

    fn core(&self) -> &PolicyCore {
        &self.core
    }

    fn before_invoke(&self, _instance: &InstanceId) -> InvocationResult<()> {
        self.core.start()?;
        let caller = self.core.observe_caller();
        self.core.decide_active(caller)
    }

    fn after_invoke(&self, _instance: &InstanceId) -> InvocationResult<()> {
        self.core.finish()?;
        if self.current_transaction().is_none() {
            self.core.fire_non_transactional_completion();
        }
        Ok(())
    }

    fn handle_system_exception(&self, error: BoxError, instance: &InstanceId) -> InvocationError {
        log::error!("System fault in {}: {}", instance, error);
        match self.current_transaction() {
            Some(caller) => {
                self.core
                    .mark_rollback_only_for_fault(caller, "system fault in supports call");
                self.core.discard(instance);
                InvocationError::rolled_back(Some(error))
            }
            None => {
                self.core.discard(instance);
                InvocationError::remote(Some(error))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FaultKind;
    use crate::policy::base::testing::environment;
    use crate::txn::{ManagerOp, TransactionManager, TransactionStatus};

    #[test]
    fn test_system_fault_without_transaction() {
        let t = environment();
        let policy = SupportsPolicy::new(&t.env);

        policy.before_invoke(&t.instance).unwrap();
        let error = policy.handle_system_exception("boom".into(), &t.instance);
        policy.after_invoke(&t.instance).unwrap();

        assert_eq!(error.kind(), FaultKind::Remote);
        assert!(t.registry.is_discarded(&t.instance));
        assert_eq!(t.manager.calls_of(ManagerOp::SetRollbackOnly), 0);
    }

    #[test]
    fn test_system_fault_with_caller_transaction() {
        let t = environment();
        let caller = t.manager.begin().unwrap();
        let policy = SupportsPolicy::new(&t.env);

        policy.before_invoke(&t.instance).unwrap();
        let error = policy.handle_system_exception("boom".into(), &t.instance);
        policy.after_invoke(&t.instance).unwrap();

        assert_eq!(error.kind(), FaultKind::TransactionRolledBack);
        assert_eq!(t.manager.status(caller), TransactionStatus::MarkedRollback);
        assert_eq!(t.manager.get_transaction(), Some(caller));
    }
}
