// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//

use crate::error::{BoxError, InvocationError, InvocationResult};
use crate::instance::InstanceId;

use super::attribute::TransactionAttribute;
use super::base::{PolicyCore, PolicyEnvironment};
use super::TransactionPolicy;

/// Runs without a transaction; rejects callers that have one
pub struct NeverPolicy {
    core: PolicyCore,
}

impl NeverPolicy {
    pub fn new(env: &PolicyEnvironment) -> Self {
        Self {
            core: PolicyCore::new(TransactionAttribute::Never, env),
        }
    }
}

impl TransactionPolicy for NeverPolicy {
    fn attribute(&self) -> TransactionAttribute {
        TransactionAttribute::Never
    }

    fn core(&self) -> &PolicyCore {
        &self.core
    }

    fn before_invoke(&self, instance: &InstanceId) -> InvocationResult<()> {
        self.core.start()?;
        if let Some(caller) = self.core.observe_caller() {
            return Err(InvocationError::TransactionNotAllowed(format!(
                "{} called inside transaction {}",
                instance, caller
            )));
        }
        self.core.decide_active(None)
    }

    fn after_invoke(&self, _instance: &InstanceId) -> InvocationResult<()> {
        self.core.finish()?;
        self.core.fire_non_transactional_completion();
        Ok(())
    }

    fn handle_system_exception(&self, error: BoxError, instance: &InstanceId) -> InvocationError {
        log::error!("System fault in {}: {}", instance, error);
        self.core.discard(instance);
        InvocationError::remote(Some(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FaultKind;
    use crate::policy::base::testing::environment;
    use crate::txn::{ManagerOp, TransactionManager};

    #[test]
    fn test_rejects_caller_transaction() {
        let t = environment();
        let caller = t.manager.begin().unwrap();
        let policy = NeverPolicy::new(&t.env);

        let error = policy.before_invoke(&t.instance).unwrap_err();
        assert_eq!(error.kind(), FaultKind::PolicyViolation);
        assert_eq!(t.manager.get_transaction(), Some(caller));
        assert_eq!(t.manager.calls_of(ManagerOp::Suspend), 0);
    }

    #[test]
    fn test_system_fault_is_remote() {
        let t = environment();
        let policy = NeverPolicy::new(&t.env);

        policy.before_invoke(&t.instance).unwrap();
        let error = policy.handle_system_exception("boom".into(), &t.instance);
        policy.after_invoke(&t.instance).unwrap();

        assert_eq!(error.kind(), FaultKind::Remote);
        assert!(t.registry.is_discarded(&t.instance));
        assert_eq!(t.manager.calls_of(ManagerOp::SetRollbackOnly), 0);
        assert_eq!(t.manager.calls_of(ManagerOp::Begin), 0);
        assert_eq!(t.manager.calls_of(ManagerOp::Resume), 0);
    }
}
