// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//

use crate::error::{BoxError, InvocationError, InvocationResult};
use crate::instance::InstanceId;

use super::attribute::TransactionAttribute;
use super::base::{PolicyCore, PolicyEnvironment};
use super::TransactionPolicy;

/// Runs without a transaction. The caller's transaction is suspended for the
/// duration of the call and resumed afterwards.
pub struct NotSupportedPolicy {
    core: PolicyCore,
}

impl NotSupportedPolicy {
    pub fn new(env: &PolicyEnvironment) -> Self {
        Self {
            core: PolicyCore::new(TransactionAttribute::NotSupported, env),
        }
    }
}

impl TransactionPolicy for NotSupportedPolicy {
    fn attribute(&self) -> TransactionAttribute {
        TransactionAttribute::NotSupported
    }

    fn core(&self) -> &PolicyCore {
        &self.core
    }

    fn before_invoke(&self, _instance: &InstanceId) -> InvocationResult<()> {
        self.core.start()?;
        self.core.observe_caller();
        let suspended = self.core.suspend()?;
        self.core
            .with_record(|record| record.set_suspended_transaction(suspended));
        self.core.decide_active(None)
    }

    fn after_invoke(&self, _instance: &InstanceId) -> InvocationResult<()> {
        self.core.finish()?;
        self.core.fire_non_transactional_completion();
        let suspended = self
            .core
            .with_record(|record| record.take_suspended_transaction());
        self.core.resume_quietly(suspended);
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
    use crate::policy::base::testing::environment;
    use crate::txn::{ManagerOp, TransactionError, TransactionManager};

    #[test]
    fn test_suspends_and_resumes_caller() {
        let t = environment();
        let caller = t.manager.begin().unwrap();
        let policy = NotSupportedPolicy::new(&t.env);

        policy.before_invoke(&t.instance).unwrap();
        assert_eq!(t.manager.get_transaction(), None);
        assert_eq!(policy.record().suspended_transaction(), Some(caller));

        policy.after_invoke(&t.instance).unwrap();
        assert_eq!(t.manager.get_transaction(), Some(caller));
        assert_eq!(t.manager.calls_of(ManagerOp::Begin), 1);
        assert_eq!(t.manager.calls_of(ManagerOp::Commit), 0);
        assert_eq!(t.manager.calls_of(ManagerOp::Rollback), 0);
    }

    #[test]
    fn test_resume_failure_does_not_fail_call() {
        let t = environment();
        t.manager.begin().unwrap();
        let policy = NotSupportedPolicy::new(&t.env);

        policy.before_invoke(&t.instance).unwrap();
        t.manager
            .inject_failure(ManagerOp::Resume, TransactionError::Internal("down".into()));
        assert!(policy.after_invoke(&t.instance).is_ok());
    }
}
