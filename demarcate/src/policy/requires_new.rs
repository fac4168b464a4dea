// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//

use crate::error::{BoxError, InvocationError, InvocationResult};
use crate::instance::InstanceId;

use super::attribute::TransactionAttribute;
use super::base::{PolicyCore, PolicyEnvironment};
use super::TransactionPolicy;

/// Always runs in a transaction of its own. The caller's transaction is
/// suspended until the new one is completed.
pub struct RequiresNewPolicy {
    core: PolicyCore,
}

impl RequiresNewPolicy {
    pub fn new(env: &PolicyEnvironment) -> Self {
        Self {
            core: PolicyCore::new(TransactionAttribute::RequiresNew, env),
        }
    }
}

impl TransactionPolicy for RequiresNewPolicy {
    fn attribute(&self) -> TransactionAttribute {
        TransactionAttribute::RequiresNew
    }

    fn core(&self) -> &PolicyCore {
        &self.core
    }

    fn before_invoke(&self, _instance: &InstanceId) -> InvocationResult<()> {
        self.core.start()?;
        self.core.observe_caller();
        let suspended = self.core.suspend()?;

        match self.core.begin() {
            Ok(transaction) => {
                self.core
                    .with_record(|record| record.set_suspended_transaction(suspended));
                self.core.decide_active(Some(transaction))
            }
            Err(e) => {
                // the method will not run, so nothing else puts the caller back
                self.core.resume_quietly(suspended);
                Err(e)
            }
        }
    }

    fn after_invoke(&self, _instance: &InstanceId) -> InvocationResult<()> {
        self.core.finish()?;
        let result = match self.current_transaction() {
            Some(transaction) => self.core.complete(transaction),
            None => Ok(()),
        };

        let suspended = self
            .core
            .with_record(|record| record.take_suspended_transaction());
        self.core.resume_quietly(suspended);
        result
    }

    fn handle_system_exception(&self, error: BoxError, instance: &InstanceId) -> InvocationError {
        log::error!("System fault in {}: {}", instance, error);
        if let Some(transaction) = self.current_transaction() {
            self.core
                .mark_rollback_only_for_fault(transaction, "system fault in requires-new call");
        }
        self.core.discard(instance);
        InvocationError::remote(Some(error))
    }
}
