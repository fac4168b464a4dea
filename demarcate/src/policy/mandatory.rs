// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//

use crate::error::{BoxError, InvocationError, InvocationResult};
use crate::instance::InstanceId;

use super::attribute::TransactionAttribute;
use super::base::{PolicyCore, PolicyEnvironment};
use super::TransactionPolicy;

/// Runs in the caller's transaction; rejects callers without one
pub struct MandatoryPolicy {
    core: PolicyCore,
}

impl MandatoryPolicy {
    pub fn new(env: &PolicyEnvironment) -> Self {
        Self {
            core: PolicyCore::new(TransactionAttribute::Mandatory, env),
        }
    }
}

impl TransactionPolicy for MandatoryPolicy {
    fn attribute(&self) -> TransactionAttribute {
        TransactionAttribute::Mandatory
    }

    fn core(&self) -> &PolicyCore {
        &self.core
    }

    fn before_invoke(&self, instance: &InstanceId) -> InvocationResult<()> {
        self.core.start()?;
        let Some(caller) = self.core.observe_caller() else {
            return Err(InvocationError::TransactionRequired(format!(
                "{} must be called inside a transaction",
                instance
            )));
        };
        log::debug!("{} joins caller transaction {}", instance, caller);
        self.core.decide_active(Some(caller))
    }

    fn after_invoke(&self, _instance: &InstanceId) -> InvocationResult<()> {
        // the caller owns commit and rollback
        self.core.finish()
    }

    fn handle_system_exception(&self, error: BoxError, instance: &InstanceId) -> InvocationError {
        log::error!("System fault in {}: {}", instance, error);
        if let Some(caller) = self.current_transaction() {
            self.core
                .mark_rollback_only_for_fault(caller, "system fault in mandatory call");
        }
        self.core.discard(instance);
        InvocationError::rolled_back(Some(error))
    }
}
