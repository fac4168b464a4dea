// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//

use crate::error::{BoxError, InvocationError, InvocationResult};
use crate::instance::InstanceId;

use super::attribute::TransactionAttribute;
use super::base::{PolicyCore, PolicyEnvironment};
use super::TransactionPolicy;

/// Joins the caller's transaction, or begins one the call then owns.
///
/// Only the owner completes the transaction. A joined transaction is left
/// to the caller, even after a system fault.
pub struct RequiredPolicy {
    core: PolicyCore,
}

impl RequiredPolicy {
    pub fn new(env: &PolicyEnvironment) -> Self {
        Self {
            core: PolicyCore::new(TransactionAttribute::Required, env),
        }
    }
}

impl TransactionPolicy for RequiredPolicy {
    fn attribute(&self) -> TransactionAttribute {
        TransactionAttribute::Required
    }

    fn core(&self) -> &PolicyCore {
        &self.core
    }

    fn before_invoke(&self, instance: &InstanceId) -> InvocationResult<()> {
        self.core.start()?;
        let active = match self.core.observe_caller() {
            Some(caller) => {
                log::debug!("{} joins caller transaction {}", instance, caller);
                caller
            }
            None => self.core.begin()?,
        };
        self.core.decide_active(Some(active))
    }

    fn after_invoke(&self, _instance: &InstanceId) -> InvocationResult<()> {
        self.core.finish()?;
        if !self.is_new_transaction() {
            return Ok(());
        }
        match self.current_transaction() {
            Some(transaction) => self.core.complete(transaction),
            None => Ok(()),
        }
    }

    fn handle_system_exception(&self, error: BoxError, instance: &InstanceId) -> InvocationError {
        log::error!("System fault in {}: {}", instance, error);
        if let Some(transaction) = self.current_transaction() {
            self.core
                .mark_rollback_only_for_fault(transaction, "system fault in required call");
        }
        self.core.discard(instance);

        if self.is_new_transaction() {
            // rolled back by after_invoke; the caller never saw the transaction
            InvocationError::remote(Some(error))
        } else {
            InvocationError::rolled_back(Some(error))
        }
    }
}
