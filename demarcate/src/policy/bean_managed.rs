// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Bean-managed demarcation
//!
//! The component begins and completes its own transactions through a
//! `UserTransaction`. The caller's transaction is suspended for the whole
//! call. A transaction still open when the method returns is a usage error,
//! unless the driver parked it on a stateful instance first.

use std::sync::Arc;

use crate::error::{BoxError, InvocationError, InvocationResult};
use crate::instance::InstanceId;
use crate::txn::TransactionId;

use super::attribute::TransactionAttribute;
use super::base::{PolicyCore, PolicyEnvironment};
use super::suspended::SuspendedTransaction;
use super::user_transaction::UserTransaction;
use super::TransactionPolicy;

pub struct BeanManagedPolicy {
    core: Arc<PolicyCore>,
}

impl BeanManagedPolicy {
    pub fn new(env: &PolicyEnvironment) -> Self {
        Self {
            core: Arc::new(PolicyCore::new(TransactionAttribute::BeanManaged, env)),
        }
    }

    pub fn user_transaction(&self) -> UserTransaction {
        UserTransaction::new(self.core.clone())
    }

    /// Take the component's open transaction off the thread so it can be
    /// carried to a later invocation
    pub fn suspend_user_transaction(&self) -> InvocationResult<Option<SuspendedTransaction>> {
        if self.core.manager().get_transaction().is_none() {
            return Ok(None);
        }
        let suspended = self.core.suspend()?;
        Ok(suspended
            .map(|transaction| SuspendedTransaction::new(self.core.manager().clone(), transaction)))
    }

    /// Reattach a transaction parked by an earlier invocation. The token is
    /// consumed; if the manager refuses, the transaction is rolled back.
    pub fn resume_user_transaction(&self, token: SuspendedTransaction) -> InvocationResult<()> {
        let transaction = token.transaction();
        token
            .resume()
            .map_err(|e| self.core.manager_fault("resume bean transaction", e))?;
        if let Some(transaction) = transaction {
            log::debug!("Resumed bean transaction {}", transaction);
        }
        Ok(())
    }

    fn roll_back_dangling(&self, instance: &InstanceId, transaction: TransactionId) -> InvocationResult<()> {
        let discarded = self.core.record().instance_discard_requested();
        if !discarded {
            log::error!(
                "{} returned without completing bean-managed transaction {}",
                instance,
                transaction
            );
        }
        if let Err(e) = self.core.rollback(transaction) {
            log::error!("Forced rollback of {} failed: {}", transaction, e);
        }

        if discarded {
            // already reported through the system fault
            Ok(())
        } else {
            Err(InvocationError::remote(Some(
                format!(
                    "bean-managed transaction {} was left open by {}",
                    transaction, instance
                )
                .into(),
            )))
        }
    }
}

impl TransactionPolicy for BeanManagedPolicy {
    fn attribute(&self) -> TransactionAttribute {
        TransactionAttribute::BeanManaged
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

    fn after_invoke(&self, instance: &InstanceId) -> InvocationResult<()> {
        self.core.finish()?;
        let result = match self.core.manager().get_transaction() {
            Some(transaction) => self.roll_back_dangling(instance, transaction),
            None => Ok(()),
        };

        self.core.fire_non_transactional_completion();
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
                .mark_rollback_only_for_fault(transaction, "system fault in bean-managed call");
        }
        self.core.discard(instance);
        InvocationError::remote(Some(error))
    }

    /// Whatever the component has begun on the thread
    fn current_transaction(&self) -> Option<TransactionId> {
        self.core.manager().get_transaction()
    }

    fn is_new_transaction(&self) -> bool {
        self.current_transaction().is_some()
    }

    fn is_client_transaction(&self) -> bool {
        false
    }

    fn as_bean_managed(&self) -> Option<&BeanManagedPolicy> {
        Some(self)
    }
}
