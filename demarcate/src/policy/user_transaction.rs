// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Demarcation handle given to bean-managed components

use std::sync::Arc;
use std::time::Duration;

use crate::error::{InvocationError, InvocationResult, SystemFaultKind};
use crate::txn::{TransactionError, TransactionId, TransactionStatus};

use super::base::PolicyCore;

/// Begin/commit/rollback facade bound to one bean-managed invocation
#[derive(Clone)]
pub struct UserTransaction {
    core: Arc<PolicyCore>,
}

impl UserTransaction {
    pub(crate) fn new(core: Arc<PolicyCore>) -> Self {
        Self { core }
    }

    /// Transaction currently on the thread
    pub fn transaction(&self) -> Option<TransactionId> {
        self.core.manager().get_transaction()
    }

    fn require_transaction(&self, operation: &str) -> InvocationResult<TransactionId> {
        self.transaction().ok_or_else(|| {
            InvocationError::system(
                SystemFaultKind::IllegalState,
                format!("{} called without a transaction", operation),
            )
        })
    }

    pub fn begin(&self) -> InvocationResult<TransactionId> {
        if let Some(current) = self.transaction() {
            return Err(InvocationError::system(
                SystemFaultKind::IllegalState,
                format!("transaction {} is already active", current),
            ));
        }

        let transaction = self.core.begin()?;
        if self.core.record().rollback_only() {
            self.core
                .mark_rollback_only(transaction, "marked before the transaction began")?;
        }
        Ok(transaction)
    }

    pub fn commit(&self) -> InvocationResult<()> {
        let transaction = self.require_transaction("commit")?;
        match self.core.manager().commit() {
            Ok(()) => {
                log::info!("Bean committed transaction {}", transaction);
                Ok(())
            }
            Err(e @ TransactionError::RolledBack(_)) => {
                Err(InvocationError::rolled_back(Some(Box::new(e))))
            }
            Err(e) => Err(self.core.manager_fault("commit", e)),
        }
    }

    pub fn rollback(&self) -> InvocationResult<()> {
        let transaction = self.require_transaction("rollback")?;
        self.core.rollback(transaction)
    }

    /// Without a transaction the mark is remembered and applied to the next
    /// one begun in this call
    pub fn set_rollback_only(&self, reason: &str) -> InvocationResult<()> {
        self.core.set_rollback_only(self.transaction(), reason)
    }

    pub fn status(&self) -> TransactionStatus {
        self.transaction()
            .map(|transaction| self.core.manager().status(transaction))
            .unwrap_or(TransactionStatus::NoTransaction)
    }

    /// Applies to transactions begun later through this handle; `None`
    /// falls back to the container timeout
    pub fn set_transaction_timeout(&self, timeout: Option<Duration>) {
        self.core.set_user_timeout(timeout);
    }
}

impl std::fmt::Debug for UserTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserTransaction")
            .field("transaction", &self.transaction())
            .finish()
    }
}
