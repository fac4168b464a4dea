// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Suspended transaction token
//!
//! Owns a transaction that was taken off its thread. The token ends in one
//! of two ways: `resume` hands the transaction back to the manager, or
//! `destroy` rolls it back. `resume` consumes the token; `destroy` may be
//! called any number of times but rolls back at most once. Dropping a token
//! that still owns a transaction destroys it.

use std::sync::Arc;

use crate::txn::{TransactionId, TransactionManager, TxnResult};

pub struct SuspendedTransaction {
    manager: Arc<dyn TransactionManager>,
    transaction: Option<TransactionId>,
}

impl SuspendedTransaction {
    pub fn new(manager: Arc<dyn TransactionManager>, transaction: TransactionId) -> Self {
        Self {
            manager,
            transaction: Some(transaction),
        }
    }

    /// The owned transaction, or `None` once destroyed
    pub fn transaction(&self) -> Option<TransactionId> {
        self.transaction
    }

    /// Reattach the transaction to the calling thread. If the manager refuses,
    /// the transaction is rolled back before the error is returned.
    pub fn resume(mut self) -> TxnResult<()> {
        let Some(transaction) = self.transaction.take() else {
            return Ok(());
        };

        match self.manager.resume(transaction) {
            Ok(()) => Ok(()),
            Err(e) => {
                log::warn!("Failed to resume {}: {}; rolling it back", transaction, e);
                force_rollback(self.manager.as_ref(), transaction);
                Err(e)
            }
        }
    }

    /// Roll back the owned transaction. Errors are logged, never returned.
    pub fn destroy(&mut self) {
        if let Some(transaction) = self.transaction.take() {
            log::info!("Destroying suspended transaction {}", transaction);
            force_rollback(self.manager.as_ref(), transaction);
        }
    }
}

fn force_rollback(manager: &dyn TransactionManager, transaction: TransactionId) {
    if let Err(e) = manager.rollback_transaction(transaction) {
        log::warn!("Forced rollback of {} failed: {}", transaction, e);
    }
}

impl Drop for SuspendedTransaction {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for SuspendedTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuspendedTransaction")
            .field("transaction", &self.transaction)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::txn::{InMemoryTransactionManager, ManagerOp, TransactionStatus};

    fn suspended(tm: &Arc<InMemoryTransactionManager>) -> SuspendedTransaction {
        tm.begin().unwrap();
        let txn = tm.suspend().unwrap().unwrap();
        SuspendedTransaction::new(tm.clone(), txn)
    }

    #[test]
    fn test_resume_reattaches() {
        let tm = Arc::new(InMemoryTransactionManager::new());
        let token = suspended(&tm);
        let txn = token.transaction().unwrap();

        token.resume().unwrap();
        assert_eq!(tm.get_transaction(), Some(txn));
        assert_eq!(tm.calls_of(ManagerOp::Rollback), 0);
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let tm = Arc::new(InMemoryTransactionManager::new());
        let mut token = suspended(&tm);
        let txn = token.transaction().unwrap();

        token.destroy();
        token.destroy();
        drop(token);

        assert_eq!(tm.calls_of(ManagerOp::Rollback), 1);
        assert_eq!(tm.status(txn), TransactionStatus::RolledBack);
    }

    #[test]
    fn test_failed_resume_rolls_back() {
        let tm = Arc::new(InMemoryTransactionManager::new());
        let token = suspended(&tm);
        let txn = token.transaction().unwrap();

        // occupy the thread so the resume is refused
        let blocker = tm.begin().unwrap();
        assert!(token.resume().is_err());

        assert_eq!(tm.status(txn), TransactionStatus::RolledBack);
        assert_eq!(tm.get_transaction(), Some(blocker));
    }

    #[test]
    fn test_drop_destroys_unresumed_token() {
        let tm = Arc::new(InMemoryTransactionManager::new());
        let txn = {
            let token = suspended(&tm);
            token.transaction().unwrap()
        };
        assert_eq!(tm.status(txn), TransactionStatus::RolledBack);
    }
}
