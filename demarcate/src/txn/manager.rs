// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Transaction manager facade
//!
//! This is the boundary between the policy layer and whatever transaction
//! manager the container runs on. Transactions are associated with the
//! calling thread: `begin`, `suspend`, `resume`, `commit` and `rollback`
//! act on that association.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::error::TxnResult;
use super::resource::{ResourceBag, Synchronization, XaResource};
use super::state::{TransactionId, TransactionStatus};

/// Transaction manager primitives used by the transaction policies.
///
/// Every call may block on I/O done by the manager. Implementations are
/// responsible for serializing concurrent access to a single transaction.
pub trait TransactionManager: Send + Sync {
    /// Begin a transaction and associate it with the calling thread.
    /// Fails with `AlreadyActive` if the thread already has one.
    fn begin(&self) -> TxnResult<TransactionId>;

    /// The transaction associated with the calling thread, if any
    fn get_transaction(&self) -> Option<TransactionId>;

    /// Detach the calling thread's transaction and return it
    fn suspend(&self) -> TxnResult<Option<TransactionId>>;

    /// Reattach a previously suspended transaction to the calling thread
    fn resume(&self, transaction: TransactionId) -> TxnResult<()>;

    /// Commit the calling thread's transaction and dissociate it
    fn commit(&self) -> TxnResult<()>;

    /// Roll back the calling thread's transaction and dissociate it
    fn rollback(&self) -> TxnResult<()>;

    /// Commit a transaction that is not the thread's ambient transaction
    fn commit_transaction(&self, transaction: TransactionId) -> TxnResult<()>;

    /// Roll back a transaction that is not the thread's ambient transaction
    fn rollback_transaction(&self, transaction: TransactionId) -> TxnResult<()>;

    fn status(&self, transaction: TransactionId) -> TransactionStatus;

    /// Mark a transaction rollback-only. The reason is advisory. A terminal
    /// transaction makes this a no-op.
    fn set_rollback_only(&self, transaction: TransactionId, reason: &str) -> TxnResult<()>;

    /// Returns `false` if the resource was refused
    fn enlist_resource(
        &self,
        transaction: TransactionId,
        resource: Arc<dyn XaResource>,
    ) -> TxnResult<bool>;

    fn register_synchronization(
        &self,
        transaction: TransactionId,
        synchronization: Arc<dyn Synchronization>,
    ) -> TxnResult<()>;

    /// Resources bound to the lifetime of `transaction`
    fn resources(&self, transaction: TransactionId) -> TxnResult<Arc<Mutex<ResourceBag>>>;

    /// Timeout applied to transactions begun later on the calling thread;
    /// `None` restores the manager default
    fn set_transaction_timeout(&self, timeout: Option<Duration>) -> TxnResult<()>;
}
