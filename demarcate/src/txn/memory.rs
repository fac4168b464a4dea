// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! In-memory transaction manager
//!
//! A thread-associated transaction manager that keeps every transaction in
//! memory. It implements the full facade contract (suspend/resume, timeouts,
//! synchronizations, resource enlistment, heuristic reporting) and records an
//! audit journal of every primitive it was asked to perform. Failures can be
//! injected per primitive, which makes it the manager of choice for embedding
//! the container in tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

use crate::config::ContainerConfig;

use super::error::{TransactionError, TxnResult};
use super::manager::TransactionManager;
use super::resource::{ResourceBag, Synchronization, XaResource};
use super::state::{HeuristicOutcome, TransactionId, TransactionStatus};

/// Primitive operations exposed by the facade, used for auditing and
/// failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManagerOp {
    Begin,
    Suspend,
    Resume,
    Commit,
    Rollback,
    SetRollbackOnly,
    Enlist,
    RegisterSynchronization,
}

/// One entry of the audit journal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerCall {
    pub op: ManagerOp,
    pub transaction: Option<TransactionId>,
}

/// Transaction statistics for monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionStatistics {
    pub begun: u64,
    pub committed: u64,
    pub rolled_back: u64,
    pub timed_out: u64,
    pub heuristic: u64,
    pub active: u64,
}

struct TransactionEntry {
    status: TransactionStatus,
    rollback_reason: Option<String>,
    deadline: Option<Instant>,
    resources: Vec<Arc<dyn XaResource>>,
    synchronizations: Vec<Arc<dyn Synchronization>>,
    bag: Arc<Mutex<ResourceBag>>,
}

impl TransactionEntry {
    fn new(deadline: Option<Instant>) -> Self {
        Self {
            status: TransactionStatus::Active,
            rollback_reason: None,
            deadline,
            resources: Vec::new(),
            synchronizations: Vec::new(),
            bag: Arc::new(Mutex::new(ResourceBag::new())),
        }
    }

    fn is_in_flight(&self) -> bool {
        matches!(
            self.status,
            TransactionStatus::Active | TransactionStatus::MarkedRollback
        )
    }
}

/// Thread-associated in-memory transaction manager
///
/// Completed transactions stay queryable through `status` until
/// `cleanup_completed_transactions` forgets them; long-running embedders
/// call it periodically. A thread's timeout override is dropped as soon as
/// it is set back to `None`, which the policies do before every begin when
/// the container has no timeout configured.
pub struct InMemoryTransactionManager {
    /// All transactions known to the manager, completed ones included until cleanup
    transactions: RwLock<HashMap<TransactionId, Arc<Mutex<TransactionEntry>>>>,
    /// Thread to transaction association
    associations: Mutex<HashMap<ThreadId, TransactionId>>,
    /// Per-thread timeout overrides set through `set_transaction_timeout`
    timeouts: Mutex<HashMap<ThreadId, Duration>>,
    default_timeout: Option<Duration>,
    next_id: AtomicU64,
    injected: Mutex<HashMap<ManagerOp, VecDeque<TransactionError>>>,
    journal: Mutex<Vec<ManagerCall>>,
    audit: bool,
    statistics: Mutex<TransactionStatistics>,
}

impl Default for InMemoryTransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTransactionManager {
    /// Create a manager with auditing enabled and no default timeout
    pub fn new() -> Self {
        Self {
            transactions: RwLock::new(HashMap::new()),
            associations: Mutex::new(HashMap::new()),
            timeouts: Mutex::new(HashMap::new()),
            default_timeout: None,
            next_id: AtomicU64::new(1),
            injected: Mutex::new(HashMap::new()),
            journal: Mutex::new(Vec::new()),
            audit: true,
            statistics: Mutex::new(TransactionStatistics::default()),
        }
    }

    /// Create a manager configured from the container configuration
    pub fn with_config(config: &ContainerConfig) -> Self {
        Self {
            default_timeout: config.transaction_timeout(),
            audit: config.audit_manager_calls,
            ..Self::new()
        }
    }

    /// Set the timeout used when a thread did not override it
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    /// Make the next call of `op` fail with `error`. Injected failures queue
    /// up per operation and are consumed in order.
    pub fn inject_failure(&self, op: ManagerOp, error: TransactionError) {
        self.injected.lock().entry(op).or_default().push_back(error);
    }

    /// Snapshot of the audit journal
    pub fn journal(&self) -> Vec<ManagerCall> {
        self.journal.lock().clone()
    }

    /// Number of journaled calls of one kind
    pub fn calls_of(&self, op: ManagerOp) -> usize {
        self.journal.lock().iter().filter(|call| call.op == op).count()
    }

    pub fn clear_journal(&self) {
        self.journal.lock().clear();
    }

    /// Reason recorded by the first `set_rollback_only` on a transaction
    pub fn rollback_reason(&self, transaction: TransactionId) -> Option<String> {
        self.lookup(transaction)
            .ok()
            .and_then(|entry| entry.lock().rollback_reason.clone())
    }

    /// Synchronizations registered with a transaction
    pub fn synchronization_count(&self, transaction: TransactionId) -> usize {
        self.lookup(transaction)
            .map(|entry| entry.lock().synchronizations.len())
            .unwrap_or(0)
    }

    pub fn statistics(&self) -> TransactionStatistics {
        let mut stats = self.statistics.lock().clone();
        stats.active = self
            .transactions
            .read()
            .values()
            .filter(|entry| entry.lock().is_in_flight())
            .count() as u64;
        stats
    }

    /// Timeout override of the calling thread, if any
    pub fn thread_timeout(&self) -> Option<Duration> {
        self.timeouts.lock().get(&thread::current().id()).copied()
    }

    /// Number of threads with a timeout override
    pub fn timeout_override_count(&self) -> usize {
        self.timeouts.lock().len()
    }

    /// Forget transactions that reached a terminal state. Returns how many
    /// were removed.
    pub fn cleanup_completed_transactions(&self) -> usize {
        let mut transactions = self.transactions.write();
        let before = transactions.len();
        transactions.retain(|_, entry| !entry.lock().status.is_terminal());
        before - transactions.len()
    }

    fn record(&self, op: ManagerOp, transaction: Option<TransactionId>) -> TxnResult<()> {
        if self.audit {
            self.journal.lock().push(ManagerCall { op, transaction });
        }
        match self.injected.lock().get_mut(&op).and_then(VecDeque::pop_front) {
            Some(error) => {
                log::debug!("Injected {:?} failure: {}", op, error);
                Err(error)
            }
            None => Ok(()),
        }
    }

    fn lookup(&self, transaction: TransactionId) -> TxnResult<Arc<Mutex<TransactionEntry>>> {
        self.transactions
            .read()
            .get(&transaction)
            .cloned()
            .ok_or(TransactionError::InvalidTransaction(transaction))
    }

    fn associated(&self) -> Option<TransactionId> {
        self.associations.lock().get(&thread::current().id()).copied()
    }

    fn dissociate(&self, transaction: TransactionId) {
        self.associations.lock().retain(|_, txn| *txn != transaction);
    }

    /// Roll back a transaction whose deadline passed. The thread association
    /// is left in place; the owner still has to complete it.
    fn expire_if_due(&self, transaction: TransactionId, entry: &Arc<Mutex<TransactionEntry>>) {
        let (resources, synchronizations) = {
            let mut state = entry.lock();
            let due = state
                .deadline
                .map(|deadline| Instant::now() >= deadline)
                .unwrap_or(false);
            if !due || !state.is_in_flight() {
                return;
            }
            state.status = TransactionStatus::RolledBack;
            state.deadline = None;
            (state.resources.clone(), state.synchronizations.clone())
        };

        log::warn!("Transaction {} timed out and was rolled back", transaction);
        self.rollback_resources(transaction, &resources);
        for synchronization in synchronizations {
            synchronization.after_completion(TransactionStatus::RolledBack);
        }

        let mut stats = self.statistics.lock();
        stats.timed_out += 1;
        stats.rolled_back += 1;
    }

    fn rollback_resources(&self, transaction: TransactionId, resources: &[Arc<dyn XaResource>]) {
        for resource in resources {
            if let Err(e) = resource.rollback(transaction) {
                log::warn!(
                    "Resource {} failed to roll back {}: {}",
                    resource.name(),
                    transaction,
                    e
                );
            }
        }
    }

    /// Commit every resource in order. A failure before anything committed
    /// rolls the rest back; a failure after is a mixed outcome.
    fn commit_resources(
        &self,
        transaction: TransactionId,
        resources: &[Arc<dyn XaResource>],
    ) -> TxnResult<TransactionStatus> {
        for (index, resource) in resources.iter().enumerate() {
            if let Err(e) = resource.commit(transaction) {
                log::error!(
                    "Resource {} failed to commit {}: {}",
                    resource.name(),
                    transaction,
                    e
                );
                self.rollback_resources(transaction, &resources[index + 1..]);
                if index == 0 {
                    return Err(TransactionError::RolledBack(transaction));
                }
                return Err(TransactionError::Heuristic {
                    transaction,
                    outcome: HeuristicOutcome::Mixed,
                });
            }
        }
        Ok(TransactionStatus::Committed)
    }

    fn complete(&self, transaction: TransactionId, commit_requested: bool) -> TxnResult<()> {
        let entry = self.lookup(transaction)?;
        self.expire_if_due(transaction, &entry);

        let status = entry.lock().status;
        match status {
            TransactionStatus::Active | TransactionStatus::MarkedRollback => {}
            TransactionStatus::RolledBack => {
                // Rolled back by the manager (timeout); only the association is left
                self.dissociate(transaction);
                return if commit_requested {
                    Err(TransactionError::RolledBack(transaction))
                } else {
                    Ok(())
                };
            }
            _ => return Err(TransactionError::NotActive(transaction)),
        }

        let mut commit = commit_requested && status.is_active();
        if commit {
            let synchronizations = entry.lock().synchronizations.clone();
            for synchronization in synchronizations {
                if let Err(e) = synchronization.before_completion() {
                    log::warn!("before_completion failed for {}: {}", transaction, e);
                    let mut state = entry.lock();
                    state.status = TransactionStatus::MarkedRollback;
                    state
                        .rollback_reason
                        .get_or_insert_with(|| format!("before_completion failed: {}", e));
                    break;
                }
            }
            commit = entry.lock().status.is_active();
        }

        let (resources, synchronizations) = {
            let mut state = entry.lock();
            state.status = if commit {
                TransactionStatus::Committing
            } else {
                TransactionStatus::RollingBack
            };
            (state.resources.clone(), state.synchronizations.clone())
        };

        let result = if commit {
            self.commit_resources(transaction, &resources)
        } else {
            self.rollback_resources(transaction, &resources);
            Ok(TransactionStatus::RolledBack)
        };

        let final_status = match &result {
            Ok(status) => *status,
            Err(TransactionError::Heuristic { .. }) => TransactionStatus::Unknown,
            Err(_) => TransactionStatus::RolledBack,
        };
        entry.lock().status = final_status;
        self.dissociate(transaction);

        for synchronization in synchronizations {
            synchronization.after_completion(final_status);
        }

        {
            let mut stats = self.statistics.lock();
            match final_status {
                TransactionStatus::Committed => stats.committed += 1,
                TransactionStatus::RolledBack => stats.rolled_back += 1,
                _ => stats.heuristic += 1,
            }
        }

        match result {
            Err(e) => Err(e),
            Ok(_) if commit_requested && !commit => Err(TransactionError::RolledBack(transaction)),
            Ok(_) => Ok(()),
        }
    }
}

impl TransactionManager for InMemoryTransactionManager {
    fn begin(&self) -> TxnResult<TransactionId> {
        self.record(ManagerOp::Begin, None)?;
        let thread_id = thread::current().id();

        let mut associations = self.associations.lock();
        if associations.contains_key(&thread_id) {
            return Err(TransactionError::AlreadyActive);
        }

        let transaction = TransactionId::from_u64(self.next_id.fetch_add(1, Ordering::SeqCst));
        let timeout = self
            .timeouts
            .lock()
            .get(&thread_id)
            .copied()
            .or(self.default_timeout);
        let entry = TransactionEntry::new(timeout.map(|timeout| Instant::now() + timeout));

        self.transactions
            .write()
            .insert(transaction, Arc::new(Mutex::new(entry)));
        associations.insert(thread_id, transaction);
        self.statistics.lock().begun += 1;

        log::debug!("Began transaction {}", transaction);
        Ok(transaction)
    }

    fn get_transaction(&self) -> Option<TransactionId> {
        self.associated()
    }

    fn suspend(&self) -> TxnResult<Option<TransactionId>> {
        let current = self.associated();
        self.record(ManagerOp::Suspend, current)?;
        let suspended = self.associations.lock().remove(&thread::current().id());
        if let Some(transaction) = suspended {
            log::debug!("Suspended transaction {}", transaction);
        }
        Ok(suspended)
    }

    fn resume(&self, transaction: TransactionId) -> TxnResult<()> {
        self.record(ManagerOp::Resume, Some(transaction))?;
        let entry = self.lookup(transaction)?;
        self.expire_if_due(transaction, &entry);
        if entry.lock().status.is_terminal() {
            return Err(TransactionError::InvalidTransaction(transaction));
        }

        let thread_id = thread::current().id();
        let mut associations = self.associations.lock();
        if let Some(current) = associations.get(&thread_id) {
            return Err(TransactionError::AlreadyAssociated(*current));
        }
        if associations.values().any(|txn| *txn == transaction) {
            return Err(TransactionError::Internal(format!(
                "transaction {} is associated with another thread",
                transaction
            )));
        }
        associations.insert(thread_id, transaction);

        log::debug!("Resumed transaction {}", transaction);
        Ok(())
    }

    fn commit(&self) -> TxnResult<()> {
        let transaction = self.associated();
        self.record(ManagerOp::Commit, transaction)?;
        self.complete(transaction.ok_or(TransactionError::NoTransaction)?, true)
    }

    fn rollback(&self) -> TxnResult<()> {
        let transaction = self.associated();
        self.record(ManagerOp::Rollback, transaction)?;
        self.complete(transaction.ok_or(TransactionError::NoTransaction)?, false)
    }

    fn commit_transaction(&self, transaction: TransactionId) -> TxnResult<()> {
        self.record(ManagerOp::Commit, Some(transaction))?;
        self.complete(transaction, true)
    }

    fn rollback_transaction(&self, transaction: TransactionId) -> TxnResult<()> {
        self.record(ManagerOp::Rollback, Some(transaction))?;
        self.complete(transaction, false)
    }

    fn status(&self, transaction: TransactionId) -> TransactionStatus {
        match self.lookup(transaction) {
            Ok(entry) => {
                self.expire_if_due(transaction, &entry);
                let status = entry.lock().status;
                status
            }
            Err(_) => TransactionStatus::NoTransaction,
        }
    }

    fn set_rollback_only(&self, transaction: TransactionId, reason: &str) -> TxnResult<()> {
        self.record(ManagerOp::SetRollbackOnly, Some(transaction))?;
        let entry = self.lookup(transaction)?;
        self.expire_if_due(transaction, &entry);

        let mut state = entry.lock();
        if state.is_in_flight() {
            state.status = TransactionStatus::MarkedRollback;
            state
                .rollback_reason
                .get_or_insert_with(|| reason.to_string());
            log::debug!("Marked {} rollback-only: {}", transaction, reason);
        }
        Ok(())
    }

    fn enlist_resource(
        &self,
        transaction: TransactionId,
        resource: Arc<dyn XaResource>,
    ) -> TxnResult<bool> {
        self.record(ManagerOp::Enlist, Some(transaction))?;
        let entry = self.lookup(transaction)?;
        self.expire_if_due(transaction, &entry);

        let mut state = entry.lock();
        if !state.status.is_active() {
            return Ok(false);
        }
        log::debug!("Enlisted {} in {}", resource.name(), transaction);
        state.resources.push(resource);
        Ok(true)
    }

    fn register_synchronization(
        &self,
        transaction: TransactionId,
        synchronization: Arc<dyn Synchronization>,
    ) -> TxnResult<()> {
        self.record(ManagerOp::RegisterSynchronization, Some(transaction))?;
        let entry = self.lookup(transaction)?;
        let mut state = entry.lock();
        if !state.is_in_flight() {
            return Err(TransactionError::NotActive(transaction));
        }
        state.synchronizations.push(synchronization);
        Ok(())
    }

    fn resources(&self, transaction: TransactionId) -> TxnResult<Arc<Mutex<ResourceBag>>> {
        let entry = self.lookup(transaction)?;
        let bag = entry.lock().bag.clone();
        Ok(bag)
    }

    fn set_transaction_timeout(&self, timeout: Option<Duration>) -> TxnResult<()> {
        let thread_id = thread::current().id();
        let mut timeouts = self.timeouts.lock();
        match timeout {
            Some(timeout) => timeouts.insert(thread_id, timeout),
            None => timeouts.remove(&thread_id),
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use std::sync::atomic::AtomicUsize;

    struct FlakyResource {
        name: String,
        fail_commit: bool,
        rollbacks: AtomicUsize,
    }

    impl FlakyResource {
        fn new(name: &str, fail_commit: bool) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                fail_commit,
                rollbacks: AtomicUsize::new(0),
            })
        }
    }

    impl XaResource for FlakyResource {
        fn name(&self) -> &str {
            &self.name
        }

        fn commit(&self, _transaction: TransactionId) -> Result<(), BoxError> {
            if self.fail_commit {
                Err("disk full".into())
            } else {
                Ok(())
            }
        }

        fn rollback(&self, _transaction: TransactionId) -> Result<(), BoxError> {
            self.rollbacks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_begin_commit_dissociates() {
        let tm = InMemoryTransactionManager::new();
        let txn = tm.begin().unwrap();
        assert_eq!(tm.get_transaction(), Some(txn));
        assert_eq!(tm.begin(), Err(TransactionError::AlreadyActive));

        tm.commit().unwrap();
        assert_eq!(tm.get_transaction(), None);
        assert_eq!(tm.status(txn), TransactionStatus::Committed);
        assert_eq!(tm.statistics().committed, 1);
    }

    #[test]
    fn test_suspend_and_resume() {
        let tm = InMemoryTransactionManager::new();
        let txn = tm.begin().unwrap();

        assert_eq!(tm.suspend().unwrap(), Some(txn));
        assert_eq!(tm.get_transaction(), None);
        assert_eq!(tm.suspend().unwrap(), None);

        tm.resume(txn).unwrap();
        assert_eq!(tm.get_transaction(), Some(txn));
        tm.rollback().unwrap();

        assert_eq!(
            tm.resume(txn),
            Err(TransactionError::InvalidTransaction(txn))
        );
    }

    #[test]
    fn test_commit_of_rollback_only_rolls_back() {
        let tm = InMemoryTransactionManager::new();
        let txn = tm.begin().unwrap();
        tm.set_rollback_only(txn, "test").unwrap();

        assert_eq!(tm.commit(), Err(TransactionError::RolledBack(txn)));
        assert_eq!(tm.status(txn), TransactionStatus::RolledBack);
        assert_eq!(tm.rollback_reason(txn).as_deref(), Some("test"));

        // terminal: further marking is a no-op
        tm.set_rollback_only(txn, "again").unwrap();
        assert_eq!(tm.rollback_reason(txn).as_deref(), Some("test"));
    }

    #[test]
    fn test_partial_commit_is_heuristic_mixed() {
        let tm = InMemoryTransactionManager::new();
        let txn = tm.begin().unwrap();
        let good = FlakyResource::new("good", false);
        let bad = FlakyResource::new("bad", true);
        assert!(tm.enlist_resource(txn, good).unwrap());
        assert!(tm.enlist_resource(txn, bad).unwrap());

        assert_eq!(
            tm.commit(),
            Err(TransactionError::Heuristic {
                transaction: txn,
                outcome: HeuristicOutcome::Mixed,
            })
        );
        assert_eq!(tm.statistics().heuristic, 1);
    }

    #[test]
    fn test_first_resource_failure_rolls_back() {
        let tm = InMemoryTransactionManager::new();
        let txn = tm.begin().unwrap();
        let bad = FlakyResource::new("bad", true);
        let other = FlakyResource::new("other", false);
        tm.enlist_resource(txn, bad).unwrap();
        tm.enlist_resource(txn, other.clone()).unwrap();

        assert_eq!(tm.commit(), Err(TransactionError::RolledBack(txn)));
        assert_eq!(other.rollbacks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_timeout_rolls_back_but_keeps_association() {
        let tm = InMemoryTransactionManager::new();
        tm.set_transaction_timeout(Some(Duration::from_millis(0)))
            .unwrap();
        let txn = tm.begin().unwrap();

        assert_eq!(tm.status(txn), TransactionStatus::RolledBack);
        assert_eq!(tm.get_transaction(), Some(txn));

        // the owner's rollback only clears the association
        tm.rollback().unwrap();
        assert_eq!(tm.get_transaction(), None);
        assert_eq!(tm.statistics().timed_out, 1);
    }

    #[test]
    fn test_enlist_refused_when_not_active() {
        let tm = InMemoryTransactionManager::new();
        let txn = tm.begin().unwrap();
        tm.set_rollback_only(txn, "test").unwrap();
        assert!(!tm
            .enlist_resource(txn, FlakyResource::new("late", false))
            .unwrap());
    }

    #[test]
    fn test_injected_failure_is_consumed_once() {
        let tm = InMemoryTransactionManager::new();
        tm.inject_failure(
            ManagerOp::Begin,
            TransactionError::Internal("journal offline".to_string()),
        );

        assert!(tm.begin().is_err());
        assert!(tm.begin().is_ok());
        assert_eq!(tm.calls_of(ManagerOp::Begin), 2);
    }

    #[test]
    fn test_cleanup_completed_transactions() {
        let tm = InMemoryTransactionManager::new();
        tm.begin().unwrap();
        tm.commit().unwrap();
        let open = tm.begin().unwrap();

        assert_eq!(tm.cleanup_completed_transactions(), 1);
        assert_eq!(tm.status(open), TransactionStatus::Active);
        assert_eq!(tm.statistics().active, 1);
    }

    #[test]
    fn test_timeout_override_is_dropped_when_restored() {
        let tm = InMemoryTransactionManager::new();
        tm.set_transaction_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        assert_eq!(tm.thread_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(tm.timeout_override_count(), 1);

        tm.set_transaction_timeout(None).unwrap();
        assert_eq!(tm.thread_timeout(), None);
        assert_eq!(tm.timeout_override_count(), 0);
    }
}
