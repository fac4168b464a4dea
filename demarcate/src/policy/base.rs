// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! State and manager plumbing shared by every policy
//!
//! `PolicyCore` owns the invocation record, the call-scoped resources and the
//! synchronizations registered while no transaction was active. All manager
//! primitives issued by a policy go through here so that every failure is
//! logged and converted the same way.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::ContainerConfig;
use crate::error::{InvocationError, InvocationResult, SystemFaultKind};
use crate::instance::{InstanceId, InstanceLifecycle};
use crate::txn::{
    ResourceBag, Synchronization, TransactionError, TransactionId, TransactionManager,
    TransactionStatus, XaResource,
};

use super::attribute::TransactionAttribute;
use super::record::InvocationRecord;
use super::TransactionPolicy;

/// Collaborators handed to every policy the factory builds
#[derive(Clone)]
pub struct PolicyEnvironment {
    pub manager: Arc<dyn TransactionManager>,
    pub lifecycle: Arc<dyn InstanceLifecycle>,
    pub transaction_timeout: Option<Duration>,
}

impl PolicyEnvironment {
    pub fn new(
        manager: Arc<dyn TransactionManager>,
        lifecycle: Arc<dyn InstanceLifecycle>,
        config: &ContainerConfig,
    ) -> Self {
        Self {
            manager,
            lifecycle,
            transaction_timeout: config.transaction_timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Created,
    Invoked,
    Completed,
}

/// The policy that was ambient when this invocation started, kept in the
/// call-scoped resource bag
pub struct CallerPolicy(pub Option<Arc<dyn TransactionPolicy>>);

pub struct PolicyCore {
    manager: Arc<dyn TransactionManager>,
    lifecycle: Arc<dyn InstanceLifecycle>,
    transaction_timeout: Option<Duration>,
    /// Timeout requested through a bean's `UserTransaction`
    user_timeout: Mutex<Option<Duration>>,
    stage: Mutex<Stage>,
    record: Mutex<InvocationRecord>,
    local_resources: Arc<Mutex<ResourceBag>>,
    /// Synchronizations registered while no transaction was active
    pending_synchronizations: Mutex<Vec<Arc<dyn Synchronization>>>,
}

impl PolicyCore {
    pub fn new(attribute: TransactionAttribute, env: &PolicyEnvironment) -> Self {
        Self {
            manager: env.manager.clone(),
            lifecycle: env.lifecycle.clone(),
            transaction_timeout: env.transaction_timeout,
            user_timeout: Mutex::new(None),
            stage: Mutex::new(Stage::Created),
            record: Mutex::new(InvocationRecord::new(attribute)),
            local_resources: Arc::new(Mutex::new(ResourceBag::new())),
            pending_synchronizations: Mutex::new(Vec::new()),
        }
    }

    pub fn manager(&self) -> &Arc<dyn TransactionManager> {
        &self.manager
    }

    /// Snapshot of the invocation record
    pub fn record(&self) -> InvocationRecord {
        self.record.lock().clone()
    }

    pub(crate) fn with_record<R>(&self, f: impl FnOnce(&mut InvocationRecord) -> R) -> R {
        f(&mut self.record.lock())
    }

    /// Guard for `before_invoke`: may run once, first
    pub(crate) fn start(&self) -> InvocationResult<()> {
        self.advance(Stage::Created, Stage::Invoked, "before_invoke")
    }

    /// Guard for `after_invoke`: may run once, after `before_invoke`
    pub(crate) fn finish(&self) -> InvocationResult<()> {
        self.advance(Stage::Invoked, Stage::Completed, "after_invoke")
    }

    fn advance(&self, expected: Stage, next: Stage, operation: &str) -> InvocationResult<()> {
        let mut stage = self.stage.lock();
        if *stage != expected {
            return Err(InvocationError::system(
                SystemFaultKind::IllegalState,
                format!("{} called in stage {:?}", operation, *stage),
            ));
        }
        *stage = next;
        Ok(())
    }

    /// Read the thread's transaction and remember it as the caller's
    pub(crate) fn observe_caller(&self) -> Option<TransactionId> {
        let caller = self.manager.get_transaction();
        self.with_record(|record| record.set_caller_transaction(caller));
        caller
    }

    pub(crate) fn decide_active(&self, transaction: Option<TransactionId>) -> InvocationResult<()> {
        if self.with_record(|record| record.set_active_transaction(transaction)) {
            Ok(())
        } else {
            Err(InvocationError::system(
                SystemFaultKind::IllegalState,
                "active transaction already decided for this invocation",
            ))
        }
    }

    pub(crate) fn manager_fault(&self, operation: &str, error: TransactionError) -> InvocationError {
        let fault = InvocationError::from(error);
        if let Some(correlation) = fault.correlation() {
            log::error!("[{}] transaction manager failed to {}", correlation, operation);
        }
        fault
    }

    pub(crate) fn set_user_timeout(&self, timeout: Option<Duration>) {
        *self.user_timeout.lock() = timeout;
    }

    /// Begin under the bean's timeout if one was set, else the container's.
    /// The manager's thread timeout is always reset first; `None` restores its
    /// default. A bean timeout is withdrawn again once the begin is done.
    pub(crate) fn begin(&self) -> InvocationResult<TransactionId> {
        let user_timeout = *self.user_timeout.lock();
        self.manager
            .set_transaction_timeout(user_timeout.or(self.transaction_timeout))
            .map_err(|e| self.manager_fault("set transaction timeout", e))?;

        let began = self.manager.begin();

        if user_timeout.is_some() {
            if let Err(e) = self.manager.set_transaction_timeout(self.transaction_timeout) {
                log::warn!("Failed to restore the container transaction timeout: {}", e);
            }
        }

        let transaction = began.map_err(|e| self.manager_fault("begin", e))?;
        log::info!("Began transaction {}", transaction);
        Ok(transaction)
    }

    pub(crate) fn suspend(&self) -> InvocationResult<Option<TransactionId>> {
        let suspended = self
            .manager
            .suspend()
            .map_err(|e| self.manager_fault("suspend", e))?;
        if let Some(transaction) = suspended {
            log::debug!("Suspended caller transaction {}", transaction);
        }
        Ok(suspended)
    }

    /// Put a suspended transaction back on the thread. Failures are logged
    /// and not returned: the business method has already completed.
    pub(crate) fn resume_quietly(&self, transaction: Option<TransactionId>) {
        let Some(transaction) = transaction else {
            return;
        };
        match self.manager.resume(transaction) {
            Ok(()) => log::debug!("Resumed caller transaction {}", transaction),
            Err(e) => log::warn!("Failed to resume transaction {}: {}", transaction, e),
        }
    }

    /// Commit if still active, otherwise roll back. A transaction found not
    /// active here (marked by the method, or expired by the manager) is the
    /// normal rollback path.
    pub(crate) fn complete(&self, transaction: TransactionId) -> InvocationResult<()> {
        let status = self.manager.status(transaction);
        if !status.is_active() {
            log::info!(
                "Transaction {} is {}; rolling back instead of committing",
                transaction,
                status
            );
            return self.rollback(transaction);
        }

        let result = if self.manager.get_transaction() == Some(transaction) {
            self.manager.commit()
        } else {
            self.manager.commit_transaction(transaction)
        };

        match result {
            Ok(()) => {
                log::info!("Committed transaction {}", transaction);
                Ok(())
            }
            Err(e @ TransactionError::RolledBack(_)) => {
                log::warn!("Commit of {} ended in rollback", transaction);
                Err(InvocationError::rolled_back(Some(Box::new(e))))
            }
            Err(e) => {
                let fault = self.manager_fault("commit", e);
                // a commit that failed before completing must not stay on the thread
                if matches!(
                    self.manager.status(transaction),
                    TransactionStatus::Active | TransactionStatus::MarkedRollback
                ) {
                    if let Err(e) = self.rollback(transaction) {
                        log::warn!("Rollback after failed commit of {} failed: {}", transaction, e);
                    }
                }
                Err(fault)
            }
        }
    }

    pub(crate) fn rollback(&self, transaction: TransactionId) -> InvocationResult<()> {
        let result = if self.manager.get_transaction() == Some(transaction) {
            self.manager.rollback()
        } else {
            self.manager.rollback_transaction(transaction)
        };
        result.map_err(|e| self.manager_fault("roll back", e))?;
        log::info!("Rolled back transaction {}", transaction);
        Ok(())
    }

    pub(crate) fn mark_rollback_only(
        &self,
        transaction: TransactionId,
        reason: &str,
    ) -> InvocationResult<()> {
        self.manager
            .set_rollback_only(transaction, reason)
            .map_err(|e| self.manager_fault("mark rollback-only", e))
    }

    /// Used by the fault handlers: a failure is logged, the fault being
    /// built is still returned to the caller
    pub(crate) fn mark_rollback_only_for_fault(&self, transaction: TransactionId, reason: &str) {
        if let Err(e) = self.mark_rollback_only(transaction, reason) {
            log::error!(
                "Could not mark {} rollback-only after system fault: {}",
                transaction,
                e
            );
        }
    }

    pub(crate) fn discard(&self, instance: &InstanceId) {
        let first_request = self.with_record(|record| {
            let first = !record.instance_discard_requested();
            record.request_instance_discard();
            first
        });
        if first_request {
            self.lifecycle.request_discard(instance);
        }
    }

    pub fn is_active(&self, transaction: Option<TransactionId>) -> bool {
        transaction
            .map(|transaction| self.manager.status(transaction).is_active())
            .unwrap_or(false)
    }

    pub fn is_rollback_only(&self, transaction: Option<TransactionId>) -> bool {
        match transaction {
            Some(transaction) => matches!(
                self.manager.status(transaction),
                TransactionStatus::MarkedRollback
                    | TransactionStatus::RollingBack
                    | TransactionStatus::RolledBack
            ),
            None => self.record.lock().rollback_only(),
        }
    }

    pub fn set_rollback_only(
        &self,
        transaction: Option<TransactionId>,
        reason: &str,
    ) -> InvocationResult<()> {
        match transaction {
            Some(transaction) => self.mark_rollback_only(transaction, reason),
            None => {
                log::debug!("Marking non-transactional invocation rollback-only: {}", reason);
                self.with_record(|record| record.mark_rollback_only());
                Ok(())
            }
        }
    }

    pub fn register_synchronization(
        &self,
        transaction: Option<TransactionId>,
        synchronization: Arc<dyn Synchronization>,
    ) -> InvocationResult<()> {
        match transaction {
            Some(transaction) if !self.manager.status(transaction).is_terminal() => self
                .manager
                .register_synchronization(transaction, synchronization)
                .map_err(|e| self.manager_fault("register synchronization", e)),
            _ => {
                self.pending_synchronizations.lock().push(synchronization);
                Ok(())
            }
        }
    }

    pub fn enlist_resource(
        &self,
        transaction: Option<TransactionId>,
        resource: Arc<dyn XaResource>,
    ) -> InvocationResult<()> {
        let Some(transaction) = transaction else {
            return Err(InvocationError::system(
                SystemFaultKind::EnlistFailed,
                format!("cannot enlist {} without an active transaction", resource.name()),
            ));
        };

        let name = resource.name().to_string();
        match self.manager.enlist_resource(transaction, resource) {
            Ok(true) => {
                log::debug!("Enlisted {} in {}", name, transaction);
                Ok(())
            }
            Ok(false) => {
                log::error!("Transaction {} refused resource {}", transaction, name);
                Err(InvocationError::system(
                    SystemFaultKind::EnlistFailed,
                    format!("transaction {} refused resource {}", transaction, name),
                ))
            }
            Err(e) => {
                log::error!("Enlisting {} in {} failed: {}", name, transaction, e);
                Err(InvocationError::system_with_source(
                    SystemFaultKind::EnlistFailed,
                    format!("enlisting {} in {} failed", name, transaction),
                    Some(Box::new(e)),
                ))
            }
        }
    }

    /// The transaction's resource bag when one is active, the call's otherwise
    pub fn resources(&self, transaction: Option<TransactionId>) -> Arc<Mutex<ResourceBag>> {
        if let Some(transaction) = transaction {
            match self.manager.resources(transaction) {
                Ok(bag) => return bag,
                Err(e) => log::warn!(
                    "No resource bag for {} ({}); using call-scoped resources",
                    transaction,
                    e
                ),
            }
        }
        self.local_resources.clone()
    }

    pub(crate) fn local_resources(&self) -> Arc<Mutex<ResourceBag>> {
        self.local_resources.clone()
    }

    /// Replay synchronizations registered while no transaction existed, as
    /// if a transaction had completed around the call
    pub(crate) fn fire_non_transactional_completion(&self) {
        let synchronizations = std::mem::take(&mut *self.pending_synchronizations.lock());
        if synchronizations.is_empty() {
            return;
        }

        if !self.record.lock().rollback_only() {
            for synchronization in &synchronizations {
                if let Err(e) = synchronization.before_completion() {
                    log::warn!("before_completion failed outside a transaction: {}", e);
                    self.with_record(|record| record.mark_rollback_only());
                    break;
                }
            }
        }

        let status = if self.record.lock().rollback_only() {
            TransactionStatus::RolledBack
        } else {
            TransactionStatus::Committed
        };
        log::debug!(
            "Replaying {} synchronizations with {}",
            synchronizations.len(),
            status
        );
        for synchronization in &synchronizations {
            synchronization.after_completion(status);
        }
    }
}
