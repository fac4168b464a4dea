// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Transaction policies
//!
//! One policy object is created per invocation from the method's declared
//! attribute. The driver calls it in a fixed order:
//!
//! 1. `before_invoke` - begin, join, suspend or reject (done by the factory)
//! 2. at most one of `handle_application_exception` / `handle_system_exception`
//!    when the business method failed; these only classify the fault and
//!    mark transactions
//! 3. `after_invoke` - commit, roll back or resume; runs on every path once
//!    `before_invoke` succeeded
//!
//! # Contents
//! - `TransactionPolicy`, the contract shared by the seven policies
//! - `PolicyCore`, the manager plumbing each policy delegates to
//! - `SuspendedTransaction` and `UserTransaction` for bean-managed demarcation
//! - `PolicyFactory`, the attribute dispatch table

pub mod attribute;
pub mod bean_managed;
pub mod base;
pub mod factory;
pub mod mandatory;
pub mod never;
pub mod not_supported;
pub mod record;
pub mod required;
pub mod requires_new;
pub mod supports;
pub mod suspended;
pub mod user_transaction;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{BoxError, InvocationError, InvocationResult};
use crate::instance::InstanceId;
use crate::txn::{Synchronization, TransactionId, XaResource};

pub use crate::txn::ResourceBag;
pub use attribute::TransactionAttribute;
pub use bean_managed::BeanManagedPolicy;
pub use base::{CallerPolicy, PolicyCore, PolicyEnvironment};
pub use factory::PolicyFactory;
pub use mandatory::MandatoryPolicy;
pub use never::NeverPolicy;
pub use not_supported::NotSupportedPolicy;
pub use record::InvocationRecord;
pub use required::RequiredPolicy;
pub use requires_new::RequiresNewPolicy;
pub use supports::SupportsPolicy;
pub use suspended::SuspendedTransaction;
pub use user_transaction::UserTransaction;

/// Per-invocation transaction policy
pub trait TransactionPolicy: Send + Sync {
    fn attribute(&self) -> TransactionAttribute;

    fn core(&self) -> &PolicyCore;

    /// Begin-time effects. A failure means the business method must not run
    /// and no other policy method may be called.
    fn before_invoke(&self, instance: &InstanceId) -> InvocationResult<()>;

    /// Completion. Runs exactly once after a successful `before_invoke`,
    /// whether or not the business method failed.
    fn after_invoke(&self, instance: &InstanceId) -> InvocationResult<()>;

    /// Classify a declared business fault. The fault is returned unchanged;
    /// with `rollback` set the active transaction is marked first.
    fn handle_application_exception(&self, error: BoxError, rollback: bool) -> InvocationError {
        if rollback {
            if let Some(transaction) = self.current_transaction() {
                let reason = format!("application fault: {}", error);
                if let Err(e) = self.core().mark_rollback_only(transaction, &reason) {
                    log::error!("Could not honour rollback for application fault: {}", e);
                }
            } else {
                self.core().with_record(|record| record.mark_rollback_only());
            }
        }
        InvocationError::Application(error)
    }

    /// Classify an unanticipated fault into one of the two caller-visible
    /// shapes, marking transactions and discarding the instance on the way
    fn handle_system_exception(&self, error: BoxError, instance: &InstanceId) -> InvocationError;

    fn record(&self) -> InvocationRecord {
        self.core().record()
    }

    /// Transaction the business method runs in
    fn current_transaction(&self) -> Option<TransactionId> {
        self.core().record().active_transaction()
    }

    /// This call began the transaction it runs in
    fn is_new_transaction(&self) -> bool {
        self.core().record().owns_transaction()
    }

    /// The method runs in the transaction its caller supplied
    fn is_client_transaction(&self) -> bool {
        let record = self.core().record();
        record.active_transaction().is_some()
            && record.active_transaction() == record.caller_transaction()
    }

    fn is_transaction_active(&self) -> bool {
        self.core().is_active(self.current_transaction())
    }

    fn is_rollback_only(&self) -> bool {
        self.core().is_rollback_only(self.current_transaction())
    }

    fn set_rollback_only(&self, reason: &str) -> InvocationResult<()> {
        self.core()
            .set_rollback_only(self.current_transaction(), reason)
    }

    /// Register with the active transaction, or hold the synchronization
    /// until `after_invoke` when there is none
    fn register_synchronization(
        &self,
        synchronization: Arc<dyn Synchronization>,
    ) -> InvocationResult<()> {
        self.core()
            .register_synchronization(self.current_transaction(), synchronization)
    }

    fn enlist_resource(&self, resource: Arc<dyn XaResource>) -> InvocationResult<()> {
        self.core()
            .enlist_resource(self.current_transaction(), resource)
    }

    fn resources(&self) -> Arc<Mutex<ResourceBag>> {
        self.core().resources(self.current_transaction())
    }

    fn as_bean_managed(&self) -> Option<&BeanManagedPolicy> {
        None
    }
}

impl std::fmt::Debug for dyn TransactionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionPolicy")
            .field("attribute", &self.attribute())
            .field("record", &self.record())
            .finish()
    }
}
