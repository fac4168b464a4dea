// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Per-invocation record
//!
//! Created when a policy is constructed and dropped with it. Records what
//! the policy did to the ambient transaction so that completion can undo it.

use once_cell::sync::OnceCell;

use crate::txn::TransactionId;

use super::attribute::TransactionAttribute;

#[derive(Debug, Clone)]
pub struct InvocationRecord {
    declared_attribute: TransactionAttribute,
    /// Transaction on the thread when the call began
    caller_transaction: Option<TransactionId>,
    /// Transaction the method observes; set once by `before_invoke`
    active_transaction: OnceCell<Option<TransactionId>>,
    /// Transaction taken off the thread by `before_invoke`, if any
    suspended_transaction: Option<TransactionId>,
    instance_discard_requested: bool,
    /// Only meaningful while no real transaction exists
    rollback_only: bool,
}

impl InvocationRecord {
    pub fn new(declared_attribute: TransactionAttribute) -> Self {
        Self {
            declared_attribute,
            caller_transaction: None,
            active_transaction: OnceCell::new(),
            suspended_transaction: None,
            instance_discard_requested: false,
            rollback_only: false,
        }
    }

    pub fn declared_attribute(&self) -> TransactionAttribute {
        self.declared_attribute
    }

    pub fn caller_transaction(&self) -> Option<TransactionId> {
        self.caller_transaction
    }

    pub(crate) fn set_caller_transaction(&mut self, transaction: Option<TransactionId>) {
        self.caller_transaction = transaction;
    }

    /// `None` until `before_invoke` decided; `Some(None)` means no transaction
    pub fn active_transaction(&self) -> Option<TransactionId> {
        self.active_transaction.get().copied().flatten()
    }

    pub fn is_active_transaction_decided(&self) -> bool {
        self.active_transaction.get().is_some()
    }

    /// Returns `false` if the active transaction had already been decided
    pub(crate) fn set_active_transaction(&mut self, transaction: Option<TransactionId>) -> bool {
        self.active_transaction.set(transaction).is_ok()
    }

    pub fn suspended_transaction(&self) -> Option<TransactionId> {
        self.suspended_transaction
    }

    pub(crate) fn set_suspended_transaction(&mut self, transaction: Option<TransactionId>) {
        self.suspended_transaction = transaction;
    }

    pub(crate) fn take_suspended_transaction(&mut self) -> Option<TransactionId> {
        self.suspended_transaction.take()
    }

    pub fn instance_discard_requested(&self) -> bool {
        self.instance_discard_requested
    }

    pub(crate) fn request_instance_discard(&mut self) {
        self.instance_discard_requested = true;
    }

    pub fn rollback_only(&self) -> bool {
        self.rollback_only
    }

    pub(crate) fn mark_rollback_only(&mut self) {
        self.rollback_only = true;
    }

    /// This call began the transaction the method runs in
    pub fn owns_transaction(&self) -> bool {
        match self.active_transaction() {
            Some(active) => self.caller_transaction != Some(active),
            None => false,
        }
    }
}
