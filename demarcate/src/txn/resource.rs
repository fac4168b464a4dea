// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Transaction participants and transaction-scoped resources
//!
//! Synchronizations are notified around completion, XA resources take part
//! in the outcome, and the `ResourceBag` holds arbitrary values for the
//! lifetime of one transaction (or one non-transactional call).

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::BoxError;

use super::state::{TransactionId, TransactionStatus};

/// Completion callbacks registered against a transaction
pub trait Synchronization: Send + Sync {
    /// Called before the transaction starts to complete. An error marks the
    /// transaction rollback-only.
    fn before_completion(&self) -> Result<(), BoxError>;

    /// Called once the transaction reached `Committed` or `RolledBack`
    fn after_completion(&self, status: TransactionStatus);
}

/// A resource manager participating in a transaction's outcome
pub trait XaResource: Send + Sync {
    /// Name used in diagnostics
    fn name(&self) -> &str;

    fn commit(&self, transaction: TransactionId) -> Result<(), BoxError>;

    fn rollback(&self, transaction: TransactionId) -> Result<(), BoxError>;
}

/// Type-keyed value store scoped to one transaction or one call
#[derive(Default)]
pub struct ResourceBag {
    entries: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl ResourceBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value, returning the one it replaced
    pub fn put<T: Any + Send + Sync>(&mut self, value: Arc<T>) -> Option<Arc<T>> {
        self.entries
            .insert(TypeId::of::<T>(), value)
            .and_then(|previous| previous.downcast::<T>().ok())
    }

    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.entries
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|value| value.downcast::<T>().ok())
    }

    pub fn remove<T: Any + Send + Sync>(&mut self) -> Option<Arc<T>> {
        self.entries
            .remove(&TypeId::of::<T>())
            .and_then(|value| value.downcast::<T>().ok())
    }

    pub fn contains<T: Any + Send + Sync>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for ResourceBag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceBag")
            .field("entries", &self.entries.len())
            .finish()
    }
}
