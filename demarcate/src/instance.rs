// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Component instances and the discard signal
//!
//! The instance pool itself lives outside this crate. The policy layer only
//! needs an identity for the instance being invoked and a way to tell the
//! pool that the instance must not be reused.

use std::collections::HashSet;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::policy::SuspendedTransaction;

/// Identity of a component instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId {
    /// Deployment name of the component
    pub component: String,
    /// Primary key (stateful/entity) or pool slot (stateless)
    pub key: String,
}

impl InstanceId {
    pub fn new(component: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            key: key.into(),
        }
    }
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.component, self.key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComponentKind {
    Stateless,
    /// Stateful instances may keep a bean-managed transaction open across calls
    Stateful,
}

/// A component instance as seen by the invocation driver
pub struct ComponentInstance {
    id: InstanceId,
    kind: ComponentKind,
    /// Bean-managed transaction left open by the previous invocation
    bean_transaction: Mutex<Option<SuspendedTransaction>>,
}

impl ComponentInstance {
    pub fn new(id: InstanceId, kind: ComponentKind) -> Self {
        Self {
            id,
            kind,
            bean_transaction: Mutex::new(None),
        }
    }

    pub fn stateless(component: &str, key: &str) -> Self {
        Self::new(InstanceId::new(component, key), ComponentKind::Stateless)
    }

    pub fn stateful(component: &str, key: &str) -> Self {
        Self::new(InstanceId::new(component, key), ComponentKind::Stateful)
    }

    pub fn id(&self) -> &InstanceId {
        &self.id
    }

    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    pub fn is_stateful(&self) -> bool {
        self.kind == ComponentKind::Stateful
    }

    pub(crate) fn take_bean_transaction(&self) -> Option<SuspendedTransaction> {
        self.bean_transaction.lock().take()
    }

    pub(crate) fn set_bean_transaction(&self, token: Option<SuspendedTransaction>) {
        *self.bean_transaction.lock() = token;
    }

    /// Check if a bean-managed transaction is parked on this instance
    pub fn has_bean_transaction(&self) -> bool {
        self.bean_transaction.lock().is_some()
    }
}

impl std::fmt::Debug for ComponentInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentInstance")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("bean_transaction", &self.has_bean_transaction())
            .finish()
    }
}

/// Instance pool boundary
pub trait InstanceLifecycle: Send + Sync {
    /// Fire-and-forget request to never reuse `instance` again
    fn request_discard(&self, instance: &InstanceId);
}

/// Lifecycle manager that only remembers what it was asked to discard
#[derive(Debug, Default)]
pub struct DiscardRegistry {
    discarded: Mutex<HashSet<InstanceId>>,
}

impl DiscardRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_discarded(&self, instance: &InstanceId) -> bool {
        self.discarded.lock().contains(instance)
    }

    pub fn discarded_count(&self) -> usize {
        self.discarded.lock().len()
    }
}

impl InstanceLifecycle for DiscardRegistry {
    fn request_discard(&self, instance: &InstanceId) {
        log::info!("Discarding component instance {}", instance);
        self.discarded.lock().insert(instance.clone());
    }
}
