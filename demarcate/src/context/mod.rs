// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Thread-scoped invocation context
//!
//! Each invocation enters a fresh `InvocationContext` on its thread and gets
//! back a `ContextGuard`. Dropping the guard puts the previous context back,
//! on every exit path, so nested and reentrant calls always see the policy
//! of their own depth.

pub mod listener;

use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::instance::InstanceId;
use crate::policy::{TransactionAttribute, TransactionPolicy};

pub use listener::{ContextListener, ContextListeners, PolicyPropagationListener};

thread_local! {
    static CURRENT_CONTEXT: RefCell<Option<Arc<InvocationContext>>> = const { RefCell::new(None) };
}

/// Where an invocation is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationPhase {
    Idle,
    /// `before_invoke` succeeded; the business method may run
    PolicyActive,
    /// The method returned or failed; the policy is finishing
    Completing,
}

pub struct InvocationContext {
    instance: InstanceId,
    method: String,
    attribute: TransactionAttribute,
    active_policy: Mutex<Option<Arc<dyn TransactionPolicy>>>,
    phase: Mutex<InvocationPhase>,
}

impl InvocationContext {
    pub fn new(instance: InstanceId, method: &str, attribute: TransactionAttribute) -> Self {
        Self {
            instance,
            method: method.to_string(),
            attribute,
            active_policy: Mutex::new(None),
            phase: Mutex::new(InvocationPhase::Idle),
        }
    }

    pub fn instance(&self) -> &InstanceId {
        &self.instance
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn attribute(&self) -> TransactionAttribute {
        self.attribute
    }

    pub fn active_policy(&self) -> Option<Arc<dyn TransactionPolicy>> {
        self.active_policy.lock().clone()
    }

    pub fn set_active_policy(&self, policy: Option<Arc<dyn TransactionPolicy>>) {
        *self.active_policy.lock() = policy;
    }

    /// Install `policy` and return the one it replaces
    pub fn replace_active_policy(
        &self,
        policy: Option<Arc<dyn TransactionPolicy>>,
    ) -> Option<Arc<dyn TransactionPolicy>> {
        std::mem::replace(&mut *self.active_policy.lock(), policy)
    }

    pub fn phase(&self) -> InvocationPhase {
        *self.phase.lock()
    }

    pub fn set_phase(&self, phase: InvocationPhase) {
        *self.phase.lock() = phase;
    }
}

impl std::fmt::Debug for InvocationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvocationContext")
            .field("instance", &self.instance)
            .field("method", &self.method)
            .field("attribute", &self.attribute)
            .field("phase", &self.phase())
            .finish()
    }
}

/// Context of the innermost invocation running on this thread
pub fn current() -> Option<Arc<InvocationContext>> {
    CURRENT_CONTEXT.with(|current| current.borrow().clone())
}

/// Policy of the innermost invocation running on this thread
pub fn active_policy() -> Option<Arc<dyn TransactionPolicy>> {
    current().and_then(|context| context.active_policy())
}

/// Make `context` current on this thread until the guard is dropped
pub fn enter(context: Arc<InvocationContext>, listeners: &ContextListeners) -> ContextGuard {
    let parent = CURRENT_CONTEXT.with(|current| current.replace(Some(context.clone())));
    listeners.entered(parent.as_deref(), &context);

    ContextGuard {
        entered: context,
        parent,
        listeners: listeners.clone(),
        _not_send: PhantomData,
    }
}

/// Restores the previous context when dropped. Tied to the thread that
/// entered the context.
#[must_use = "the context is left as soon as the guard is dropped"]
pub struct ContextGuard {
    entered: Arc<InvocationContext>,
    parent: Option<Arc<InvocationContext>>,
    listeners: ContextListeners,
    _not_send: PhantomData<*const ()>,
}

impl ContextGuard {
    pub fn context(&self) -> &Arc<InvocationContext> {
        &self.entered
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        CURRENT_CONTEXT.with(|current| *current.borrow_mut() = self.parent.clone());
        self.entered.set_phase(InvocationPhase::Idle);
        self.listeners
            .exited(&self.entered, self.parent.as_deref());
    }
}
