// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Demarcate - declarative transaction demarcation for component invocations
//!
//! Demarcate is the transaction-policy layer of a component container. Each
//! component method declares one of seven transaction attributes; the
//! container turns that declaration into begin, join, suspend, resume, commit
//! and rollback calls on a thread-associated transaction manager around the
//! method.
//!
//! # Features
//!
//! - **Seven Attributes**: Mandatory, Never, NotSupported, Required,
//!   RequiresNew, Supports and bean-managed demarcation
//! - **Fault Classification**: business faults pass through unchanged,
//!   system faults become rolled-back or remote faults with a correlation id
//! - **Nested Calls**: the ambient policy is saved and restored per thread
//! - **Stateful Continuation**: bean-managed transactions can span calls on
//!   a stateful instance
//! - **In-Memory Manager**: an auditable transaction manager with fault
//!   injection for embedding and testing
//!
//! # Usage
//!
//! Build an `InvocationDriver` over a `TransactionManager` and an
//! `InstanceLifecycle`, then call component methods through
//! `InvocationDriver::invoke`.

pub mod config;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod instance;
pub mod logging;
pub mod policy;
pub mod txn;

// Re-export the public API - InvocationDriver is the entry point
pub use config::{ConfigError, ContainerConfig};
pub use coordinator::{InvocationDriver, InvocationScope};
pub use error::{BoxError, BusinessFault, FaultKind, InvocationError, InvocationResult, SystemFaultKind};
pub use instance::{ComponentInstance, ComponentKind, DiscardRegistry, InstanceId, InstanceLifecycle};
pub use policy::{TransactionAttribute, TransactionPolicy, UserTransaction};
pub use txn::{InMemoryTransactionManager, TransactionId, TransactionManager, TransactionStatus};

/// Demarcate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Demarcate crate name
pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");
