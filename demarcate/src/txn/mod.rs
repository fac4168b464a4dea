// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Transaction manager boundary
//!
//! The policy layer never touches a transaction directly; everything goes
//! through the `TransactionManager` facade defined here.
//!
//! # Contents
//! - Opaque transaction handles and status values
//! - The facade trait with thread-associated begin/suspend/resume/commit/rollback
//! - Synchronization and XA resource participants
//! - `InMemoryTransactionManager`, an auditable reference implementation

pub mod error;
pub mod manager;
pub mod memory;
pub mod resource;
pub mod state;

pub use error::{TransactionError, TxnResult};
pub use manager::TransactionManager;
pub use memory::{InMemoryTransactionManager, ManagerCall, ManagerOp, TransactionStatistics};
pub use resource::{ResourceBag, Synchronization, XaResource};
pub use state::{HeuristicOutcome, TransactionId, TransactionStatus};
