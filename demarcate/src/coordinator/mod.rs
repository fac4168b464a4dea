// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Invocation Driver - orchestration of one component call
//!
//! The InvocationDriver provides the single entry point through which the
//! container calls a component method under its declared transaction attribute.

pub mod invocation_driver;

pub use invocation_driver::{InvocationDriver, InvocationScope};

// Re-export types needed to write business methods
pub use crate::context::InvocationPhase;
pub use crate::error::{BusinessFault, InvocationError, InvocationResult};
