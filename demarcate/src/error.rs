// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Invocation error types
//!
//! `InvocationError` is the only error a caller of the container sees. System
//! faults of a business method reach the caller as `TransactionRolledBack` or
//! `Remote`; container and manager failures as `System`. All three carry a
//! correlation id. The underlying cause is kept as the error source and
//! logged under the same id; it never appears in the display text.

use thiserror::Error;
use uuid::Uuid;

use crate::txn::{HeuristicOutcome, TransactionError};

/// Boxed error used for causes supplied by business code and resources
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Coarse classification of an invocation failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    /// A transaction attribute precondition failed before the method ran
    PolicyViolation,
    /// The business method's own declared fault
    Application,
    /// The caller's transaction is gone
    TransactionRolledBack,
    /// The call failed; the reference must not be reused
    Remote,
    /// Container or transaction-manager failure
    System,
}

/// Sub-kinds of system faults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemFaultKind {
    /// Failure reported by the transaction manager
    Manager,
    /// Partial or reversed completion reported by the transaction manager
    Heuristic(HeuristicOutcome),
    /// A resource could not be enlisted
    EnlistFailed,
    /// An operation was used outside the state that allows it
    IllegalState,
    /// A transaction attribute name did not match any known attribute
    UnknownAttribute,
}

impl std::fmt::Display for SystemFaultKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SystemFaultKind::Manager => f.write_str("transaction manager"),
            SystemFaultKind::Heuristic(outcome) => write!(f, "{}", outcome),
            SystemFaultKind::EnlistFailed => f.write_str("enlist failed"),
            SystemFaultKind::IllegalState => f.write_str("illegal state"),
            SystemFaultKind::UnknownAttribute => f.write_str("unknown transaction attribute"),
        }
    }
}

/// Errors surfaced by an invocation
#[derive(Error, Debug)]
pub enum InvocationError {
    #[error("transaction required: {0}")]
    TransactionRequired(String),

    #[error("transaction not allowed: {0}")]
    TransactionNotAllowed(String),

    #[error(transparent)]
    Application(BoxError),

    #[error("transaction rolled back (correlation {correlation})")]
    TransactionRolledBack {
        correlation: Uuid,
        #[source]
        cause: Option<BoxError>,
    },

    #[error("invocation failed, reference invalidated (correlation {correlation})")]
    Remote {
        correlation: Uuid,
        #[source]
        cause: Option<BoxError>,
    },

    /// `message` is logged under the correlation id, never displayed
    #[error("system fault ({kind}) (correlation {correlation})")]
    System {
        kind: SystemFaultKind,
        correlation: Uuid,
        message: String,
        #[source]
        source: Option<BoxError>,
    },
}

impl InvocationError {
    pub fn kind(&self) -> FaultKind {
        match self {
            InvocationError::TransactionRequired(_) | InvocationError::TransactionNotAllowed(_) => {
                FaultKind::PolicyViolation
            }
            InvocationError::Application(_) => FaultKind::Application,
            InvocationError::TransactionRolledBack { .. } => FaultKind::TransactionRolledBack,
            InvocationError::Remote { .. } => FaultKind::Remote,
            InvocationError::System { .. } => FaultKind::System,
        }
    }

    /// The caller must drop its reference to the component
    pub fn invalidates_reference(&self) -> bool {
        matches!(
            self,
            InvocationError::TransactionRolledBack { .. } | InvocationError::Remote { .. }
        )
    }

    /// Correlation id of a caller-visible system fault
    pub fn correlation(&self) -> Option<Uuid> {
        match self {
            InvocationError::TransactionRolledBack { correlation, .. }
            | InvocationError::Remote { correlation, .. }
            | InvocationError::System { correlation, .. } => Some(*correlation),
            _ => None,
        }
    }

    pub fn system_kind(&self) -> Option<SystemFaultKind> {
        match self {
            InvocationError::System { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Internal detail of a system fault, for diagnostics
    pub fn system_message(&self) -> Option<&str> {
        match self {
            InvocationError::System { message, .. } => Some(message),
            _ => None,
        }
    }

    pub fn system(kind: SystemFaultKind, message: impl Into<String>) -> Self {
        Self::system_with_source(kind, message, None)
    }

    /// Build a system fault, logging its message and cause under a fresh correlation id
    pub fn system_with_source(
        kind: SystemFaultKind,
        message: impl Into<String>,
        source: Option<BoxError>,
    ) -> Self {
        let correlation = Uuid::new_v4();
        let message = message.into();
        log_cause(
            correlation,
            &format!("system fault ({}): {}", kind, message),
            source.as_deref(),
        );
        InvocationError::System {
            kind,
            correlation,
            message,
            source,
        }
    }

    /// Build a generic remote fault, logging the cause under a fresh correlation id
    pub fn remote(cause: Option<BoxError>) -> Self {
        let correlation = Uuid::new_v4();
        log_cause(correlation, "invocation failed", cause.as_deref());
        InvocationError::Remote { correlation, cause }
    }

    /// Build a transaction-rolled-back fault, logging the cause under a fresh correlation id
    pub fn rolled_back(cause: Option<BoxError>) -> Self {
        let correlation = Uuid::new_v4();
        log_cause(correlation, "transaction rolled back", cause.as_deref());
        InvocationError::TransactionRolledBack { correlation, cause }
    }
}

fn log_cause(
    correlation: Uuid,
    what: &str,
    cause: Option<&(dyn std::error::Error + Send + Sync + 'static)>,
) {
    match cause {
        Some(cause) => log::error!("[{}] {}: {}", correlation, what, cause),
        None => log::error!("[{}] {}", correlation, what),
    }
}

/// Manager faults are always system faults; heuristic outcomes keep their own sub-kind
impl From<TransactionError> for InvocationError {
    fn from(error: TransactionError) -> Self {
        let kind = match &error {
            TransactionError::Heuristic { outcome, .. } => SystemFaultKind::Heuristic(*outcome),
            TransactionError::EnlistFailed(_) => SystemFaultKind::EnlistFailed,
            _ => SystemFaultKind::Manager,
        };
        InvocationError::system_with_source(kind, kind.to_string(), Some(Box::new(error)))
    }
}

/// How a business method failed
#[derive(Debug)]
pub enum BusinessFault {
    /// Part of the method's declared contract; `rollback` asks the container
    /// to mark the transaction rollback-only before returning it
    Application { error: BoxError, rollback: bool },
    /// Anything unanticipated
    System(BoxError),
}

impl BusinessFault {
    pub fn application(error: impl Into<BoxError>) -> Self {
        BusinessFault::Application {
            error: error.into(),
            rollback: false,
        }
    }

    pub fn application_rollback(error: impl Into<BoxError>) -> Self {
        BusinessFault::Application {
            error: error.into(),
            rollback: true,
        }
    }

    pub fn system(error: impl Into<BoxError>) -> Self {
        BusinessFault::System(error.into())
    }
}

pub type InvocationResult<T> = std::result::Result<T, InvocationError>;
