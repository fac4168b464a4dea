// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Transaction identity and status
//!
//! This module defines the opaque transaction handle and the status values
//! reported by the transaction manager facade.

use serde::{Deserialize, Serialize};

/// Opaque identifier for a transaction instance.
///
/// Handles are minted by the transaction manager only; the policy layer
/// compares them and passes them back, nothing more.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(u64);

impl TransactionId {
    /// Create a TransactionId from a raw value (used by manager implementations)
    pub fn from_u64(id: u64) -> Self {
        TransactionId(id)
    }

    /// Get the underlying ID value
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

/// Transaction lifecycle states as reported by `TransactionManager::status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionStatus {
    /// Transaction is active and may still commit
    Active,
    /// Transaction may only be rolled back
    MarkedRollback,
    /// Transaction is preparing to commit (2PC first phase)
    Preparing,
    /// Transaction is committing
    Committing,
    /// Transaction has been committed successfully
    Committed,
    /// Transaction is rolling back
    RollingBack,
    /// Transaction has been rolled back
    RolledBack,
    /// The manager does not know the transaction
    NoTransaction,
    /// The manager cannot determine the status
    Unknown,
}

impl TransactionStatus {
    /// Policies branch only on this: active vs. everything else
    pub fn is_active(&self) -> bool {
        matches!(self, TransactionStatus::Active)
    }

    /// Check if the transaction reached a final state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Committed
                | TransactionStatus::RolledBack
                | TransactionStatus::NoTransaction
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Active => "ACTIVE",
            TransactionStatus::MarkedRollback => "MARKED_ROLLBACK",
            TransactionStatus::Preparing => "PREPARING",
            TransactionStatus::Committing => "COMMITTING",
            TransactionStatus::Committed => "COMMITTED",
            TransactionStatus::RollingBack => "ROLLING_BACK",
            TransactionStatus::RolledBack => "ROLLED_BACK",
            TransactionStatus::NoTransaction => "NO_TRANSACTION",
            TransactionStatus::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of a two-phase commit where participants disagreed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HeuristicOutcome {
    /// Some participants committed and others rolled back
    Mixed,
    /// All participants rolled back although commit was requested
    Rollback,
    /// All participants committed although rollback was requested
    Commit,
}

impl std::fmt::Display for HeuristicOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            HeuristicOutcome::Mixed => "heuristic mixed",
            HeuristicOutcome::Rollback => "heuristic rollback",
            HeuristicOutcome::Commit => "heuristic commit",
        };
        f.write_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_active_is_active() {
        assert!(TransactionStatus::Active.is_active());
        assert!(!TransactionStatus::MarkedRollback.is_active());
        assert!(!TransactionStatus::RolledBack.is_active());
        assert!(!TransactionStatus::Unknown.is_active());
    }

    #[test]
    fn test_terminal_states() {
        assert!(TransactionStatus::Committed.is_terminal());
        assert!(TransactionStatus::RolledBack.is_terminal());
        assert!(!TransactionStatus::MarkedRollback.is_terminal());
        assert!(!TransactionStatus::Preparing.is_terminal());
    }

    #[test]
    fn test_transaction_id_display() {
        assert_eq!(TransactionId::from_u64(42).to_string(), "txn_42");
    }
}
