// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Transaction manager error types

use thiserror::Error;

use super::state::{HeuristicOutcome, TransactionId};

/// Faults raised by the transaction manager facade
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("a transaction is already associated with the calling thread")]
    AlreadyActive,

    #[error("no transaction is associated with the calling thread")]
    NoTransaction,

    #[error("transaction {0} is not active")]
    NotActive(TransactionId),

    #[error("transaction {0} is unknown or expired")]
    InvalidTransaction(TransactionId),

    #[error("calling thread is already associated with transaction {0}")]
    AlreadyAssociated(TransactionId),

    #[error("transaction {0} was rolled back instead of committed")]
    RolledBack(TransactionId),

    #[error("transaction {transaction} completed with {outcome}")]
    Heuristic {
        transaction: TransactionId,
        outcome: HeuristicOutcome,
    },

    #[error("resource could not be enlisted in transaction {0}")]
    EnlistFailed(TransactionId),

    #[error("transaction manager error: {0}")]
    Internal(String),
}

pub type TxnResult<T> = std::result::Result<T, TransactionError>;
