// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Declared transaction attributes

use serde::{Deserialize, Serialize};

/// How a component method interacts with the caller's transaction.
/// Declared per method ahead of time; never changes during a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionAttribute {
    /// Caller must supply a transaction
    Mandatory,
    /// Caller must not have a transaction
    Never,
    /// Runs without a transaction; the caller's is suspended
    NotSupported,
    /// Joins the caller's transaction or begins one
    Required,
    /// Always runs in a fresh transaction; the caller's is suspended
    RequiresNew,
    /// Joins the caller's transaction if there is one
    Supports,
    /// The component demarcates its own transactions
    BeanManaged,
}

impl TransactionAttribute {
    pub const ALL: [TransactionAttribute; 7] = [
        TransactionAttribute::Mandatory,
        TransactionAttribute::Never,
        TransactionAttribute::NotSupported,
        TransactionAttribute::Required,
        TransactionAttribute::RequiresNew,
        TransactionAttribute::Supports,
        TransactionAttribute::BeanManaged,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionAttribute::Mandatory => "Mandatory",
            TransactionAttribute::Never => "Never",
            TransactionAttribute::NotSupported => "NotSupported",
            TransactionAttribute::Required => "Required",
            TransactionAttribute::RequiresNew => "RequiresNew",
            TransactionAttribute::Supports => "Supports",
            TransactionAttribute::BeanManaged => "BeanManaged",
        }
    }

    /// Everything except `BeanManaged` is demarcated by the container
    pub fn is_container_managed(&self) -> bool {
        !matches!(self, TransactionAttribute::BeanManaged)
    }

    /// Attributes that may leave the caller's transaction suspended while the method runs
    pub fn suspends_caller(&self) -> bool {
        matches!(
            self,
            TransactionAttribute::NotSupported
                | TransactionAttribute::RequiresNew
                | TransactionAttribute::BeanManaged
        )
    }
}

impl std::fmt::Display for TransactionAttribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TransactionAttribute {
    type Err = String;

    /// Accepts descriptor spellings such as `Required`, `REQUIRES_NEW`,
    /// `not-supported` or `Bean`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .collect::<String>()
            .to_uppercase();

        match normalized.as_str() {
            "MANDATORY" => Ok(TransactionAttribute::Mandatory),
            "NEVER" => Ok(TransactionAttribute::Never),
            "NOTSUPPORTED" => Ok(TransactionAttribute::NotSupported),
            "REQUIRED" => Ok(TransactionAttribute::Required),
            "REQUIRESNEW" => Ok(TransactionAttribute::RequiresNew),
            "SUPPORTS" => Ok(TransactionAttribute::Supports),
            "BEAN" | "BEANMANAGED" => Ok(TransactionAttribute::BeanManaged),
            _ => Err(format!("Unknown transaction attribute: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_parsing() {
        assert_eq!(
            "REQUIRES_NEW".parse::<TransactionAttribute>().unwrap(),
            TransactionAttribute::RequiresNew
        );
        assert_eq!(
            "not-supported".parse::<TransactionAttribute>().unwrap(),
            TransactionAttribute::NotSupported
        );
        assert_eq!(
            "Bean".parse::<TransactionAttribute>().unwrap(),
            TransactionAttribute::BeanManaged
        );
        assert!("Sometimes".parse::<TransactionAttribute>().is_err());
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        for attribute in TransactionAttribute::ALL {
            assert_eq!(
                attribute.to_string().parse::<TransactionAttribute>(),
                Ok(attribute)
            );
        }
    }

    #[test]
    fn test_container_managed() {
        assert!(TransactionAttribute::Required.is_container_managed());
        assert!(!TransactionAttribute::BeanManaged.is_container_managed());
        assert!(TransactionAttribute::RequiresNew.suspends_caller());
        assert!(!TransactionAttribute::Supports.suspends_caller());
    }
}
