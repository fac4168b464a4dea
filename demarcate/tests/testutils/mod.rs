//! Test utilities for Demarcate integration tests
//!
//! - ContainerFixture: manager, discard registry and driver wired together
//! - participants: recording synchronizations and XA resources

#![allow(dead_code)]

pub mod container_fixture;
pub mod participants;
