// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! env_logger setup
//!
//! The library only emits through the `log` facade; these helpers are for
//! binaries and tests embedding the container. `RUST_LOG` always wins over
//! the configured filter.

use crate::config::ContainerConfig;

/// Initialise logging from the container configuration
pub fn init(config: &ContainerConfig) {
    init_with_filter(&config.log_filter);
}

/// Initialise logging with a default filter. Repeated calls are ignored.
pub fn init_with_filter(filter: &str) {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter))
        .format_timestamp_millis()
        .try_init();
}

/// Test-friendly logger: captured by the harness, safe to call from every test
pub fn init_for_tests() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug"))
        .is_test(true)
        .try_init();
}
