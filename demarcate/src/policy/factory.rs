// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//

use std::sync::Arc;

use crate::config::ContainerConfig;
use crate::error::{InvocationError, InvocationResult, SystemFaultKind};
use crate::instance::{InstanceId, InstanceLifecycle};
use crate::txn::TransactionManager;

use super::attribute::TransactionAttribute;
use super::base::PolicyEnvironment;
use super::bean_managed::BeanManagedPolicy;
use super::mandatory::MandatoryPolicy;
use super::never::NeverPolicy;
use super::not_supported::NotSupportedPolicy;
use super::required::RequiredPolicy;
use super::requires_new::RequiresNewPolicy;
use super::supports::SupportsPolicy;
use super::TransactionPolicy;

/// Builds the policy for a declared attribute and runs its begin-time effects
#[derive(Clone)]
pub struct PolicyFactory {
    env: PolicyEnvironment,
}

impl PolicyFactory {
    pub fn new(
        manager: Arc<dyn TransactionManager>,
        lifecycle: Arc<dyn InstanceLifecycle>,
        config: &ContainerConfig,
    ) -> Self {
        Self {
            env: PolicyEnvironment::new(manager, lifecycle, config),
        }
    }

    pub fn environment(&self) -> &PolicyEnvironment {
        &self.env
    }

    /// Construct without running `before_invoke`
    pub fn build(&self, attribute: TransactionAttribute) -> Arc<dyn TransactionPolicy> {
        match attribute {
            TransactionAttribute::Mandatory => Arc::new(MandatoryPolicy::new(&self.env)),
            TransactionAttribute::Never => Arc::new(NeverPolicy::new(&self.env)),
            TransactionAttribute::NotSupported => Arc::new(NotSupportedPolicy::new(&self.env)),
            TransactionAttribute::Required => Arc::new(RequiredPolicy::new(&self.env)),
            TransactionAttribute::RequiresNew => Arc::new(RequiresNewPolicy::new(&self.env)),
            TransactionAttribute::Supports => Arc::new(SupportsPolicy::new(&self.env)),
            TransactionAttribute::BeanManaged => Arc::new(BeanManagedPolicy::new(&self.env)),
        }
    }

    /// Construct the policy and apply its begin-time effects. On failure the
    /// business method must not be invoked.
    pub fn create_policy(
        &self,
        attribute: TransactionAttribute,
        instance: &InstanceId,
    ) -> InvocationResult<Arc<dyn TransactionPolicy>> {
        let policy = self.build(attribute);
        policy.before_invoke(instance)?;
        log::debug!("{} policy active for {}", attribute, instance);
        Ok(policy)
    }

    /// Same as `create_policy` for an attribute given by its descriptor name
    pub fn create_policy_named(
        &self,
        attribute: &str,
        instance: &InstanceId,
    ) -> InvocationResult<Arc<dyn TransactionPolicy>> {
        let attribute = Self::resolve_attribute(attribute, instance)?;
        self.create_policy(attribute, instance)
    }

    /// Parse a descriptor attribute name; unknown names are a system fault
    pub fn resolve_attribute(
        attribute: &str,
        instance: &InstanceId,
    ) -> InvocationResult<TransactionAttribute> {
        attribute.parse::<TransactionAttribute>().map_err(|message| {
            log::error!("Cannot build a policy for {}: {}", instance, message);
            InvocationError::system(SystemFaultKind::UnknownAttribute, message)
        })
    }
}
