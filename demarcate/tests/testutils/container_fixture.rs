//! Container fixture for Demarcate integration tests
//!
//! Wires an `InMemoryTransactionManager`, a `DiscardRegistry` and an
//! `InvocationDriver` the way an embedding container would.

use std::sync::Arc;
use std::time::Duration;

use demarcate::txn::ManagerOp;
use demarcate::{
    BusinessFault, ComponentInstance, ContainerConfig, DiscardRegistry, InMemoryTransactionManager,
    InvocationDriver, InvocationResult, InvocationScope, TransactionAttribute, TransactionId,
    TransactionManager,
};

pub struct ContainerFixture {
    pub manager: Arc<InMemoryTransactionManager>,
    pub registry: Arc<DiscardRegistry>,
    pub driver: InvocationDriver,
}

impl ContainerFixture {
    pub fn new() -> Self {
        Self::with_config(ContainerConfig::default())
    }

    pub fn with_config(config: ContainerConfig) -> Self {
        Self::from_manager(InMemoryTransactionManager::with_config(&config), &config)
    }

    /// Fixture whose manager expires transactions after `timeout`
    pub fn with_manager_timeout(timeout: Duration) -> Self {
        let config = ContainerConfig::default();
        Self::from_manager(
            InMemoryTransactionManager::with_config(&config).with_default_timeout(timeout),
            &config,
        )
    }

    fn from_manager(manager: InMemoryTransactionManager, config: &ContainerConfig) -> Self {
        demarcate::logging::init_for_tests();

        let manager = Arc::new(manager);
        let registry = Arc::new(DiscardRegistry::new());
        let driver = InvocationDriver::new(manager.clone(), registry.clone(), config);
        Self {
            manager,
            registry,
            driver,
        }
    }

    pub fn invoke<R, F>(
        &self,
        instance: &ComponentInstance,
        attribute: TransactionAttribute,
        target: F,
    ) -> InvocationResult<R>
    where
        F: FnOnce(&InvocationScope<'_>) -> Result<R, BusinessFault>,
    {
        self.driver.invoke(instance, "business", attribute, target)
    }

    /// Begin a transaction on the test thread, acting as the caller
    pub fn begin_caller(&self) -> TransactionId {
        self.manager
            .begin()
            .expect("Failed to begin caller transaction")
    }

    pub fn ambient(&self) -> Option<TransactionId> {
        self.manager.get_transaction()
    }

    pub fn calls(&self, op: ManagerOp) -> usize {
        self.manager.calls_of(op)
    }

    pub fn is_discarded(&self, instance: &ComponentInstance) -> bool {
        self.registry.is_discarded(instance.id())
    }
}

impl Default for ContainerFixture {
    fn default() -> Self {
        Self::new()
    }
}
