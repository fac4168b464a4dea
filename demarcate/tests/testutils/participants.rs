//! Recording transaction participants

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use demarcate::txn::{Synchronization, XaResource};
use demarcate::{BoxError, TransactionId, TransactionStatus};

/// Synchronization that remembers every callback
#[derive(Default)]
pub struct RecordingSynchronization {
    pub before: AtomicUsize,
    pub after: Mutex<Vec<TransactionStatus>>,
    pub fail_before: AtomicBool,
}

impl RecordingSynchronization {
    pub fn failing() -> Self {
        let sync = Self::default();
        sync.fail_before.store(true, Ordering::SeqCst);
        sync
    }

    pub fn before_count(&self) -> usize {
        self.before.load(Ordering::SeqCst)
    }

    pub fn outcomes(&self) -> Vec<TransactionStatus> {
        self.after.lock().clone()
    }
}

impl Synchronization for RecordingSynchronization {
    fn before_completion(&self) -> Result<(), BoxError> {
        self.before.fetch_add(1, Ordering::SeqCst);
        if self.fail_before.load(Ordering::SeqCst) {
            return Err("flush failed".into());
        }
        Ok(())
    }

    fn after_completion(&self, status: TransactionStatus) {
        self.after.lock().push(status);
    }
}

/// XA resource that can be told to fail its commit
pub struct RecordingResource {
    name: String,
    fail_commit: bool,
    pub commits: AtomicUsize,
    pub rollbacks: AtomicUsize,
}

impl RecordingResource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fail_commit: false,
            commits: AtomicUsize::new(0),
            rollbacks: AtomicUsize::new(0),
        }
    }

    pub fn failing(name: &str) -> Self {
        Self {
            fail_commit: true,
            ..Self::new(name)
        }
    }

    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn rollback_count(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }
}

impl XaResource for RecordingResource {
    fn name(&self) -> &str {
        &self.name
    }

    fn commit(&self, _transaction: TransactionId) -> Result<(), BoxError> {
        if self.fail_commit {
            return Err(format!("{} lost its connection", self.name).into());
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn rollback(&self, _transaction: TransactionId) -> Result<(), BoxError> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
