//! Swappable Classifier
//!
//! A compiled program shared by many matching threads and replaced
//! wholesale on reconfiguration. Readers hold the lock only long enough to
//! clone the [`Arc`], so a match in flight always runs to completion on the
//! program it started with.

extern crate alloc;

use alloc::sync::Arc;

use spin::RwLock;

use super::Classify;
use crate::bytecode::compressed::CompressedProgram;

/// A [`CompressedProgram`] behind an atomically replaceable reference.
#[derive(Debug)]
pub struct SharedClassifier {
    inner: RwLock<Arc<CompressedProgram>>,
}

impl SharedClassifier {
    /// Share `program`.
    pub fn new(program: CompressedProgram) -> Self {
        Self {
            inner: RwLock::new(Arc::new(program)),
        }
    }

    /// The program currently in use.
    pub fn load(&self) -> Arc<CompressedProgram> {
        Arc::clone(&self.inner.read())
    }

    /// Install `program` for all subsequent matches and return the previous
    /// one.
    pub fn replace(&self, program: CompressedProgram) -> Arc<CompressedProgram> {
        let program = Arc::new(program);
        core::mem::replace(&mut *self.inner.write(), program)
    }
}

impl Classify for SharedClassifier {
    fn classify(&self, packet: &[u8]) -> u32 {
        self.load().classify(packet)
    }
}
