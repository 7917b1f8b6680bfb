//! Chaotic session store for fault injection.
//!
//! Wraps another store and randomly fails lookups so the decryption pipeline's
//! storage placeholders can be exercised deterministically.

#![allow(clippy::disallowed_types, reason = "Locking simple RNG state")]

use std::sync::{Arc, Mutex};

use backscroll_crypto::{ExportedSessionKey, InboundGroupSession};

use crate::{MegolmSessionIndex, SessionKeyStore, SessionStore, StorageError};

/// Message carried by every injected failure.
const CHAOS_MESSAGE: &str = "chaotic failure injection";

/// Session store wrapper that randomly fails operations.
///
/// Each call to a store method draws from a seeded LCG and fails with
/// `StorageError::Io` when the draw falls below `failure_rate`. Clones share
/// the RNG and the operation counter.
#[derive(Clone)]
pub struct ChaoticSessionStore<S> {
    inner: S,
    /// 0.0 never fails, 1.0 always fails
    failure_rate: f64,
    rng: Arc<Mutex<ChaoticRng>>,
    operation_count: Arc<Mutex<usize>>,
}

/// Linear congruential generator, reproducible from its seed.
struct ChaoticRng {
    state: u64,
}

impl ChaoticRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Next value in [0.0, 1.0)
    fn next(&mut self) -> f64 {
        // Numerical Recipes constants
        const A: u64 = 1_664_525;
        const C: u64 = 1_013_904_223;
        const M: u64 = 1u64 << 32;

        self.state = (A.wrapping_mul(self.state).wrapping_add(C)) % M;
        (self.state as f64) / (M as f64)
    }
}

impl<S> ChaoticSessionStore<S> {
    /// Wrap `inner` with the default seed.
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn new(inner: S, failure_rate: f64) -> Self {
        Self::with_seed(inner, failure_rate, 0x1234_5678_9ABC_DEF0)
    }

    /// Wrap `inner` with an explicit seed for reproducible runs.
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn with_seed(inner: S, failure_rate: f64, seed: u64) -> Self {
        assert!(
            (0.0..=1.0).contains(&failure_rate),
            "failure_rate must be between 0.0 and 1.0, got {failure_rate}"
        );

        Self {
            inner,
            failure_rate,
            rng: Arc::new(Mutex::new(ChaoticRng::new(seed))),
            operation_count: Arc::new(Mutex::new(0)),
        }
    }

    /// Wrapped store, for checking state after a chaos run.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Number of store operations attempted through this wrapper.
    pub fn operation_count(&self) -> usize {
        #[allow(clippy::expect_used)]
        *self.operation_count.lock().expect("operation_count mutex poisoned")
    }

    /// Count the operation and decide whether it fails.
    fn roll(&self) -> Result<(), StorageError> {
        #[allow(clippy::expect_used)]
        let mut count = self.operation_count.lock().expect("operation_count mutex poisoned");
        *count += 1;
        drop(count);

        #[allow(clippy::expect_used)]
        let draw = self.rng.lock().expect("ChaoticRng mutex poisoned").next();
        if draw < self.failure_rate {
            tracing::trace!(target: crate::LOG_DB, "injecting session store failure");
            return Err(StorageError::Io(CHAOS_MESSAGE.to_string()));
        }
        Ok(())
    }
}

impl<S: SessionStore> SessionStore for ChaoticSessionStore<S> {
    fn has_inbound_session(&self, index: &MegolmSessionIndex) -> Result<bool, StorageError> {
        self.roll()?;
        self.inner.has_inbound_session(index)
    }

    fn inbound_session(
        &self,
        index: &MegolmSessionIndex,
    ) -> Result<InboundGroupSession, StorageError> {
        self.roll()?;
        self.inner.inbound_session(index)
    }
}

impl<S: SessionKeyStore> SessionKeyStore for ChaoticSessionStore<S> {
    fn save_inbound_session(
        &self,
        index: &MegolmSessionIndex,
        export: &ExportedSessionKey,
    ) -> Result<bool, StorageError> {
        self.roll()?;
        self.inner.save_inbound_session(index, export)
    }

    fn sessions(&self) -> Result<Vec<(MegolmSessionIndex, ExportedSessionKey)>, StorageError> {
        self.roll()?;
        self.inner.sessions()
    }
}
