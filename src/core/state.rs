//! State Generation
//!
//! Unguessable correlation values binding a login redirect to its callback,
//! plus an optional single-use guard.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::error::OAuth2Error;

/// Number of random bytes in a correlation value.
pub const STATE_BYTES: usize = 32;

/// Opaque correlation value: 32 random bytes, URL-safe base64 without padding.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CorrelationState(String);

impl CorrelationState {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for CorrelationState {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<CorrelationState> for String {
    fn from(state: CorrelationState) -> Self {
        state.0
    }
}

impl std::fmt::Debug for CorrelationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("CorrelationState")
            .field(&redact(&self.0))
            .finish()
    }
}

/// Generate a correlation value from the operating system's CSPRNG.
pub fn generate_state() -> Result<CorrelationState, OAuth2Error> {
    generate_state_from(&mut OsRng)
}

/// Generate a correlation value from the given random source.
///
/// A failing source is an error; there is no fallback generator.
pub fn generate_state_from<R: RngCore + ?Sized>(
    rng: &mut R,
) -> Result<CorrelationState, OAuth2Error> {
    let mut bytes = [0u8; STATE_BYTES];
    rng.try_fill_bytes(&mut bytes)
        .map_err(|e| OAuth2Error::Entropy {
            message: e.to_string(),
        })?;
    Ok(CorrelationState(URL_SAFE_NO_PAD.encode(bytes)))
}

/// Short prefix of a state value, safe to log.
pub(crate) fn redact(state: &str) -> String {
    let prefix: String = state.chars().take(6).collect();
    format!("{prefix}...")
}

/// Single-use enforcement for state values (dependency injection seam).
pub trait ReplayGuard: Send + Sync {
    /// Mark `state` as used. Returns `false` if it was already used.
    fn consume(&self, state: &str) -> bool;
}

/// In-memory replay guard. Entries are forgotten after the TTL, which should
/// be at least the state cookie's max-age.
pub struct InMemoryReplayGuard {
    seen: Mutex<HashMap<String, Instant>>,
    ttl: Duration,
}

impl InMemoryReplayGuard {
    /// Create guard with the given TTL.
    pub fn new(ttl: Duration) -> Self {
        Self {
            seen: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Number of remembered states.
    pub fn len(&self) -> usize {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ReplayGuard for InMemoryReplayGuard {
    fn consume(&self, state: &str) -> bool {
        let now = Instant::now();
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        seen.retain(|_, used_at| now.duration_since(*used_at) < self.ttl);

        if seen.contains_key(state) {
            return false;
        }
        seen.insert(state.to_string(), now);
        true
    }
}
