//! Latest-request-wins token tracking
//!
//! Validation and persistence calls can overlap. Each call takes a token
//! before suspending; when it settles, its response is applied only if no
//! newer token has been issued in the meantime.

use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque, monotonically increasing request token
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestToken(u64);

impl RequestToken {
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Issues tokens and answers "is this still the latest?"
#[derive(Debug, Default)]
pub struct RequestTracker {
    latest: AtomicU64,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a new token, superseding every earlier one
    pub fn issue(&self) -> RequestToken {
        RequestToken(self.latest.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Whether `token` is the most recently issued one
    pub fn is_latest(&self, token: RequestToken) -> bool {
        self.latest.load(Ordering::SeqCst) == token.0
    }

    /// Supersede every outstanding token without starting a new request
    pub fn invalidate(&self) {
        self.latest.fetch_add(1, Ordering::SeqCst);
    }
}
