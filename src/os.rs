//! Thin wrappers over the runtime's synchronization primitives.
//!
//! The flag group mirrors an RTOS event-flag object: interrupt-like
//! contexts (driver threads, timer callbacks) post bits synchronously and
//! never block; pipeline tasks pend on a mask with a timeout.

use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::Notify;

use crate::errors::OsError;

/// Bitwise event-flag group.
///
/// `post` is callable from any context and never blocks; `pend_any`
/// suspends the calling task until any bit of the mask is set, consuming
/// the matched bits on return.
#[derive(Debug, Default)]
pub struct FlagGroup {
    bits: Mutex<u32>,
    notify: Notify,
}

impl FlagGroup {
    pub fn new() -> Self {
        Self {
            bits: Mutex::new(0),
            notify: Notify::new(),
        }
    }

    /// Sets the given bits and wakes every pending task.
    pub fn post(&self, bits: u32) {
        let mut state = self.bits.lock().expect("flag group poisoned");
        *state |= bits;
        drop(state);
        self.notify.notify_waiters();
    }

    /// Clears the given bits without waking anyone.
    pub fn clear(&self, bits: u32) {
        let mut state = self.bits.lock().expect("flag group poisoned");
        *state &= !bits;
    }

    /// Returns the currently set bits without consuming them.
    pub fn peek(&self) -> u32 {
        *self.bits.lock().expect("flag group poisoned")
    }

    /// Waits until any bit of `mask` is set, consuming and returning the
    /// matched bits. Fails with [`OsError::PendTimeout`] when the timeout
    /// elapses first.
    pub async fn pend_any(&self, mask: u32, timeout: Duration) -> Result<u32, OsError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            // The Notified future must exist before the state check so a
            // post between check and await is not lost.
            let notified = self.notify.notified();

            {
                let mut state = self.bits.lock().expect("flag group poisoned");
                let hit = *state & mask;
                if hit != 0 {
                    *state &= !hit;
                    return Ok(hit);
                }
            }

            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Err(OsError::PendTimeout(timeout));
            }
            let _ = tokio::time::timeout(remaining, notified).await;
        }
    }
}
