//! Pause Points
//!
//! Structural maintenance never holds up a global pause. Between chunks an
//! incremental task calls [`PauseHook::pause_point`]; if a pause has been
//! requested the maintenance context arrives and blocks there until the
//! pause is released, then resumes where it left off.
//!
//! ## Pause States
//!
//! ```text
//! PAUSE_NONE (0) ─────┐
//!     │               │
//!     ▼               │
//! PAUSE_REQUESTED (1) │
//!     │               │
//!     ▼               │
//! PAUSE_REACHED (2) ──┘ (after release)
//! ```

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

pub const PAUSE_NONE: u8 = 0;
pub const PAUSE_REQUESTED: u8 = 1;
pub const PAUSE_REACHED: u8 = 2;

/// Cooperation point offered by incremental tasks between chunks
pub trait PauseHook: Send + Sync {
    /// Let a pending global pause proceed; returns once it is over
    fn pause_point(&self);
}

/// Hook for contexts with nothing to cooperate with
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPause;

impl PauseHook for NoPause {
    fn pause_point(&self) {}
}

/// Global pause coordination
///
/// The pausing side calls [`Safepoint::request`], waits for the expected
/// number of contexts with [`Safepoint::wait_for_arrivals`] and finally
/// [`Safepoint::release`]s them. Maintenance contexts reach it through
/// [`PauseHook::pause_point`].
///
/// # Examples
///
/// ```rust
/// use strtab::pause::{PauseHook, Safepoint, PAUSE_NONE};
///
/// let safepoint = Safepoint::new();
/// // No pause requested: returns immediately
/// safepoint.pause_point();
/// assert_eq!(safepoint.state(), PAUSE_NONE);
/// ```
#[derive(Debug)]
pub struct Safepoint {
    state: AtomicU8,
    arrived: AtomicUsize,
    pauses_taken: AtomicUsize,
}

impl Safepoint {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(PAUSE_NONE),
            arrived: AtomicUsize::new(0),
            pauses_taken: AtomicUsize::new(0),
        }
    }

    /// Ask every cooperating context to stop at its next pause point
    pub fn request(&self) {
        self.state.store(PAUSE_REQUESTED, Ordering::SeqCst);
    }

    /// Spin until `expected` contexts have arrived
    pub fn wait_for_arrivals(&self, expected: usize) {
        while self.arrived.load(Ordering::Acquire) < expected {
            std::thread::yield_now();
        }
    }

    /// End the pause and let every blocked context continue
    pub fn release(&self) {
        self.arrived.store(0, Ordering::Release);
        self.state.store(PAUSE_NONE, Ordering::Release);
    }

    pub fn is_requested(&self) -> bool {
        self.state.load(Ordering::Acquire) != PAUSE_NONE
    }

    pub fn state(&self) -> u8 {
        self.state.load(Ordering::Acquire)
    }

    /// Contexts currently blocked at a pause point
    pub fn arrived(&self) -> usize {
        self.arrived.load(Ordering::Acquire)
    }

    /// Number of times a pause point actually blocked
    pub fn pauses_taken(&self) -> usize {
        self.pauses_taken.load(Ordering::Relaxed)
    }

    fn block_until_released(&self) {
        self.arrived.fetch_add(1, Ordering::AcqRel);
        self.state.store(PAUSE_REACHED, Ordering::Release);
        self.pauses_taken.fetch_add(1, Ordering::Relaxed);

        while self.state.load(Ordering::Acquire) != PAUSE_NONE {
            std::thread::yield_now();
        }
    }
}

impl Default for Safepoint {
    fn default() -> Self {
        Self::new()
    }
}

impl PauseHook for Safepoint {
    fn pause_point(&self) {
        if self.is_requested() {
            self.block_until_released();
        }
    }
}
