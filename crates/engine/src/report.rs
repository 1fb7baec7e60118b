use std::sync::atomic::{AtomicBool, Ordering};

use tracing::warn;

/// Per-run warning aggregator. Worst-case numerical fallbacks can trigger at
/// thousands of locations in one pass; each condition is reported once per
/// reporter lifetime so the log stays readable. Create a fresh reporter per
/// run to reset the state.
#[derive(Debug, Default)]
pub struct Reporter {
    zero_gradient: AtomicBool,
    zero_weight: AtomicBool,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Both the regression and the finite-difference fallback failed at some
    /// location; a zero gradient was written there.
    pub fn warn_zero_gradient(&self) {
        if !self.zero_gradient.swap(true, Ordering::Relaxed) {
            warn!(
                "gradient: no usable neighbors at one or more locations; writing zero vectors there"
            );
        }
    }

    /// A smoothing kernel row had no in-ROI support; output 0 was written.
    pub fn warn_zero_weight(&self) {
        if !self.zero_weight.swap(true, Ordering::Relaxed) {
            warn!("smoothing: zero total kernel weight at one or more locations; writing zeros there");
        }
    }

    pub fn warned_zero_gradient(&self) -> bool {
        self.zero_gradient.load(Ordering::Relaxed)
    }

    pub fn warned_zero_weight(&self) -> bool {
        self.zero_weight.load(Ordering::Relaxed)
    }
}
