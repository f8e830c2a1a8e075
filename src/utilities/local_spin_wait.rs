use std::hint;
use std::thread;

/// Spin waiter used by build workers polling the shared task stack.
///
/// Spins with exponentially growing bursts for a few rounds, then falls back to yielding the timeslice.
pub(crate) struct LocalSpinWait {
    pub wait_count: u32,
}

impl LocalSpinWait {
    pub const YIELD_THRESHOLD: u32 = 3;

    #[inline(always)]
    pub fn new() -> Self {
        Self { wait_count: 0 }
    }

    #[inline(always)]
    pub fn spin_once(&mut self) {
        if self.wait_count >= Self::YIELD_THRESHOLD {
            thread::yield_now();
        } else {
            let spin_count = 1 << self.wait_count;
            for _ in 0..spin_count {
                hint::spin_loop();
            }
            self.wait_count += 1;
        }
    }

    /// Restarts the spin schedule after useful work was found.
    #[inline(always)]
    pub fn reset(&mut self) {
        self.wait_count = 0;
    }
}
