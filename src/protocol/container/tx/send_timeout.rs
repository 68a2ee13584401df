//! Send timeout of a Tx container: the latest tick at which a partially
//! filled container has to leave.

/// Down-counter in main-function ticks (0 = stopped).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SendTimeout(u16);

impl SendTimeout {
    pub const STOPPED: Self = Self(0);

    /// Arm with `ticks`, or shorten a running timeout to `ticks`.
    ///
    /// A running timeout is never extended; `ticks == 0` is ignored.
    pub fn start_or_shorten(&mut self, ticks: u16) {
        if ticks == 0 {
            return;
        }
        if self.0 == 0 || ticks < self.0 {
            self.0 = ticks;
        }
    }

    pub fn stop(&mut self) {
        self.0 = 0;
    }

    pub fn is_running(&self) -> bool {
        self.0 > 0
    }

    /// Remaining ticks.
    pub fn remaining(&self) -> u16 {
        self.0
    }

    /// Advance by one tick. Returns `true` on the tick the timeout expires
    /// (counter at 1), after which it reads 0.
    pub fn tick(&mut self) -> bool {
        if self.0 == 0 {
            return false;
        }
        let expired = self.0 == 1;
        self.0 -= 1;
        expired
    }
}
