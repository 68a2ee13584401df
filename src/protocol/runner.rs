//! Async driver of the main functions.
use core::future::Future;

use embassy_sync::blocking_mutex::raw::RawMutex;
use futures_util::future::{select, Either};
use futures_util::pin_mut;

use crate::ipdum::IpduM;
use crate::protocol::traits::{
    diagnostics::DiagnosticSink, main_function_timer::MainFunctionTimer, pdu_router::PduRouter,
};

impl<'a, M: RawMutex, R: PduRouter, D: DiagnosticSink> IpduM<'a, M, R, D> {
    /// Run `main_function(partition)` on every tick of `timer` until `stop`
    /// completes.
    ///
    /// Returns the number of main-function cycles executed.
    ///
    /// ```rust,ignore
    /// let mut ticker = Ticker::every(Duration::from_millis(5));
    /// ipdum.run_main_function(0, &mut ticker, shutdown.wait()).await;
    /// ```
    pub async fn run_main_function<T, S>(&self, partition: u8, timer: &mut T, stop: S) -> u32
    where
        T: MainFunctionTimer,
        S: Future<Output = ()>,
    {
        pin_mut!(stop);
        let mut cycles = 0u32;

        loop {
            let tick = timer.next_tick();
            pin_mut!(tick);

            match select(stop.as_mut(), tick).await {
                Either::Left(_) => {
                    #[cfg(feature = "defmt")]
                    defmt::debug!("IpduM partition {} stopped after {} cycles", partition, cycles);
                    return cycles;
                }
                Either::Right(_) => {
                    self.main_function(partition);
                    cycles = cycles.wrapping_add(1);
                }
            }
        }
    }
}
