//! Periodic timer driving the main functions.

/// Asynchronous source of main-function ticks.
pub trait MainFunctionTimer {
    /// Wait until the next tick is due.
    fn next_tick<'a>(&'a mut self) -> impl core::future::Future<Output = ()> + 'a;
}

impl MainFunctionTimer for embassy_time::Ticker {
    fn next_tick<'a>(&'a mut self) -> impl core::future::Future<Output = ()> + 'a {
        self.next()
    }
}
