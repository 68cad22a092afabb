//! Poll orchestration: the start/stop lifecycle around repeated scrape cycles.
//!
//! - [`Poller`] owns the cycle loop, the subscriber fan-out and the published registry
//! - [`PollerBuilder`] wires the store, the source and the subscribers
//! - [`PollerState`] is observable through [`Poller::watch_state`]
//! - [`wait_for_shutdown_signal`] backs [`Poller::run_until_shutdown`]

mod builder;
#[allow(clippy::module_inception)]
mod poller;
mod shutdown;
mod state;

pub use builder::PollerBuilder;
pub use poller::Poller;
pub use shutdown::wait_for_shutdown_signal;
pub use state::PollerState;
