//! Readiness-driven event loop and non-blocking I/O helpers for ember.
//!
//! The loop is single-threaded: every readiness event reported by the underlying `mio::Poll`
//! is handed to one `Dispatch` implementation, in the order the poll reported them.

mod event_loop;
pub mod net;
mod registry;
mod shutdown;

pub use self::{
    event_loop::{run_event_loop, Dispatch, LoopOptions, Ready},
    registry::{Registry, SHUTDOWN_TOKEN},
    shutdown::Shutdown,
};
