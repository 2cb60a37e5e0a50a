use std::time::Duration;

use anyhow::Error;
use mio::{event::Event, Events, Token};
use tracing::{event, instrument, Level};

use crate::{Registry, SHUTDOWN_TOKEN};

/// Receiver of readiness events from the event loop.
pub trait Dispatch {
    /// Handle one readiness event.
    ///
    /// Returning `Err` stops the event loop, so only failures that affect the whole service
    /// should be returned. Failures of a single source should be handled locally.
    fn dispatch(&mut self, registry: &Registry, ready: Ready) -> Result<(), Error>;

    /// Called once after shutdown was requested, before the event loop returns.
    fn shutdown(&mut self, registry: &Registry) -> Result<(), Error>;
}

/// Readiness state of one registered source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ready {
    pub token: Token,
    pub readable: bool,
    pub writable: bool,
    /// Both directions of the source are closed.
    pub hangup: bool,
    pub error: bool,
}

impl Ready {
    fn from_event(event: &Event) -> Self {
        Self {
            token: event.token(),
            readable: event.is_readable(),
            writable: event.is_writable(),
            hangup: event.is_read_closed() && event.is_write_closed(),
            error: event.is_error(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoopOptions {
    /// Maximum amount of events processed per poll cycle.
    pub events_capacity: usize,
    /// Maximum time the loop waits idle before checking for shutdown again.
    pub timeout: Option<Duration>,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self {
            events_capacity: 128,
            timeout: Some(Duration::from_secs(1)),
        }
    }
}

/// Run the poll loop until shutdown is triggered on the registry.
#[instrument("mio-event-loop", skip_all)]
pub fn run_event_loop<D>(
    registry: &mut Registry,
    dispatch: &mut D,
    options: &LoopOptions,
) -> Result<(), Error>
where
    D: Dispatch,
{
    let mut events = Events::with_capacity(options.events_capacity);

    loop {
        if registry.is_shutdown() {
            event!(Level::DEBUG, "shutting down event loop");
            dispatch.shutdown(registry)?;
            return Ok(());
        }

        registry.poll(&mut events, options.timeout)?;

        for event in events.iter() {
            // The waker only exists to interrupt the poll
            if event.token() == SHUTDOWN_TOKEN {
                continue;
            }

            let ready = Ready::from_event(event);
            event!(Level::TRACE, ?ready, "dispatching ready event");
            dispatch.dispatch(registry, ready)?;
        }
    }
}
