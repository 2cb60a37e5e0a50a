use std::{io::ErrorKind, time::Duration};

use anyhow::{Context as _, Error};
use mio::{event::Source, Events, Interest, Poll, Token, Waker};
use tracing::{event, Level};

use crate::Shutdown;

/// Token reserved for the shutdown waker, never handed to a `Dispatch`.
pub const SHUTDOWN_TOKEN: Token = Token(usize::MAX - 1);

/// Owner of the mio poll instance.
///
/// Sources are registered through this registry, with tokens chosen by the caller.
/// The registry is created before the event loop and handed to it by mutable reference.
pub struct Registry {
    poll: Poll,
    shutdown: Shutdown,
}

impl Registry {
    pub fn new() -> Result<Self, Error> {
        let poll = Poll::new().context("failed to create poll")?;

        let waker = Waker::new(poll.registry(), SHUTDOWN_TOKEN)
            .context("failed to create shutdown waker")?;
        let shutdown = Shutdown::new(waker);

        Ok(Self { poll, shutdown })
    }

    /// Get a handle that can stop the event loop driven by this registry.
    pub fn shutdown(&self) -> Shutdown {
        self.shutdown.clone()
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown.is_triggered()
    }

    pub(crate) fn poll(
        &mut self,
        events: &mut Events,
        timeout: Option<Duration>,
    ) -> Result<(), Error> {
        loop {
            match self.poll.poll(events, timeout) {
                Ok(()) => return Ok(()),
                // A signal arrived while waiting, this is not a failure
                Err(error) if error.kind() == ErrorKind::Interrupted => {
                    event!(Level::TRACE, "poll interrupted, retrying");
                }
                Err(error) => return Err(Error::new(error).context("failed to poll")),
            }
        }
    }

    pub fn register<S>(&self, source: &mut S, token: Token, interest: Interest) -> Result<(), Error>
    where
        S: Source + ?Sized,
    {
        self.poll
            .registry()
            .register(source, token, interest)
            .context("failed to register source")?;
        Ok(())
    }

    pub fn reregister<S>(
        &self,
        source: &mut S,
        token: Token,
        interest: Interest,
    ) -> Result<(), Error>
    where
        S: Source + ?Sized,
    {
        self.poll
            .registry()
            .reregister(source, token, interest)
            .context("failed to reregister source")?;
        Ok(())
    }

    pub fn deregister<S>(&self, source: &mut S) -> Result<(), Error>
    where
        S: Source + ?Sized,
    {
        self.poll
            .registry()
            .deregister(source)
            .context("failed to deregister source")?;
        Ok(())
    }
}
