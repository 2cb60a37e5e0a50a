use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use mio::Waker;
use tracing::{event, Level};

/// Cancellation token for a running event loop.
///
/// Cloneable and safe to trigger from any thread. The loop observes the token once per poll
/// cycle, the waker makes sure a poll that is waiting returns promptly.
#[derive(Clone)]
pub struct Shutdown {
    triggered: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl Shutdown {
    pub(crate) fn new(waker: Waker) -> Self {
        Self {
            triggered: Arc::new(AtomicBool::new(false)),
            waker: Arc::new(waker),
        }
    }

    /// Request the event loop to tear down all connections and return.
    pub fn trigger(&self) {
        event!(Level::DEBUG, "shutdown requested");
        self.triggered.store(true, Ordering::SeqCst);

        if let Err(error) = self.waker.wake() {
            // The loop still sees the flag when its poll timeout expires
            event!(Level::WARN, ?error, "failed to wake event loop");
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }
}
