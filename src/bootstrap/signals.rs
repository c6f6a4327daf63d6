//! SIGTERM/SIGINT capture for forwarding to the server child.
//!
//! Uses the `signal-hook` crate for safe signal registration. The wait loop
//! polls [`SignalHandler::take_pending`] rather than blocking on signals.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use signal_hook::consts::{SIGINT, SIGTERM};

/// Signal the bootstrapper relays to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardSignal {
    Terminate,
    Interrupt,
}

/// Signal flags shared between the OS handler and the wait loop.
#[derive(Clone, Default)]
pub struct SignalHandler {
    terminate_flag: Arc<AtomicBool>,
    interrupt_flag: Arc<AtomicBool>,
}

impl SignalHandler {
    /// Create a handler and register OS signal hooks.
    ///
    /// Registration is best-effort; failures are logged to stderr but not fatal.
    #[must_use]
    pub fn install() -> Self {
        let handler = Self::default();
        if let Err(e) = signal_hook::flag::register(SIGTERM, Arc::clone(&handler.terminate_flag)) {
            eprintln!("[ORB-SIGNAL] failed to register SIGTERM: {e}");
        }
        if let Err(e) = signal_hook::flag::register(SIGINT, Arc::clone(&handler.interrupt_flag)) {
            eprintln!("[ORB-SIGNAL] failed to register SIGINT: {e}");
        }
        handler
    }

    /// Take (and clear) the next pending signal. SIGTERM wins over SIGINT.
    pub fn take_pending(&self) -> Option<ForwardSignal> {
        if self.terminate_flag.swap(false, Ordering::Relaxed) {
            Some(ForwardSignal::Terminate)
        } else if self.interrupt_flag.swap(false, Ordering::Relaxed) {
            Some(ForwardSignal::Interrupt)
        } else {
            None
        }
    }

    /// Programmatically raise a flag (tests, error escalation).
    pub fn request(&self, signal: ForwardSignal) {
        match signal {
            ForwardSignal::Terminate => self.terminate_flag.store(true, Ordering::Relaxed),
            ForwardSignal::Interrupt => self.interrupt_flag.store(true, Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_signal_is_taken_once() {
        let handler = SignalHandler::default();
        assert_eq!(handler.take_pending(), None);
        handler.request(ForwardSignal::Interrupt);
        assert_eq!(handler.take_pending(), Some(ForwardSignal::Interrupt));
        assert_eq!(handler.take_pending(), None);
    }

    #[test]
    fn terminate_takes_priority() {
        let handler = SignalHandler::default();
        handler.request(ForwardSignal::Interrupt);
        handler.request(ForwardSignal::Terminate);
        assert_eq!(handler.take_pending(), Some(ForwardSignal::Terminate));
        assert_eq!(handler.take_pending(), Some(ForwardSignal::Interrupt));
    }

    #[test]
    fn clones_share_flags() {
        let handler = SignalHandler::default();
        let clone = handler.clone();
        clone.request(ForwardSignal::Terminate);
        assert_eq!(handler.take_pending(), Some(ForwardSignal::Terminate));
    }
}
