//! One-shot broadcast cancellation.
//!
//! A signal is a channel nobody ever sends on. Firing drops the only sender,
//! which disconnects every receiver at once, so any number of workers can wait
//! on it inside a `select!` next to their request channel.

use std::sync::{Arc, Mutex, PoisonError};

use crossbeam_channel::{Receiver, Sender, TryRecvError, bounded};

#[derive(Debug)]
struct Inner {
    trigger: Mutex<Option<Sender<()>>>,
    listener: Receiver<()>,
}

/// One-shot, multi-listener cancellation signal. Never re-armed.
///
/// Clones share the same signal.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    inner: Arc<Inner>,
}

/// Per-worker cancellation; same mechanics as the global signal.
pub type CancelToken = ShutdownSignal;

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, rx) = bounded(0);
        Self {
            inner: Arc::new(Inner {
                trigger: Mutex::new(Some(tx)),
                listener: rx,
            }),
        }
    }

    /// Fire the signal. Returns `false` if it had already fired.
    pub fn fire(&self) -> bool {
        self.inner
            .trigger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
    }

    pub fn is_fired(&self) -> bool {
        is_disconnected(&self.inner.listener)
    }

    /// Receiver that becomes ready (disconnected) once the signal fires.
    pub fn listener(&self) -> Receiver<()> {
        self.inner.listener.clone()
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// True once the sending side of `rx` is gone.
pub(crate) fn is_disconnected(rx: &Receiver<()>) -> bool {
    matches!(rx.try_recv(), Err(TryRecvError::Disconnected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn fires_once() {
        let signal = ShutdownSignal::new();
        assert!(!signal.is_fired());
        assert!(signal.fire());
        assert!(!signal.fire());
        assert!(signal.is_fired());
    }

    #[test]
    fn wakes_every_listener() {
        let signal = ShutdownSignal::new();
        let waiters: Vec<_> = (0..8)
            .map(|_| {
                let rx = signal.listener();
                thread::spawn(move || {
                    matches!(
                        rx.recv_timeout(Duration::from_secs(5)),
                        Err(crossbeam_channel::RecvTimeoutError::Disconnected)
                    )
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        signal.clone().fire();

        for w in waiters {
            assert!(w.join().unwrap());
        }
    }
}
