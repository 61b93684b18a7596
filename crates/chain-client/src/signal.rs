// chain-client/src/signal.rs

use tokio::sync::watch;

/// Observer side of a chain's rollback counter.
///
/// The epoch increases every time the chain state is rolled back
/// (reset to genesis or reverted to a snapshot). Anything caching
/// chain-derived values compares epochs to detect staleness.
#[derive(Debug, Clone)]
pub struct ResetSignal {
    rx: watch::Receiver<u64>,
}

impl ResetSignal {
    /// Signal for chains that can never be rolled back
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(0);
        Self { rx }
    }

    /// Current rollback epoch
    pub fn epoch(&self) -> u64 {
        *self.rx.borrow()
    }
}

/// Producer side, owned by the chain backend
#[derive(Debug)]
pub struct ResetNotifier {
    tx: watch::Sender<u64>,
}

impl ResetNotifier {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx }
    }

    pub fn subscribe(&self) -> ResetSignal {
        ResetSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Record a rollback
    pub fn notify(&self) {
        self.tx.send_modify(|epoch| *epoch += 1);
        tracing::debug!("Chain rollback, reset epoch now {}", *self.tx.borrow());
    }

    pub fn epoch(&self) -> u64 {
        *self.tx.borrow()
    }
}

impl Default for ResetNotifier {
    fn default() -> Self {
        Self::new()
    }
}
