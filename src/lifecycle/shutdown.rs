//! Stop signal for background timers.

use tokio::sync::broadcast;

/// Broadcast stop signal shared by a component and its timer tasks.
///
/// Each timer subscribes when it is spawned, so a component can be stopped
/// and started again: a new timer never sees an old trigger.
#[derive(Debug)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Subscribe to the stop signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Signal every current subscriber. Synchronous; never blocks.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Number of timer tasks still listening.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
