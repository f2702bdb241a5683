use tokio::sync::mpsc;

use crate::event::SampleTime;
use crate::pdu::PackagedEvent;

/// Signals published downstream by the sink and its packaging handler.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// New head position after a cycle.
    SamplesConsumed(SampleTime),
    /// Metadata plus per-channel payload of one handled event.
    Event(PackagedEvent),
    /// No more pending work; downstream may tear down.
    ShutdownReady,
}

/// Optional outbound port. Sending never blocks, and a missing or closed
/// receiver is not an error.
#[derive(Debug, Clone, Default)]
pub struct OutboundPort {
    tx: Option<mpsc::UnboundedSender<Outbound>>,
}

impl OutboundPort {
    pub fn new(tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn disconnected() -> Self {
        Self { tx: None }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn publish(&self, signal: Outbound) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(signal);
        }
    }
}
