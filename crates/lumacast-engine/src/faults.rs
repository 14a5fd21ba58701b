//! Broadcast bus for recoverable engine faults.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::distributor::TransportKind;

/// Faults are buffered per subscriber; slow subscribers lag rather than block.
const FAULT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineFault {
    /// The render backend lost its device; drawing has halted.
    ContextLost { backend: &'static str },
    /// Resources were re-acquired after a loss.
    ContextRestored { backend: &'static str },
    /// A `.cube` source failed to parse; the previous LUT stays active.
    LutParse { source: String, message: String },
    /// A distribution transport was requested that the host cannot provide.
    UnsupportedTransport { transport: TransportKind },
    /// Consecutive render failures with no presented frame.
    RenderStalled { consecutive_failures: u32 },
}

/// Cloneable publisher; every clone feeds the same subscribers.
#[derive(Debug, Clone)]
pub struct FaultBus {
    tx: broadcast::Sender<EngineFault>,
}

impl FaultBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(FAULT_CAPACITY);
        Self { tx }
    }

    /// Publish to current subscribers. Dropped silently when nobody listens.
    pub fn publish(&self, fault: EngineFault) {
        tracing::debug!(?fault, "engine fault");
        let _ = self.tx.send(fault);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineFault> {
        self.tx.subscribe()
    }
}

impl Default for FaultBus {
    fn default() -> Self {
        Self::new()
    }
}
