//! Outcome publication port
//!
//! Publishing is fire-and-forget from the engine's point of view. Delivery
//! guarantees belong to whatever sits behind the [`OutcomePublisher`].

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::allotment::AllotmentOutcome;
use crate::error::{AllotError, AllotResult};

/// Outcome publisher trait
#[async_trait]
pub trait OutcomePublisher: Send + Sync {
    /// Emit one outcome event
    ///
    /// # Returns
    /// * `Ok(())` - Event handed to the transport
    /// * `Err(AllotError::PublicationFailure)` - Event was not emitted
    async fn publish(&self, outcome: &AllotmentOutcome) -> AllotResult<()>;
}

/// Publisher backed by an unbounded tokio channel
pub struct ChannelPublisher {
    sender: mpsc::UnboundedSender<AllotmentOutcome>,
}

impl ChannelPublisher {
    /// Create a publisher and the receiving half for downstream consumers
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AllotmentOutcome>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl OutcomePublisher for ChannelPublisher {
    async fn publish(&self, outcome: &AllotmentOutcome) -> AllotResult<()> {
        self.sender
            .send(outcome.clone())
            .map_err(|_| AllotError::PublicationFailure {
                ipo_id: outcome.ipo_id.clone(),
                message: "outcome receiver closed".to_string(),
            })
    }
}
