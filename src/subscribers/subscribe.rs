//! # Core subscriber trait.
//!
//! Implementations are driven by the supervisor's listener task, one event
//! at a time, in publish order. They should avoid blocking the runtime;
//! slow work belongs behind the subscriber's own buffering.

use async_trait::async_trait;

use crate::events::Event;

/// Contract for event subscribers.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handles a single event.
    async fn on_event(&self, event: &Event);

    /// Human-readable name for logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}
