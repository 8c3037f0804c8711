//! `trellis-events` — the per-message event bus and node membership.
//!
//! Every message id gets its own topic (`events:{messageId}`); all
//! publications for a turn flow through one [`TurnPublisher`] so the
//! per-topic timestamp order is monotonic even under same-millisecond
//! bursts. Tool invocations get a [`ToolEventPublisher`] whose `toolId`
//! is fixed at construction.

mod bus;
mod cancel;
mod heartbeat;
mod publisher;

pub use bus::EventBus;
pub use cancel::CancelToken;
pub use heartbeat::{active_nodes, Heartbeat, HeartbeatHandle};
pub use publisher::{ToolEventPublisher, TurnPublisher};
