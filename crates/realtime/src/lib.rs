#![deny(unsafe_code)]

/// Registry adapter: validation, self-exclusion and teardown.
pub mod bridge;
pub mod error;
/// Wire events and their validated form.
pub mod event;
/// Multi-subscriber event emitter.
pub mod hub;

pub use bridge::{BRIDGE_SUBSCRIBER_NAME, BridgeOutcome, IndicatorBridge, apply_event};
pub use error::{RealtimeError, RealtimeResult};
pub use event::{RealtimeEvent, Signal};
pub use hub::{EventHub, Subscription};
