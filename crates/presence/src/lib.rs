#![deny(unsafe_code)]

//! Ephemeral typing/recording indicators for chat threads.
//!
//! The [`IndicatorRegistry`] keeps the latest activity per thread and user, expires it
//! when the sender goes quiet, and notifies subscribers after every change. Render
//! surfaces read it through [`IndicatorView`].

pub mod error;
pub mod events;
pub mod ids;
pub mod indicator;
pub mod registry;
pub mod view;

pub use error::{PresenceError, PresenceResult};
pub use events::{ChangeKind, RegistryChange};
pub use ids::{ThreadId, UserId};
pub use indicator::{ActivityMode, Indicator, IndicatorPatch};
pub use registry::{
    DEFAULT_CHANGE_BUFFER, DEFAULT_RECORDING_TIMEOUT, DEFAULT_TYPING_TIMEOUT, IndicatorRegistry,
    RegistryConfig,
};
pub use view::{ActivitySummary, DirectoryNames, IndicatorView, NameResolver, display_name};
