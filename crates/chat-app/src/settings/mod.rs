pub mod state;

pub use state::{PresenceSettings, SettingsError, SettingsStore};
