#![deny(unsafe_code)]

/// Presence session wiring.
///
/// Owns the indicator registry, the realtime hub and the render surfaces for one
/// signed-in session.
pub mod app;
/// Render surfaces fed by registry change notifications.
pub mod chat;
/// Settings persistence.
pub mod settings;
