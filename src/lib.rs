pub mod backends;
pub mod catalog;
pub mod config_loader;
pub mod console;
pub mod detector;
pub mod dialog;
pub mod error;
pub mod face;
pub mod orchestrator;
pub mod playback;
pub mod positions;
pub mod presence;
pub mod session;
pub mod signage;
