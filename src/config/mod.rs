//! Desired-state configuration: degrees, self-role groups, course
//! entitlements and the bot's own settings.

pub mod error;
pub mod loader;
pub mod settings;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_catalog, load_settings};
pub use settings::{BotSettings, ChannelNames, RoleNames};
pub use types::*;
