pub mod commands;
pub mod config;
pub mod courses;
pub mod directory;
pub mod gateway;
pub mod kernel;
pub mod roles;
pub mod voice;

pub use kernel::reactor::{Dispatcher, Reactor};
