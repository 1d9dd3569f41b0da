pub mod lifecycle;
pub mod naming;

pub use lifecycle::VoiceChannelLifecycle;
pub use naming::shadow_channel_name;
