//! Capability interfaces over the chat server.
//!
//! The core never talks to the network directly: it sees the server only
//! through these three traits. `discord` implements them over REST,
//! `memory` implements them in-process.

pub mod discord;
pub mod memory;
pub mod types;

pub use types::*;

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{method} {path} returned {status}: {body}")]
    Status {
        method: String,
        path: String,
        status: u16,
        body: String,
    },

    #[error("still rate limited on {path} after {attempts} attempts")]
    RateLimited { path: String, attempts: u32 },

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("unknown {kind} {id}")]
    Unknown { kind: &'static str, id: u64 },

    #[error("directory refused operation: {0}")]
    Refused(String),
}

pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Role membership. Always read live; callers never cache the result
/// beyond the handler that asked for it.
#[async_trait]
pub trait RoleDirectory: Send + Sync {
    async fn list_roles(&self) -> DirectoryResult<Vec<RoleInfo>>;
    async fn add(&self, member: MemberId, role: RoleId) -> DirectoryResult<()>;
    async fn remove(&self, member: MemberId, role: RoleId) -> DirectoryResult<()>;
    async fn list_held(&self, member: MemberId) -> DirectoryResult<HashSet<RoleId>>;
    async fn holders(&self, role: RoleId) -> DirectoryResult<Vec<MemberId>>;
}

#[async_trait]
pub trait ChannelDirectory: Send + Sync {
    async fn list_channels(&self) -> DirectoryResult<Vec<ChannelInfo>>;
    async fn channel(&self, id: ChannelId) -> DirectoryResult<Option<ChannelInfo>>;
    /// Full history, oldest first.
    async fn history(&self, channel: ChannelId) -> DirectoryResult<Vec<Message>>;
    async fn purge(&self, channel: ChannelId) -> DirectoryResult<()>;
    async fn send(&self, channel: ChannelId, content: &str) -> DirectoryResult<MessageId>;
    async fn delete_message(&self, channel: ChannelId, message: MessageId) -> DirectoryResult<()>;
    async fn create(&self, channel: NewChannel) -> DirectoryResult<ChannelId>;
    async fn set_overwrite(&self, channel: ChannelId, overwrite: Overwrite) -> DirectoryResult<()>;
    async fn remove_overwrite(&self, channel: ChannelId, target: OverwriteTarget) -> DirectoryResult<()>;
    /// Replaces the topic and the whole overwrite list in one edit.
    async fn replace_permissions(
        &self,
        channel: ChannelId,
        topic: &str,
        overwrites: &[Overwrite],
    ) -> DirectoryResult<()>;
    async fn delete(&self, channel: ChannelId) -> DirectoryResult<()>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn add_reaction(&self, channel: ChannelId, message: MessageId, emoji: &str) -> DirectoryResult<()>;
    async fn remove_reaction(
        &self,
        channel: ChannelId,
        message: MessageId,
        emoji: &str,
        member: MemberId,
    ) -> DirectoryResult<()>;
    async fn fetch(&self, channel: ChannelId, message: MessageId) -> DirectoryResult<Option<Message>>;
}

/// Handles to the three capabilities, cloned into every handler.
#[derive(Clone)]
pub struct Directories {
    pub roles: Arc<dyn RoleDirectory>,
    pub channels: Arc<dyn ChannelDirectory>,
    pub messages: Arc<dyn MessageStore>,
}

impl Directories {
    /// Wires all three capabilities to one backend.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: RoleDirectory + ChannelDirectory + MessageStore + 'static,
    {
        Self {
            roles: backend.clone(),
            channels: backend.clone(),
            messages: backend,
        }
    }
}
