use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::directory::{ChannelId, MessageId, RoleId};

/// What a menu message stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MenuTarget {
    /// Index into `GuildLayout::degrees`
    Degree(usize),
    SelfRole(RoleId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MenuEntry {
    pub channel: ChannelId,
    pub target: MenuTarget,
}

/// Message id → entity, built by the reconciler and read by the engine.
#[derive(Debug, Clone, Default)]
pub struct MenuMapping {
    entries: HashMap<MessageId, MenuEntry>,
    by_target: HashMap<MenuTarget, MessageId>,
}

impl MenuMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `message` to `entry`. A message or a target that is already
    /// bound is refused, which keeps the relation one-to-one.
    pub fn bind(&mut self, message: MessageId, entry: MenuEntry) -> bool {
        if self.entries.contains_key(&message) || self.by_target.contains_key(&entry.target) {
            return false;
        }
        self.entries.insert(message, entry);
        self.by_target.insert(entry.target, message);
        true
    }

    pub fn lookup(&self, message: MessageId) -> Option<MenuEntry> {
        self.entries.get(&message).copied()
    }

    pub fn message_for(&self, target: MenuTarget) -> Option<MessageId> {
        self.by_target.get(&target).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Handle shared between the reconciler (writer) and the engine (reader).
pub type SharedMapping = Arc<RwLock<MenuMapping>>;
