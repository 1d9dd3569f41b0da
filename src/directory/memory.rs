//! In-process guild implementing every directory capability.
//!
//! Backs the integration tests: it records operation counters, can inject
//! failures and can yield inside calls so that concurrently dispatched
//! handlers really interleave at their suspension points.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use super::{
    ChannelDirectory, ChannelId, ChannelInfo, ChannelKind, DirectoryError, DirectoryResult, MemberId,
    Message, MessageId, MessageStore, NewChannel, Overwrite, OverwriteTarget, RoleDirectory, RoleId,
    RoleInfo,
};

pub const EVERYONE: &str = "@everyone";

/// Directory-call tallies, used to assert side-effect freedom.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpCounters {
    pub sends: usize,
    pub message_deletes: usize,
    pub purges: usize,
    pub reactions_added: usize,
    pub reactions_removed: usize,
    pub channels_created: usize,
    pub channels_deleted: usize,
    pub role_adds: usize,
    pub role_removes: usize,
}

#[derive(Debug, Clone)]
struct StoredMessage {
    message: Message,
    reactions: BTreeMap<String, BTreeSet<MemberId>>,
}

#[derive(Debug, Clone)]
struct StoredChannel {
    info: ChannelInfo,
    topic: Option<String>,
    overwrites: Vec<Overwrite>,
    messages: Vec<StoredMessage>,
}

#[derive(Debug, Default)]
struct GuildState {
    next_id: u64,
    roles: Vec<RoleInfo>,
    member_roles: HashMap<MemberId, HashSet<RoleId>>,
    channels: BTreeMap<ChannelId, StoredChannel>,
    counters: OpCounters,
    failing_channels: HashSet<ChannelId>,
    failing_roles: HashSet<RoleId>,
    sends_before_failure: Option<usize>,
}

impl GuildState {
    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn check_role(&self, role: RoleId) -> DirectoryResult<()> {
        if self.failing_roles.contains(&role) {
            return Err(DirectoryError::Refused(format!("role {} is unavailable", role)));
        }
        Ok(())
    }

    fn channel_mut(&mut self, id: ChannelId) -> DirectoryResult<&mut StoredChannel> {
        if self.failing_channels.contains(&id) {
            return Err(DirectoryError::Refused(format!("channel {} is unavailable", id)));
        }
        self.channels
            .get_mut(&id)
            .ok_or(DirectoryError::Unknown { kind: "channel", id: id.0 })
    }
}

pub struct MemoryGuild {
    bot_user: MemberId,
    everyone: RoleId,
    yield_inside_calls: bool,
    state: Mutex<GuildState>,
}

impl MemoryGuild {
    pub fn new() -> Self {
        let mut state = GuildState {
            next_id: 1000,
            ..GuildState::default()
        };
        let everyone = RoleId(state.allocate());
        state.roles.push(RoleInfo { id: everyone, name: EVERYONE.to_string() });
        let bot_user = MemberId(state.allocate());

        Self {
            bot_user,
            everyone,
            yield_inside_calls: false,
            state: Mutex::new(state),
        }
    }

    /// Makes every async call yield once before touching state.
    pub fn with_interleaving(mut self) -> Self {
        self.yield_inside_calls = true;
        self
    }

    fn state(&self) -> MutexGuard<'_, GuildState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn suspend(&self) {
        if self.yield_inside_calls {
            tokio::task::yield_now().await;
        }
    }

    pub fn bot_user(&self) -> MemberId {
        self.bot_user
    }

    pub fn everyone_role(&self) -> RoleId {
        self.everyone
    }

    pub fn add_role(&self, name: &str) -> RoleId {
        let mut state = self.state();
        let id = RoleId(state.allocate());
        state.roles.push(RoleInfo { id, name: name.to_string() });
        id
    }

    pub fn add_channel(&self, name: &str, kind: ChannelKind, parent: Option<ChannelId>) -> ChannelId {
        let mut state = self.state();
        let id = ChannelId(state.allocate());
        state.channels.insert(
            id,
            StoredChannel {
                info: ChannelInfo { id, name: name.to_string(), kind, parent },
                topic: None,
                overwrites: Vec::new(),
                messages: Vec::new(),
            },
        );
        id
    }

    pub fn new_member(&self) -> MemberId {
        let mut state = self.state();
        let id = MemberId(state.allocate());
        state.member_roles.insert(id, HashSet::new());
        id
    }

    /// Grants a role without counting it as a directory call.
    pub fn grant(&self, member: MemberId, role: RoleId) {
        self.state().member_roles.entry(member).or_default().insert(role);
    }

    pub fn roles_of(&self, member: MemberId) -> HashSet<RoleId> {
        self.state().member_roles.get(&member).cloned().unwrap_or_default()
    }

    /// Posts a message as an arbitrary author, bypassing counters.
    pub fn post_as(&self, channel: ChannelId, author: MemberId, content: &str) -> MessageId {
        let mut state = self.state();
        let id = MessageId(state.allocate());
        if let Some(stored) = state.channels.get_mut(&channel) {
            stored.messages.push(StoredMessage {
                message: Message { id, channel, author, content: content.to_string() },
                reactions: BTreeMap::new(),
            });
        }
        id
    }

    /// Deletes a message the way a moderator would, bypassing counters.
    pub fn remove_message(&self, channel: ChannelId, message: MessageId) {
        if let Some(stored) = self.state().channels.get_mut(&channel) {
            stored.messages.retain(|m| m.message.id != message);
        }
    }

    /// Records a member's reaction the way the server would before
    /// delivering the event.
    pub fn react_as(&self, channel: ChannelId, message: MessageId, emoji: &str, member: MemberId) {
        let mut state = self.state();
        if let Some(stored) = state.channels.get_mut(&channel) {
            if let Some(msg) = stored.messages.iter_mut().find(|m| m.message.id == message) {
                msg.reactions.entry(emoji.to_string()).or_default().insert(member);
            }
        }
    }

    pub fn messages(&self, channel: ChannelId) -> Vec<Message> {
        self.state()
            .channels
            .get(&channel)
            .map(|c| c.messages.iter().map(|m| m.message.clone()).collect())
            .unwrap_or_default()
    }

    pub fn reactors(&self, channel: ChannelId, message: MessageId, emoji: &str) -> BTreeSet<MemberId> {
        self.state()
            .channels
            .get(&channel)
            .and_then(|c| c.messages.iter().find(|m| m.message.id == message))
            .and_then(|m| m.reactions.get(emoji).cloned())
            .unwrap_or_default()
    }

    pub fn channel_named(&self, name: &str) -> Option<ChannelInfo> {
        self.state()
            .channels
            .values()
            .find(|c| c.info.name == name)
            .map(|c| c.info.clone())
    }

    pub fn has_channel(&self, id: ChannelId) -> bool {
        self.state().channels.contains_key(&id)
    }

    pub fn overwrites(&self, channel: ChannelId) -> Vec<Overwrite> {
        self.state()
            .channels
            .get(&channel)
            .map(|c| c.overwrites.clone())
            .unwrap_or_default()
    }

    pub fn topic(&self, channel: ChannelId) -> Option<String> {
        self.state().channels.get(&channel).and_then(|c| c.topic.clone())
    }

    pub fn counters(&self) -> OpCounters {
        self.state().counters
    }

    pub fn reset_counters(&self) {
        self.state().counters = OpCounters::default();
    }

    /// Every later call touching this channel fails.
    pub fn fail_channel(&self, channel: ChannelId) {
        self.state().failing_channels.insert(channel);
    }

    /// Every later grant or revoke of this role fails.
    pub fn fail_role(&self, role: RoleId) {
        self.state().failing_roles.insert(role);
    }

    /// Allows `n` more sends, then every send fails.
    pub fn fail_sends_after(&self, n: usize) {
        self.state().sends_before_failure = Some(n);
    }

    pub fn clear_failures(&self) {
        let mut state = self.state();
        state.failing_channels.clear();
        state.failing_roles.clear();
        state.sends_before_failure = None;
    }
}

impl Default for MemoryGuild {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RoleDirectory for MemoryGuild {
    async fn list_roles(&self) -> DirectoryResult<Vec<RoleInfo>> {
        self.suspend().await;
        Ok(self.state().roles.clone())
    }

    async fn add(&self, member: MemberId, role: RoleId) -> DirectoryResult<()> {
        self.suspend().await;
        let mut state = self.state();
        state.check_role(role)?;
        state.counters.role_adds += 1;
        state.member_roles.entry(member).or_default().insert(role);
        Ok(())
    }

    async fn remove(&self, member: MemberId, role: RoleId) -> DirectoryResult<()> {
        self.suspend().await;
        let mut state = self.state();
        state.check_role(role)?;
        state.counters.role_removes += 1;
        if let Some(held) = state.member_roles.get_mut(&member) {
            held.remove(&role);
        }
        Ok(())
    }

    async fn list_held(&self, member: MemberId) -> DirectoryResult<HashSet<RoleId>> {
        self.suspend().await;
        Ok(self.state().member_roles.get(&member).cloned().unwrap_or_default())
    }

    async fn holders(&self, role: RoleId) -> DirectoryResult<Vec<MemberId>> {
        self.suspend().await;
        let mut holders: Vec<MemberId> = self
            .state()
            .member_roles
            .iter()
            .filter(|(_, held)| held.contains(&role))
            .map(|(member, _)| *member)
            .collect();
        holders.sort();
        Ok(holders)
    }
}

#[async_trait]
impl ChannelDirectory for MemoryGuild {
    async fn list_channels(&self) -> DirectoryResult<Vec<ChannelInfo>> {
        self.suspend().await;
        Ok(self.state().channels.values().map(|c| c.info.clone()).collect())
    }

    async fn channel(&self, id: ChannelId) -> DirectoryResult<Option<ChannelInfo>> {
        self.suspend().await;
        Ok(self.state().channels.get(&id).map(|c| c.info.clone()))
    }

    async fn history(&self, channel: ChannelId) -> DirectoryResult<Vec<Message>> {
        self.suspend().await;
        let mut state = self.state();
        let stored = state.channel_mut(channel)?;
        Ok(stored.messages.iter().map(|m| m.message.clone()).collect())
    }

    async fn purge(&self, channel: ChannelId) -> DirectoryResult<()> {
        self.suspend().await;
        let mut state = self.state();
        let removed = {
            let stored = state.channel_mut(channel)?;
            let n = stored.messages.len();
            stored.messages.clear();
            n
        };
        state.counters.purges += 1;
        state.counters.message_deletes += removed;
        Ok(())
    }

    async fn send(&self, channel: ChannelId, content: &str) -> DirectoryResult<MessageId> {
        self.suspend().await;
        let mut state = self.state();
        if let Some(remaining) = state.sends_before_failure {
            if remaining == 0 {
                return Err(DirectoryError::Refused("send quota exhausted".to_string()));
            }
            state.sends_before_failure = Some(remaining - 1);
        }
        let id = MessageId(state.allocate());
        let author = self.bot_user;
        state.channel_mut(channel)?.messages.push(StoredMessage {
            message: Message { id, channel, author, content: content.to_string() },
            reactions: BTreeMap::new(),
        });
        state.counters.sends += 1;
        Ok(id)
    }

    async fn delete_message(&self, channel: ChannelId, message: MessageId) -> DirectoryResult<()> {
        self.suspend().await;
        let mut state = self.state();
        let stored = state.channel_mut(channel)?;
        let before = stored.messages.len();
        stored.messages.retain(|m| m.message.id != message);
        if stored.messages.len() == before {
            return Err(DirectoryError::Unknown { kind: "message", id: message.0 });
        }
        state.counters.message_deletes += 1;
        Ok(())
    }

    async fn create(&self, channel: NewChannel) -> DirectoryResult<ChannelId> {
        self.suspend().await;
        let mut state = self.state();
        let id = ChannelId(state.allocate());
        state.channels.insert(
            id,
            StoredChannel {
                info: ChannelInfo { id, name: channel.name, kind: channel.kind, parent: channel.parent },
                topic: channel.topic,
                overwrites: channel.overwrites,
                messages: Vec::new(),
            },
        );
        state.counters.channels_created += 1;
        Ok(id)
    }

    async fn set_overwrite(&self, channel: ChannelId, overwrite: Overwrite) -> DirectoryResult<()> {
        self.suspend().await;
        let mut state = self.state();
        let stored = state.channel_mut(channel)?;
        stored.overwrites.retain(|o| o.target != overwrite.target);
        stored.overwrites.push(overwrite);
        Ok(())
    }

    async fn remove_overwrite(&self, channel: ChannelId, target: OverwriteTarget) -> DirectoryResult<()> {
        self.suspend().await;
        let mut state = self.state();
        state.channel_mut(channel)?.overwrites.retain(|o| o.target != target);
        Ok(())
    }

    async fn replace_permissions(
        &self,
        channel: ChannelId,
        topic: &str,
        overwrites: &[Overwrite],
    ) -> DirectoryResult<()> {
        self.suspend().await;
        let mut state = self.state();
        let stored = state.channel_mut(channel)?;
        stored.topic = Some(topic.to_string());
        stored.overwrites = overwrites.to_vec();
        Ok(())
    }

    async fn delete(&self, channel: ChannelId) -> DirectoryResult<()> {
        self.suspend().await;
        let mut state = self.state();
        state.channel_mut(channel)?;
        state.channels.remove(&channel);
        state.counters.channels_deleted += 1;
        Ok(())
    }
}

#[async_trait]
impl MessageStore for MemoryGuild {
    async fn add_reaction(&self, channel: ChannelId, message: MessageId, emoji: &str) -> DirectoryResult<()> {
        self.suspend().await;
        let bot = self.bot_user;
        let mut state = self.state();
        let stored = state.channel_mut(channel)?;
        let msg = stored
            .messages
            .iter_mut()
            .find(|m| m.message.id == message)
            .ok_or(DirectoryError::Unknown { kind: "message", id: message.0 })?;
        msg.reactions.entry(emoji.to_string()).or_default().insert(bot);
        state.counters.reactions_added += 1;
        Ok(())
    }

    async fn remove_reaction(
        &self,
        channel: ChannelId,
        message: MessageId,
        emoji: &str,
        member: MemberId,
    ) -> DirectoryResult<()> {
        self.suspend().await;
        let mut state = self.state();
        let stored = state.channel_mut(channel)?;
        if let Some(msg) = stored.messages.iter_mut().find(|m| m.message.id == message) {
            if let Some(reactors) = msg.reactions.get_mut(emoji) {
                reactors.remove(&member);
            }
        }
        state.counters.reactions_removed += 1;
        Ok(())
    }

    async fn fetch(&self, channel: ChannelId, message: MessageId) -> DirectoryResult<Option<Message>> {
        self.suspend().await;
        let mut state = self.state();
        let stored = state.channel_mut(channel)?;
        Ok(stored
            .messages
            .iter()
            .find(|m| m.message.id == message)
            .map(|m| m.message.clone()))
    }
}
