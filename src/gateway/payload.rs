//! Gateway frames and their translation into reactor events.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::directory::{ChannelId, GuildId, MemberId, MessageId};
use crate::kernel::event::{Event, IncomingMessage, ReactionEvent, VoiceTransition};

pub mod op {
    pub const DISPATCH: u8 = 0;
    pub const HEARTBEAT: u8 = 1;
    pub const IDENTIFY: u8 = 2;
    pub const RECONNECT: u8 = 7;
    pub const INVALID_SESSION: u8 = 9;
    pub const HELLO: u8 = 10;
    pub const HEARTBEAT_ACK: u8 = 11;
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayPayload {
    pub op: u8,
    #[serde(default)]
    pub d: Value,
    #[serde(default)]
    pub s: Option<u64>,
    #[serde(default)]
    pub t: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Hello {
    pub heartbeat_interval: u64,
}

#[derive(Debug, Deserialize)]
struct UserDto {
    id: MemberId,
    #[serde(default)]
    bot: bool,
}

#[derive(Debug, Deserialize)]
struct MemberDto {
    user: Option<UserDto>,
}

#[derive(Debug, Deserialize)]
struct EmojiDto {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReactionDto {
    user_id: MemberId,
    channel_id: ChannelId,
    message_id: MessageId,
    #[serde(default)]
    guild_id: Option<GuildId>,
    emoji: EmojiDto,
}

#[derive(Debug, Deserialize)]
struct VoiceStateDto {
    #[serde(default)]
    guild_id: Option<GuildId>,
    #[serde(default)]
    channel_id: Option<ChannelId>,
    user_id: MemberId,
    #[serde(default)]
    member: Option<MemberDto>,
}

impl VoiceStateDto {
    fn from_bot(&self) -> bool {
        self.member
            .as_ref()
            .and_then(|m| m.user.as_ref())
            .is_some_and(|u| u.bot)
    }
}

#[derive(Debug, Deserialize)]
struct GuildCreateDto {
    id: GuildId,
    #[serde(default)]
    voice_states: Vec<VoiceStateDto>,
}

#[derive(Debug, Deserialize)]
struct MemberAddDto {
    guild_id: GuildId,
    user: UserDto,
}

#[derive(Debug, Deserialize)]
struct MessageCreateDto {
    id: MessageId,
    channel_id: ChannelId,
    #[serde(default)]
    guild_id: Option<GuildId>,
    author: UserDto,
    #[serde(default)]
    content: String,
}

/// Stateful dispatch decoder for one guild.
///
/// Voice state updates only carry the new room, so the last known room of
/// every member is remembered to recover the room they left.
#[derive(Debug)]
pub struct Translator {
    guild: GuildId,
    presence: HashMap<MemberId, ChannelId>,
}

impl Translator {
    pub fn new(guild: GuildId) -> Self {
        Self {
            guild,
            presence: HashMap::new(),
        }
    }

    pub fn room_of(&self, member: MemberId) -> Option<ChannelId> {
        self.presence.get(&member).copied()
    }

    /// Events for the dispatch `kind`. Unhandled kinds and other guilds
    /// yield nothing.
    pub fn translate(&mut self, kind: &str, data: &Value) -> Result<Vec<Event>, serde_json::Error> {
        let events = match kind {
            "GUILD_CREATE" => {
                let guild = GuildCreateDto::deserialize(data)?;
                if guild.id != self.guild {
                    return Ok(Vec::new());
                }
                self.seed(guild.voice_states)
            }
            "MESSAGE_REACTION_ADD" | "MESSAGE_REACTION_REMOVE" => {
                let reaction = ReactionDto::deserialize(data)?;
                if reaction.guild_id != Some(self.guild) {
                    return Ok(Vec::new());
                }
                let event = ReactionEvent {
                    member: reaction.user_id,
                    channel: reaction.channel_id,
                    message: reaction.message_id,
                    emoji: reaction.emoji.name.unwrap_or_default(),
                };
                if kind == "MESSAGE_REACTION_ADD" {
                    vec![Event::ReactionAdd(event)]
                } else {
                    vec![Event::ReactionRemove(event)]
                }
            }
            "VOICE_STATE_UPDATE" => {
                let state = VoiceStateDto::deserialize(data)?;
                if state.guild_id != Some(self.guild) || state.from_bot() {
                    return Ok(Vec::new());
                }
                let previous = match state.channel_id {
                    Some(room) => self.presence.insert(state.user_id, room),
                    None => self.presence.remove(&state.user_id),
                };
                vec![Event::VoiceState(VoiceTransition {
                    member: state.user_id,
                    previous,
                    current: state.channel_id,
                })]
            }
            "GUILD_MEMBER_ADD" => {
                let added = MemberAddDto::deserialize(data)?;
                if added.guild_id != self.guild || added.user.bot {
                    return Ok(Vec::new());
                }
                vec![Event::MemberJoin { member: added.user.id }]
            }
            "MESSAGE_CREATE" => {
                let message = MessageCreateDto::deserialize(data)?;
                if message.guild_id != Some(self.guild) {
                    return Ok(Vec::new());
                }
                vec![Event::Message(IncomingMessage {
                    id: message.id,
                    channel: message.channel_id,
                    author: message.author.id,
                    author_is_bot: message.author.bot,
                    content: message.content,
                })]
            }
            _ => Vec::new(),
        };
        Ok(events)
    }

    /// Replaces the presence table with a full snapshot and emits the
    /// transitions that bring the previous table in line with it.
    fn seed(&mut self, states: Vec<VoiceStateDto>) -> Vec<Event> {
        let next: HashMap<MemberId, ChannelId> = states
            .into_iter()
            .filter(|s| !s.from_bot())
            .filter_map(|s| s.channel_id.map(|room| (s.user_id, room)))
            .collect();

        let mut transitions: Vec<VoiceTransition> = self
            .presence
            .iter()
            .filter(|(member, _)| !next.contains_key(member))
            .map(|(member, room)| VoiceTransition {
                member: *member,
                previous: Some(*room),
                current: None,
            })
            .collect();
        transitions.extend(next.iter().filter_map(|(member, room)| {
            let previous = self.presence.get(member).copied();
            (previous != Some(*room)).then_some(VoiceTransition {
                member: *member,
                previous,
                current: Some(*room),
            })
        }));
        transitions.sort_by_key(|t| t.member);

        self.presence = next;
        transitions.into_iter().map(Event::VoiceState).collect()
    }
}
