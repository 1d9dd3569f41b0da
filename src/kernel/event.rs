use crate::directory::{ChannelId, MemberId, MessageId};

/// Inbound events. Everything the bot reacts to arrives as one of these
/// on the reactor's queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    ReactionAdd(ReactionEvent),
    ReactionRemove(ReactionEvent),
    VoiceState(VoiceTransition),
    MemberJoin { member: MemberId },
    Message(IncomingMessage),
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::ReactionAdd(_) => "reaction_add",
            Event::ReactionRemove(_) => "reaction_remove",
            Event::VoiceState(_) => "voice_state",
            Event::MemberJoin { .. } => "member_join",
            Event::Message(_) => "message",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionEvent {
    pub member: MemberId,
    pub channel: ChannelId,
    pub message: MessageId,
    pub emoji: String,
}

/// A member moving between voice rooms. `previous == current` covers
/// mute/deafen updates and is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceTransition {
    pub member: MemberId,
    pub previous: Option<ChannelId>,
    pub current: Option<ChannelId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub id: MessageId,
    pub channel: ChannelId,
    pub author: MemberId,
    pub author_is_bot: bool,
    pub content: String,
}
