//! Shadow text channels for voice rooms.
//!
//! A room's shadow exists while the room has at least one occupant and is
//! visible only to those occupants. Occupancy lives in memory only; shadows
//! left over from a previous process are reused by name but never swept.
//!
//! Transitions of one member never interleave, and they must be fed in the
//! order they happened; the reactor keeps each member's voice events in
//! arrival order.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tracing::{debug, info, warn};

use super::naming::shadow_channel_name;
use crate::directory::{
    ChannelId, ChannelInfo, ChannelKind, DirectoryError, DirectoryResult, Directories, MemberId, NewChannel,
    Overwrite, OverwriteTarget, RoleId,
};
use crate::kernel::event::VoiceTransition;
use crate::kernel::lock::KeyedLock;

#[derive(Debug, Clone)]
struct ShadowEntry {
    text_channel: ChannelId,
    occupants: HashSet<MemberId>,
}

pub struct VoiceChannelLifecycle {
    dirs: Directories,
    everyone: RoleId,
    shadows: Mutex<HashMap<ChannelId, ShadowEntry>>,
    rooms: KeyedLock<ChannelId>,
    members: KeyedLock<MemberId>,
}

impl VoiceChannelLifecycle {
    pub fn new(dirs: Directories, everyone: RoleId) -> Self {
        Self {
            dirs,
            everyone,
            shadows: Mutex::new(HashMap::new()),
            rooms: KeyedLock::new(),
            members: KeyedLock::new(),
        }
    }

    /// Applies one voice-state change. The leave half runs even when the
    /// join half fails and vice versa; the first error is returned.
    pub async fn on_transition(&self, transition: VoiceTransition) -> DirectoryResult<()> {
        if transition.previous == transition.current {
            return Ok(());
        }
        let _member = self.members.lock(transition.member).await;

        let left = match transition.previous {
            Some(room) => self.leave(room, transition.member).await,
            None => Ok(()),
        };
        if let Err(e) = &left {
            warn!(member = %transition.member, error = %e, "leaving voice room failed");
        }

        let joined = match transition.current {
            Some(room) => self.join(room, transition.member).await,
            None => Ok(()),
        };

        left.and(joined)
    }

    /// Occupants tracked for `room`, zero when it has no shadow.
    pub fn occupancy(&self, room: ChannelId) -> usize {
        self.table().get(&room).map_or(0, |e| e.occupants.len())
    }

    pub fn shadow_of(&self, room: ChannelId) -> Option<ChannelId> {
        self.table().get(&room).map(|e| e.text_channel)
    }

    pub fn tracked_rooms(&self) -> usize {
        self.table().len()
    }

    fn table(&self) -> std::sync::MutexGuard<'_, HashMap<ChannelId, ShadowEntry>> {
        self.shadows.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn leave(&self, room: ChannelId, member: MemberId) -> DirectoryResult<()> {
        let _room = self.rooms.lock(room).await;
        let channels = &self.dirs.channels;

        let tracked = {
            let mut table = self.table();
            match table.get_mut(&room) {
                Some(entry) => {
                    entry.occupants.remove(&member);
                    let remaining = entry.occupants.len();
                    let text = entry.text_channel;
                    if remaining == 0 {
                        table.remove(&room);
                    }
                    Some((text, remaining))
                }
                None => None,
            }
        };

        match tracked {
            Some((text, 0)) => {
                channels.delete(text).await?;
                info!(%room, shadow = %text, "voice room empty, shadow deleted");
            }
            Some((text, remaining)) => {
                channels.remove_overwrite(text, OverwriteTarget::Member(member)).await?;
                debug!(%room, %member, remaining, "member left voice room");
            }
            None => {
                if let Some(shadow) = self.find_shadow(room).await? {
                    channels.remove_overwrite(shadow.id, OverwriteTarget::Member(member)).await?;
                    debug!(%room, %member, "left untracked room, override revoked");
                }
            }
        }
        Ok(())
    }

    async fn join(&self, room: ChannelId, member: MemberId) -> DirectoryResult<()> {
        let _room = self.rooms.lock(room).await;
        let channels = &self.dirs.channels;

        let tracked = self.table().get(&room).map(|e| e.text_channel);
        if let Some(text) = tracked {
            channels.set_overwrite(text, Overwrite::allow_view(OverwriteTarget::Member(member))).await?;
            if let Some(entry) = self.table().get_mut(&room) {
                entry.occupants.insert(member);
            }
            debug!(%room, %member, "member joined voice room");
            return Ok(());
        }

        let voice = self.voice_room(room).await?;
        let name = shadow_channel_name(&voice.name);
        let existing = self.shadow_named(&name, voice.parent).await?;

        let text = match existing {
            Some(shadow) => {
                channels
                    .set_overwrite(shadow.id, Overwrite::allow_view(OverwriteTarget::Member(member)))
                    .await?;
                debug!(%room, shadow = %shadow.id, "reusing existing shadow");
                shadow.id
            }
            None => {
                let id = channels
                    .create(NewChannel {
                        name: name.clone(),
                        kind: ChannelKind::Text,
                        parent: voice.parent,
                        topic: None,
                        overwrites: vec![
                            Overwrite::deny_view(OverwriteTarget::Role(self.everyone)),
                            Overwrite::allow_view(OverwriteTarget::Member(member)),
                        ],
                    })
                    .await?;
                info!(%room, shadow = %id, name, "shadow created");
                id
            }
        };

        self.table().insert(
            room,
            ShadowEntry {
                text_channel: text,
                occupants: HashSet::from([member]),
            },
        );
        Ok(())
    }

    async fn voice_room(&self, room: ChannelId) -> DirectoryResult<ChannelInfo> {
        self.dirs
            .channels
            .channel(room)
            .await?
            .ok_or(DirectoryError::Unknown { kind: "channel", id: room.0 })
    }

    async fn find_shadow(&self, room: ChannelId) -> DirectoryResult<Option<ChannelInfo>> {
        match self.dirs.channels.channel(room).await? {
            Some(voice) => self.shadow_named(&shadow_channel_name(&voice.name), voice.parent).await,
            None => Ok(None),
        }
    }

    async fn shadow_named(&self, name: &str, parent: Option<ChannelId>) -> DirectoryResult<Option<ChannelInfo>> {
        Ok(self
            .dirs
            .channels
            .list_channels()
            .await?
            .into_iter()
            .find(|c| c.kind == ChannelKind::Text && c.name == name && c.parent == parent))
    }
}
