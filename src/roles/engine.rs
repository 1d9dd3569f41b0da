use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use super::mapping::{MenuEntry, MenuTarget, SharedMapping};
use super::transition::{plan_degree_add, plan_degree_remove, DegreeRoles, RoleEffect, Transition};
use super::is_toggle;
use crate::directory::{DirectoryResult, Directories, MemberId};
use crate::kernel::boot::GuildLayout;
use crate::kernel::event::ReactionEvent;
use crate::kernel::lock::KeyedLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionOutcome {
    /// Not a toggle on a known menu message, or the bot's own reaction.
    Ignored,
    Applied,
    /// Degree exclusivity would break; the reaction was retracted.
    Rejected,
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Add,
    Remove,
}

/// Turns toggle reactions on menu messages into role changes.
///
/// Degree changes for one member are serialized: the member's token is
/// held from the role read until the last mutation (or the retraction)
/// finishes. Self-roles are additive and skip the token.
pub struct ReactionRoleEngine {
    dirs: Directories,
    layout: Arc<GuildLayout>,
    mapping: SharedMapping,
    bot_user: MemberId,
    members: KeyedLock<MemberId>,
}

impl ReactionRoleEngine {
    pub fn new(dirs: Directories, layout: Arc<GuildLayout>, mapping: SharedMapping, bot_user: MemberId) -> Self {
        Self {
            dirs,
            layout,
            mapping,
            bot_user,
            members: KeyedLock::new(),
        }
    }

    pub async fn on_toggle_add(&self, event: &ReactionEvent) -> DirectoryResult<ReactionOutcome> {
        self.handle(event, Direction::Add).await
    }

    pub async fn on_toggle_remove(&self, event: &ReactionEvent) -> DirectoryResult<ReactionOutcome> {
        self.handle(event, Direction::Remove).await
    }

    /// Members whose degree token is currently held or awaited.
    pub fn members_in_flight(&self) -> usize {
        self.members.active()
    }

    async fn resolve(&self, event: &ReactionEvent) -> Option<MenuEntry> {
        if event.member == self.bot_user || !is_toggle(&event.emoji) {
            return None;
        }
        let entry = self.mapping.read().await.lookup(event.message);
        match entry {
            Some(entry) if entry.channel == event.channel => Some(entry),
            _ => {
                trace!(message = %event.message, channel = %event.channel, "reaction on unmapped message dropped");
                None
            }
        }
    }

    async fn handle(&self, event: &ReactionEvent, direction: Direction) -> DirectoryResult<ReactionOutcome> {
        let Some(entry) = self.resolve(event).await else {
            return Ok(ReactionOutcome::Ignored);
        };

        match entry.target {
            MenuTarget::Degree(index) => {
                let Some(degree) = self.layout.degrees.get(index) else {
                    trace!(index, "menu entry points past the degree list");
                    return Ok(ReactionOutcome::Ignored);
                };
                let roles = DegreeRoles {
                    degree: degree.role,
                    campus: self.layout.campus_role(degree.remote_campus),
                    tourist: self.layout.tourist,
                };
                self.degree_transition(event, &degree.name, roles, direction).await
            }
            MenuTarget::SelfRole(role) => {
                let roles = &self.dirs.roles;
                match direction {
                    Direction::Add => roles.add(event.member, role).await?,
                    Direction::Remove => roles.remove(event.member, role).await?,
                }
                debug!(member = %event.member, %role, ?direction, "self-role toggled");
                Ok(ReactionOutcome::Applied)
            }
        }
    }

    async fn degree_transition(
        &self,
        event: &ReactionEvent,
        degree: &str,
        roles: DegreeRoles,
        direction: Direction,
    ) -> DirectoryResult<ReactionOutcome> {
        let _token = self.members.lock(event.member).await;

        let held = self.dirs.roles.list_held(event.member).await?;
        let plan = match direction {
            Direction::Add => plan_degree_add(&held, roles, self.layout.degree_roles()),
            Direction::Remove => plan_degree_remove(&held, roles),
        };

        match plan {
            Transition::Noop => Ok(ReactionOutcome::Unchanged),
            Transition::Reject => {
                self.dirs
                    .messages
                    .remove_reaction(event.channel, event.message, &event.emoji, event.member)
                    .await?;
                info!(member = %event.member, degree, "second degree refused, reaction retracted");
                Ok(ReactionOutcome::Rejected)
            }
            Transition::Apply(effects) => {
                if let Err(e) = self.apply_all(event.member, &effects).await {
                    if direction == Direction::Add {
                        self.retract_quietly(event).await;
                    }
                    return Err(e);
                }
                info!(member = %event.member, degree, ?direction, "degree updated");
                Ok(ReactionOutcome::Applied)
            }
        }
    }

    /// Applies `effects` in order. If one fails, the ones already applied
    /// are undone newest first and the original error is returned.
    async fn apply_all(&self, member: MemberId, effects: &[RoleEffect]) -> DirectoryResult<()> {
        for (done, effect) in effects.iter().enumerate() {
            let Err(e) = self.apply(member, *effect).await else {
                continue;
            };
            warn!(%member, ?effect, error = %e, undoing = done, "degree update failed, rolling back");
            for applied in effects[..done].iter().rev() {
                let undo = applied.undo();
                if let Err(undo_err) = self.apply(member, undo).await {
                    warn!(%member, effect = ?undo, error = %undo_err, "rollback step failed");
                }
            }
            return Err(e);
        }
        Ok(())
    }

    async fn apply(&self, member: MemberId, effect: RoleEffect) -> DirectoryResult<()> {
        match effect {
            RoleEffect::Add(role) => self.dirs.roles.add(member, role).await,
            RoleEffect::Remove(role) => self.dirs.roles.remove(member, role).await,
        }
    }

    /// Takes the member's reaction back after a failed degree add; errors
    /// are only logged.
    async fn retract_quietly(&self, event: &ReactionEvent) {
        let retracted = self
            .dirs
            .messages
            .remove_reaction(event.channel, event.message, &event.emoji, event.member)
            .await;
        if let Err(e) = retracted {
            warn!(member = %event.member, error = %e, "could not retract reaction after failed update");
        }
    }
}
