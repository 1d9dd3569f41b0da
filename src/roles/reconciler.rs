//! Menu reconciliation.
//!
//! A menu channel is described by a `MenuPlan`. Reconciling matches the
//! plan against the channel history; an incomplete match triggers a full
//! purge-and-repost. Sends are sequential, so a failure halfway leaves a
//! partial channel that simply fails to match on the next pass.

use std::collections::HashSet;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::mapping::{MenuEntry, MenuMapping, MenuTarget, SharedMapping};
use super::TOGGLE_EMOJI;
use crate::directory::{ChannelId, DirectoryResult, Directories, MemberId, Message, MessageId};
use crate::kernel::boot::GuildLayout;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuItem {
    pub target: MenuTarget,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuSection {
    pub header: String,
    pub items: Vec<MenuItem>,
}

/// Desired content of one menu channel, in emission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuPlan {
    pub channel: ChannelId,
    pub sections: Vec<MenuSection>,
}

impl MenuPlan {
    pub fn degree_menu(layout: &GuildLayout, header: &str) -> Self {
        let items = layout
            .degrees
            .iter()
            .enumerate()
            .map(|(i, d)| MenuItem {
                target: MenuTarget::Degree(i),
                text: d.display.clone(),
            })
            .collect();
        Self {
            channel: layout.degree_menu,
            sections: vec![MenuSection {
                header: header.to_string(),
                items,
            }],
        }
    }

    pub fn self_role_menu(layout: &GuildLayout) -> Self {
        let sections = layout
            .self_roles
            .iter()
            .map(|g| MenuSection {
                header: g.header.clone(),
                items: g
                    .entries
                    .iter()
                    .map(|e| MenuItem {
                        target: MenuTarget::SelfRole(e.role),
                        text: e.prompt.clone(),
                    })
                    .collect(),
            })
            .collect();
        Self {
            channel: layout.self_role_channel,
            sections,
        }
    }

    pub fn items(&self) -> impl Iterator<Item = &MenuItem> {
        self.sections.iter().flat_map(|s| s.items.iter())
    }

    pub fn item_count(&self) -> usize {
        self.sections.iter().map(|s| s.items.len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub bindings: Vec<(MenuTarget, MessageId)>,
    pub rebuilt: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub unchanged: Vec<ChannelId>,
    pub rebuilt: Vec<ChannelId>,
    pub failed: Vec<(ChannelId, String)>,
    pub bound: usize,
}

/// Binds each item to the first unclaimed bot-authored message containing
/// its text, walking history in order.
pub fn match_history(history: &[Message], bot_user: MemberId, plan: &MenuPlan) -> Vec<Option<MessageId>> {
    let mut claimed = HashSet::new();
    let mut matches = Vec::with_capacity(plan.item_count());

    for item in plan.items() {
        let found = history
            .iter()
            .find(|m| m.author == bot_user && !claimed.contains(&m.id) && m.content.contains(&item.text))
            .map(|m| m.id);
        if let Some(id) = found {
            claimed.insert(id);
        }
        matches.push(found);
    }

    matches
}

pub struct Reconciler {
    dirs: Directories,
    bot_user: MemberId,
    mapping: SharedMapping,
    refresh_lock: Mutex<()>,
}

impl Reconciler {
    pub fn new(dirs: Directories, bot_user: MemberId) -> Self {
        Self {
            dirs,
            bot_user,
            mapping: SharedMapping::default(),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Handle the reaction engine reads from.
    pub fn mapping(&self) -> SharedMapping {
        self.mapping.clone()
    }

    pub async fn reconcile(&self, plan: &MenuPlan) -> DirectoryResult<Reconciliation> {
        let history = self.dirs.channels.history(plan.channel).await?;
        let matches = match_history(&history, self.bot_user, plan);
        let matched = matches.iter().filter(|m| m.is_some()).count();

        if matched == matches.len() {
            let bindings = plan
                .items()
                .zip(matches)
                .filter_map(|(item, id)| id.map(|id| (item.target, id)))
                .collect();
            return Ok(Reconciliation { bindings, rebuilt: false });
        }

        info!(
            channel = %plan.channel,
            matched,
            expected = matches.len(),
            history = history.len(),
            "menu drifted, rebuilding"
        );
        self.rebuild(plan).await
    }

    async fn rebuild(&self, plan: &MenuPlan) -> DirectoryResult<Reconciliation> {
        let channels = &self.dirs.channels;
        channels.purge(plan.channel).await?;

        let mut bindings = Vec::with_capacity(plan.item_count());
        for section in &plan.sections {
            if !section.header.is_empty() {
                channels.send(plan.channel, &section.header).await?;
            }
            for item in &section.items {
                let id = channels.send(plan.channel, &item.text).await?;
                self.dirs.messages.add_reaction(plan.channel, id, TOGGLE_EMOJI).await?;
                bindings.push((item.target, id));
            }
        }

        Ok(Reconciliation { bindings, rebuilt: true })
    }

    /// Reconciles every plan and swaps in a freshly built mapping. Channels
    /// that fail contribute no bindings; events for them are dropped until
    /// the next refresh succeeds.
    pub async fn refresh(&self, plans: &[MenuPlan]) -> RefreshSummary {
        let _guard = self.refresh_lock.lock().await;
        let mut next = MenuMapping::new();
        let mut summary = RefreshSummary::default();

        for plan in plans {
            match self.reconcile(plan).await {
                Ok(outcome) => {
                    for (target, message) in outcome.bindings {
                        if next.bind(message, MenuEntry { channel: plan.channel, target }) {
                            summary.bound += 1;
                        } else {
                            warn!(channel = %plan.channel, %message, ?target, "duplicate menu binding ignored");
                        }
                    }
                    if outcome.rebuilt {
                        summary.rebuilt.push(plan.channel);
                    } else {
                        summary.unchanged.push(plan.channel);
                    }
                }
                Err(e) => {
                    warn!(channel = %plan.channel, error = %e, "menu reconciliation failed");
                    summary.failed.push((plan.channel, e.to_string()));
                }
            }
        }

        *self.mapping.write().await = next;
        summary
    }
}
