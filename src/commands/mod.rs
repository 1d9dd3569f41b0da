//! Text-prefixed administrative commands.

pub mod parse;
pub mod privilege;

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub use parse::{parse, parse_mention, Command, ParseError};
pub use privilege::is_privileged;

use crate::courses::CoursePermissionSync;
use crate::directory::{DirectoryResult, Directories, MemberId};
use crate::kernel::boot::GuildLayout;
use crate::kernel::event::IncomingMessage;
use crate::roles::{MenuPlan, Reconciler};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug)]
pub enum CommandOutcome {
    /// Not a command, or from a bot.
    Ignored,
    /// Refused for lack of privilege; the handle finishes once the warning
    /// and the command message are gone.
    Denied(JoinHandle<()>),
    Completed(Command),
}

pub struct CommandRouter {
    dirs: Directories,
    layout: Arc<GuildLayout>,
    reconciler: Arc<Reconciler>,
    menus: Vec<MenuPlan>,
    courses: CoursePermissionSync,
    prefix: String,
    warning_delay: Duration,
}

impl CommandRouter {
    pub fn new(
        dirs: Directories,
        layout: Arc<GuildLayout>,
        reconciler: Arc<Reconciler>,
        menus: Vec<MenuPlan>,
        prefix: impl Into<String>,
        warning_delay: Duration,
    ) -> Self {
        let courses = CoursePermissionSync::new(dirs.clone(), layout.course_category, layout.everyone);
        Self {
            dirs,
            layout,
            reconciler,
            menus,
            courses,
            prefix: prefix.into(),
            warning_delay,
        }
    }

    pub async fn on_message(&self, message: &IncomingMessage) -> DirectoryResult<CommandOutcome> {
        if message.author_is_bot {
            return Ok(CommandOutcome::Ignored);
        }
        let command = match parse(&self.prefix, &message.content) {
            None => return Ok(CommandOutcome::Ignored),
            Some(Err(ParseError::Unknown(name))) => {
                debug!(name, "unknown command ignored");
                return Ok(CommandOutcome::Ignored);
            }
            Some(Err(e)) => {
                self.reply(message, &format!("\u{274c} {e}")).await?;
                return Ok(CommandOutcome::Ignored);
            }
            Some(Ok(command)) => command,
        };

        if command.requires_privilege() {
            let held = self.dirs.roles.list_held(message.author).await?;
            if !is_privileged(&held, &self.layout) {
                warn!(member = %message.author, command = command.name(), "privileged command refused");
                let cleanup =
                    privilege::deny(&self.dirs, message.channel, message.id, message.author, self.warning_delay)
                        .await?;
                return Ok(CommandOutcome::Denied(cleanup));
            }
        }

        info!(member = %message.author, command = command.name(), "running command");
        match command {
            Command::Version => self.reply(message, VERSION).await?,
            Command::Refresh => self.refresh(message).await?,
            Command::RebuildCourseChannels => self.rebuild_courses(message).await?,
            Command::Sudo { target } => self.sudo(message, target.unwrap_or(message.author)).await?,
            Command::ResetAdmin => self.reset_admin(message).await?,
        }
        Ok(CommandOutcome::Completed(command))
    }

    async fn reply(&self, to: &IncomingMessage, text: &str) -> DirectoryResult<()> {
        self.dirs.channels.send(to.channel, text).await.map(|_| ())
    }

    async fn refresh(&self, message: &IncomingMessage) -> DirectoryResult<()> {
        self.reply(message, "A atualizar os menus... / Refreshing menus...").await?;
        let summary = self.reconciler.refresh(&self.menus).await;
        let text = if summary.failed.is_empty() {
            format!(
                "\u{2705} Menus atualizados / Menus refreshed ({} rebuilt, {} unchanged)",
                summary.rebuilt.len(),
                summary.unchanged.len()
            )
        } else {
            format!(
                "\u{26a0}\u{fe0f} {} menu channel(s) failed to refresh; see the logs",
                summary.failed.len()
            )
        };
        self.reply(message, &text).await
    }

    async fn rebuild_courses(&self, message: &IncomingMessage) -> DirectoryResult<()> {
        let summary = self.courses.sync(&self.layout.courses, &self.layout.degrees).await?;
        self.reply(message, &format!("Course channels: {summary}")).await
    }

    async fn sudo(&self, message: &IncomingMessage, target: MemberId) -> DirectoryResult<()> {
        let held = self.dirs.roles.list_held(target).await?;
        if !is_privileged(&held, &self.layout) {
            return self
                .reply(message, "\u{274c} User does not have administrator permissions.")
                .await;
        }

        let elevated = self.layout.elevated;
        if held.contains(&elevated) {
            self.dirs.roles.remove(target, elevated).await?;
            info!(member = %target, "elevated role removed");
            self.reply(message, "\u{2705} Elevated role removed.").await
        } else {
            self.dirs.roles.add(target, elevated).await?;
            info!(member = %target, "elevated role granted");
            self.reply(message, "\u{2705} Elevated role added.").await
        }
    }

    async fn reset_admin(&self, message: &IncomingMessage) -> DirectoryResult<()> {
        let elevated = self.layout.elevated;
        let holders = self.dirs.roles.holders(elevated).await?;

        let mut failed = 0usize;
        for member in &holders {
            if let Err(e) = self.dirs.roles.remove(*member, elevated).await {
                warn!(%member, error = %e, "could not remove elevated role");
                failed += 1;
            }
        }

        let text = if failed == 0 {
            format!("\u{2705} Elevated role reset ({} member(s)).", holders.len())
        } else {
            format!("\u{274c} Elevated role reset failed for {failed} of {} member(s).", holders.len())
        };
        self.reply(message, &text).await
    }
}
