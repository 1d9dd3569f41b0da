use std::sync::Arc;
use tracing::info;

use crate::directory::{DirectoryResult, Directories, MemberId};
use crate::kernel::boot::GuildLayout;

pub const USER_PLACEHOLDER: &str = "$USER";

pub fn render_welcome(template: &str, member: MemberId) -> String {
    template.replace(USER_PLACEHOLDER, &format!("<@{}>", member))
}

/// New members start as tourists and get greeted in the welcome channel.
pub struct Onboarding {
    dirs: Directories,
    layout: Arc<GuildLayout>,
    template: String,
}

impl Onboarding {
    pub fn new(dirs: Directories, layout: Arc<GuildLayout>, template: impl Into<String>) -> Self {
        Self {
            dirs,
            layout,
            template: template.into(),
        }
    }

    pub async fn on_member_join(&self, member: MemberId) -> DirectoryResult<()> {
        self.dirs.roles.add(member, self.layout.tourist).await?;
        if !self.template.is_empty() {
            let text = render_welcome(&self.template, member);
            self.dirs.channels.send(self.layout.welcome, &text).await?;
        }
        info!(%member, "member onboarded as tourist");
        Ok(())
    }
}
