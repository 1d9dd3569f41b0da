//! The single privilege model: a member is privileged when they hold any
//! configured privileged role or the elevated role.

use std::collections::HashSet;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::directory::{ChannelId, DirectoryResult, Directories, MemberId, MessageId, RoleId};
use crate::kernel::boot::GuildLayout;

pub fn is_privileged(held: &HashSet<RoleId>, layout: &GuildLayout) -> bool {
    held.contains(&layout.elevated) || layout.privileged.iter().any(|role| held.contains(role))
}

pub fn denial_text(member: MemberId) -> String {
    format!(
        "\u{26a0}\u{fe0f} <@{member}> não tens permissão para usar este comando. / You don't have permission to use this command."
    )
}

/// Posts the denial warning, then removes it together with the offending
/// command once `delay` has passed. The cleanup runs detached; the handle
/// is returned for callers that want to await it.
pub async fn deny(
    dirs: &Directories,
    channel: ChannelId,
    command: MessageId,
    member: MemberId,
    delay: Duration,
) -> DirectoryResult<JoinHandle<()>> {
    let warning = dirs.channels.send(channel, &denial_text(member)).await?;
    let dirs = dirs.clone();

    Ok(tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        for message in [warning, command] {
            if let Err(e) = remove_if_present(&dirs, channel, message).await {
                warn!(%channel, %message, error = %e, "could not clean up after privilege warning");
            }
        }
    }))
}

/// Messages may already be gone, deleted by their author or a moderator.
async fn remove_if_present(dirs: &Directories, channel: ChannelId, message: MessageId) -> DirectoryResult<()> {
    if dirs.messages.fetch(channel, message).await?.is_none() {
        debug!(%channel, %message, "already deleted");
        return Ok(());
    }
    dirs.channels.delete_message(channel, message).await?;
    debug!(%channel, %message, "privilege warning cleanup");
    Ok(())
}
