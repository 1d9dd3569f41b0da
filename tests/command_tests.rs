mod common;

use std::time::Duration;

use campus_bot::commands::{Command, CommandOutcome, CommandRouter, VERSION};
use campus_bot::directory::MemberId;
use campus_bot::kernel::event::IncomingMessage;
use common::Fixture;

const WARNING_DELAY: Duration = Duration::from_millis(20);

fn router(fx: &Fixture) -> CommandRouter {
    CommandRouter::new(
        fx.dirs.clone(),
        fx.layout.clone(),
        fx.reconciler(),
        fx.menus(),
        fx.settings.prefix.clone(),
        WARNING_DELAY,
    )
}

/// Posts `text` in the welcome channel as `author` and returns the event.
fn say(fx: &Fixture, author: MemberId, text: &str) -> IncomingMessage {
    let channel = fx.layout.welcome;
    let id = fx.guild.post_as(channel, author, text);
    IncomingMessage {
        id,
        channel,
        author,
        author_is_bot: false,
        content: text.to_string(),
    }
}

fn moderator(fx: &Fixture) -> MemberId {
    let member = fx.guild.new_member();
    fx.guild.grant(member, fx.role("Mod"));
    member
}

fn last_reply(fx: &Fixture) -> String {
    fx.guild
        .messages(fx.layout.welcome)
        .last()
        .map(|m| m.content.clone())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_denied_command_is_cleaned_up() {
    let fx = Fixture::new().await;
    let router = router(&fx);
    let member = fx.tourist_member();
    let message = say(&fx, member, "$refresh");

    let outcome = router.on_message(&message).await.unwrap();

    // 1. Warning visible right away
    let CommandOutcome::Denied(cleanup) = outcome else {
        panic!("Tourist ran a privileged command");
    };
    assert_eq!(fx.guild.messages(fx.layout.welcome).len(), 2);
    assert!(last_reply(&fx).contains(&format!("<@{}>", member)));

    // 2. After the delay both the warning and the command are gone
    cleanup.await.unwrap();
    assert!(fx.guild.messages(fx.layout.welcome).is_empty(), "Cleanup left messages behind");
    assert_eq!(fx.guild.counters().sends, 1, "Denied command must not run");
}

#[tokio::test]
async fn test_version_needs_no_privilege() {
    let fx = Fixture::new().await;
    let router = router(&fx);
    let member = fx.tourist_member();

    let outcome = router.on_message(&say(&fx, member, "$version")).await.unwrap();

    assert!(matches!(outcome, CommandOutcome::Completed(Command::Version)));
    assert_eq!(last_reply(&fx), VERSION);
}

#[tokio::test]
async fn test_sudo_toggles_elevated_role() {
    let fx = Fixture::new().await;
    let router = router(&fx);
    let moderator = moderator(&fx);

    router.on_message(&say(&fx, moderator, "$sudo")).await.unwrap();
    assert!(fx.guild.roles_of(moderator).contains(&fx.layout.elevated), "sudo did not elevate");

    router.on_message(&say(&fx, moderator, "$sudo")).await.unwrap();
    assert!(!fx.guild.roles_of(moderator).contains(&fx.layout.elevated), "second sudo did not drop");
}

#[tokio::test]
async fn test_sudo_on_unprivileged_target_is_refused() {
    let fx = Fixture::new().await;
    let router = router(&fx);
    let moderator = moderator(&fx);
    let tourist = fx.tourist_member();

    let text = format!("$sudo <@{}>", tourist);
    router.on_message(&say(&fx, moderator, &text)).await.unwrap();

    assert!(!fx.guild.roles_of(tourist).contains(&fx.layout.elevated));
    assert!(last_reply(&fx).contains("does not have administrator permissions"));
}

#[tokio::test]
async fn test_reset_admin_clears_every_holder() {
    let fx = Fixture::new().await;
    let router = router(&fx);
    let a = moderator(&fx);
    let b = moderator(&fx);
    fx.guild.grant(a, fx.layout.elevated);
    fx.guild.grant(b, fx.layout.elevated);

    router.on_message(&say(&fx, a, "$reset_admin")).await.unwrap();

    for member in [a, b] {
        assert!(!fx.guild.roles_of(member).contains(&fx.layout.elevated));
        assert!(fx.guild.roles_of(member).contains(&fx.role("Mod")), "reset_admin touched other roles");
    }
    assert!(last_reply(&fx).contains("2 member(s)"));
}

#[tokio::test]
async fn test_refresh_reports_before_and_after() {
    let fx = Fixture::new().await;
    let router = router(&fx);
    let moderator = moderator(&fx);

    router.on_message(&say(&fx, moderator, "$refresh")).await.unwrap();

    let replies: Vec<String> = fx
        .guild
        .messages(fx.layout.welcome)
        .into_iter()
        .filter(|m| m.author == fx.guild.bot_user())
        .map(|m| m.content)
        .collect();
    assert_eq!(replies.len(), 2, "Replies: {:?}", replies);
    assert!(replies[1].contains("2 rebuilt"));
    assert_eq!(fx.guild.messages(fx.layout.degree_menu).len(), 1 + fx.layout.degrees.len());
}

#[tokio::test]
async fn test_rebuild_course_channels_replies_with_summary() {
    let fx = Fixture::new().await;
    let router = router(&fx);
    let moderator = moderator(&fx);

    router
        .on_message(&say(&fx, moderator, "$rebuild_course_channels"))
        .await
        .unwrap();

    assert!(last_reply(&fx).contains("2 created, 0 updated, 0 failed"));
    assert!(fx.guild.channel_named("iaed").is_some());
}

#[tokio::test]
async fn test_chatter_and_bots_are_ignored() {
    let fx = Fixture::new().await;
    let router = router(&fx);
    let moderator = moderator(&fx);

    let mut from_bot = say(&fx, moderator, "$refresh");
    from_bot.author_is_bot = true;
    let outcomes = [
        router.on_message(&from_bot).await.unwrap(),
        router.on_message(&say(&fx, moderator, "hello $refresh")).await.unwrap(),
        router.on_message(&say(&fx, moderator, "$dance")).await.unwrap(),
    ];

    assert!(outcomes.iter().all(|o| matches!(o, CommandOutcome::Ignored)));
    assert_eq!(fx.guild.counters().sends, 0);
}

#[tokio::test]
async fn test_cleanup_skips_command_deleted_by_its_author() {
    let fx = Fixture::new().await;
    let router = router(&fx);
    let member = fx.tourist_member();
    let message = say(&fx, member, "$reset_admin");

    let CommandOutcome::Denied(cleanup) = router.on_message(&message).await.unwrap() else {
        panic!("Tourist ran a privileged command");
    };
    // 1. Author deletes the command before the warning expires
    fx.guild.remove_message(message.channel, message.id);
    fx.guild.reset_counters();
    cleanup.await.unwrap();

    // VERIFY: only the warning needed deleting
    assert_eq!(fx.guild.counters().message_deletes, 1);
    assert!(fx.guild.messages(fx.layout.welcome).is_empty());
}
