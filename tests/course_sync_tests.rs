mod common;

use campus_bot::courses::{course_channel_name, CoursePermissionSync};
use campus_bot::directory::{ChannelKind, Overwrite, OverwriteTarget};
use common::{Fixture, LEIC_A, LEIC_T, MEEC};

fn sync_for(fx: &Fixture) -> CoursePermissionSync {
    CoursePermissionSync::new(fx.dirs.clone(), fx.layout.course_category, fx.layout.everyone)
}

#[tokio::test]
async fn test_missing_course_channels_are_created() {
    let fx = Fixture::new().await;
    let sync = sync_for(&fx);

    let summary = sync.sync(&fx.layout.courses, &fx.layout.degrees).await.unwrap();
    assert_eq!(summary.created, 2);
    assert_eq!(summary.updated, 0);
    assert!(summary.failed.is_empty());

    // VERIFY: SisDig is visible to all three degrees and hidden from everyone
    let channel = fx.guild.channel_named("sisdig").expect("Course channel not created");
    assert_eq!(channel.parent, Some(fx.layout.course_category));
    assert_eq!(fx.guild.topic(channel.id).as_deref(), Some("Sistemas Digitais"));
    let acl = fx.guild.overwrites(channel.id);
    assert!(acl.contains(&Overwrite::deny_view(OverwriteTarget::Role(fx.layout.everyone))));
    for degree in [LEIC_A, LEIC_T, MEEC] {
        assert!(
            acl.contains(&Overwrite::allow_view(OverwriteTarget::Role(fx.role(degree)))),
            "{} cannot see sisdig",
            degree
        );
    }
    assert_eq!(acl.len(), 4);
}

#[tokio::test]
async fn test_existing_channel_acl_and_topic_are_replaced() {
    let fx = Fixture::new().await;
    let iaed = fx
        .guild
        .add_channel(&course_channel_name("IAED"), ChannelKind::Text, Some(fx.layout.course_category));
    // 1. Stale ACL left from an older roster
    fx.dirs
        .channels
        .replace_permissions(iaed, "old topic", &[Overwrite::allow_view(OverwriteTarget::Role(fx.role(MEEC)))])
        .await
        .unwrap();

    let summary = sync_for(&fx).sync(&fx.layout.courses, &fx.layout.degrees).await.unwrap();

    // VERIFY: updated in place, MEEC no longer listed
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.created, 1);
    assert_eq!(fx.guild.topic(iaed).as_deref(), Some("Algoritmos e Estruturas de Dados"));
    let acl = fx.guild.overwrites(iaed);
    assert!(!acl.iter().any(|o| o.target == OverwriteTarget::Role(fx.role(MEEC))));
    assert!(acl.contains(&Overwrite::allow_view(OverwriteTarget::Role(fx.role(LEIC_T)))));
}

#[tokio::test]
async fn test_one_failing_course_does_not_abort_the_batch() {
    let fx = Fixture::new().await;
    let iaed = fx
        .guild
        .add_channel("iaed", ChannelKind::Text, Some(fx.layout.course_category));
    fx.guild.fail_channel(iaed);

    let summary = sync_for(&fx).sync(&fx.layout.courses, &fx.layout.degrees).await.unwrap();

    // VERIFY: IAED reported, SisDig still created
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].0, "IAED");
    assert_eq!(summary.created, 1);
    assert_eq!(summary.succeeded(), 1);
    assert!(fx.guild.channel_named("sisdig").is_some());
    assert!(summary.to_string().starts_with("1 created, 0 updated, 1 failed"));
}

#[tokio::test]
async fn test_second_sync_only_updates() {
    let fx = Fixture::new().await;
    let sync = sync_for(&fx);
    sync.sync(&fx.layout.courses, &fx.layout.degrees).await.unwrap();
    fx.guild.reset_counters();

    let summary = sync.sync(&fx.layout.courses, &fx.layout.degrees).await.unwrap();

    assert_eq!(summary.created, 0);
    assert_eq!(summary.updated, 2);
    assert_eq!(fx.guild.counters().channels_created, 0);
}
