use std::sync::Arc;

use campus_bot::directory::memory::MemoryGuild;
use campus_bot::directory::{ChannelId, ChannelKind, Directories, MemberId, Overwrite, OverwriteTarget};
use campus_bot::kernel::event::VoiceTransition;
use campus_bot::voice::{shadow_channel_name, VoiceChannelLifecycle};

struct Rooms {
    guild: Arc<MemoryGuild>,
    lifecycle: VoiceChannelLifecycle,
    category: ChannelId,
    club: ChannelId,
    alpha: ChannelId,
}

fn rooms(guild: MemoryGuild) -> Rooms {
    let guild = Arc::new(guild);
    let category = guild.add_channel("Voz", ChannelKind::Category, None);
    let club = guild.add_channel("C++ Club", ChannelKind::Voice, Some(category));
    let alpha = guild.add_channel("Team  Alpha", ChannelKind::Voice, Some(category));
    let lifecycle = VoiceChannelLifecycle::new(Directories::from_backend(guild.clone()), guild.everyone_role());
    Rooms {
        guild,
        lifecycle,
        category,
        club,
        alpha,
    }
}

fn moved(member: MemberId, previous: Option<ChannelId>, current: Option<ChannelId>) -> VoiceTransition {
    VoiceTransition {
        member,
        previous,
        current,
    }
}

#[test]
fn test_shadow_names() {
    assert_eq!(shadow_channel_name("C++ Club"), "c-club-vc");
    assert_eq!(shadow_channel_name("Team  Alpha"), "team-alpha-vc");
    assert_eq!(shadow_channel_name("Estudo #1 (LEIC)"), "estudo-1-leic-vc");
}

#[tokio::test]
async fn test_first_join_creates_private_shadow() {
    let r = rooms(MemoryGuild::new());
    let member = r.guild.new_member();

    r.lifecycle.on_transition(moved(member, None, Some(r.club))).await.unwrap();

    // VERIFY: shadow exists in the voice room's category with default-deny
    let shadow = r.guild.channel_named("c-club-vc").expect("Shadow not created");
    assert_eq!(shadow.kind, ChannelKind::Text);
    assert_eq!(shadow.parent, Some(r.category));
    let overwrites = r.guild.overwrites(shadow.id);
    assert!(overwrites.contains(&Overwrite::deny_view(OverwriteTarget::Role(r.guild.everyone_role()))));
    assert!(overwrites.contains(&Overwrite::allow_view(OverwriteTarget::Member(member))));
    assert_eq!(r.lifecycle.occupancy(r.club), 1);
    assert_eq!(r.lifecycle.shadow_of(r.club), Some(shadow.id));
}

#[tokio::test]
async fn test_shadow_lives_until_last_occupant_leaves() {
    let r = rooms(MemoryGuild::new());
    let first = r.guild.new_member();
    let second = r.guild.new_member();

    // 1. Two members join
    r.lifecycle.on_transition(moved(first, None, Some(r.alpha))).await.unwrap();
    r.lifecycle.on_transition(moved(second, None, Some(r.alpha))).await.unwrap();
    let shadow = r.lifecycle.shadow_of(r.alpha).expect("Shadow tracked");
    assert_eq!(r.guild.counters().channels_created, 1, "Second join must reuse the shadow");
    assert_eq!(r.lifecycle.occupancy(r.alpha), 2);

    // 2. First leaves: override revoked, shadow kept
    r.lifecycle.on_transition(moved(first, Some(r.alpha), None)).await.unwrap();
    assert!(r.guild.has_channel(shadow));
    let overwrites = r.guild.overwrites(shadow);
    assert!(!overwrites.iter().any(|o| o.target == OverwriteTarget::Member(first)));
    assert!(overwrites.contains(&Overwrite::allow_view(OverwriteTarget::Member(second))));

    // 3. Second leaves: shadow deleted, mapping entry gone
    r.lifecycle.on_transition(moved(second, Some(r.alpha), None)).await.unwrap();
    assert!(!r.guild.has_channel(shadow), "Empty room kept its shadow");
    assert_eq!(r.lifecycle.shadow_of(r.alpha), None);
    assert_eq!(r.lifecycle.tracked_rooms(), 0);
}

#[tokio::test]
async fn test_move_between_rooms() {
    let r = rooms(MemoryGuild::new());
    let member = r.guild.new_member();

    r.lifecycle.on_transition(moved(member, None, Some(r.club))).await.unwrap();
    let club_shadow = r.lifecycle.shadow_of(r.club).unwrap();
    r.lifecycle.on_transition(moved(member, Some(r.club), Some(r.alpha))).await.unwrap();

    // VERIFY: old shadow gone, new one created
    assert!(!r.guild.has_channel(club_shadow));
    assert!(r.guild.channel_named("team-alpha-vc").is_some());
    assert_eq!(r.lifecycle.occupancy(r.club), 0);
    assert_eq!(r.lifecycle.occupancy(r.alpha), 1);
}

#[tokio::test]
async fn test_same_room_update_is_noop() {
    let r = rooms(MemoryGuild::new());
    let member = r.guild.new_member();
    r.lifecycle.on_transition(moved(member, None, Some(r.club))).await.unwrap();
    r.guild.reset_counters();

    // 1. Mute/deafen arrives as previous == current
    r.lifecycle.on_transition(moved(member, Some(r.club), Some(r.club))).await.unwrap();
    r.lifecycle.on_transition(moved(member, None, None)).await.unwrap();

    assert_eq!(r.guild.counters().channels_created + r.guild.counters().channels_deleted, 0);
    assert_eq!(r.lifecycle.occupancy(r.club), 1);
}

#[tokio::test]
async fn test_leftover_shadow_is_reused_by_name() {
    let r = rooms(MemoryGuild::new());
    // 1. A shadow left behind by an earlier process
    let leftover = r.guild.add_channel("c-club-vc", ChannelKind::Text, Some(r.category));
    let member = r.guild.new_member();

    r.lifecycle.on_transition(moved(member, None, Some(r.club))).await.unwrap();

    // VERIFY: no duplicate, member allowed on the existing one
    assert_eq!(r.guild.counters().channels_created, 0);
    assert_eq!(r.lifecycle.shadow_of(r.club), Some(leftover));
    assert!(r
        .guild
        .overwrites(leftover)
        .contains(&Overwrite::allow_view(OverwriteTarget::Member(member))));
}

#[tokio::test]
async fn test_concurrent_joins_create_one_shadow() {
    let r = rooms(MemoryGuild::new().with_interleaving());
    let members: Vec<MemberId> = (0..5).map(|_| r.guild.new_member()).collect();

    let joins = members
        .iter()
        .map(|m| r.lifecycle.on_transition(moved(*m, None, Some(r.club))));
    for result in futures_util::future::join_all(joins).await {
        result.unwrap();
    }

    assert_eq!(r.guild.counters().channels_created, 1, "Racing joins duplicated the shadow");
    assert_eq!(r.lifecycle.occupancy(r.club), 5);

    let leaves = members
        .iter()
        .map(|m| r.lifecycle.on_transition(moved(*m, Some(r.club), None)));
    for result in futures_util::future::join_all(leaves).await {
        result.unwrap();
    }
    assert_eq!(r.lifecycle.tracked_rooms(), 0);
    assert!(r.guild.channel_named("c-club-vc").is_none());
}

#[tokio::test]
async fn test_back_to_back_moves_leave_no_stale_occupant() {
    let r = rooms(MemoryGuild::new().with_interleaving());
    let third = r.guild.add_channel("Sala 3", ChannelKind::Voice, Some(r.category));
    let member = r.guild.new_member();
    let other = r.guild.new_member();

    // 1. Both sit in the club room
    r.lifecycle.on_transition(moved(other, None, Some(r.club))).await.unwrap();
    r.lifecycle.on_transition(moved(member, None, Some(r.club))).await.unwrap();

    // 2. Member hops club -> alpha -> sala 3 with both updates in flight
    let (first, second) = tokio::join!(
        r.lifecycle.on_transition(moved(member, Some(r.club), Some(r.alpha))),
        r.lifecycle.on_transition(moved(member, Some(r.alpha), Some(third))),
    );
    first.unwrap();
    second.unwrap();

    // VERIFY: nobody is left in alpha and its shadow is gone
    assert_eq!(r.lifecycle.occupancy(r.alpha), 0);
    assert_eq!(r.lifecycle.shadow_of(r.alpha), None);
    assert!(r.guild.channel_named("team-alpha-vc").is_none(), "Stale shadow kept");
    assert_eq!(r.lifecycle.occupancy(r.club), 1);
    assert_eq!(r.lifecycle.occupancy(third), 1);
    let club_shadow = r.lifecycle.shadow_of(r.club).unwrap();
    assert!(!r
        .guild
        .overwrites(club_shadow)
        .contains(&Overwrite::allow_view(OverwriteTarget::Member(member))));
}
