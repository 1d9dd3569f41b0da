mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use campus_bot::commands::CommandRouter;
use campus_bot::directory::ChannelKind;
use campus_bot::kernel::event::{Event, VoiceTransition};
use campus_bot::roles::{Onboarding, Reconciler};
use campus_bot::voice::VoiceChannelLifecycle;
use campus_bot::{Dispatcher, Reactor};
use common::{Fixture, LEIC_A};

async fn dispatcher(fx: &Fixture) -> (Arc<Reconciler>, Arc<Dispatcher>) {
    let (reconciler, engine) = fx.engine().await;
    let dispatcher = Dispatcher {
        engine,
        voice: VoiceChannelLifecycle::new(fx.dirs.clone(), fx.layout.everyone),
        onboarding: Onboarding::new(fx.dirs.clone(), fx.layout.clone(), fx.settings.welcome_message.clone()),
        commands: CommandRouter::new(
            fx.dirs.clone(),
            fx.layout.clone(),
            reconciler.clone(),
            fx.menus(),
            fx.settings.prefix.clone(),
            Duration::from_millis(10),
        ),
    };
    (reconciler, Arc::new(dispatcher))
}

#[tokio::test]
async fn test_member_join_onboards_as_tourist() {
    let fx = Fixture::new().await;
    let (_, dispatcher) = dispatcher(&fx).await;
    let member = fx.guild.new_member();

    dispatcher.dispatch(Event::MemberJoin { member }).await;

    assert_eq!(fx.guild.roles_of(member), HashSet::from([fx.tourist()]));
    let welcome = fx.guild.messages(fx.layout.welcome);
    assert_eq!(welcome.len(), 1);
    assert!(welcome[0].content.contains(&format!("<@{}>", member)));
    assert!(!welcome[0].content.contains("$USER"));
}

#[tokio::test]
async fn test_reactor_drains_queue_then_stops() {
    let fx = Fixture::interleaved().await;
    let (reconciler, dispatcher) = dispatcher(&fx).await;
    let room = fx.guild.add_channel("Sala de Estudo", ChannelKind::Voice, None);

    let member = fx.guild.new_member();
    let reaction = {
        fx.guild.grant(member, fx.tourist());
        fx.degree_reaction(&reconciler, member, LEIC_A).await
    };

    // 1. Queue a burst of independent events, then close the queue
    let (tx, rx) = mpsc::channel(16);
    tx.send(Event::ReactionAdd(reaction)).await.unwrap();
    tx.send(Event::VoiceState(VoiceTransition {
        member,
        previous: None,
        current: Some(room),
    }))
    .await
    .unwrap();
    drop(tx);

    Reactor::new(rx, dispatcher, CancellationToken::new()).run().await;

    // VERIFY: every handler ran to completion before run() returned
    let held = fx.guild.roles_of(member);
    assert!(held.contains(&fx.role(LEIC_A)));
    assert!(held.contains(&fx.layout.home_campus));
    assert!(fx.guild.channel_named("sala-de-estudo-vc").is_some());
}

#[tokio::test]
async fn test_reactor_stops_on_shutdown() {
    let fx = Fixture::new().await;
    let (_, dispatcher) = dispatcher(&fx).await;
    let (_tx, rx) = mpsc::channel::<Event>(4);
    let shutdown = CancellationToken::new();

    let handle = tokio::spawn(Reactor::new(rx, dispatcher, shutdown.clone()).run());
    shutdown.cancel();

    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("Reactor ignored shutdown")
        .unwrap();
}

#[tokio::test]
async fn test_voice_hops_of_one_member_apply_in_arrival_order() {
    let fx = Fixture::interleaved().await;
    let (_, dispatcher) = dispatcher(&fx).await;
    let rooms: Vec<_> = ["Sala A", "Sala B", "Sala C"]
        .into_iter()
        .map(|name| fx.guild.add_channel(name, ChannelKind::Voice, None))
        .collect();
    let member = fx.guild.new_member();
    let other = fx.guild.new_member();
    let hop = |who, previous, current| Event::VoiceState(VoiceTransition { member: who, previous, current });

    // 1. other joins A; member joins A, then hops A -> B -> C
    let (tx, rx) = mpsc::channel(16);
    for event in [
        hop(other, None, Some(rooms[0])),
        hop(member, None, Some(rooms[0])),
        hop(member, Some(rooms[0]), Some(rooms[1])),
        hop(member, Some(rooms[1]), Some(rooms[2])),
    ] {
        tx.send(event).await.unwrap();
    }
    drop(tx);

    Reactor::new(rx, dispatcher.clone(), CancellationToken::new()).run().await;

    // VERIFY: B ends empty with no shadow, A and C keep theirs
    assert_eq!(dispatcher.voice.occupancy(rooms[1]), 0);
    assert!(fx.guild.channel_named("sala-b-vc").is_none(), "Stale shadow for B");
    assert_eq!(dispatcher.voice.occupancy(rooms[0]), 1);
    assert_eq!(dispatcher.voice.occupancy(rooms[2]), 1);
    assert!(fx.guild.channel_named("sala-c-vc").is_some());
}
