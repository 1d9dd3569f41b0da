use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::oneshot::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::event::Event;
use crate::commands::{CommandOutcome, CommandRouter};
use crate::directory::{DirectoryResult, MemberId};
use crate::roles::{Onboarding, ReactionOutcome, ReactionRoleEngine};
use crate::voice::VoiceChannelLifecycle;

/// One handler per event kind.
pub struct Dispatcher {
    pub engine: ReactionRoleEngine,
    pub voice: VoiceChannelLifecycle,
    pub onboarding: Onboarding,
    pub commands: CommandRouter,
}

impl Dispatcher {
    /// Runs the handler for `event`. Failures are logged and end here; the
    /// next event starts from a fresh read.
    pub async fn dispatch(&self, event: Event) {
        let kind = event.kind();
        if let Err(e) = self.handle(event).await {
            warn!(kind, error = %e, "event handler failed");
        }
    }

    async fn handle(&self, event: Event) -> DirectoryResult<()> {
        match event {
            Event::ReactionAdd(reaction) => {
                let outcome = self.engine.on_toggle_add(&reaction).await?;
                log_reaction(outcome);
            }
            Event::ReactionRemove(reaction) => {
                let outcome = self.engine.on_toggle_remove(&reaction).await?;
                log_reaction(outcome);
            }
            Event::VoiceState(transition) => self.voice.on_transition(transition).await?,
            Event::MemberJoin { member } => self.onboarding.on_member_join(member).await?,
            Event::Message(message) => {
                if let CommandOutcome::Completed(command) = self.commands.on_message(&message).await? {
                    debug!(command = command.name(), "command finished");
                }
            }
        }
        Ok(())
    }
}

fn log_reaction(outcome: ReactionOutcome) {
    if outcome != ReactionOutcome::Ignored {
        debug!(?outcome, "reaction handled");
    }
}

/// Keeps one member's voice events in arrival order: each waits for the
/// previous one of the same member to finish.
#[derive(Default)]
struct VoiceLanes {
    tails: HashMap<MemberId, oneshot::Receiver<()>>,
}

impl VoiceLanes {
    /// Returns the predecessor to wait for and the signal to fire when done.
    fn enter(&mut self, member: MemberId) -> (Option<oneshot::Receiver<()>>, oneshot::Sender<()>) {
        let (done, tail) = oneshot::channel();
        (self.tails.insert(member, tail), done)
    }

    /// Forgets members whose last event has finished.
    fn prune(&mut self) {
        self.tails
            .retain(|_, tail| matches!(tail.try_recv(), Err(TryRecvError::Empty)));
    }
}

/// Drains the inbound queue, one task per event. Events run concurrently
/// except that one member's voice events run one after another.
pub struct Reactor {
    receiver: mpsc::Receiver<Event>,
    dispatcher: Arc<Dispatcher>,
    shutdown: CancellationToken,
    lanes: VoiceLanes,
}

impl Reactor {
    pub fn new(receiver: mpsc::Receiver<Event>, dispatcher: Arc<Dispatcher>, shutdown: CancellationToken) -> Self {
        Self {
            receiver,
            dispatcher,
            shutdown,
            lanes: VoiceLanes::default(),
        }
    }

    /// Returns once shut down or once every sender is gone, after in-flight
    /// handlers have finished.
    pub async fn run(mut self) {
        info!("reactor started");
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                received = self.receiver.recv() => {
                    let Some(event) = received else { break };
                    self.spawn(&mut tasks, event);
                }
                Some(finished) = tasks.join_next(), if !tasks.is_empty() => {
                    reap(finished);
                    self.lanes.prune();
                }
            }
        }

        info!(in_flight = tasks.len(), "reactor stopping");
        while let Some(finished) = tasks.join_next().await {
            reap(finished);
        }
    }

    fn spawn(&mut self, tasks: &mut JoinSet<()>, event: Event) {
        let span = info_span!("event", id = %Uuid::new_v4(), kind = event.kind());
        let dispatcher = Arc::clone(&self.dispatcher);
        let lane = match &event {
            Event::VoiceState(transition) => Some(self.lanes.enter(transition.member)),
            _ => None,
        };

        tasks.spawn(
            async move {
                let done = match lane {
                    Some((previous, done)) => {
                        if let Some(previous) = previous {
                            // Err means the predecessor was dropped; nothing left to wait for.
                            let _ = previous.await;
                        }
                        Some(done)
                    }
                    None => None,
                };
                dispatcher.dispatch(event).await;
                if let Some(done) = done {
                    let _ = done.send(());
                }
            }
            .instrument(span),
        );
    }
}

fn reap(finished: Result<(), tokio::task::JoinError>) {
    if let Err(e) = finished {
        if e.is_panic() {
            error!(error = %e, "event handler panicked");
        }
    }
}
