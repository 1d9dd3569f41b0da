use anyhow::{Context, Result};
use clap::Parser;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use campus_bot::commands::CommandRouter;
use campus_bot::config::{load_catalog, load_settings};
use campus_bot::directory::discord::DiscordHttp;
use campus_bot::directory::{Directories, GuildId};
use campus_bot::gateway::GatewaySession;
use campus_bot::kernel::boot::resolve_layout;
use campus_bot::roles::{MenuPlan, Onboarding, ReactionRoleEngine, Reconciler};
use campus_bot::voice::VoiceChannelLifecycle;
use campus_bot::{Dispatcher, Reactor};

const EVENT_QUEUE: usize = 256;

#[derive(Debug, Parser)]
#[command(name = "campus-bot", version, about = "Degree and course role bot")]
struct Cli {
    /// Bot token
    #[arg(long, env = "DISCORD_TOKEN", hide_env_values = true)]
    token: String,

    /// The one server this bot manages
    #[arg(long, env = "GUILD_ID")]
    guild_id: GuildId,

    /// Directory holding degrees.json, roles.json, courses.json and bot.json
    #[arg(long, env = "CAMPUS_BOT_CONFIG", default_value = "config")]
    config_dir: PathBuf,
}

/// Runs one startup step and logs how long it took.
async fn chore<T>(name: &str, step: impl Future<Output = T>) -> T {
    let started = Instant::now();
    let out = step.await;
    info!(chore = name, elapsed_ms = started.elapsed().as_millis() as u64, "startup chore finished");
    out
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("campus_bot=info")))
        .init();

    let cli = Cli::parse();
    info!(version = env!("CARGO_PKG_VERSION"), guild = %cli.guild_id, "campus-bot booting");

    let settings = load_settings(&cli.config_dir).context("loading bot settings")?;
    let catalog = match load_catalog(&cli.config_dir, &settings) {
        Ok(catalog) => catalog,
        Err(e) => {
            error!("{e}");
            return Err(e).context("loading role catalog");
        }
    };
    info!(
        degrees = catalog.degrees.len(),
        self_role_groups = catalog.self_roles.len(),
        courses = catalog.courses.len(),
        "catalog loaded"
    );

    let http = chore("connect", DiscordHttp::connect(&cli.token, cli.guild_id))
        .await
        .context("connecting to the chat server")?;
    let bot_user = http.bot_user();
    let dirs = Directories::from_backend(Arc::new(http));

    let layout = match chore("resolve layout", resolve_layout(&dirs, &settings, &catalog)).await {
        Ok(layout) => Arc::new(layout),
        Err(e) => {
            error!("{e}");
            return Err(e).context("server layout does not match the configuration");
        }
    };

    let reconciler = Arc::new(Reconciler::new(dirs.clone(), bot_user));
    let menus = vec![
        MenuPlan::degree_menu(&layout, &settings.degree_menu_header),
        MenuPlan::self_role_menu(&layout),
    ];
    let summary = chore("reconcile menus", reconciler.refresh(&menus)).await;
    if !summary.failed.is_empty() {
        warn!(failed = summary.failed.len(), "some menus could not be reconciled, their reactions are ignored");
    }
    info!(
        rebuilt = summary.rebuilt.len(),
        unchanged = summary.unchanged.len(),
        bound = summary.bound,
        "menus ready"
    );

    let dispatcher = Arc::new(Dispatcher {
        engine: ReactionRoleEngine::new(dirs.clone(), layout.clone(), reconciler.mapping(), bot_user),
        voice: VoiceChannelLifecycle::new(dirs.clone(), layout.everyone),
        onboarding: Onboarding::new(dirs.clone(), layout.clone(), settings.welcome_message.clone()),
        commands: CommandRouter::new(
            dirs.clone(),
            layout.clone(),
            reconciler.clone(),
            menus,
            settings.prefix.clone(),
            Duration::from_secs(settings.warning_delay_secs),
        ),
    });

    let shutdown = CancellationToken::new();
    let (tx, rx) = mpsc::channel(EVENT_QUEUE);

    let gateway = {
        let session = GatewaySession::new(cli.token.clone(), cli.guild_id, tx, shutdown.clone());
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let result = session.run().await;
            shutdown.cancel();
            result
        })
    };
    let reactor = tokio::spawn(Reactor::new(rx, dispatcher, shutdown.clone()).run());

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("interrupt received, shutting down"),
        _ = shutdown.cancelled() => {}
    }
    shutdown.cancel();

    reactor.await.context("reactor task")?;
    gateway.await.context("gateway task")??;
    info!("campus-bot stopped");
    Ok(())
}
