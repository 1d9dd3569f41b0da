//! Gateway session: identifies, keeps the heartbeat, and forwards decoded
//! dispatches to the reactor queue. Reconnects with backoff until shut down
//! or until the gateway closes with a code that rules out a retry.

pub mod payload;

use anyhow::{bail, Context, Result};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::directory::GuildId;
use crate::kernel::event::Event;
use payload::{op, GatewayPayload, Hello, Translator};

pub const GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

const GUILDS: u64 = 1 << 0;
const GUILD_MEMBERS: u64 = 1 << 1;
const GUILD_VOICE_STATES: u64 = 1 << 7;
const GUILD_MESSAGES: u64 = 1 << 9;
const GUILD_MESSAGE_REACTIONS: u64 = 1 << 10;
const MESSAGE_CONTENT: u64 = 1 << 15;

pub const INTENTS: u64 =
    GUILDS | GUILD_MEMBERS | GUILD_VOICE_STATES | GUILD_MESSAGES | GUILD_MESSAGE_REACTIONS | MESSAGE_CONTENT;

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Close codes after which reconnecting cannot help.
const FATAL_CLOSE_CODES: &[u16] = &[4004, 4010, 4011, 4012, 4013, 4014];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Reconnect,
    Shutdown,
    /// Bad token, bad intents or similar; a new session would fail the same way.
    Fatal(u16),
}

fn close_outcome(code: Option<u16>) -> SessionEnd {
    match code {
        Some(code) if FATAL_CLOSE_CODES.contains(&code) => SessionEnd::Fatal(code),
        _ => SessionEnd::Reconnect,
    }
}

pub struct GatewaySession {
    token: String,
    url: String,
    translator: Translator,
    events: mpsc::Sender<Event>,
    shutdown: CancellationToken,
}

impl GatewaySession {
    pub fn new(token: impl Into<String>, guild: GuildId, events: mpsc::Sender<Event>, shutdown: CancellationToken) -> Self {
        Self {
            token: token.into(),
            url: GATEWAY_URL.to_string(),
            translator: Translator::new(guild),
            events,
            shutdown,
        }
    }

    /// Points the session at another gateway endpoint.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub async fn run(mut self) -> Result<()> {
        let mut backoff = INITIAL_BACKOFF;

        loop {
            match self.session().await {
                Ok(SessionEnd::Shutdown) => {
                    info!("gateway session closed");
                    return Ok(());
                }
                Ok(SessionEnd::Fatal(code)) => {
                    bail!("gateway refused the session with close code {code}");
                }
                Ok(SessionEnd::Reconnect) => {
                    backoff = INITIAL_BACKOFF;
                    info!("gateway asked for a new session");
                }
                Err(e) => {
                    if self.shutdown.is_cancelled() {
                        return Ok(());
                    }
                    warn!(error = %e, retry_in = ?backoff, "gateway session failed");
                }
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => return Ok(()),
                _ = tokio::time::sleep(backoff) => {}
            }
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    async fn session(&mut self) -> Result<SessionEnd> {
        let (ws, _) = connect_async(self.url.as_str()).await.context("gateway connect failed")?;
        let (mut sink, mut stream) = ws.split();

        let hello = loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    let frame: GatewayPayload = serde_json::from_str(&text)?;
                    if frame.op == op::HELLO {
                        break Hello::deserialize(&frame.d)?;
                    }
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => bail!("gateway closed before hello"),
            }
        };

        let identify = json!({
            "op": op::IDENTIFY,
            "d": {
                "token": self.token,
                "intents": INTENTS,
                "properties": {
                    "os": std::env::consts::OS,
                    "browser": env!("CARGO_PKG_NAME"),
                    "device": env!("CARGO_PKG_NAME"),
                }
            }
        });
        sink.send(Message::Text(identify.to_string())).await?;

        let mut heartbeat = tokio::time::interval(Duration::from_millis(hello.heartbeat_interval));
        heartbeat.tick().await;
        let mut sequence: Option<u64> = None;
        let mut acked = true;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return Ok(SessionEnd::Shutdown);
                }
                _ = heartbeat.tick() => {
                    if !acked {
                        warn!("heartbeat not acknowledged, dropping connection");
                        return Ok(SessionEnd::Reconnect);
                    }
                    acked = false;
                    sink.send(heartbeat_frame(sequence)).await?;
                }
                frame = stream.next() => {
                    let text = match frame {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(close))) => {
                            debug!(?close, "gateway closed the connection");
                            return Ok(close_outcome(close.as_ref().map(|c| u16::from(c.code))));
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => return Err(e.into()),
                        None => return Ok(SessionEnd::Reconnect),
                    };

                    let frame: GatewayPayload = serde_json::from_str(&text)?;
                    match frame.op {
                        op::DISPATCH => {
                            if frame.s.is_some() {
                                sequence = frame.s;
                            }
                            if !self.forward(&frame).await {
                                return Ok(SessionEnd::Shutdown);
                            }
                        }
                        op::HEARTBEAT => sink.send(heartbeat_frame(sequence)).await?,
                        op::HEARTBEAT_ACK => acked = true,
                        op::RECONNECT | op::INVALID_SESSION => return Ok(SessionEnd::Reconnect),
                        other => debug!(op = other, "ignored gateway opcode"),
                    }
                }
            }
        }
    }

    /// False once the reactor has stopped listening.
    async fn forward(&mut self, frame: &GatewayPayload) -> bool {
        let Some(kind) = frame.t.as_deref() else {
            return true;
        };
        if kind == "READY" {
            info!("gateway session ready");
        }

        let events = match self.translator.translate(kind, &frame.d) {
            Ok(events) => events,
            Err(e) => {
                debug!(kind, error = %e, "undecodable dispatch skipped");
                return true;
            }
        };
        for event in events {
            if self.events.send(event).await.is_err() {
                return false;
            }
        }
        true
    }
}

fn heartbeat_frame(sequence: Option<u64>) -> Message {
    Message::Text(json!({ "op": op::HEARTBEAT, "d": sequence }).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_listed_close_codes_are_fatal() {
        assert_eq!(close_outcome(Some(4004)), SessionEnd::Fatal(4004));
        assert_eq!(close_outcome(Some(4014)), SessionEnd::Fatal(4014));
        assert_eq!(close_outcome(Some(4000)), SessionEnd::Reconnect);
        assert_eq!(close_outcome(Some(1000)), SessionEnd::Reconnect);
        assert_eq!(close_outcome(None), SessionEnd::Reconnect);
    }
}
