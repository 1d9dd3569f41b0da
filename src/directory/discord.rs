use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};

use super::{
    ChannelDirectory, ChannelId, ChannelInfo, ChannelKind, DirectoryError, DirectoryResult, GuildId,
    MemberId, Message, MessageId, MessageStore, NewChannel, Overwrite, OverwriteTarget, RoleDirectory,
    RoleId, RoleInfo,
};

const API_BASE: &str = "https://discord.com/api/v10";
const MAX_ATTEMPTS: u32 = 5;
const PAGE_SIZE: usize = 100;
const MEMBER_PAGE_SIZE: usize = 1000;

/// REST client for one guild. Calls carry no timeout; a 429 is retried
/// after the server-provided delay a bounded number of times.
#[derive(Clone)]
pub struct DiscordHttp {
    client: Client,
    token: String,
    guild: GuildId,
    base_url: String,
    bot_user: MemberId,
}

#[derive(Deserialize)]
struct UserDto {
    id: MemberId,
    #[serde(default)]
    bot: bool,
}

#[derive(Deserialize)]
struct RoleDto {
    id: RoleId,
    name: String,
}

#[derive(Deserialize)]
struct MemberDto {
    user: Option<UserDto>,
    #[serde(default)]
    roles: Vec<RoleId>,
}

#[derive(Deserialize)]
struct ChannelDto {
    id: ChannelId,
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    parent_id: Option<ChannelId>,
}

#[derive(Deserialize)]
struct MessageDto {
    id: MessageId,
    channel_id: ChannelId,
    author: UserDto,
    #[serde(default)]
    content: String,
}

#[derive(Serialize)]
struct OverwriteDto {
    id: String,
    #[serde(rename = "type")]
    kind: u8,
    allow: String,
    deny: String,
}

#[derive(Deserialize)]
struct RateLimitDto {
    retry_after: f64,
}

impl From<&Overwrite> for OverwriteDto {
    fn from(o: &Overwrite) -> Self {
        let kind = match o.target {
            OverwriteTarget::Role(_) => 0,
            OverwriteTarget::Member(_) => 1,
        };
        Self {
            id: o.target.id().to_string(),
            kind,
            allow: o.allow.bits().to_string(),
            deny: o.deny.bits().to_string(),
        }
    }
}

fn channel_kind(raw: u8) -> Option<ChannelKind> {
    match raw {
        0 | 5 => Some(ChannelKind::Text),
        2 | 13 => Some(ChannelKind::Voice),
        4 => Some(ChannelKind::Category),
        _ => None,
    }
}

fn channel_type(kind: ChannelKind) -> u8 {
    match kind {
        ChannelKind::Text => 0,
        ChannelKind::Voice => 2,
        ChannelKind::Category => 4,
    }
}

impl ChannelDto {
    fn into_info(self) -> Option<ChannelInfo> {
        Some(ChannelInfo {
            id: self.id,
            name: self.name.unwrap_or_default(),
            kind: channel_kind(self.kind)?,
            parent: self.parent_id,
        })
    }
}

impl From<MessageDto> for Message {
    fn from(m: MessageDto) -> Self {
        Message {
            id: m.id,
            channel: m.channel_id,
            author: m.author.id,
            content: m.content,
        }
    }
}

impl DiscordHttp {
    /// Builds the client and asks the server who we are.
    pub async fn connect(token: &str, guild: GuildId) -> DirectoryResult<Self> {
        let mut http = Self {
            client: Client::builder().build()?,
            token: token.to_string(),
            guild,
            base_url: API_BASE.to_string(),
            bot_user: MemberId(0),
        };
        let me: UserDto = http.get(&["users", "@me"], &[]).await?;
        if !me.bot {
            warn!("token does not belong to a bot account");
        }
        http.bot_user = me.id;
        Ok(http)
    }

    pub fn bot_user(&self) -> MemberId {
        self.bot_user
    }

    fn url(&self, segments: &[&str]) -> DirectoryResult<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| DirectoryError::Refused(format!("bad base url: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| DirectoryError::Refused("base url cannot carry a path".to_string()))?
            .extend(segments);
        Ok(url)
    }

    async fn call(
        &self,
        method: Method,
        segments: &[&str],
        query: &[(&str, String)],
        body: Option<Value>,
    ) -> DirectoryResult<Option<Value>> {
        let url = self.url(segments)?;
        let path = format!("/{}", segments.join("/"));

        for attempt in 1..=MAX_ATTEMPTS {
            let mut request = self
                .client
                .request(method.clone(), url.clone())
                .header(AUTHORIZATION, format!("Bot {}", self.token))
                .query(query);
            if let Some(body) = &body {
                request = request.json(body);
            }

            let response = request.send().await?;
            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                let wait = response
                    .json::<RateLimitDto>()
                    .await
                    .map(|r| r.retry_after)
                    .unwrap_or(1.0);
                warn!(%path, attempt, wait, "rate limited");
                tokio::time::sleep(Duration::from_secs_f64(wait.max(0.0))).await;
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(DirectoryError::Status {
                    method: method.to_string(),
                    path,
                    status: status.as_u16(),
                    body,
                });
            }

            let text = response.text().await?;
            debug!(%method, %path, status = status.as_u16(), "directory call");
            if text.trim().is_empty() {
                return Ok(None);
            }
            return Ok(Some(serde_json::from_str(&text)?));
        }

        Err(DirectoryError::RateLimited { path, attempts: MAX_ATTEMPTS })
    }

    async fn get<T: DeserializeOwned>(&self, segments: &[&str], query: &[(&str, String)]) -> DirectoryResult<T> {
        match self.call(Method::GET, segments, query, None).await? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Err(DirectoryError::Refused(format!("empty response from /{}", segments.join("/")))),
        }
    }

    async fn send_only(&self, method: Method, segments: &[&str], body: Option<Value>) -> DirectoryResult<()> {
        self.call(method, segments, &[], body).await.map(|_| ())
    }

    /// Newest-first pages, walked backwards with `before`.
    async fn messages_page(&self, channel: ChannelId, before: Option<MessageId>) -> DirectoryResult<Vec<MessageDto>> {
        let mut query = vec![("limit", PAGE_SIZE.to_string())];
        if let Some(before) = before {
            query.push(("before", before.to_string()));
        }
        self.get(&["channels", &channel.to_string(), "messages"], &query).await
    }
}

#[async_trait]
impl RoleDirectory for DiscordHttp {
    async fn list_roles(&self) -> DirectoryResult<Vec<RoleInfo>> {
        let roles: Vec<RoleDto> = self.get(&["guilds", &self.guild.to_string(), "roles"], &[]).await?;
        Ok(roles.into_iter().map(|r| RoleInfo { id: r.id, name: r.name }).collect())
    }

    async fn add(&self, member: MemberId, role: RoleId) -> DirectoryResult<()> {
        let guild = self.guild.to_string();
        let member = member.to_string();
        let role = role.to_string();
        self.send_only(Method::PUT, &["guilds", &guild, "members", &member, "roles", &role], None)
            .await
    }

    async fn remove(&self, member: MemberId, role: RoleId) -> DirectoryResult<()> {
        let guild = self.guild.to_string();
        let member = member.to_string();
        let role = role.to_string();
        self.send_only(Method::DELETE, &["guilds", &guild, "members", &member, "roles", &role], None)
            .await
    }

    async fn list_held(&self, member: MemberId) -> DirectoryResult<HashSet<RoleId>> {
        let dto: MemberDto = self
            .get(&["guilds", &self.guild.to_string(), "members", &member.to_string()], &[])
            .await?;
        Ok(dto.roles.into_iter().collect())
    }

    async fn holders(&self, role: RoleId) -> DirectoryResult<Vec<MemberId>> {
        let guild = self.guild.to_string();
        let mut holders = Vec::new();
        let mut after: Option<MemberId> = None;

        loop {
            let mut query = vec![("limit", MEMBER_PAGE_SIZE.to_string())];
            if let Some(after) = after {
                query.push(("after", after.to_string()));
            }
            let page: Vec<MemberDto> = self.get(&["guilds", &guild, "members"], &query).await?;
            let full_page = page.len() == MEMBER_PAGE_SIZE;

            for member in page {
                let Some(user) = member.user else { continue };
                after = Some(after.map_or(user.id, |a| a.max(user.id)));
                if member.roles.contains(&role) {
                    holders.push(user.id);
                }
            }

            if !full_page {
                break;
            }
        }

        Ok(holders)
    }
}

#[async_trait]
impl ChannelDirectory for DiscordHttp {
    async fn list_channels(&self) -> DirectoryResult<Vec<ChannelInfo>> {
        let channels: Vec<ChannelDto> = self.get(&["guilds", &self.guild.to_string(), "channels"], &[]).await?;
        Ok(channels.into_iter().filter_map(ChannelDto::into_info).collect())
    }

    async fn channel(&self, id: ChannelId) -> DirectoryResult<Option<ChannelInfo>> {
        match self.get::<ChannelDto>(&["channels", &id.to_string()], &[]).await {
            Ok(dto) => Ok(dto.into_info()),
            Err(DirectoryError::Status { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn history(&self, channel: ChannelId) -> DirectoryResult<Vec<Message>> {
        let mut newest_first: Vec<Message> = Vec::new();
        let mut before = None;

        loop {
            let page = self.messages_page(channel, before).await?;
            let full_page = page.len() == PAGE_SIZE;
            before = page.last().map(|m| m.id);
            newest_first.extend(page.into_iter().map(Message::from));
            if !full_page || before.is_none() {
                break;
            }
        }

        newest_first.reverse();
        Ok(newest_first)
    }

    async fn purge(&self, channel: ChannelId) -> DirectoryResult<()> {
        for message in self.history(channel).await? {
            self.delete_message(channel, message.id).await?;
        }
        Ok(())
    }

    async fn send(&self, channel: ChannelId, content: &str) -> DirectoryResult<MessageId> {
        let body = json!({ "content": content, "allowed_mentions": { "parse": ["users"] } });
        match self
            .call(Method::POST, &["channels", &channel.to_string(), "messages"], &[], Some(body))
            .await?
        {
            Some(value) => Ok(serde_json::from_value::<MessageDto>(value)?.id),
            None => Err(DirectoryError::Refused("message create returned no body".to_string())),
        }
    }

    async fn delete_message(&self, channel: ChannelId, message: MessageId) -> DirectoryResult<()> {
        let channel = channel.to_string();
        let message = message.to_string();
        self.send_only(Method::DELETE, &["channels", &channel, "messages", &message], None)
            .await
    }

    async fn create(&self, channel: NewChannel) -> DirectoryResult<ChannelId> {
        let overwrites: Vec<OverwriteDto> = channel.overwrites.iter().map(OverwriteDto::from).collect();
        let mut body = json!({
            "name": channel.name,
            "type": channel_type(channel.kind),
            "permission_overwrites": overwrites,
        });
        if let Some(parent) = channel.parent {
            body["parent_id"] = json!(parent.to_string());
        }
        if let Some(topic) = channel.topic {
            body["topic"] = json!(topic);
        }

        match self
            .call(Method::POST, &["guilds", &self.guild.to_string(), "channels"], &[], Some(body))
            .await?
        {
            Some(value) => Ok(serde_json::from_value::<ChannelDto>(value)?.id),
            None => Err(DirectoryError::Refused("channel create returned no body".to_string())),
        }
    }

    async fn set_overwrite(&self, channel: ChannelId, overwrite: Overwrite) -> DirectoryResult<()> {
        let dto = OverwriteDto::from(&overwrite);
        let body = json!({ "allow": dto.allow, "deny": dto.deny, "type": dto.kind });
        self.send_only(
            Method::PUT,
            &["channels", &channel.to_string(), "permissions", &dto.id],
            Some(body),
        )
        .await
    }

    async fn remove_overwrite(&self, channel: ChannelId, target: OverwriteTarget) -> DirectoryResult<()> {
        let channel = channel.to_string();
        let target = target.id().to_string();
        self.send_only(Method::DELETE, &["channels", &channel, "permissions", &target], None)
            .await
    }

    async fn replace_permissions(
        &self,
        channel: ChannelId,
        topic: &str,
        overwrites: &[Overwrite],
    ) -> DirectoryResult<()> {
        let overwrites: Vec<OverwriteDto> = overwrites.iter().map(OverwriteDto::from).collect();
        let body = json!({ "topic": topic, "permission_overwrites": overwrites });
        self.send_only(Method::PATCH, &["channels", &channel.to_string()], Some(body))
            .await
    }

    async fn delete(&self, channel: ChannelId) -> DirectoryResult<()> {
        self.send_only(Method::DELETE, &["channels", &channel.to_string()], None)
            .await
    }
}

#[async_trait]
impl MessageStore for DiscordHttp {
    async fn add_reaction(&self, channel: ChannelId, message: MessageId, emoji: &str) -> DirectoryResult<()> {
        let channel = channel.to_string();
        let message = message.to_string();
        self.send_only(
            Method::PUT,
            &["channels", &channel, "messages", &message, "reactions", emoji, "@me"],
            None,
        )
        .await
    }

    async fn remove_reaction(
        &self,
        channel: ChannelId,
        message: MessageId,
        emoji: &str,
        member: MemberId,
    ) -> DirectoryResult<()> {
        let channel = channel.to_string();
        let message = message.to_string();
        let member = member.to_string();
        self.send_only(
            Method::DELETE,
            &["channels", &channel, "messages", &message, "reactions", emoji, &member],
            None,
        )
        .await
    }

    async fn fetch(&self, channel: ChannelId, message: MessageId) -> DirectoryResult<Option<Message>> {
        match self
            .get::<MessageDto>(&["channels", &channel.to_string(), "messages", &message.to_string()], &[])
            .await
        {
            Ok(dto) => Ok(Some(dto.into())),
            Err(DirectoryError::Status { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
