//! Startup resolution of configured names into server ids.
//!
//! Every missing role, channel and category is collected before failing so
//! that one run reports the whole misconfiguration.

use std::collections::HashMap;
use std::fmt;
use tracing::info;

use crate::config::{BotSettings, Catalog, CourseEntitlement};
use crate::directory::{ChannelId, ChannelInfo, ChannelKind, DirectoryError, Directories, RoleId};

pub const EVERYONE_ROLE: &str = "@everyone";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDegree {
    pub name: String,
    pub display: String,
    pub remote_campus: bool,
    pub role: RoleId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSelfRole {
    pub role_name: String,
    pub prompt: String,
    pub role: RoleId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedGroup {
    pub id: String,
    pub header: String,
    pub entries: Vec<ResolvedSelfRole>,
}

/// The server-side view of the configuration, immutable for the process
/// lifetime.
#[derive(Debug, Clone)]
pub struct GuildLayout {
    pub everyone: RoleId,
    pub tourist: RoleId,
    pub home_campus: RoleId,
    pub remote_campus: RoleId,
    pub elevated: RoleId,
    pub privileged: Vec<RoleId>,
    pub degrees: Vec<ResolvedDegree>,
    pub self_roles: Vec<ResolvedGroup>,
    pub courses: Vec<CourseEntitlement>,
    pub degree_menu: ChannelId,
    pub self_role_channel: ChannelId,
    pub welcome: ChannelId,
    pub course_category: ChannelId,
}

impl GuildLayout {
    pub fn campus_role(&self, remote_campus: bool) -> RoleId {
        if remote_campus {
            self.remote_campus
        } else {
            self.home_campus
        }
    }

    pub fn degree_roles(&self) -> impl Iterator<Item = RoleId> + '_ {
        self.degrees.iter().map(|d| d.role)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissingEntity {
    Role(String),
    Channel(String),
    Category(String),
}

impl fmt::Display for MissingEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingEntity::Role(name) => write!(f, "role \"{}\"", name),
            MissingEntity::Channel(name) => write!(f, "text channel \"{}\"", name),
            MissingEntity::Category(name) => write!(f, "category \"{}\"", name),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("{} required entities are missing from the server:{}", .0.len(), render_missing(.0))]
    Missing(Vec<MissingEntity>),

    #[error("could not read the server layout: {0}")]
    Directory(#[from] DirectoryError),
}

fn render_missing(missing: &[MissingEntity]) -> String {
    missing.iter().map(|m| format!("\n  - {}", m)).collect()
}

struct Resolver {
    roles: HashMap<String, RoleId>,
    channels: Vec<ChannelInfo>,
    missing: Vec<MissingEntity>,
}

impl Resolver {
    /// Unknown roles resolve to a placeholder id and are recorded once.
    fn role(&mut self, name: &str) -> RoleId {
        match self.roles.get(name) {
            Some(id) => *id,
            None => {
                let entry = MissingEntity::Role(name.to_string());
                if !self.missing.contains(&entry) {
                    self.missing.push(entry);
                }
                RoleId(0)
            }
        }
    }

    fn channel(&mut self, name: &str, kind: ChannelKind) -> ChannelId {
        match self.channels.iter().find(|c| c.kind == kind && c.name == name) {
            Some(c) => c.id,
            None => {
                let entry = match kind {
                    ChannelKind::Category => MissingEntity::Category(name.to_string()),
                    _ => MissingEntity::Channel(name.to_string()),
                };
                if !self.missing.contains(&entry) {
                    self.missing.push(entry);
                }
                ChannelId(0)
            }
        }
    }
}

pub async fn resolve_layout(
    dirs: &Directories,
    settings: &BotSettings,
    catalog: &Catalog,
) -> Result<GuildLayout, StartupError> {
    let mut roles = HashMap::new();
    for role in dirs.roles.list_roles().await? {
        roles.entry(role.name).or_insert(role.id);
    }
    let channels = dirs.channels.list_channels().await?;
    info!(roles = roles.len(), channels = channels.len(), "server layout fetched");

    let mut r = Resolver {
        roles,
        channels,
        missing: Vec::new(),
    };

    let names = &settings.roles;
    let everyone = r.role(EVERYONE_ROLE);
    let tourist = r.role(&names.tourist);
    let home_campus = r.role(&names.home_campus);
    let remote_campus = r.role(&names.remote_campus);
    let elevated = r.role(&names.elevated);
    let privileged = names.privileged.iter().map(|name| r.role(name)).collect();

    let degrees = catalog
        .degrees
        .iter()
        .map(|d| ResolvedDegree {
            name: d.name.clone(),
            display: d.display.clone(),
            remote_campus: d.remote_campus,
            role: r.role(&d.name),
        })
        .collect();

    let self_roles = catalog
        .self_roles
        .iter()
        .map(|g| ResolvedGroup {
            id: g.id.clone(),
            header: g.header.clone(),
            entries: g
                .entries
                .iter()
                .map(|e| ResolvedSelfRole {
                    role_name: e.role_name.clone(),
                    prompt: e.prompt.clone(),
                    role: r.role(&e.role_name),
                })
                .collect(),
        })
        .collect();

    let channel_names = &settings.channels;
    let degree_menu = r.channel(&channel_names.degree_menu, ChannelKind::Text);
    let self_role_channel = r.channel(&channel_names.self_roles, ChannelKind::Text);
    let welcome = r.channel(&channel_names.welcome, ChannelKind::Text);
    let course_category = r.channel(&channel_names.course_category, ChannelKind::Category);

    if !r.missing.is_empty() {
        return Err(StartupError::Missing(r.missing));
    }

    Ok(GuildLayout {
        everyone,
        tourist,
        home_campus,
        remote_campus,
        elevated,
        privileged,
        degrees,
        self_roles,
        courses: catalog.courses.clone(),
        degree_menu,
        self_role_channel,
        welcome,
        course_category,
    })
}
