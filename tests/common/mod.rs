#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use campus_bot::config::{
    BotSettings, Catalog, CourseDescriptor, CourseMap, DegreeDescriptor, GroupDescriptor, SelfRoleDescriptor,
};
use campus_bot::directory::memory::MemoryGuild;
use campus_bot::directory::{ChannelId, ChannelKind, Directories, MemberId, MessageId, RoleId};
use campus_bot::kernel::boot::{resolve_layout, GuildLayout};
use campus_bot::kernel::event::ReactionEvent;
use campus_bot::roles::{MenuPlan, MenuTarget, ReactionRoleEngine, Reconciler, TOGGLE_EMOJI};

pub const LEIC_A: &str = "LEIC-A";
pub const LEIC_T: &str = "LEIC-T";
pub const MEEC: &str = "MEEC";

pub fn degree(name: &str, display: &str, remote_campus: bool) -> DegreeDescriptor {
    DegreeDescriptor {
        name: name.to_string(),
        display: display.to_string(),
        remote_campus,
    }
}

pub fn sample_degrees() -> Vec<DegreeDescriptor> {
    vec![
        degree(LEIC_A, "Informática (Alameda)", false),
        degree(LEIC_T, "Informática (Taguspark)", true),
        degree(MEEC, "Electrotécnica", false),
    ]
}

pub fn sample_self_roles() -> SelfRoleDescriptor {
    SelfRoleDescriptor {
        roles: BTreeMap::from([
            ("Gaming".to_string(), "🎮 Jogos / Gaming".to_string()),
            ("Music".to_string(), "🎵 Música / Music".to_string()),
        ]),
        groups: BTreeMap::from([(
            "interests".to_string(),
            GroupDescriptor {
                msg: "Interesses / Interests".to_string(),
                roles: vec!["Gaming".to_string(), "Music".to_string()],
            },
        )]),
    }
}

pub fn sample_courses() -> CourseMap {
    BTreeMap::from([
        (
            "IAED".to_string(),
            CourseDescriptor {
                name: "Algoritmos e Estruturas de Dados".to_string(),
                degrees: vec![LEIC_A.to_string(), LEIC_T.to_string()],
            },
        ),
        (
            "SisDig".to_string(),
            CourseDescriptor {
                name: "Sistemas Digitais".to_string(),
                degrees: vec![LEIC_A.to_string(), LEIC_T.to_string(), MEEC.to_string()],
            },
        ),
    ])
}

pub fn sample_catalog(settings: &BotSettings) -> Catalog {
    Catalog::from_descriptors(sample_degrees(), sample_self_roles(), sample_courses(), settings)
        .expect("sample catalog is valid")
}

/// A guild holding every role and channel the sample catalog needs.
pub struct Fixture {
    pub guild: Arc<MemoryGuild>,
    pub dirs: Directories,
    pub settings: BotSettings,
    pub catalog: Catalog,
    pub layout: Arc<GuildLayout>,
    pub roles: HashMap<String, RoleId>,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::build(MemoryGuild::new()).await
    }

    /// Every directory call yields once, so concurrent handlers interleave.
    pub async fn interleaved() -> Self {
        Self::build(MemoryGuild::new().with_interleaving()).await
    }

    async fn build(guild: MemoryGuild) -> Self {
        let settings = BotSettings::default();
        let catalog = sample_catalog(&settings);

        let mut roles = HashMap::new();
        let names = &settings.roles;
        let mut wanted: Vec<String> = vec![
            names.tourist.clone(),
            names.home_campus.clone(),
            names.remote_campus.clone(),
            names.elevated.clone(),
        ];
        wanted.extend(names.privileged.iter().cloned());
        wanted.extend(catalog.degrees.iter().map(|d| d.name.clone()));
        wanted.extend(["Gaming".to_string(), "Music".to_string()]);
        for name in wanted {
            let id = guild.add_role(&name);
            roles.insert(name, id);
        }

        let channels = &settings.channels;
        guild.add_channel(&channels.degree_menu, ChannelKind::Text, None);
        guild.add_channel(&channels.self_roles, ChannelKind::Text, None);
        guild.add_channel(&channels.welcome, ChannelKind::Text, None);
        guild.add_channel(&channels.course_category, ChannelKind::Category, None);

        let guild = Arc::new(guild);
        let dirs = Directories::from_backend(guild.clone());
        let layout = resolve_layout(&dirs, &settings, &catalog)
            .await
            .expect("fixture guild resolves");

        Self {
            guild,
            dirs,
            settings,
            catalog,
            layout: Arc::new(layout),
            roles,
        }
    }

    pub fn role(&self, name: &str) -> RoleId {
        self.roles[name]
    }

    pub fn tourist(&self) -> RoleId {
        self.layout.tourist
    }

    /// A member fresh off onboarding: holds only the tourist role.
    pub fn tourist_member(&self) -> MemberId {
        let member = self.guild.new_member();
        self.guild.grant(member, self.layout.tourist);
        member
    }

    pub fn menus(&self) -> Vec<MenuPlan> {
        vec![
            MenuPlan::degree_menu(&self.layout, &self.settings.degree_menu_header),
            MenuPlan::self_role_menu(&self.layout),
        ]
    }

    pub fn reconciler(&self) -> Arc<Reconciler> {
        Arc::new(Reconciler::new(self.dirs.clone(), self.guild.bot_user()))
    }

    /// Reconciles both menus and returns an engine reading the fresh mapping.
    pub async fn engine(&self) -> (Arc<Reconciler>, ReactionRoleEngine) {
        let reconciler = self.reconciler();
        let summary = reconciler.refresh(&self.menus()).await;
        assert!(summary.failed.is_empty(), "menus reconcile cleanly: {:?}", summary.failed);
        let engine = ReactionRoleEngine::new(
            self.dirs.clone(),
            self.layout.clone(),
            reconciler.mapping(),
            self.guild.bot_user(),
        );
        (reconciler, engine)
    }

    pub fn degree_index(&self, name: &str) -> usize {
        self.layout
            .degrees
            .iter()
            .position(|d| d.name == name)
            .expect("degree exists")
    }

    /// Menu message currently bound to `target`.
    pub async fn menu_message(&self, reconciler: &Reconciler, target: MenuTarget) -> MessageId {
        reconciler
            .mapping()
            .read()
            .await
            .message_for(target)
            .expect("target is bound")
    }

    pub async fn degree_reaction(&self, reconciler: &Reconciler, member: MemberId, degree: &str) -> ReactionEvent {
        let target = MenuTarget::Degree(self.degree_index(degree));
        let message = self.menu_message(reconciler, target).await;
        self.guild
            .react_as(self.layout.degree_menu, message, TOGGLE_EMOJI, member);
        ReactionEvent {
            member,
            channel: self.layout.degree_menu,
            message,
            emoji: TOGGLE_EMOJI.to_string(),
        }
    }

    pub async fn self_role_reaction(&self, reconciler: &Reconciler, member: MemberId, role: &str) -> ReactionEvent {
        let message = self
            .menu_message(reconciler, MenuTarget::SelfRole(self.role(role)))
            .await;
        ReactionEvent {
            member,
            channel: self.layout.self_role_channel,
            message,
            emoji: TOGGLE_EMOJI.to_string(),
        }
    }

    pub fn channel(&self, name: &str) -> ChannelId {
        self.guild.channel_named(name).expect("channel exists").id
    }
}
