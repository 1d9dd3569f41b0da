use serde::{Deserialize, Serialize};

/// `bot.json`. Every field has a default so the file itself is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotSettings {
    #[serde(default = "default_prefix")]
    pub prefix: String,

    #[serde(default)]
    pub roles: RoleNames,

    #[serde(default)]
    pub channels: ChannelNames,

    /// Instruction message heading the degree menu
    #[serde(default = "default_menu_header")]
    pub degree_menu_header: String,

    /// Posted in the welcome channel; `$USER` becomes a mention
    #[serde(default = "default_welcome")]
    pub welcome_message: String,

    /// How long privilege warnings stay visible
    #[serde(default = "default_warning_delay")]
    pub warning_delay_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleNames {
    #[serde(default = "default_tourist")]
    pub tourist: String,

    /// Campus of degrees with `isRemoteCampus = false`
    #[serde(default = "default_home_campus")]
    pub home_campus: String,

    /// Campus of degrees with `isRemoteCampus = true`
    #[serde(default = "default_remote_campus")]
    pub remote_campus: String,

    /// Holders of any of these may run privileged commands
    #[serde(default = "default_privileged")]
    pub privileged: Vec<String>,

    /// Toggled by `sudo`, cleared by `reset_admin`
    #[serde(default = "default_elevated")]
    pub elevated: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelNames {
    #[serde(default = "default_degree_menu")]
    pub degree_menu: String,

    #[serde(default = "default_self_roles")]
    pub self_roles: String,

    #[serde(default = "default_welcome_channel")]
    pub welcome: String,

    /// Category holding one channel per course
    #[serde(default = "default_course_category")]
    pub course_category: String,
}

fn default_prefix() -> String { "$".to_string() }
fn default_menu_header() -> String {
    "Reage com ☑️ na mensagem do teu curso para teres acesso aos canais respetivos.\n\
     React with ☑️ on your degree's message to get access to its channels."
        .to_string()
}
fn default_welcome() -> String {
    "Bem vind@ $USER! Escolhe o teu curso no canal de cursos. / Welcome $USER! Pick your degree in the degrees channel."
        .to_string()
}
fn default_warning_delay() -> u64 { 5 }
fn default_tourist() -> String { "TurISTa".to_string() }
fn default_home_campus() -> String { "Alameda".to_string() }
fn default_remote_campus() -> String { "Tagus Park".to_string() }
fn default_privileged() -> Vec<String> { vec!["Mod".to_string(), "Admin".to_string()] }
fn default_elevated() -> String { "Admin+".to_string() }
fn default_degree_menu() -> String { "escolhe-o-teu-curso".to_string() }
fn default_self_roles() -> String { "escolhe-as-tuas-roles".to_string() }
fn default_welcome_channel() -> String { "entradas".to_string() }
fn default_course_category() -> String { "Cadeiras".to_string() }

impl Default for RoleNames {
    fn default() -> Self {
        Self {
            tourist: default_tourist(),
            home_campus: default_home_campus(),
            remote_campus: default_remote_campus(),
            privileged: default_privileged(),
            elevated: default_elevated(),
        }
    }
}

impl Default for ChannelNames {
    fn default() -> Self {
        Self {
            degree_menu: default_degree_menu(),
            self_roles: default_self_roles(),
            welcome: default_welcome_channel(),
            course_category: default_course_category(),
        }
    }
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            roles: RoleNames::default(),
            channels: ChannelNames::default(),
            degree_menu_header: default_menu_header(),
            welcome_message: default_welcome(),
            warning_delay_secs: default_warning_delay(),
        }
    }
}
