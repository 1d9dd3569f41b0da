use serde::de::DeserializeOwned;
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::Path;
use tracing::info;

use super::error::ConfigError;
use super::settings::BotSettings;
use super::types::*;

pub const DEGREES_FILE: &str = "degrees.json";
pub const ROLES_FILE: &str = "roles.json";
pub const COURSES_FILE: &str = "courses.json";
pub const SETTINGS_FILE: &str = "bot.json";

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Loads `bot.json`, falling back to defaults when the file is absent.
pub fn load_settings(dir: &Path) -> Result<BotSettings, ConfigError> {
    let path = dir.join(SETTINGS_FILE);
    if !path.exists() {
        info!("{} not found, using default settings", path.display());
        return Ok(BotSettings::default());
    }
    read_json(&path)
}

/// Loads and validates the three descriptor files.
pub fn load_catalog(dir: &Path, settings: &BotSettings) -> Result<Catalog, ConfigError> {
    let degrees: Vec<DegreeDescriptor> = read_json(&dir.join(DEGREES_FILE))?;
    let self_roles: SelfRoleDescriptor = read_json(&dir.join(ROLES_FILE))?;
    let courses: CourseMap = read_json(&dir.join(COURSES_FILE))?;

    let catalog = Catalog::from_descriptors(degrees, self_roles, courses, settings)?;
    info!(
        degrees = catalog.degrees.len(),
        groups = catalog.self_roles.len(),
        courses = catalog.courses.len(),
        "catalog loaded from {}",
        dir.display()
    );
    Ok(catalog)
}

/// Texts sharing one menu channel must not contain each other, otherwise
/// matching a message back to its entity is ambiguous.
fn check_overlaps(channel: &str, entities: &[(String, &str)], headers: &[&str], problems: &mut Vec<String>) {
    for (label, text) in entities {
        if text.trim().is_empty() {
            problems.push(format!("{}: {} has empty text", channel, label));
        }
    }

    for i in 0..entities.len() {
        for j in (i + 1)..entities.len() {
            let (a_label, a) = (&entities[i].0, entities[i].1);
            let (b_label, b) = (&entities[j].0, entities[j].1);
            if a.is_empty() || b.is_empty() {
                continue;
            }
            if b.contains(a) {
                problems.push(format!("{}: text of {} is contained in {}", channel, a_label, b_label));
            } else if a.contains(b) {
                problems.push(format!("{}: text of {} is contained in {}", channel, b_label, a_label));
            }
        }
    }

    for header in headers {
        for (label, text) in entities {
            if !text.is_empty() && header.contains(text) {
                problems.push(format!("{}: a header message contains the text of {}", channel, label));
            }
        }
    }
}

impl Catalog {
    pub fn from_descriptors(
        degrees: Vec<DegreeDescriptor>,
        self_roles: SelfRoleDescriptor,
        courses: CourseMap,
        settings: &BotSettings,
    ) -> Result<Self, ConfigError> {
        let mut problems = Vec::new();

        // Degrees
        let mut names = HashSet::new();
        for d in &degrees {
            if d.name.trim().is_empty() {
                problems.push("a degree has an empty name".to_string());
            } else if !names.insert(d.name.as_str()) {
                problems.push(format!("degree {} is declared twice", d.name));
            }
        }
        let degree_texts: Vec<(String, &str)> = degrees
            .iter()
            .map(|d| (format!("degree {}", d.name), d.display.as_str()))
            .collect();
        check_overlaps(
            &settings.channels.degree_menu,
            &degree_texts,
            &[settings.degree_menu_header.as_str()],
            &mut problems,
        );

        // Self-role groups
        let mut groups = Vec::new();
        for (group_id, group) in &self_roles.groups {
            let mut entries = Vec::new();
            for role_name in &group.roles {
                match self_roles.roles.get(role_name) {
                    Some(prompt) => entries.push(SelfRoleEntry {
                        role_name: role_name.clone(),
                        prompt: prompt.clone(),
                    }),
                    None => problems.push(format!(
                        "group {} lists role {} which has no prompt in \"roles\"",
                        group_id, role_name
                    )),
                }
            }
            groups.push(SelfRoleGroup {
                id: group_id.clone(),
                header: group.msg.clone(),
                entries,
            });
        }
        let entry_texts: Vec<(String, &str)> = groups
            .iter()
            .flat_map(|g| {
                g.entries
                    .iter()
                    .map(move |e| (format!("role {} in group {}", e.role_name, g.id), e.prompt.as_str()))
            })
            .collect();
        let headers: Vec<&str> = groups.iter().map(|g| g.header.as_str()).collect();
        check_overlaps(&settings.channels.self_roles, &entry_texts, &headers, &mut problems);

        // Courses
        let mut entitlements = Vec::new();
        for (course_id, course) in courses {
            for degree in &course.degrees {
                if !names.contains(degree.as_str()) {
                    problems.push(format!("course {} references unknown degree {}", course_id, degree));
                }
            }
            entitlements.push(CourseEntitlement {
                course_id,
                topic: course.name,
                degrees: course.degrees.into_iter().collect::<BTreeSet<_>>(),
            });
        }

        if !problems.is_empty() {
            return Err(ConfigError::Invalid(problems));
        }

        Ok(Catalog {
            degrees: degrees
                .into_iter()
                .map(|d| Degree {
                    name: d.name,
                    display: d.display,
                    remote_campus: d.remote_campus,
                })
                .collect(),
            self_roles: groups,
            courses: entitlements,
        })
    }
}
