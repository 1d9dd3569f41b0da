use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info, warn};

use crate::config::CourseEntitlement;
use crate::directory::{
    ChannelId, ChannelInfo, ChannelKind, DirectoryResult, Directories, NewChannel, Overwrite, OverwriteTarget,
    RoleId,
};
use crate::kernel::boot::ResolvedDegree;

/// Outcome of one batch. Individual failures never abort the batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub created: usize,
    pub updated: usize,
    pub failed: Vec<(String, String)>,
}

impl SyncSummary {
    pub fn succeeded(&self) -> usize {
        self.created + self.updated
    }
}

impl fmt::Display for SyncSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} failed",
            self.created,
            self.updated,
            self.failed.len()
        )?;
        for (course, error) in &self.failed {
            write!(f, "\n  - {}: {}", course, error)?;
        }
        Ok(())
    }
}

pub fn course_channel_name(course_id: &str) -> String {
    course_id.to_lowercase()
}

/// Channel ACL for a course: hidden from everyone, readable by each
/// entitled degree. Degrees without a resolved role are skipped.
pub fn course_acl(course: &CourseEntitlement, degree_roles: &HashMap<&str, RoleId>, everyone: RoleId) -> Vec<Overwrite> {
    let mut acl = vec![Overwrite::deny_view(OverwriteTarget::Role(everyone))];
    acl.extend(
        course
            .degrees
            .iter()
            .filter_map(|name| degree_roles.get(name.as_str()))
            .map(|role| Overwrite::allow_view(OverwriteTarget::Role(*role))),
    );
    acl
}

enum Applied {
    Created,
    Updated,
}

pub struct CoursePermissionSync {
    dirs: Directories,
    category: ChannelId,
    everyone: RoleId,
}

impl CoursePermissionSync {
    pub fn new(dirs: Directories, category: ChannelId, everyone: RoleId) -> Self {
        Self { dirs, category, everyone }
    }

    pub async fn sync(
        &self,
        courses: &[CourseEntitlement],
        degrees: &[ResolvedDegree],
    ) -> DirectoryResult<SyncSummary> {
        let existing: HashMap<String, ChannelInfo> = self
            .dirs
            .channels
            .list_channels()
            .await?
            .into_iter()
            .filter(|c| c.kind == ChannelKind::Text && c.parent == Some(self.category))
            .map(|c| (c.name.clone(), c))
            .collect();
        let degree_roles: HashMap<&str, RoleId> = degrees.iter().map(|d| (d.name.as_str(), d.role)).collect();

        let mut summary = SyncSummary::default();
        for course in courses {
            let acl = course_acl(course, &degree_roles, self.everyone);
            let name = course_channel_name(&course.course_id);
            match self.apply(course, &name, existing.get(&name), &acl).await {
                Ok(Applied::Created) => summary.created += 1,
                Ok(Applied::Updated) => summary.updated += 1,
                Err(e) => {
                    warn!(course = %course.course_id, error = %e, "course channel sync failed");
                    summary.failed.push((course.course_id.clone(), e.to_string()));
                }
            }
        }

        info!(
            created = summary.created,
            updated = summary.updated,
            failed = summary.failed.len(),
            "course channels synchronized"
        );
        Ok(summary)
    }

    async fn apply(
        &self,
        course: &CourseEntitlement,
        name: &str,
        existing: Option<&ChannelInfo>,
        acl: &[Overwrite],
    ) -> DirectoryResult<Applied> {
        match existing {
            Some(channel) => {
                self.dirs.channels.replace_permissions(channel.id, &course.topic, acl).await?;
                debug!(course = %course.course_id, channel = %channel.id, "course channel updated");
                Ok(Applied::Updated)
            }
            None => {
                let id = self
                    .dirs
                    .channels
                    .create(NewChannel {
                        name: name.to_string(),
                        kind: ChannelKind::Text,
                        parent: Some(self.category),
                        topic: Some(course.topic.clone()),
                        overwrites: acl.to_vec(),
                    })
                    .await?;
                debug!(course = %course.course_id, channel = %id, "course channel created");
                Ok(Applied::Created)
            }
        }
    }
}
