//! Per-course channel visibility derived from the degree roster.

pub mod sync;

pub use sync::{course_acl, course_channel_name, CoursePermissionSync, SyncSummary};
