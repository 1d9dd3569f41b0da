use crate::directory::MemberId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Refresh,
    RebuildCourseChannels,
    /// Toggle the elevated role on `target`, or on the caller when absent.
    Sudo { target: Option<MemberId> },
    ResetAdmin,
    Version,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Refresh => "refresh",
            Command::RebuildCourseChannels => "rebuild_course_channels",
            Command::Sudo { .. } => "sudo",
            Command::ResetAdmin => "reset_admin",
            Command::Version => "version",
        }
    }

    pub fn requires_privilege(&self) -> bool {
        !matches!(self, Command::Version)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unknown command `{0}`")]
    Unknown(String),

    #[error("`{0}` is not a member mention")]
    BadMention(String),
}

/// `None` when `content` does not start with `prefix`.
pub fn parse(prefix: &str, content: &str) -> Option<Result<Command, ParseError>> {
    let body = content.trim().strip_prefix(prefix)?;
    let mut words = body.split_whitespace();
    let name = words.next()?;

    let command = match name {
        "refresh" => Command::Refresh,
        "rebuild_course_channels" => Command::RebuildCourseChannels,
        "reset_admin" => Command::ResetAdmin,
        "version" => Command::Version,
        "sudo" => match words.next() {
            None => Command::Sudo { target: None },
            Some(arg) => match parse_mention(arg) {
                Some(member) => Command::Sudo { target: Some(member) },
                None => return Some(Err(ParseError::BadMention(arg.to_string()))),
            },
        },
        other => return Some(Err(ParseError::Unknown(other.to_string()))),
    };
    Some(Ok(command))
}

/// Accepts `<@id>` and the nickname form `<@!id>`.
pub fn parse_mention(text: &str) -> Option<MemberId> {
    let inner = text.strip_prefix("<@")?.strip_suffix('>')?;
    let digits = inner.strip_prefix('!').unwrap_or(inner);
    digits.parse().ok()
}
