use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Snowflake-backed identifiers. Discord sends them as JSON strings, so they
/// serialize as strings and accept either strings or numbers on the way in.
macro_rules! snowflake_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub u64);

        impl $name {
            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse().map($name)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.0.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                #[derive(Deserialize)]
                #[serde(untagged)]
                enum Raw {
                    Text(String),
                    Number(u64),
                }
                match Raw::deserialize(deserializer)? {
                    Raw::Text(s) => s.parse().map($name).map_err(serde::de::Error::custom),
                    Raw::Number(n) => Ok($name(n)),
                }
            }
        }
    };
}

snowflake_id!(RoleId);
snowflake_id!(ChannelId);
snowflake_id!(MessageId);
snowflake_id!(MemberId);
snowflake_id!(GuildId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Text,
    Voice,
    Category,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleInfo {
    pub id: RoleId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: ChannelId,
    pub name: String,
    pub kind: ChannelKind,
    pub parent: Option<ChannelId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub channel: ChannelId,
    pub author: MemberId,
    pub content: String,
}

/// Permission bits, laid out as the chat server defines them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Permissions(pub u64);

impl Permissions {
    pub const NONE: Permissions = Permissions(0);
    pub const VIEW_CHANNEL: Permissions = Permissions(1 << 10);

    pub fn bits(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OverwriteTarget {
    Role(RoleId),
    Member(MemberId),
}

impl OverwriteTarget {
    pub fn id(self) -> u64 {
        match self {
            OverwriteTarget::Role(r) => r.0,
            OverwriteTarget::Member(m) => m.0,
        }
    }
}

/// Per-channel permission override for one role or member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Overwrite {
    pub target: OverwriteTarget,
    pub allow: Permissions,
    pub deny: Permissions,
}

impl Overwrite {
    pub fn allow_view(target: OverwriteTarget) -> Self {
        Self {
            target,
            allow: Permissions::VIEW_CHANNEL,
            deny: Permissions::NONE,
        }
    }

    pub fn deny_view(target: OverwriteTarget) -> Self {
        Self {
            target,
            allow: Permissions::NONE,
            deny: Permissions::VIEW_CHANNEL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChannel {
    pub name: String,
    pub kind: ChannelKind,
    pub parent: Option<ChannelId>,
    pub topic: Option<String>,
    pub overwrites: Vec<Overwrite>,
}
