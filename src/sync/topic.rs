//! Sync topics: `sync:<entity>:<action>`.

use std::fmt;
use std::str::FromStr;

use crate::error::SyncError;

pub const TOPIC_PREFIX: &str = "sync";

// == Action ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Create,
    Update,
    Delete,
    StatusChanged,
}

impl Action {
    pub const ALL: [Action; 4] = [
        Action::Create,
        Action::Update,
        Action::Delete,
        Action::StatusChanged,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::StatusChanged => "status-changed",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| SyncError::InvalidTopic(format!("unknown action '{}'", s)))
    }
}

// == Topic ==
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic {
    entity: String,
    action: Action,
}

impl Topic {
    pub fn new(entity: impl Into<String>, action: Action) -> Self {
        Self {
            entity: entity.into(),
            action,
        }
    }

    /// Parses `sync:<entity>:<action>`. The entity must be non-empty and
    /// contain no `:`.
    pub fn parse(raw: &str) -> Result<Self, SyncError> {
        let mut parts = raw.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(TOPIC_PREFIX), Some(entity), Some(action)) if !entity.is_empty() => {
                Ok(Self::new(entity, action.parse()?))
            }
            _ => Err(SyncError::InvalidTopic(raw.to_string())),
        }
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn action(&self) -> Action {
        self.action
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", TOPIC_PREFIX, self.entity, self.action)
    }
}
