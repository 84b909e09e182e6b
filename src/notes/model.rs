use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const UNTITLED_NOTE: &str = "Untitled Note";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(Uuid);

impl NoteId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for NoteId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: NoteId,
    pub title: String,
    pub content: String,
    /// Milliseconds since the Unix epoch.
    pub updated_at: i64,
}

impl Note {
    pub fn new(updated_at: i64) -> Self {
        Self {
            id: NoteId::generate(),
            title: String::new(),
            content: String::new(),
            updated_at,
        }
    }

    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            UNTITLED_NOTE
        } else {
            &self.title
        }
    }

    /// Merges the given fields, returning whether anything changed.
    pub fn apply(&mut self, patch: NotePatch) -> bool {
        let mut changed = false;
        if let Some(title) = patch.title {
            changed |= self.title != title;
            self.title = title;
        }
        if let Some(content) = patch.content {
            changed |= self.content != content;
            self.content = content;
        }
        if let Some(updated_at) = patch.updated_at {
            changed |= self.updated_at != updated_at;
            self.updated_at = updated_at;
        }
        changed
    }
}

/// Field-level partial update. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotePatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub updated_at: Option<i64>,
}

impl NotePatch {
    pub fn title(value: impl Into<String>) -> Self {
        Self {
            title: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn content(value: impl Into<String>) -> Self {
        Self {
            content: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn at(mut self, updated_at: i64) -> Self {
        self.updated_at = Some(updated_at);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none() && self.updated_at.is_none()
    }
}
