use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Country,
    Competition,
    Season,
    Team,
    Player,
    Match,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Country => "country",
            EntityKind::Competition => "competition",
            EntityKind::Season => "season",
            EntityKind::Team => "team",
            EntityKind::Player => "player",
            EntityKind::Match => "match",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error kinds that cross the per-item boundary. Only `Fetch` and
/// `MissingEntity` are expected during normal operation; `Db` means the
/// local store misbehaved. All three fail just the current item in a
/// batch run, never the run itself.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("fetch {resource}: {message}")]
    Fetch { resource: String, message: String },

    #[error("missing required {kind}: {context}")]
    MissingEntity { kind: EntityKind, context: String },

    #[error("storage: {0}")]
    Db(#[from] rusqlite::Error),
}

impl SyncError {
    pub fn missing(kind: EntityKind, context: impl Into<String>) -> Self {
        SyncError::MissingEntity {
            kind,
            context: context.into(),
        }
    }
}
