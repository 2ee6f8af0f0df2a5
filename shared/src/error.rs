use thiserror::Error;

/// Territory Store failures. Nothing here is fatal; every variant leaves the
/// store unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("territory `{0}` not found")]
    NotFound(String),
    #[error("territory id `{0}` is already in use")]
    DuplicateId(String),
    #[error("territory id must not be empty")]
    EmptyId,
    #[error("`{0}` is not a usable territory id")]
    InvalidId(String),
    #[error("territory name must not be empty")]
    EmptyName,
    #[error("`{0}` is not a #RRGGBB color")]
    InvalidColor(String),
}

/// Paint Session precondition failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("paint tool is not active")]
    NotPainting,
    #[error("select a territory first")]
    NoSelection,
    #[error("property editing is only available in edit mode")]
    NotEditing,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A persisted record that cannot be turned into a territory, or a territory
/// that must not be persisted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordError {
    #[error("record id is empty or contains forbidden characters")]
    InvalidId,
    #[error("record `{0}` has an empty name")]
    EmptyName(String),
    #[error("record `{id}` has invalid color `{color}`")]
    InvalidColor { id: String, color: String },
    #[error("record `{0}` has no boxes")]
    NoBoxes(String),
    #[error("record `{id}` has malformed bounds {bounds:?}")]
    MalformedBounds { id: String, bounds: [[f64; 2]; 2] },
}

/// Remote Sync Adapter failures, surfaced to the user as a generic
/// notification and never retried automatically.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("remote store answered HTTP {0}")]
    Status(u16),
    #[error("failed to decode remote payload: {0}")]
    Decode(String),
    #[error("territory `{0}` already exists remotely")]
    Conflict(String),
    #[error("territory `{0}` does not exist remotely")]
    Missing(String),
    #[error("a save for territory `{0}` is already in flight")]
    SaveInProgress(String),
    #[error(transparent)]
    Record(#[from] RecordError),
}

impl SyncError {
    /// Short text for the transient notification.
    pub fn user_message(&self, action: SyncAction) -> String {
        match self {
            Self::SaveInProgress(_) => "Save already in progress".to_string(),
            Self::Record(RecordError::NoBoxes(_)) => {
                "Paint at least one pixel before saving".to_string()
            }
            _ => match action {
                SyncAction::Load => "Failed to load territories".to_string(),
                SyncAction::Save => "Failed to save territory".to_string(),
                SyncAction::Update => "Failed to update territory".to_string(),
                SyncAction::Delete => "Failed to delete territory".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    Load,
    Save,
    Update,
    Delete,
}

/// Anything an editor action can fail with.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EditorError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
