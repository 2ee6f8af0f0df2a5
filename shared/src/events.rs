use serde::{Deserialize, Serialize};

use crate::record::TerritoryRecord;

/// Change feed payload pushed by the server over SSE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TerritoryEvent {
    Snapshot {
        #[serde(default)]
        seq: u64,
        territories: Vec<TerritoryRecord>,
        timestamp: String,
    },
    Upsert {
        #[serde(default)]
        seq: u64,
        territory: TerritoryRecord,
        timestamp: String,
    },
    Delete {
        #[serde(default)]
        seq: u64,
        id: String,
        timestamp: String,
    },
}

impl TerritoryEvent {
    pub fn seq(&self) -> u64 {
        match self {
            Self::Snapshot { seq, .. } | Self::Upsert { seq, .. } | Self::Delete { seq, .. } => {
                *seq
            }
        }
    }

    /// SSE `event:` name.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Snapshot { .. } => "snapshot",
            Self::Upsert { .. } => "upsert",
            Self::Delete { .. } => "delete",
        }
    }
}
