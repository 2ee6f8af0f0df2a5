use serde::{Deserialize, Serialize};

use crate::colors::is_hex_color;
use crate::error::RecordError;
use crate::grid::{BoxSize, Cell};
use crate::territory::{CellSet, Territory};

pub const MAX_ID_LEN: usize = 64;

/// One persisted grid square.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxRecord {
    pub bounds: [[f64; 2]; 2],
}

/// Remote store row, one per territory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerritoryRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub gang: String,
    pub color: String,
    #[serde(default)]
    pub boxes: Vec<BoxRecord>,
}

/// Partial row for update-by-id. Absent fields stay untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TerritoryPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gang: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boxes: Option<Vec<BoxRecord>>,
}

impl TerritoryPatch {
    /// Patch that rewrites every mutable column of `record`.
    pub fn full(record: &TerritoryRecord) -> Self {
        Self {
            name: Some(record.name.clone()),
            gang: Some(record.gang.clone()),
            color: Some(record.color.clone()),
            boxes: Some(record.boxes.clone()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.gang.is_none() && self.color.is_none() && self.boxes.is_none()
    }

    pub fn apply_to(self, record: &mut TerritoryRecord) {
        if let Some(name) = self.name {
            record.name = name;
        }
        if let Some(gang) = self.gang {
            record.gang = gang;
        }
        if let Some(color) = self.color {
            record.color = color;
        }
        if let Some(boxes) = self.boxes {
            record.boxes = boxes;
        }
    }
}

pub fn is_valid_id(id: &str) -> bool {
    let trimmed = id.trim();
    !trimmed.is_empty()
        && trimmed == id
        && id.len() <= MAX_ID_LEN
        && !id
            .chars()
            .any(|ch| ch.is_control() || matches!(ch, '/' | '\\' | '?' | '#'))
}

impl BoxRecord {
    /// Decode into a cell and its edge length.
    fn to_cell(&self, id: &str) -> Result<(Cell, BoxSize), RecordError> {
        let [[lat_min, lng_min], [lat_max, lng_max]] = self.bounds;
        let malformed = || RecordError::MalformedBounds {
            id: id.to_string(),
            bounds: self.bounds,
        };

        let all_integral = self
            .bounds
            .iter()
            .flatten()
            .all(|v| v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64);
        if !all_integral {
            return Err(malformed());
        }

        let lat_span = lat_max - lat_min;
        let lng_span = lng_max - lng_min;
        if lat_span != lng_span || lat_span <= 0.0 || lat_span > u32::MAX as f64 {
            return Err(malformed());
        }
        let size = BoxSize::new(lat_span as u32).ok_or_else(malformed)?;
        Ok((Cell::new(lat_min as i64, lng_min as i64), size))
    }
}

impl TerritoryRecord {
    /// Checks a row is fit to persist.
    pub fn validate(&self) -> Result<(), RecordError> {
        if !is_valid_id(&self.id) {
            return Err(RecordError::InvalidId);
        }
        if self.name.trim().is_empty() {
            return Err(RecordError::EmptyName(self.id.clone()));
        }
        if !is_hex_color(&self.color) {
            return Err(RecordError::InvalidColor {
                id: self.id.clone(),
                color: self.color.clone(),
            });
        }
        if self.boxes.is_empty() {
            return Err(RecordError::NoBoxes(self.id.clone()));
        }
        for b in &self.boxes {
            b.to_cell(&self.id)?;
        }
        Ok(())
    }
}

impl Territory {
    pub fn to_record(&self) -> TerritoryRecord {
        TerritoryRecord {
            id: self.id.clone(),
            name: self.name.clone(),
            gang: self.gang.clone(),
            color: self.color.clone(),
            boxes: self
                .cells
                .bounds()
                .map(|(_, bounds)| BoxRecord {
                    bounds: bounds.to_array(),
                })
                .collect(),
        }
    }

    /// Decode a row. Duplicate corners collapse; `persisted` starts `false`.
    pub fn from_record(record: TerritoryRecord) -> Result<Self, RecordError> {
        if !is_valid_id(&record.id) {
            return Err(RecordError::InvalidId);
        }
        let cells = record
            .boxes
            .iter()
            .map(|b| b.to_cell(&record.id))
            .collect::<Result<CellSet, _>>()?;
        Ok(Self {
            id: record.id,
            name: record.name,
            gang: record.gang,
            color: record.color,
            cells,
            persisted: false,
        })
    }
}

/// Pretty JSON array of every territory, for pasting into a seed data file.
pub fn export_static_data<'a>(
    territories: impl IntoIterator<Item = &'a Territory>,
) -> Result<String, serde_json::Error> {
    let records: Vec<TerritoryRecord> = territories.into_iter().map(Territory::to_record).collect();
    serde_json::to_string_pretty(&records)
}
