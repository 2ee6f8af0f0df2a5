//! Paint tool state machine.
//!
//! `Idle` until `start_painting`, then `Painting(mode)` until `stop_painting`.
//! Map clicks only mutate the store while painting with a selection.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{SessionError, StoreError};
use crate::grid::{BoxSize, Cell, Point, line_between, snap};
use crate::store::{RemovalPolicy, TerritoryStore};

pub const DEFAULT_PAINT_COLOR: &str = "#FF0000";
pub const DEFAULT_GANG_NAME: &str = "New Gang";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaintMode {
    Add,
    Remove,
    Edit,
}

impl PaintMode {
    pub fn label(self) -> &'static str {
        match self {
            Self::Add => "Adding Pixels",
            Self::Remove => "Removing Pixels",
            Self::Edit => "Editing Territory",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Idle,
    Painting(PaintMode),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub shift: bool,
}

impl Modifiers {
    pub const SHIFT: Self = Self { shift: true };
}

/// Territory property editable from the side panel in edit mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerritoryField {
    Id,
    Name,
    Gang,
    Color,
}

/// What a map click did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    Added { cells: usize, line_fill: bool },
    Removed { cells: usize, territory_deleted: bool },
    /// Edit mode reserves clicks for the side panel.
    Ignored,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaintSession {
    state: SessionState,
    mode: PaintMode,
    box_size: BoxSize,
    color: String,
    gang_name: String,
    selected: Option<String>,
    last_clicked: Option<Cell>,
    removal: RemovalPolicy,
}

impl Default for PaintSession {
    fn default() -> Self {
        Self {
            state: SessionState::Idle,
            mode: PaintMode::Add,
            box_size: BoxSize::default(),
            color: DEFAULT_PAINT_COLOR.to_string(),
            gang_name: DEFAULT_GANG_NAME.to_string(),
            selected: None,
            last_clicked: None,
            removal: RemovalPolicy::default(),
        }
    }
}

impl PaintSession {
    pub fn new(removal: RemovalPolicy) -> Self {
        Self {
            removal,
            ..Self::default()
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, SessionState::Painting(_))
    }

    /// Last tool picked; kept while idle so the panel can highlight it.
    pub fn mode(&self) -> PaintMode {
        self.mode
    }

    pub fn box_size(&self) -> BoxSize {
        self.box_size
    }

    pub fn color(&self) -> &str {
        &self.color
    }

    pub fn gang_name(&self) -> &str {
        &self.gang_name
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn last_clicked(&self) -> Option<Cell> {
        self.last_clicked
    }

    pub fn removal_policy(&self) -> RemovalPolicy {
        self.removal
    }

    pub fn set_removal_policy(&mut self, removal: RemovalPolicy) {
        self.removal = removal;
    }

    pub fn set_color(&mut self, color: &str) {
        self.color = color.to_string();
    }

    pub fn set_gang_name(&mut self, gang_name: &str) {
        self.gang_name = gang_name.to_string();
    }

    /// A new grid invalidates the line-fill anchor.
    pub fn set_box_size(&mut self, box_size: BoxSize) {
        if box_size != self.box_size {
            self.box_size = box_size;
            self.last_clicked = None;
        }
    }

    /// Enter `Painting(mode)`. Edit mode needs a selection and stages the
    /// selected territory's color and gang.
    pub fn start_painting(
        &mut self,
        mode: PaintMode,
        store: &TerritoryStore,
    ) -> Result<(), SessionError> {
        if mode == PaintMode::Edit {
            let id = self.selected.as_deref().ok_or(SessionError::NoSelection)?;
            let territory = store
                .get(id)
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            self.color = territory.color.clone();
            self.gang_name = territory.gang.clone();
        }
        self.mode = mode;
        self.state = SessionState::Painting(mode);
        Ok(())
    }

    /// Tool buttons while the panel is open: same preconditions as
    /// `start_painting`.
    pub fn set_type_value(
        &mut self,
        mode: PaintMode,
        store: &TerritoryStore,
    ) -> Result<(), SessionError> {
        self.start_painting(mode, store)
    }

    pub fn stop_painting(&mut self) {
        self.state = SessionState::Idle;
        self.selected = None;
        self.last_clicked = None;
    }

    /// Select `id`, or deselect when it is already selected. Returns the new
    /// selection.
    pub fn select_territory(&mut self, id: &str) -> Option<&str> {
        if self.selected.as_deref() == Some(id) {
            self.selected = None;
        } else {
            self.selected = Some(id.to_string());
        }
        self.last_clicked = None;
        self.selected.as_deref()
    }

    /// Select without toggling (clicking a rendered cell).
    pub fn focus_territory(&mut self, id: &str) {
        if self.selected.as_deref() != Some(id) {
            self.selected = Some(id.to_string());
            self.last_clicked = None;
        }
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
        self.last_clicked = None;
    }

    /// Create a territory from the staged name/color and select it.
    pub fn create_new_territory(&mut self, store: &mut TerritoryStore) -> String {
        let name = if self.gang_name.trim().is_empty() {
            DEFAULT_GANG_NAME
        } else {
            self.gang_name.trim()
        };
        let id = store.create_territory(name, name, &self.color);
        self.selected = Some(id.clone());
        self.last_clicked = None;
        id
    }

    /// Edit a property of the selected territory. Only in edit mode.
    pub fn set_field_value(
        &mut self,
        field: TerritoryField,
        value: &str,
        store: &mut TerritoryStore,
    ) -> Result<(), SessionError> {
        if self.state != SessionState::Painting(PaintMode::Edit) {
            return Err(SessionError::NotEditing);
        }
        let id = self.selected.clone().ok_or(SessionError::NoSelection)?;
        match field {
            TerritoryField::Id => {
                store.change_territory_id(&id, value)?;
                self.selected = Some(value.trim().to_string());
            }
            TerritoryField::Name => store.rename_territory(&id, value)?,
            TerritoryField::Gang => {
                store.set_gang(&id, value)?;
                self.gang_name = value.trim().to_string();
            }
            TerritoryField::Color => {
                store.recolor_territory(&id, value)?;
                self.color = value.to_string();
            }
        }
        Ok(())
    }

    /// Apply a map click according to the active tool.
    pub fn on_map_click(
        &mut self,
        point: Point,
        modifiers: Modifiers,
        store: &mut TerritoryStore,
    ) -> Result<ClickOutcome, SessionError> {
        let SessionState::Painting(mode) = self.state else {
            return Err(SessionError::NotPainting);
        };
        let id = self.selected.clone().ok_or(SessionError::NoSelection)?;
        if !store.contains(&id) {
            self.clear_selection();
            return Err(StoreError::NotFound(id).into());
        }

        match mode {
            PaintMode::Add => {
                let snapped = snap(point, self.box_size);
                let run = if modifiers.shift {
                    self.last_clicked
                        .and_then(|last| line_between(last, snapped, self.box_size))
                } else {
                    None
                };
                let line_fill = run.is_some();
                let cells = run.unwrap_or_else(|| vec![snapped]);
                let added = store.add_cells(&id, cells, self.box_size)?;
                if line_fill {
                    debug!(territory = %id, added, "line-fill");
                }
                self.last_clicked = Some(snapped);
                Ok(ClickOutcome::Added {
                    cells: added,
                    line_fill,
                })
            }
            PaintMode::Remove => {
                let outcome = store.remove_cell_at(&id, point, self.box_size, self.removal)?;
                if outcome.territory_deleted {
                    self.clear_selection();
                } else {
                    self.last_clicked = Some(snap(point, self.box_size));
                }
                Ok(ClickOutcome::Removed {
                    cells: outcome.removed,
                    territory_deleted: outcome.territory_deleted,
                })
            }
            PaintMode::Edit => Ok(ClickOutcome::Ignored),
        }
    }
}
