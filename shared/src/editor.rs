//! Application state for the territory editor.
//!
//! Views hold a `TerritoryEditor` (through context, never a global) and
//! mutate it only through the named actions below. `revision()` changes
//! after every visible mutation.

use tracing::debug;

use crate::error::{EditorError, SessionError, StoreError};
use crate::grid::{BoxSize, Point};
use crate::query::{Selection, select_at};
use crate::record::export_static_data;
use crate::render::{MapSurface, RenderOptions, RenderRect, draw, project};
use crate::session::{ClickOutcome, Modifiers, PaintMode, PaintSession, TerritoryField};
use crate::store::{Ownership, RemovalPolicy, TerritoryStore};
use crate::territory::{GangFilter, Territory};

/// Pointer input from the map surface, already unprojected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MapEvent {
    Click { point: Point, shift: bool },
    ContextMenu { point: Point },
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditorOutcome {
    Painted(ClickOutcome),
    Selected(Selection),
    Deleted(String),
    Nothing,
}

/// Popup pinned to a cell center.
#[derive(Debug, Clone, PartialEq)]
pub struct Popup {
    pub territory_id: String,
    pub anchor: Point,
}

#[derive(Debug, Clone)]
pub struct TerritoryEditor {
    store: TerritoryStore,
    session: PaintSession,
    popup: Option<Popup>,
    show_territories: bool,
    gang_filter: GangFilter,
    /// Bumped for view-only changes the store does not see.
    view_revision: u64,
}

impl Default for TerritoryEditor {
    fn default() -> Self {
        Self::new(Ownership::default(), RemovalPolicy::default())
    }
}

impl TerritoryEditor {
    pub fn new(ownership: Ownership, removal: RemovalPolicy) -> Self {
        Self {
            store: TerritoryStore::new(ownership),
            session: PaintSession::new(removal),
            popup: None,
            show_territories: true,
            gang_filter: GangFilter::All,
            view_revision: 0,
        }
    }

    pub fn store(&self) -> &TerritoryStore {
        &self.store
    }

    pub fn session(&self) -> &PaintSession {
        &self.session
    }

    pub fn popup(&self) -> Option<&Popup> {
        self.popup.as_ref()
    }

    pub fn popup_territory(&self) -> Option<&Territory> {
        self.popup
            .as_ref()
            .and_then(|p| self.store.get(&p.territory_id))
    }

    pub fn show_territories(&self) -> bool {
        self.show_territories
    }

    pub fn gang_filter(&self) -> &GangFilter {
        &self.gang_filter
    }

    pub fn selected_territory(&self) -> Option<&Territory> {
        self.session.selected().and_then(|id| self.store.get(id))
    }

    pub fn revision(&self) -> u64 {
        self.store.revision() + self.view_revision
    }

    /// Distinct gang labels for the filter dropdown, sorted case-insensitively.
    pub fn gang_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .store
            .iter()
            .map(|t| t.gang.trim())
            .filter(|g| !g.is_empty())
            .map(str::to_string)
            .collect();
        names.sort_by_key(|g| g.to_lowercase());
        names.dedup_by(|a, b| a.eq_ignore_ascii_case(b));
        names
    }

    fn touch(&mut self) {
        self.view_revision += 1;
    }

    /// Drop popup/selection pointing at territories that no longer exist.
    fn prune_dangling(&mut self) {
        if let Some(id) = self.session.selected() {
            if !self.store.contains(id) {
                self.session.clear_selection();
                self.touch();
            }
        }
        if self
            .popup
            .as_ref()
            .is_some_and(|p| !self.store.contains(&p.territory_id))
        {
            self.popup = None;
            self.touch();
        }
    }

    pub fn handle(&mut self, event: MapEvent) -> Result<EditorOutcome, EditorError> {
        match event {
            MapEvent::Click { point, shift } => self.on_click(point, shift),
            MapEvent::ContextMenu { point } => Ok(self.on_context_menu(point)),
        }
    }

    fn on_click(&mut self, point: Point, shift: bool) -> Result<EditorOutcome, EditorError> {
        let painting_with_selection = self.session.is_active() && self.session.selected().is_some();
        if !painting_with_selection {
            // Idle, or painting with nothing selected: clicks pick a territory.
            let Some(selection) = self.hit(point) else {
                if self.session.is_active() {
                    return Err(SessionError::NoSelection.into());
                }
                return Ok(EditorOutcome::Nothing);
            };
            self.session.focus_territory(&selection.territory_id);
            self.popup = Some(Popup {
                territory_id: selection.territory_id.clone(),
                anchor: selection.anchor,
            });
            self.touch();
            return Ok(EditorOutcome::Selected(selection));
        }

        let outcome = self
            .session
            .on_map_click(point, Modifiers { shift }, &mut self.store)?;
        self.prune_dangling();
        Ok(EditorOutcome::Painted(outcome))
    }

    fn on_context_menu(&mut self, point: Point) -> EditorOutcome {
        let Some(id) = self.hit(point).map(|s| s.territory_id) else {
            return EditorOutcome::Nothing;
        };
        match self.delete_territory(&id) {
            Ok(()) => EditorOutcome::Deleted(id),
            Err(_) => EditorOutcome::Nothing,
        }
    }

    /// Hit-test against what is actually drawn.
    fn hit(&self, point: Point) -> Option<Selection> {
        if !self.show_territories {
            return None;
        }
        select_at(&self.store, point, &self.gang_filter)
    }

    pub fn start_painting(&mut self, mode: PaintMode) -> Result<(), EditorError> {
        self.session.start_painting(mode, &self.store)?;
        self.touch();
        Ok(())
    }

    pub fn set_type_value(&mut self, mode: PaintMode) -> Result<(), EditorError> {
        self.session.set_type_value(mode, &self.store)?;
        self.touch();
        Ok(())
    }

    pub fn stop_painting(&mut self) {
        self.session.stop_painting();
        self.popup = None;
        self.touch();
    }

    /// Toggle selection of `id` from the territory list.
    pub fn select_territory(&mut self, id: &str) -> Result<Option<String>, EditorError> {
        if !self.store.contains(id) {
            return Err(StoreError::NotFound(id.to_string()).into());
        }
        let selected = self.session.select_territory(id).map(str::to_string);
        if selected.is_none() {
            self.popup = None;
        }
        self.touch();
        Ok(selected)
    }

    pub fn create_new_territory(&mut self) -> String {
        let id = self.session.create_new_territory(&mut self.store);
        self.popup = None;
        debug!(territory = %id, "created from paint controls");
        id
    }

    pub fn delete_territory(&mut self, id: &str) -> Result<(), EditorError> {
        self.store.delete_territory(id)?;
        self.prune_dangling();
        Ok(())
    }

    pub fn set_field_value(&mut self, field: TerritoryField, value: &str) -> Result<(), EditorError> {
        let before = self.session.selected().map(str::to_string);
        self.session.set_field_value(field, value, &mut self.store)?;
        if field == TerritoryField::Id {
            if let (Some(old), Some(popup)) = (before, self.popup.as_mut()) {
                if popup.territory_id == old {
                    popup.territory_id = value.trim().to_string();
                }
            }
        }
        Ok(())
    }

    pub fn set_color(&mut self, color: &str) {
        self.session.set_color(color);
        self.touch();
    }

    pub fn set_gang_name(&mut self, gang_name: &str) {
        self.session.set_gang_name(gang_name);
        self.touch();
    }

    pub fn set_box_size(&mut self, box_size: BoxSize) {
        self.session.set_box_size(box_size);
        self.touch();
    }

    pub fn set_removal_policy(&mut self, removal: RemovalPolicy) {
        self.session.set_removal_policy(removal);
        self.touch();
    }

    pub fn set_show_territories(&mut self, show: bool) {
        self.show_territories = show;
        if !show {
            self.popup = None;
        }
        self.touch();
    }

    pub fn set_gang_filter(&mut self, filter: GangFilter) {
        self.gang_filter = filter;
        if self
            .popup_territory()
            .is_some_and(|t| !self.gang_filter.matches(t))
        {
            self.popup = None;
        }
        self.touch();
    }

    pub fn close_popup(&mut self) {
        if self.popup.take().is_some() {
            self.touch();
        }
    }

    /// Replace everything with a fresh remote load.
    pub fn apply_loaded(&mut self, territories: Vec<Territory>) {
        self.store.replace_all(territories);
        self.prune_dangling();
    }

    /// Copy of the selected territory for an async save.
    pub fn save_snapshot(&self) -> Result<Territory, EditorError> {
        let id = self.session.selected().ok_or(SessionError::NoSelection)?;
        self.store
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()).into())
    }

    /// Record a finished save. If the territory was deleted or re-keyed while
    /// the save ran, the row just written is queued for delete-by-id.
    pub fn mark_saved(&mut self, id: &str) {
        if self.store.mark_persisted(id).is_err() {
            debug!(territory = %id, "saved territory is gone locally; queueing remote delete");
            self.store.tombstone(id);
        }
    }

    /// Deleted ids still present remotely.
    pub fn pending_deletes(&self) -> Vec<String> {
        self.store.tombstones().to_vec()
    }

    pub fn mark_deleted_remotely(&mut self, id: &str) {
        self.store.clear_tombstone(id);
    }

    pub fn render_rects(&self) -> Vec<RenderRect> {
        project(
            &self.store,
            RenderOptions {
                selected: self.session.selected(),
                filter: &self.gang_filter,
                visible: self.show_territories,
            },
        )
    }

    pub fn draw(&self, surface: &mut impl MapSurface) {
        draw(surface, &self.render_rects());
    }

    pub fn export_static_data(&self) -> Result<String, serde_json::Error> {
        export_static_data(self.store.iter())
    }
}
