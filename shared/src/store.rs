use std::collections::HashMap;

use tracing::debug;

use crate::colors::is_hex_color;
use crate::error::StoreError;
use crate::grid::{BoxSize, Cell, Point, snap};
use crate::record::is_valid_id;
use crate::territory::Territory;

/// How a remove click picks the cells to drop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RemovalPolicy {
    /// Only the cell whose corner equals the click snapped at the current box size.
    #[default]
    ExactCell,
    /// Every cell whose rectangle contains the raw click point.
    Containment,
}

/// Whether two territories may claim the same cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Ownership {
    /// Overlaps allowed; the later territory in render order wins visually.
    #[default]
    Shared,
    /// Claiming a cell strips it from every other territory.
    Exclusive,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoveOutcome {
    pub removed: usize,
    /// The territory lost its last cell and no longer exists.
    pub territory_deleted: bool,
}

/// In-memory territory collection with an incremental cell index.
///
/// Every successful mutation bumps `revision`; views compare revisions instead
/// of holding on to stale geometry.
#[derive(Debug, Clone, Default)]
pub struct TerritoryStore {
    /// Render order: later entries draw on top.
    territories: Vec<Territory>,
    /// cell -> ids claiming it, in claim order.
    index: HashMap<Cell, Vec<String>>,
    /// Deleted ids that still exist remotely.
    tombstones: Vec<String>,
    ownership: Ownership,
    revision: u64,
    last_local_id_ms: i64,
}

impl TerritoryStore {
    pub fn new(ownership: Ownership) -> Self {
        Self {
            ownership,
            ..Self::default()
        }
    }

    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.territories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.territories.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Territory> {
        self.territories.iter()
    }

    pub fn get(&self, id: &str) -> Option<&Territory> {
        self.territories.iter().find(|t| t.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    /// Ids claiming `cell`, earliest claim first.
    pub fn owners_of(&self, cell: Cell) -> &[String] {
        self.index.get(&cell).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Ids deleted locally whose remote rows still need a delete-by-id.
    pub fn tombstones(&self) -> &[String] {
        &self.tombstones
    }

    /// Queue a delete-by-id for a remote row that has no local territory.
    pub fn tombstone(&mut self, id: &str) {
        if !self.contains(id) && !self.tombstones.iter().any(|t| t == id) {
            self.tombstones.push(id.to_string());
        }
    }

    pub fn clear_tombstone(&mut self, id: &str) {
        self.tombstones.retain(|t| t != id);
    }

    /// Replace the whole collection, e.g. after loading from the remote store.
    pub fn replace_all(&mut self, territories: Vec<Territory>) {
        let mut seen = std::collections::HashSet::new();
        self.territories = territories
            .into_iter()
            .filter(|t| seen.insert(t.id.clone()))
            .collect();
        self.tombstones.clear();
        self.rebuild_index();
        self.bump();
    }

    /// Add a fully formed territory (loaded row or seed data).
    pub fn insert(&mut self, territory: Territory) -> Result<(), StoreError> {
        if territory.id.trim().is_empty() {
            return Err(StoreError::EmptyId);
        }
        if self.contains(&territory.id) {
            return Err(StoreError::DuplicateId(territory.id));
        }
        for (cell, _) in territory.cells.iter() {
            self.index.entry(cell).or_default().push(territory.id.clone());
        }
        self.clear_tombstone(&territory.id);
        self.territories.push(territory);
        self.bump();
        Ok(())
    }

    /// Allocate a `custom-<millis>` territory with no cells and return its id.
    pub fn create_territory(&mut self, name: &str, gang: &str, color: &str) -> String {
        let now_ms = chrono::Utc::now().timestamp_millis();
        self.create_territory_at(name, gang, color, now_ms)
    }

    pub fn create_territory_at(&mut self, name: &str, gang: &str, color: &str, now_ms: i64) -> String {
        let mut stamp = now_ms.max(self.last_local_id_ms + 1);
        while self.contains(&format!("custom-{stamp}")) {
            stamp += 1;
        }
        self.last_local_id_ms = stamp;
        let id = format!("custom-{stamp}");

        self.territories
            .push(Territory::new(id.clone(), name, color).with_gang(gang));
        self.bump();
        debug!(territory = %id, "created territory");
        id
    }

    pub fn delete_territory(&mut self, id: &str) -> Result<Territory, StoreError> {
        let pos = self
            .position(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let territory = self.territories.remove(pos);
        for (cell, _) in territory.cells.iter() {
            self.unindex(cell, id);
        }
        if territory.persisted {
            self.tombstones.push(territory.id.clone());
        }
        self.bump();
        debug!(territory = %id, "deleted territory");
        Ok(territory)
    }

    /// Claim `cell`. Re-adding a claimed corner is a no-op returning `false`.
    pub fn add_cell(&mut self, id: &str, cell: Cell, size: BoxSize) -> Result<bool, StoreError> {
        Ok(self.add_cells(id, [cell], size)? > 0)
    }

    /// Claim every cell in `cells`; returns how many were new.
    pub fn add_cells(
        &mut self,
        id: &str,
        cells: impl IntoIterator<Item = Cell>,
        size: BoxSize,
    ) -> Result<usize, StoreError> {
        let pos = self
            .position(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let mut added = Vec::new();
        {
            let territory = &mut self.territories[pos];
            for cell in cells {
                if territory.cells.insert(cell, size) {
                    added.push(cell);
                }
            }
        }
        if added.is_empty() {
            return Ok(0);
        }

        for cell in &added {
            self.index.entry(*cell).or_default().push(id.to_string());
        }
        if self.ownership == Ownership::Exclusive {
            self.strip_from_others(id, &added);
        }
        self.bump();
        Ok(added.len())
    }

    /// Remove the cell(s) at `point` under `policy`; deletes the territory when
    /// its last cell goes.
    pub fn remove_cell_at(
        &mut self,
        id: &str,
        point: Point,
        size: BoxSize,
        policy: RemovalPolicy,
    ) -> Result<RemoveOutcome, StoreError> {
        let pos = self
            .position(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let targets = match policy {
            RemovalPolicy::ExactCell => vec![snap(point, size)],
            RemovalPolicy::Containment => self.territories[pos].cells.containing(point),
        };

        let mut removed = Vec::new();
        {
            let territory = &mut self.territories[pos];
            for cell in targets {
                if territory.cells.remove(cell).is_some() {
                    removed.push(cell);
                }
            }
        }
        if removed.is_empty() {
            return Ok(RemoveOutcome::default());
        }

        for cell in &removed {
            self.unindex(*cell, id);
        }
        let territory_deleted = self.territories[pos].cells.is_empty();
        if territory_deleted {
            self.delete_territory(id)?;
        } else {
            self.bump();
        }
        Ok(RemoveOutcome {
            removed: removed.len(),
            territory_deleted,
        })
    }

    pub fn rename_territory(&mut self, id: &str, name: &str) -> Result<(), StoreError> {
        if name.trim().is_empty() {
            return Err(StoreError::EmptyName);
        }
        self.territory_mut(id)?.name = name.to_string();
        self.bump();
        Ok(())
    }

    pub fn set_gang(&mut self, id: &str, gang: &str) -> Result<(), StoreError> {
        self.territory_mut(id)?.gang = gang.trim().to_string();
        self.bump();
        Ok(())
    }

    pub fn recolor_territory(&mut self, id: &str, color: &str) -> Result<(), StoreError> {
        if !is_hex_color(color) {
            return Err(StoreError::InvalidColor(color.to_string()));
        }
        self.territory_mut(id)?.color = color.to_string();
        self.bump();
        Ok(())
    }

    /// Re-key a territory. The old remote row (if any) is tombstoned and the
    /// territory becomes unsaved under its new id.
    pub fn change_territory_id(&mut self, id: &str, new_id: &str) -> Result<(), StoreError> {
        let new_id = new_id.trim();
        if new_id.is_empty() {
            return Err(StoreError::EmptyId);
        }
        if !is_valid_id(new_id) {
            return Err(StoreError::InvalidId(new_id.to_string()));
        }
        let pos = self
            .position(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if new_id == id {
            return Ok(());
        }
        if self.contains(new_id) {
            return Err(StoreError::DuplicateId(new_id.to_string()));
        }

        let territory = &mut self.territories[pos];
        territory.id = new_id.to_string();
        if territory.persisted {
            territory.persisted = false;
            self.tombstones.push(id.to_string());
        }
        for owners in self.index.values_mut() {
            for owner in owners.iter_mut().filter(|owner| owner.as_str() == id) {
                *owner = new_id.to_string();
            }
        }
        self.bump();
        Ok(())
    }

    pub fn mark_persisted(&mut self, id: &str) -> Result<(), StoreError> {
        self.territory_mut(id)?.persisted = true;
        self.clear_tombstone(id);
        Ok(())
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.territories.iter().position(|t| t.id == id)
    }

    fn territory_mut(&mut self, id: &str) -> Result<&mut Territory, StoreError> {
        self.territories
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn strip_from_others(&mut self, id: &str, cells: &[Cell]) {
        let mut emptied = Vec::new();
        for cell in cells {
            let others: Vec<String> = self
                .owners_of(*cell)
                .iter()
                .filter(|owner| owner.as_str() != id)
                .cloned()
                .collect();
            for other in others {
                if let Some(territory) = self.territories.iter_mut().find(|t| t.id == other) {
                    territory.cells.remove(*cell);
                    if territory.cells.is_empty() {
                        emptied.push(other.clone());
                    }
                }
                self.unindex(*cell, &other);
            }
        }
        for other in emptied {
            if self.delete_territory(&other).is_ok() {
                debug!(territory = %other, claimed_by = %id, "territory lost its last cell");
            }
        }
    }

    fn unindex(&mut self, cell: Cell, id: &str) {
        if let Some(owners) = self.index.get_mut(&cell) {
            owners.retain(|owner| owner != id);
            if owners.is_empty() {
                self.index.remove(&cell);
            }
        }
    }

    fn rebuild_index(&mut self) {
        self.index.clear();
        for territory in &self.territories {
            for (cell, _) in territory.cells.iter() {
                self.index
                    .entry(cell)
                    .or_default()
                    .push(territory.id.clone());
            }
        }
    }

    fn bump(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn size(n: u32) -> BoxSize {
        BoxSize::new(n).expect("positive box size")
    }

    fn store_with(id: &str, cells: &[(i64, i64)]) -> TerritoryStore {
        let mut store = TerritoryStore::default();
        let mut territory = Territory::new(id, "Ballas", "#800080");
        for (row, col) in cells {
            territory.cells.insert(Cell::new(*row, *col), size(10));
        }
        store.insert(territory).expect("insert territory");
        store
    }

    #[test]
    fn add_cell_has_set_semantics() {
        let mut store = store_with("a", &[]);
        assert_eq!(store.add_cell("a", Cell::new(0, 0), size(10)), Ok(true));
        assert_eq!(store.add_cell("a", Cell::new(0, 0), size(10)), Ok(false));
        assert_eq!(store.add_cell("a", Cell::new(0, 0), size(20)), Ok(false));

        let territory = store.get("a").expect("territory present");
        assert_eq!(territory.cells.len(), 1);
        assert_eq!(store.owners_of(Cell::new(0, 0)), ["a".to_string()]);
    }

    #[test]
    fn mutating_unknown_territory_reports_not_found() {
        let mut store = TerritoryStore::default();
        let revision = store.revision();
        assert_eq!(
            store.add_cell("ghost", Cell::new(0, 0), size(10)),
            Err(StoreError::NotFound("ghost".into()))
        );
        assert_eq!(
            store.remove_cell_at("ghost", Point::new(1.0, 1.0), size(10), RemovalPolicy::ExactCell),
            Err(StoreError::NotFound("ghost".into()))
        );
        assert!(matches!(
            store.delete_territory("ghost"),
            Err(StoreError::NotFound(_))
        ));
        assert_eq!(store.revision(), revision);
    }

    #[test]
    fn removing_last_cell_deletes_territory() {
        let mut store = store_with("a", &[(0, 0)]);
        let outcome = store
            .remove_cell_at("a", Point::new(3.0, 7.0), size(10), RemovalPolicy::ExactCell)
            .expect("remove succeeds");
        assert_eq!(
            outcome,
            RemoveOutcome {
                removed: 1,
                territory_deleted: true
            }
        );
        assert!(store.get("a").is_none());
        assert!(store.owners_of(Cell::new(0, 0)).is_empty());
    }

    #[test]
    fn removing_a_miss_changes_nothing() {
        let mut store = store_with("a", &[(0, 0)]);
        let revision = store.revision();
        let outcome = store
            .remove_cell_at("a", Point::new(55.0, 55.0), size(10), RemovalPolicy::ExactCell)
            .expect("remove succeeds");
        assert_eq!(outcome, RemoveOutcome::default());
        assert_eq!(store.revision(), revision);
    }

    #[test]
    fn exact_and_containment_diverge_after_box_size_change() {
        // Painted at 20, removed while the session is set to 10.
        let mut territory = Territory::new("a", "Vagos", "#FFFF00");
        territory.cells.insert(Cell::new(0, 0), size(20));
        territory.cells.insert(Cell::new(40, 40), size(20));
        let mut exact = TerritoryStore::default();
        exact.insert(territory.clone()).expect("insert");
        let mut containment = TerritoryStore::default();
        containment.insert(territory).expect("insert");

        let click = Point::new(15.0, 15.0);
        let miss = exact
            .remove_cell_at("a", click, size(10), RemovalPolicy::ExactCell)
            .expect("remove");
        assert_eq!(miss.removed, 0);

        let hit = containment
            .remove_cell_at("a", click, size(10), RemovalPolicy::Containment)
            .expect("remove");
        assert_eq!(hit.removed, 1);
        assert!(!hit.territory_deleted);
        assert_eq!(containment.get("a").map(|t| t.cells.len()), Some(1));
    }

    #[test]
    fn create_territory_allocates_unique_local_ids() {
        let mut store = TerritoryStore::default();
        let a = store.create_territory_at("New Gang", "New Gang", "#FF0000", 1_000);
        let b = store.create_territory_at("New Gang", "New Gang", "#FF0000", 1_000);
        assert_eq!(a, "custom-1000");
        assert_eq!(b, "custom-1001");
        let created = store.get(&a).expect("created");
        assert!(created.cells.is_empty());
        assert!(!created.persisted);
    }

    #[test]
    fn rename_rejects_blank_names() {
        let mut store = store_with("a", &[(0, 0)]);
        assert_eq!(store.rename_territory("a", "  "), Err(StoreError::EmptyName));
        assert_eq!(store.rename_territory("a", "Grove"), Ok(()));
        assert_eq!(store.get("a").map(|t| t.name.as_str()), Some("Grove"));
    }

    #[test]
    fn recolor_requires_hex() {
        let mut store = store_with("a", &[(0, 0)]);
        assert_eq!(
            store.recolor_territory("a", "green"),
            Err(StoreError::InvalidColor("green".into()))
        );
        assert_eq!(store.recolor_territory("a", "#00FF00"), Ok(()));
    }

    #[test]
    fn change_id_rejects_duplicates_and_reindexes() {
        let mut store = store_with("a", &[(0, 0)]);
        store
            .insert(Territory::new("b", "Vagos", "#FFFF00"))
            .expect("insert b");

        assert_eq!(
            store.change_territory_id("a", "b"),
            Err(StoreError::DuplicateId("b".into()))
        );
        assert_eq!(store.change_territory_id("a", " "), Err(StoreError::EmptyId));
        assert_eq!(
            store.change_territory_id("a", "grove/street"),
            Err(StoreError::InvalidId("grove/street".into()))
        );
        assert!(store.get("a").is_some());
        assert_eq!(store.change_territory_id("a", "c"), Ok(()));
        assert!(store.get("a").is_none());
        assert_eq!(store.owners_of(Cell::new(0, 0)), ["c".to_string()]);
    }

    #[test]
    fn persisted_deletions_leave_tombstones() {
        let mut store = store_with("a", &[(0, 0)]);
        store.mark_persisted("a").expect("mark persisted");
        store.delete_territory("a").expect("delete");
        assert_eq!(store.tombstones(), ["a".to_string()]);

        let local = store.create_territory_at("x", "x", "#000000", 5);
        store.delete_territory(&local).expect("delete local");
        assert_eq!(store.tombstones(), ["a".to_string()]);
    }

    #[test]
    fn tombstone_skips_live_and_repeated_ids() {
        let mut store = store_with("a", &[(0, 0)]);
        store.tombstone("a");
        assert!(store.tombstones().is_empty());
        store.tombstone("gone");
        store.tombstone("gone");
        assert_eq!(store.tombstones(), ["gone".to_string()]);
    }

    #[test]
    fn shared_ownership_allows_overlap() {
        let mut store = store_with("a", &[(0, 0)]);
        store
            .insert(Territory::new("b", "Vagos", "#FFFF00"))
            .expect("insert b");
        store.add_cell("b", Cell::new(0, 0), size(10)).expect("add");
        assert_eq!(
            store.owners_of(Cell::new(0, 0)),
            ["a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn exclusive_ownership_steals_cells_and_drops_emptied_territories() {
        let mut store = TerritoryStore::new(Ownership::Exclusive);
        let mut a = Territory::new("a", "Ballas", "#800080");
        a.cells.insert(Cell::new(0, 0), size(10));
        let mut b = Territory::new("b", "Vagos", "#FFFF00");
        b.cells.insert(Cell::new(0, 10), size(10));
        b.cells.insert(Cell::new(0, 20), size(10));
        store.insert(a).expect("insert a");
        store.insert(b).expect("insert b");

        store.add_cell("b", Cell::new(0, 0), size(10)).expect("steal");
        assert!(store.get("a").is_none());
        assert_eq!(store.owners_of(Cell::new(0, 0)), ["b".to_string()]);

        store
            .insert(Territory::new("c", "Families", "#00FF00"))
            .expect("insert c");
        store.add_cell("c", Cell::new(0, 10), size(10)).expect("steal");
        assert_eq!(store.get("b").map(|t| t.cells.len()), Some(2));
        assert_eq!(store.owners_of(Cell::new(0, 10)), ["c".to_string()]);
    }

    #[test]
    fn every_mutation_bumps_revision() {
        let mut store = TerritoryStore::default();
        let r0 = store.revision();
        let id = store.create_territory_at("x", "x", "#000000", 1);
        let r1 = store.revision();
        store.add_cell(&id, Cell::new(0, 0), size(10)).expect("add");
        let r2 = store.revision();
        store.rename_territory(&id, "y").expect("rename");
        let r3 = store.revision();
        assert!(r0 < r1 && r1 < r2 && r2 < r3);
    }
}
