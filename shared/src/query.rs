use crate::grid::{Cell, Point};
use crate::store::TerritoryStore;
use crate::territory::{GangFilter, Territory};

/// Territory drawn on top at `cell`: the most recent claimant in the index.
pub fn find_territory_containing(store: &TerritoryStore, cell: Cell) -> Option<&Territory> {
    store
        .owners_of(cell)
        .iter()
        .rev()
        .find_map(|id| store.get(id))
}

/// Topmost visible territory whose rectangles contain `point`.
///
/// Scans in reverse render order so overlapping claims resolve the same way
/// they are painted. Cells of any box size are hit-tested by containment.
pub fn territory_at<'a>(
    store: &'a TerritoryStore,
    point: Point,
    filter: &GangFilter,
) -> Option<&'a Territory> {
    store
        .iter()
        .rev()
        .filter(|t| filter.matches(t))
        .find(|t| !t.cells.containing(point).is_empty())
}

/// Result of clicking a rendered cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub territory_id: String,
    /// Geometric center of the hit cell, for the popup.
    pub anchor: Point,
}

pub fn select_at(store: &TerritoryStore, point: Point, filter: &GangFilter) -> Option<Selection> {
    let territory = territory_at(store, point, filter)?;
    let anchor = territory.anchor_at(point)?;
    Some(Selection {
        territory_id: territory.id.clone(),
        anchor,
    })
}
