use std::collections::BTreeMap;

use crate::grid::{Bounds, BoxSize, Cell, Point, cell_bounds};

/// Set of claimed grid squares, keyed by snapped corner.
///
/// Each cell remembers the box size it was painted with, so changing the
/// session pixel size never resizes existing cells.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CellSet {
    cells: BTreeMap<Cell, BoxSize>,
}

impl CellSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the corner is already claimed (set semantics).
    pub fn insert(&mut self, cell: Cell, size: BoxSize) -> bool {
        if self.cells.contains_key(&cell) {
            return false;
        }
        self.cells.insert(cell, size);
        true
    }

    pub fn remove(&mut self, cell: Cell) -> Option<BoxSize> {
        self.cells.remove(&cell)
    }

    pub fn contains(&self, cell: Cell) -> bool {
        self.cells.contains_key(&cell)
    }

    pub fn size_of(&self, cell: Cell) -> Option<BoxSize> {
        self.cells.get(&cell).copied()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Cell, BoxSize)> + '_ {
        self.cells.iter().map(|(cell, size)| (*cell, *size))
    }

    pub fn bounds(&self) -> impl Iterator<Item = (Cell, Bounds)> + '_ {
        self.iter().map(|(cell, size)| (cell, cell_bounds(cell, size)))
    }

    /// Cells whose rectangle contains the raw point, regardless of grid alignment.
    pub fn containing(&self, point: Point) -> Vec<Cell> {
        self.bounds()
            .filter(|(_, bounds)| bounds.contains(point))
            .map(|(cell, _)| cell)
            .collect()
    }
}

impl FromIterator<(Cell, BoxSize)> for CellSet {
    fn from_iter<T: IntoIterator<Item = (Cell, BoxSize)>>(iter: T) -> Self {
        let mut set = Self::new();
        for (cell, size) in iter {
            set.insert(cell, size);
        }
        set
    }
}

/// A named, colored gang region.
#[derive(Debug, Clone, PartialEq)]
pub struct Territory {
    pub id: String,
    pub name: String,
    pub gang: String,
    /// `#RRGGBB`, used for fill and UI accents.
    pub color: String,
    pub cells: CellSet,
    /// Whether the remote store holds a row with this id.
    pub persisted: bool,
}

impl Territory {
    pub fn new(id: impl Into<String>, name: impl Into<String>, color: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: id.into(),
            gang: name.clone(),
            name,
            color: color.into(),
            cells: CellSet::new(),
            persisted: false,
        }
    }

    pub fn with_gang(mut self, gang: impl Into<String>) -> Self {
        self.gang = gang.into();
        self
    }

    /// Geometric center of the first cell containing `point`.
    pub fn anchor_at(&self, point: Point) -> Option<Point> {
        self.cells
            .bounds()
            .find(|(_, bounds)| bounds.contains(point))
            .map(|(_, bounds)| bounds.center())
    }
}

/// Gang filter from the header dropdown: everything, or a single gang label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum GangFilter {
    #[default]
    All,
    Gang(String),
}

impl GangFilter {
    /// `"all"` and empty select values mean no filtering.
    pub fn from_select_value(value: &str) -> Self {
        let value = value.trim();
        if value.is_empty() || value.eq_ignore_ascii_case("all") {
            Self::All
        } else {
            Self::Gang(value.to_string())
        }
    }

    pub fn matches(&self, territory: &Territory) -> bool {
        match self {
            Self::All => true,
            Self::Gang(gang) => territory.gang.eq_ignore_ascii_case(gang),
        }
    }
}
