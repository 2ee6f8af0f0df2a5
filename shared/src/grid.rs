use serde::{Deserialize, Serialize};

/// Pixel sizes offered by the paint controls.
pub const BOX_SIZE_CHOICES: [u32; 4] = [5, 10, 15, 20];
pub const DEFAULT_BOX_SIZE: u32 = 10;

/// Continuous map coordinate (CRS-simple lat/lng of the base image).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub lat: f64,
    pub lng: f64,
}

impl Point {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Grid square identity: the snapped lower corner, in map units.
///
/// A cell does not carry its edge length; territories store it alongside
/// so cells painted at different pixel sizes keep their own extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cell {
    pub row: i64,
    pub col: i64,
}

impl Cell {
    pub const fn new(row: i64, col: i64) -> Self {
        Self { row, col }
    }

    pub fn corner(self) -> Point {
        Point::new(self.row as f64, self.col as f64)
    }
}

/// Grid cell edge length. Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct BoxSize(u32);

impl BoxSize {
    pub const fn new(size: u32) -> Option<Self> {
        if size == 0 { None } else { Some(Self(size)) }
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    pub const fn step(self) -> i64 {
        self.0 as i64
    }
}

impl Default for BoxSize {
    fn default() -> Self {
        Self(DEFAULT_BOX_SIZE)
    }
}

impl TryFrom<u32> for BoxSize {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| "box size must be positive".to_string())
    }
}

impl From<BoxSize> for u32 {
    fn from(value: BoxSize) -> Self {
        value.0
    }
}

/// Axis-aligned rectangle in map coordinates, `min` inclusive, `max` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: Point,
    pub max: Point,
}

impl Bounds {
    pub fn contains(&self, point: Point) -> bool {
        point.lat >= self.min.lat
            && point.lat < self.max.lat
            && point.lng >= self.min.lng
            && point.lng < self.max.lng
    }

    pub fn center(&self) -> Point {
        Point::new(
            (self.min.lat + self.max.lat) / 2.0,
            (self.min.lng + self.max.lng) / 2.0,
        )
    }

    /// `[[latMin, lngMin], [latMax, lngMax]]`, the persisted shape.
    pub fn to_array(&self) -> [[f64; 2]; 2] {
        [[self.min.lat, self.min.lng], [self.max.lat, self.max.lng]]
    }
}

/// Quantize a map coordinate to the lower corner of its grid square.
pub fn snap(point: Point, size: BoxSize) -> Cell {
    let step = size.get() as f64;
    Cell {
        row: ((point.lat / step).floor() * step) as i64,
        col: ((point.lng / step).floor() * step) as i64,
    }
}

pub fn cell_bounds(cell: Cell, size: BoxSize) -> Bounds {
    let step = size.step();
    Bounds {
        min: Point::new(cell.row as f64, cell.col as f64),
        max: Point::new(
            cell.row.saturating_add(step) as f64,
            cell.col.saturating_add(step) as f64,
        ),
    }
}

/// Cells on the straight run from `from` to `to` (inclusive), stepping by `size`.
///
/// Only rows or columns that match exactly form a run; anything else, including
/// `from == to`, yields `None`.
pub fn line_between(from: Cell, to: Cell, size: BoxSize) -> Option<Vec<Cell>> {
    let step = size.step();
    if from == to {
        return None;
    }
    if from.row == to.row {
        let (lo, hi) = (from.col.min(to.col), from.col.max(to.col));
        let span = hi.checked_sub(lo)?;
        if span % step != 0 {
            return None;
        }
        return Some(
            (0..=span / step)
                .map(|i| Cell::new(from.row, lo + i * step))
                .collect(),
        );
    }
    if from.col == to.col {
        let (lo, hi) = (from.row.min(to.row), from.row.max(to.row));
        let span = hi.checked_sub(lo)?;
        if span % step != 0 {
            return None;
        }
        return Some(
            (0..=span / step)
                .map(|i| Cell::new(lo + i * step, from.col))
                .collect(),
        );
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn size(n: u32) -> BoxSize {
        BoxSize::new(n).expect("positive box size")
    }

    #[test]
    fn snap_floors_toward_negative_infinity() {
        assert_eq!(snap(Point::new(12.7, 3.2), size(10)), Cell::new(10, 0));
        assert_eq!(snap(Point::new(-0.5, -10.0), size(10)), Cell::new(-10, -10));
        assert_eq!(snap(Point::new(-10.1, 19.99), size(5)), Cell::new(-15, 15));
    }

    #[test]
    fn snap_is_idempotent() {
        let samples = [
            Point::new(0.0, 0.0),
            Point::new(123.456, -78.9),
            Point::new(-0.0001, 9.9999),
            Point::new(-250.0, 250.0),
        ];
        for box_size in BOX_SIZE_CHOICES {
            let s = size(box_size);
            for p in samples {
                let once = snap(p, s);
                assert_eq!(snap(once.corner(), s), once);
            }
        }
    }

    #[test]
    fn cell_bounds_spans_one_box() {
        let bounds = cell_bounds(Cell::new(20, -10), size(15));
        assert_eq!(bounds.to_array(), [[20.0, -10.0], [35.0, 5.0]]);
        assert!(bounds.contains(Point::new(20.0, -10.0)));
        assert!(!bounds.contains(Point::new(35.0, 0.0)));
        assert_eq!(bounds.center(), Point::new(27.5, -2.5));
    }

    #[test]
    fn huge_coordinates_saturate_instead_of_overflowing() {
        let cell = snap(Point::new(1e300, -1e300), size(10));
        assert_eq!(cell, Cell::new(i64::MAX, i64::MIN));
        let bounds = cell_bounds(cell, size(10));
        assert_eq!(bounds.max.lat, i64::MAX as f64);
        assert_eq!(bounds.min.lng, i64::MIN as f64);
        assert_eq!(
            line_between(Cell::new(0, i64::MIN), Cell::new(0, i64::MAX), size(10)),
            None
        );
    }

    #[test]
    fn zero_box_size_is_rejected() {
        assert!(BoxSize::new(0).is_none());
        assert!(serde_json::from_str::<BoxSize>("0").is_err());
        assert_eq!(serde_json::from_str::<BoxSize>("15").ok(), BoxSize::new(15));
    }

    #[test]
    fn line_between_walks_rows_and_columns_inclusively() {
        let run = line_between(Cell::new(0, 30), Cell::new(0, 0), size(10));
        assert_eq!(
            run,
            Some(vec![
                Cell::new(0, 0),
                Cell::new(0, 10),
                Cell::new(0, 20),
                Cell::new(0, 30)
            ])
        );

        let run = line_between(Cell::new(-10, 5), Cell::new(10, 5), size(10));
        assert_eq!(
            run,
            Some(vec![Cell::new(-10, 5), Cell::new(0, 5), Cell::new(10, 5)])
        );
    }

    #[test]
    fn line_between_requires_alignment() {
        assert_eq!(line_between(Cell::new(0, 0), Cell::new(10, 30), size(10)), None);
        assert_eq!(line_between(Cell::new(0, 0), Cell::new(0, 0), size(10)), None);
        assert_eq!(line_between(Cell::new(0, 0), Cell::new(0, 25), size(10)), None);
    }
}
