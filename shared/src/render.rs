//! Territory cells as styled rectangles.
//!
//! Recomputed from the store on every redraw; nothing here is cached.

use crate::colors::{resolve_color, rgba_css};
use crate::grid::{Bounds, Point};
use crate::store::TerritoryStore;
use crate::territory::GangFilter;

pub const SELECTED_FILL_OPACITY: f64 = 0.9;
pub const SELECTED_STROKE_WEIGHT: f64 = 1.0;
pub const UNSELECTED_FILL_OPACITY: f64 = 0.7;
pub const UNSELECTED_STROKE_WEIGHT: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RectStyle {
    pub color: (u8, u8, u8),
    pub fill_opacity: f64,
    pub stroke_weight: f64,
}

impl RectStyle {
    pub fn for_territory(color: (u8, u8, u8), selected: bool) -> Self {
        if selected {
            Self {
                color,
                fill_opacity: SELECTED_FILL_OPACITY,
                stroke_weight: SELECTED_STROKE_WEIGHT,
            }
        } else {
            Self {
                color,
                fill_opacity: UNSELECTED_FILL_OPACITY,
                stroke_weight: UNSELECTED_STROKE_WEIGHT,
            }
        }
    }

    pub fn fill_css(&self) -> String {
        rgba_css(self.color, self.fill_opacity)
    }

    pub fn stroke_css(&self) -> String {
        rgba_css(self.color, 1.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderRect {
    pub territory_id: String,
    pub bounds: Bounds,
    pub style: RectStyle,
}

/// What the projection reads besides the store.
#[derive(Debug, Clone, Copy)]
pub struct RenderOptions<'a> {
    pub selected: Option<&'a str>,
    pub filter: &'a GangFilter,
    pub visible: bool,
}

/// Rectangles in render order. The selected territory is drawn last so its
/// stroke is not covered by neighbours.
pub fn project(store: &TerritoryStore, options: RenderOptions<'_>) -> Vec<RenderRect> {
    if !options.visible {
        return Vec::new();
    }

    let mut rects = Vec::new();
    let mut selected_rects = Vec::new();
    for territory in store.iter().filter(|t| options.filter.matches(t)) {
        let is_selected = options.selected == Some(territory.id.as_str());
        let style =
            RectStyle::for_territory(resolve_color(&territory.color, &territory.gang), is_selected);
        let out = if is_selected {
            &mut selected_rects
        } else {
            &mut rects
        };
        out.extend(territory.cells.bounds().map(|(_, bounds)| RenderRect {
            territory_id: territory.id.clone(),
            bounds,
            style,
        }));
    }
    rects.append(&mut selected_rects);
    rects
}

/// Screen-space sink for the projection: the map library handle.
pub trait MapSurface {
    /// Map coordinate to surface pixels `(x, y)`.
    fn project(&self, point: Point) -> (f64, f64);
    fn unproject(&self, x: f64, y: f64) -> Point;
    fn clear(&mut self);
    fn draw_rectangle(&mut self, top_left: (f64, f64), bottom_right: (f64, f64), style: &RectStyle);
}

/// Clear the surface and draw every rectangle through it.
pub fn draw(surface: &mut impl MapSurface, rects: &[RenderRect]) {
    surface.clear();
    for rect in rects {
        // lat grows upward on the base image, so the max corner is on top.
        let top_left = surface.project(Point::new(rect.bounds.max.lat, rect.bounds.min.lng));
        let bottom_right = surface.project(Point::new(rect.bounds.min.lat, rect.bounds.max.lng));
        surface.draw_rectangle(top_left, bottom_right, &rect.style);
    }
}
