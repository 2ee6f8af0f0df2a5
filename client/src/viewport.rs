use turfmap_shared::Point;

/// Base map image size in map units. The image spans lat `0..MAP_HEIGHT`
/// (growing upward) and lng `0..MAP_WIDTH`.
pub const MAP_WIDTH: f64 = 5000.0;
pub const MAP_HEIGHT: f64 = 5000.0;

/// Pan/zoom transformation from map coordinates to screen pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct Viewport {
    pub offset_x: f64,
    pub offset_y: f64,
    pub scale: f64,
}

const MIN_SCALE: f64 = 0.1;
const MAX_SCALE: f64 = 8.0;
const ZOOM_SENSITIVITY: f64 = 0.001;

impl Default for Viewport {
    fn default() -> Self {
        Self {
            offset_x: 0.0,
            offset_y: 0.0,
            scale: 0.2,
        }
    }
}

impl Viewport {
    pub fn map_to_screen(&self, point: Point) -> (f64, f64) {
        (
            point.lng * self.scale + self.offset_x,
            (MAP_HEIGHT - point.lat) * self.scale + self.offset_y,
        )
    }

    pub fn screen_to_map(&self, sx: f64, sy: f64) -> Point {
        Point::new(
            MAP_HEIGHT - (sy - self.offset_y) / self.scale,
            (sx - self.offset_x) / self.scale,
        )
    }

    /// Zoom toward a focus point (screen coordinates).
    pub fn zoom_at(&mut self, delta: f64, screen_x: f64, screen_y: f64) {
        let factor = (-delta * ZOOM_SENSITIVITY).exp();
        let new_scale = (self.scale * factor).clamp(MIN_SCALE, MAX_SCALE);
        let ratio = new_scale / self.scale;

        // Keep the point under the cursor fixed.
        self.offset_x = screen_x - (screen_x - self.offset_x) * ratio;
        self.offset_y = screen_y - (screen_y - self.offset_y) * ratio;
        self.scale = new_scale;
    }

    pub fn pan(&mut self, dx: f64, dy: f64) {
        self.offset_x += dx;
        self.offset_y += dy;
    }

    /// Show the whole base map, centered.
    pub fn fit_map(&mut self, canvas_w: f64, canvas_h: f64) {
        if canvas_w <= 0.0 || canvas_h <= 0.0 {
            return;
        }
        self.scale = (canvas_w / MAP_WIDTH)
            .min(canvas_h / MAP_HEIGHT)
            .clamp(MIN_SCALE, MAX_SCALE);
        self.offset_x = (canvas_w - MAP_WIDTH * self.scale) / 2.0;
        self.offset_y = (canvas_h - MAP_HEIGHT * self.scale) / 2.0;
    }

    /// Center on a map point without changing zoom.
    pub fn center_on(&mut self, point: Point, canvas_w: f64, canvas_h: f64) {
        let (sx, sy) = self.map_to_screen(point);
        self.pan(canvas_w / 2.0 - sx, canvas_h / 2.0 - sy);
    }
}
