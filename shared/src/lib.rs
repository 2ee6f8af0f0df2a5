pub mod colors;
pub mod editor;
pub mod error;
pub mod events;
pub mod grid;
pub mod query;
pub mod record;
pub mod render;
pub mod session;
pub mod store;
pub mod sync;
pub mod territory;

pub use colors::gang_color;
pub use editor::{EditorOutcome, MapEvent, Popup, TerritoryEditor};
pub use error::*;
pub use events::TerritoryEvent;
pub use grid::{BOX_SIZE_CHOICES, Bounds, BoxSize, Cell, Point, snap};
pub use record::{BoxRecord, TerritoryPatch, TerritoryRecord};
pub use render::{MapSurface, RectStyle, RenderRect};
pub use session::{PaintMode, PaintSession, TerritoryField};
pub use store::{Ownership, RemovalPolicy, TerritoryStore};
pub use sync::{RemoteStore, SyncAdapter, UpsertOutcome};
pub use territory::*;
