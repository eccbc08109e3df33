//! Crop selection for the live video feed.
//!
//! - `region` - `CropRegion` in source-pixel coordinates and frame extraction
//! - `editor` - the selection state machine that produces regions from
//!   on-screen drags

mod editor;
mod region;

pub use editor::{CropEditor, DisplaySize, EditorState, Point};
pub use region::{CropError, CropRegion};
