//! Crop selection state machine.
//!
//! ```text
//!            begin              commit
//! Idle ───────────────> Selecting ───────> Committed
//!  ^                       │                  │
//!  └──────── cancel ───────┘                  │ begin
//!  ^                                          v
//!  └──────── clear ─────────────────── Selecting ...
//! ```
//!
//! Selections are tracked in display pixels (the size the preview is drawn
//! at) and converted to source pixels on commit.

use super::CropRegion;

/// A pointer position relative to the preview's top-left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Size the preview element is displayed at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplaySize {
    pub width: f64,
    pub height: f64,
}

impl DisplaySize {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Externally visible editor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorState {
    Idle,
    Selecting,
    Committed,
}

#[derive(Debug, Clone)]
struct Selection {
    start: Option<Point>,
    current: Option<Point>,
    dragging: bool,
    /// Preview visibility before selection forced it on.
    preview_before: bool,
}

#[derive(Debug, Clone)]
enum Phase {
    Idle,
    Selecting(Selection),
    Committed,
}

/// Crop editor holding the committed region and preview visibility.
#[derive(Debug, Clone)]
pub struct CropEditor {
    phase: Phase,
    region: Option<CropRegion>,
    preview_visible: bool,
}

impl Default for CropEditor {
    fn default() -> Self {
        Self::new(false)
    }
}

impl CropEditor {
    pub fn new(preview_visible: bool) -> Self {
        Self {
            phase: Phase::Idle,
            region: None,
            preview_visible,
        }
    }

    pub fn state(&self) -> EditorState {
        match self.phase {
            Phase::Idle => EditorState::Idle,
            Phase::Selecting(_) => EditorState::Selecting,
            Phase::Committed => EditorState::Committed,
        }
    }

    /// The committed crop region, if any.
    pub fn region(&self) -> Option<CropRegion> {
        self.region
    }

    pub fn preview_visible(&self) -> bool {
        self.preview_visible
    }

    /// Toggle the live preview. Ignored while selecting, since the operator
    /// needs to see what they are selecting.
    pub fn set_preview_visible(&mut self, visible: bool) {
        if !matches!(self.phase, Phase::Selecting(_)) {
            self.preview_visible = visible;
        }
    }

    /// The in-progress rectangle in display pixels, normalized so that the
    /// first point is the top-left corner.
    pub fn selection(&self) -> Option<(Point, Point)> {
        let Phase::Selecting(sel) = &self.phase else {
            return None;
        };
        let (start, current) = (sel.start?, sel.current?);
        Some((
            Point::new(start.x.min(current.x), start.y.min(current.y)),
            Point::new(start.x.max(current.x), start.y.max(current.y)),
        ))
    }

    /// Enter `Selecting`, forcing the preview on.
    ///
    /// Returns `false` if a selection is already in progress.
    pub fn begin(&mut self) -> bool {
        if matches!(self.phase, Phase::Selecting(_)) {
            return false;
        }
        self.phase = Phase::Selecting(Selection {
            start: None,
            current: None,
            dragging: false,
            preview_before: self.preview_visible,
        });
        self.preview_visible = true;
        true
    }

    /// Pointer pressed: starts a new rectangle.
    pub fn press(&mut self, at: Point) {
        if let Phase::Selecting(sel) = &mut self.phase {
            sel.start = Some(at);
            sel.current = Some(at);
            sel.dragging = true;
        }
    }

    /// Pointer moved while pressed.
    pub fn drag(&mut self, to: Point) {
        if let Phase::Selecting(sel) = &mut self.phase
            && sel.dragging
            && sel.start.is_some()
        {
            sel.current = Some(to);
        }
    }

    /// Pointer released: the rectangle stays until commit or cancel.
    pub fn release(&mut self) {
        if let Phase::Selecting(sel) = &mut self.phase {
            sel.dragging = false;
        }
    }

    /// Convert the selection to source pixels and store it.
    ///
    /// `source` is the native `(width, height)` of the video. Returns the new
    /// region, or `None` if the selection was degenerate, in which case this
    /// behaves like [`cancel`](Self::cancel).
    pub fn commit(&mut self, display: DisplaySize, source: (u32, u32)) -> Option<CropRegion> {
        let Phase::Selecting(sel) = &self.phase else {
            return None;
        };
        let preview_before = sel.preview_before;

        let region = self
            .selection()
            .and_then(|(min, max)| to_source_region(min, max, display, source));

        match region {
            Some(region) => {
                crate::debug!("crop"; "committed {}", region);
                self.region = Some(region);
                self.phase = Phase::Committed;
                self.preview_visible = preview_before;
                Some(region)
            }
            None => {
                self.cancel();
                None
            }
        }
    }

    /// Drop the in-progress selection, keeping any committed region.
    pub fn cancel(&mut self) {
        if let Phase::Selecting(sel) = &self.phase {
            self.preview_visible = sel.preview_before;
            self.phase = if self.region.is_some() {
                Phase::Committed
            } else {
                Phase::Idle
            };
        }
    }

    /// Forget the committed region.
    pub fn clear(&mut self) {
        self.region = None;
        if matches!(self.phase, Phase::Committed) {
            self.phase = Phase::Idle;
        }
    }

    /// Store a region directly, bypassing selection.
    pub fn set_region(&mut self, region: CropRegion) {
        self.region = Some(region);
        if matches!(self.phase, Phase::Idle) {
            self.phase = Phase::Committed;
        }
    }
}

/// Scale a display-space rectangle by `source / display` on each axis.
fn to_source_region(
    min: Point,
    max: Point,
    display: DisplaySize,
    (source_width, source_height): (u32, u32),
) -> Option<CropRegion> {
    if display.width <= 0.0 || display.height <= 0.0 {
        return None;
    }
    let scale_x = f64::from(source_width) / display.width;
    let scale_y = f64::from(source_height) / display.height;

    let to_px = |v: f64| v.round().max(0.0) as u32;
    CropRegion::new(
        to_px(min.x * scale_x),
        to_px(min.y * scale_y),
        to_px((max.x - min.x) * scale_x),
        to_px((max.y - min.y) * scale_y),
    )
    .ok()
}
