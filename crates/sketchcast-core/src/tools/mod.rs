//! Tool system and the local draw-state machine.

use crate::color::PenColor;
use crate::surface::{Composite, StrokeStyle};
use kurbo::Point;
use serde::{Deserialize, Serialize};

/// Fixed eraser width in pixels.
pub const ERASER_WIDTH: f64 = 20.0;

/// Pen width selected on startup.
pub const DEFAULT_PEN_WIDTH: f64 = 5.0;

/// Widths offered by the line-width selector.
pub const WIDTH_PRESETS: [f64; 3] = [1.0, 3.0, 5.0];

/// Available tools. Pen and eraser are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ToolKind {
    #[default]
    Pen,
    Eraser,
}

/// State of the pointer interaction.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum DrawState {
    /// Waiting for a pointer-down.
    #[default]
    Idle,
    /// A stroke is in progress.
    Drawing {
        /// End of the last rasterized segment.
        last: Point,
        /// Style captured when the stroke started.
        style: StrokeStyle,
    },
}

/// One segment of a stroke, ready to rasterize.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub from: Point,
    pub to: Point,
    pub style: StrokeStyle,
}

/// Manages the current tool, its settings and the stroke in progress.
#[derive(Debug, Clone)]
pub struct ToolManager {
    /// Currently selected tool.
    current_tool: ToolKind,
    /// Pen color for the next stroke.
    color: PenColor,
    /// Pen width for the next stroke.
    width: f64,
    /// Current state of the interaction.
    state: DrawState,
}

impl Default for ToolManager {
    fn default() -> Self {
        Self {
            current_tool: ToolKind::Pen,
            color: PenColor::BLACK,
            width: DEFAULT_PEN_WIDTH,
            state: DrawState::Idle,
        }
    }
}

impl ToolManager {
    /// Create a new tool manager with a black 5px pen.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_tool(&self) -> ToolKind {
        self.current_tool
    }

    pub fn is_eraser(&self) -> bool {
        self.current_tool == ToolKind::Eraser
    }

    pub fn color(&self) -> PenColor {
        self.color
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn state(&self) -> &DrawState {
        &self.state
    }

    /// Check if a stroke is in progress.
    pub fn is_drawing(&self) -> bool {
        matches!(self.state, DrawState::Drawing { .. })
    }

    /// Flip between pen and eraser.
    pub fn toggle_eraser(&mut self) {
        self.current_tool = match self.current_tool {
            ToolKind::Pen => ToolKind::Eraser,
            ToolKind::Eraser => ToolKind::Pen,
        };
    }

    /// Select a pen color. Selecting a color always switches back to the pen.
    ///
    /// A stroke already in progress keeps the color it started with.
    pub fn set_color(&mut self, color: PenColor) {
        self.color = color;
        self.current_tool = ToolKind::Pen;
    }

    /// Select the pen width. Returns false (and changes nothing) for widths
    /// that are not positive and finite.
    pub fn set_width(&mut self, width: f64) -> bool {
        if !(width.is_finite() && width > 0.0) {
            return false;
        }
        self.width = width;
        true
    }

    /// The style a stroke started now would use.
    pub fn stroke_style(&self) -> StrokeStyle {
        match self.current_tool {
            ToolKind::Eraser => StrokeStyle {
                color: PenColor::BLACK,
                width: ERASER_WIDTH,
                composite: Composite::DestinationOut,
            },
            ToolKind::Pen => StrokeStyle {
                color: self.color,
                width: self.width,
                composite: Composite::SourceOver,
            },
        }
    }

    /// Begin a stroke at `point`, fixing its style.
    ///
    /// A pointer-down while already drawing restarts the path at `point`.
    pub fn pointer_down(&mut self, point: Point) {
        self.state = DrawState::Drawing {
            last: point,
            style: self.stroke_style(),
        };
    }

    /// Extend the stroke to `point`. Returns the segment to rasterize, or
    /// `None` when no stroke is in progress.
    pub fn pointer_move(&mut self, point: Point) -> Option<Segment> {
        match &mut self.state {
            DrawState::Idle => None,
            DrawState::Drawing { last, style } => {
                let segment = Segment {
                    from: *last,
                    to: point,
                    style: *style,
                };
                *last = point;
                Some(segment)
            }
        }
    }

    /// End the stroke. Returns true if a stroke was in progress.
    pub fn pointer_up(&mut self) -> bool {
        let was_drawing = self.is_drawing();
        self.state = DrawState::Idle;
        was_drawing
    }
}
