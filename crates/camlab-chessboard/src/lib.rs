//! Chessboard inner-corner finding.
//!
//! Pipeline:
//! 1. ChESS corners from `chess-corners` (position, diagonal orientation, response).
//! 2. A 4-connected graph linking corners whose spacing and orientations fit a grid.
//! 3. BFS grid coordinates per connected component.
//! 4. The first complete `cols x rows` component, ordered row-major.

mod draw;
mod finder;
mod geom;
pub mod gridgraph;
mod params;

pub use draw::draw_chessboard_corners;
pub use finder::{ChessGridFinder, ChessboardFinder};
pub use params::{ChessGridParams, GridGraphParams};

use nalgebra::Point2;

/// A ChESS corner: sub-pixel position, orientation of the diagonal through
/// the bright squares (radians, modulo π) and detector response.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Corner {
    pub position: Point2<f32>,
    pub orientation: f32,
    pub strength: f32,
}
