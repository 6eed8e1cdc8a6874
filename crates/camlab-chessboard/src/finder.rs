use std::f32::consts::PI;

use chess_corners::{find_chess_corners_image, ChessConfig, CornerDescriptor, ThresholdMode};
use image::GrayImage;
use log::{debug, warn};
use nalgebra::Point2;

use crate::gridgraph::{assign_grid_coordinates, connected_components, order_complete_grid, GridGraph};
use crate::params::ChessGridParams;
use crate::Corner;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Anything that can locate the inner corners of a `cols x rows` chessboard.
///
/// Returned points are row-major, `cols` per row; `None` when the complete
/// board is not visible.
pub trait ChessboardFinder {
    fn find(&self, img: &GrayImage) -> Option<Vec<Point2<f32>>>;

    /// `(cols, rows)` of inner corners this finder looks for.
    fn pattern_size(&self) -> (usize, usize);
}

impl<F: ChessboardFinder + ?Sized> ChessboardFinder for &F {
    fn find(&self, img: &GrayImage) -> Option<Vec<Point2<f32>>> {
        (**self).find(img)
    }

    fn pattern_size(&self) -> (usize, usize) {
        (**self).pattern_size()
    }
}

/// ChESS corners linked into a 4-connected grid.
#[derive(Clone, Debug)]
pub struct ChessGridFinder {
    pub cols: usize,
    pub rows: usize,
    pub params: ChessGridParams,
}

impl ChessGridFinder {
    pub fn new(cols: usize, rows: usize, params: ChessGridParams) -> Self {
        Self { cols, rows, params }
    }

    pub fn chess_config(&self) -> ChessConfig {
        let mut cfg = ChessConfig::single_scale();
        cfg.threshold_mode = ThresholdMode::Relative;
        cfg.threshold_value = self.params.chess_threshold_rel;
        cfg.nms_radius = self.params.chess_nms_radius;
        cfg
    }

    /// Raw ChESS corners above the strength threshold; empty when the
    /// detector rejects its configuration.
    pub fn detect_corners(&self, img: &GrayImage) -> Vec<Corner> {
        match find_chess_corners_image(img, &self.chess_config()) {
            Ok(found) => found
                .iter()
                .map(adapt_chess_corner)
                .filter(|c| c.strength >= self.params.min_strength)
                .collect(),
            Err(e) => {
                warn!("ChESS detection failed: {e}");
                Vec::new()
            }
        }
    }

    /// Assemble an ordered board from already detected corners.
    pub fn find_in_corners(&self, corners: &[Corner]) -> Option<Vec<Point2<f32>>> {
        let needed = self.cols * self.rows;
        if needed == 0 || corners.len() < needed {
            debug!("{} corners, need {}", corners.len(), needed);
            return None;
        }

        let graph = GridGraph::new(corners, &self.params.graph);
        for component in connected_components(&graph) {
            if component.len() < needed {
                break;
            }
            let Some(cells) = assign_grid_coordinates(&graph, &component) else {
                continue;
            };
            if let Some(order) = order_complete_grid(&cells, self.cols, self.rows) {
                return Some(order.into_iter().map(|i| corners[i].position).collect());
            }
            debug!(
                "component with {} corners does not form a {}x{} grid",
                component.len(),
                self.cols,
                self.rows
            );
        }
        None
    }
}

impl ChessboardFinder for ChessGridFinder {
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, img), fields(width = img.width(), height = img.height()))
    )]
    fn find(&self, img: &GrayImage) -> Option<Vec<Point2<f32>>> {
        let corners = self.detect_corners(img);
        debug!("{} ChESS corners", corners.len());
        self.find_in_corners(&corners)
    }

    fn pattern_size(&self) -> (usize, usize) {
        (self.cols, self.rows)
    }
}

/// The two grid axes bound a dark sector; its bisector is the diagonal
/// through the dark squares, which alternates by 90° between neighbours.
fn diagonal_orientation(c: &CornerDescriptor) -> f32 {
    (0.5 * (c.axes[0].angle + c.axes[1].angle)).rem_euclid(PI)
}

fn adapt_chess_corner(c: &CornerDescriptor) -> Corner {
    Corner {
        position: Point2::new(c.x, c.y),
        orientation: diagonal_orientation(c),
        strength: c.response,
    }
}
