use serde::{Deserialize, Serialize};

/// Neighbour search for the corner graph.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GridGraphParams {
    pub min_spacing_pix: f32,
    pub max_spacing_pix: f32,
    pub k_neighbors: usize,
    pub orientation_tolerance_deg: f32,
}

impl Default for GridGraphParams {
    fn default() -> Self {
        Self {
            min_spacing_pix: 5.0,
            max_spacing_pix: 120.0,
            k_neighbors: 8,
            orientation_tolerance_deg: 22.5,
        }
    }
}

/// Chessboard finder settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ChessGridParams {
    /// ChESS response below which corners are dropped.
    pub min_strength: f32,
    /// `threshold_rel` handed to the ChESS detector.
    pub chess_threshold_rel: f32,
    /// `nms_radius` handed to the ChESS detector.
    pub chess_nms_radius: u32,
    pub graph: GridGraphParams,
}

impl Default for ChessGridParams {
    fn default() -> Self {
        Self {
            min_strength: 0.0,
            chess_threshold_rel: 0.2,
            chess_nms_radius: 2,
            graph: GridGraphParams::default(),
        }
    }
}
